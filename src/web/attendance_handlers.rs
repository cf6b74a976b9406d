// src/web/attendance_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::attendance::{AttendanceRecord, NewAttendance},
    services::attendance_service,
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn list_attendance(State(state): State<AppState>) -> AppResult<Json<Vec<AttendanceRecord>>> {
    Ok(Json(attendance_service::list_attendance(state.store.as_ref()).await?))
}

pub async fn get_attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<AttendanceRecord>> {
    attendance_service::find_attendance_by_id(state.store.as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Registo de presença"))
}

pub async fn create_attendance(
    State(state): State<AppState>,
    Json(input): Json<NewAttendance>,
) -> AppResult<(StatusCode, Json<AttendanceRecord>)> {
    let record = attendance_service::create_attendance(state.store.as_ref(), input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_attendance(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    if attendance_service::delete_attendance(state.store.as_ref(), &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Registo de presença"))
    }
}
