// src/web/enrollment_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::enrollment::{Enrollment, EnrollmentPatch, NewEnrollment, UnenrollRequest},
    services::{enrollment_service, records},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

// POST /api/enrollments (409 se já houver inscrição ativa)
pub async fn enroll(
    State(state): State<AppState>,
    Json(input): Json<NewEnrollment>,
) -> AppResult<(StatusCode, Json<Enrollment>)> {
    let enrollment = enrollment_service::enroll_student(state.store.as_ref(), input).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn list_enrollments(State(state): State<AppState>) -> AppResult<Json<Vec<Enrollment>>> {
    Ok(Json(enrollment_service::list_enrollments(state.store.as_ref()).await?))
}

pub async fn get_enrollment(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Enrollment>> {
    enrollment_service::find_enrollment_by_id(state.store.as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Inscrição"))
}

pub async fn update_enrollment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<EnrollmentPatch>,
) -> AppResult<Json<Enrollment>> {
    enrollment_service::update_enrollment(state.store.as_ref(), &id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Inscrição"))
}

pub async fn delete_enrollment(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    if enrollment_service::delete_enrollment(state.store.as_ref(), &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Inscrição"))
    }
}

// POST /api/enrollments/unenroll
pub async fn unenroll(
    State(state): State<AppState>,
    Json(request): Json<UnenrollRequest>,
) -> AppResult<Json<Enrollment>> {
    let student_id = records::required(request.student_id, "studentId")?;
    let course_id = records::required(request.course_id, "courseId")?;
    let enrollment = enrollment_service::unenroll(state.store.as_ref(), &student_id, &course_id).await?;
    Ok(Json(enrollment))
}
