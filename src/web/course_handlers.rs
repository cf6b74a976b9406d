// src/web/course_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        attendance::AttendanceRecord,
        course::{Course, CoursePatch, NewCourse},
        enrollment::Enrollment,
    },
    services::{attendance_service, course_service, enrollment_service},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

pub async fn list_courses(State(state): State<AppState>) -> AppResult<Json<Vec<Course>>> {
    Ok(Json(course_service::list_courses(state.store.as_ref()).await?))
}

pub async fn get_course(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Course>> {
    course_service::find_course_by_id(state.store.as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Unidade curricular"))
}

pub async fn create_course(
    State(state): State<AppState>,
    Json(input): Json<NewCourse>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = course_service::create_course(state.store.as_ref(), input).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update_course(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<CoursePatch>,
) -> AppResult<Json<Course>> {
    course_service::update_course(state.store.as_ref(), &id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Unidade curricular"))
}

pub async fn delete_course(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    if course_service::delete_course(state.store.as_ref(), &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Unidade curricular"))
    }
}

// GET /api/courses/{id}/enrollments (só ativas)
pub async fn course_enrollments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Enrollment>>> {
    Ok(Json(enrollment_service::list_active_for_course(state.store.as_ref(), &id).await?))
}

pub async fn course_attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    Ok(Json(attendance_service::list_for_course(state.store.as_ref(), &id).await?))
}
