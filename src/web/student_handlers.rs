// src/web/student_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        attendance::AttendanceRecord,
        enrollment::Enrollment,
        student::{NewStudent, Student, StudentPatch},
    },
    services::{attendance_service, broadcaster::LiveEvent, enrollment_service, student_service},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

/// Envia a lista completa de alunos aos clientes SSE. Falhas só ficam no log.
async fn broadcast_roster(state: &AppState) {
    match student_service::list_students(state.store.as_ref()).await {
        Ok(students) => {
            state.broadcaster.publish(LiveEvent::new("students", students));
        }
        Err(e) => tracing::warn!("Lista de alunos não enviada aos clientes SSE: {}", e),
    }
}

// GET /api/students
pub async fn list_students(State(state): State<AppState>) -> AppResult<Json<Vec<Student>>> {
    Ok(Json(student_service::list_students(state.store.as_ref()).await?))
}

// GET /api/students/{id}
pub async fn get_student(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Student>> {
    student_service::find_student_by_id(state.store.as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Aluno"))
}

// POST /api/students
pub async fn create_student(
    State(state): State<AppState>,
    Json(input): Json<NewStudent>,
) -> AppResult<(StatusCode, Json<Student>)> {
    let student = student_service::create_student(state.store.as_ref(), input).await?;
    broadcast_roster(&state).await;
    Ok((StatusCode::CREATED, Json(student)))
}

// PUT /api/students/{id}
pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<StudentPatch>,
) -> AppResult<Json<Student>> {
    let student = student_service::update_student(state.store.as_ref(), &id, &patch)
        .await?
        .ok_or_else(|| AppError::not_found("Aluno"))?;
    broadcast_roster(&state).await;
    Ok(Json(student))
}

// DELETE /api/students/{id}
pub async fn delete_student(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    if !student_service::delete_student(state.store.as_ref(), &id).await? {
        return Err(AppError::not_found("Aluno"));
    }
    broadcast_roster(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/students/{id}/enrollments
pub async fn student_enrollments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<Enrollment>>> {
    Ok(Json(enrollment_service::list_for_student(state.store.as_ref(), &id).await?))
}

// GET /api/students/{id}/attendance
pub async fn student_attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    Ok(Json(attendance_service::list_for_student(state.store.as_ref(), &id).await?))
}
