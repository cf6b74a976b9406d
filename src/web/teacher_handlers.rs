// src/web/teacher_handlers.rs
use crate::{
    error::AppResult,
    models::{course::NewCourse, student::NewStudent, teacher::{TeacherCollection, TeacherProfile}},
    services::teacher_service,
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    created_courses: usize,
}

async fn list(state: &AppState, uid: &str, collection: TeacherCollection) -> AppResult<Json<Vec<Value>>> {
    Ok(Json(teacher_service::list_collection(state.store.as_ref(), uid, collection).await?))
}

// GET /api/teachers/{uid}/courses
pub async fn list_courses(State(state): State<AppState>, Path(uid): Path<String>) -> AppResult<Json<Vec<Value>>> {
    list(&state, &uid, TeacherCollection::Courses).await
}

// GET /api/teachers/{uid}/students
pub async fn list_students(State(state): State<AppState>, Path(uid): Path<String>) -> AppResult<Json<Vec<Value>>> {
    list(&state, &uid, TeacherCollection::Students).await
}

// GET /api/teachers/{uid}/attendance
pub async fn list_attendance(State(state): State<AppState>, Path(uid): Path<String>) -> AppResult<Json<Vec<Value>>> {
    list(&state, &uid, TeacherCollection::Attendance).await
}

// POST /api/teachers/{uid}/init (corpo opcional com o perfil)
pub async fn init_teacher(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    profile: Option<Json<TeacherProfile>>,
) -> AppResult<Json<InitResponse>> {
    let profile = profile.map(|Json(p)| p).unwrap_or_default();
    let created_courses = teacher_service::init_teacher(state.store.as_ref(), &uid, profile).await?;
    Ok(Json(InitResponse { created_courses }))
}

// POST /api/teachers/{uid}/courses
pub async fn add_course(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(input): Json<NewCourse>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let course = teacher_service::add_course(state.store.as_ref(), &uid, input).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

// POST /api/teachers/{uid}/students
pub async fn add_student(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Json(input): Json<NewStudent>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let student = teacher_service::add_student(state.store.as_ref(), &uid, input).await?;
    Ok((StatusCode::CREATED, Json(student)))
}
