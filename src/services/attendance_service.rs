// src/services/attendance_service.rs
//! Check-ins avulsos em `attendance/<id>` (o modelo anterior às sessões).
//! A mesma coleção recebe as cópias globais das marcações de sessão.

use crate::{
    error::{AppError, AppResult},
    models::attendance::{AttendanceRecord, NewAttendance},
    services::{
        course_service, records::{self, now_iso},
        student_service,
    },
    store::KvStore,
};

pub const ATTENDANCE_PATH: &str = "attendance";

/// Só `courseId` é obrigatório; o aluno pode ficar por identificar.
pub async fn create_attendance(store: &dyn KvStore, input: NewAttendance) -> AppResult<AttendanceRecord> {
    let course_id = records::required(input.course_id, "courseId")?;
    let student_id = input.student_id.filter(|s| !s.trim().is_empty());

    let record = AttendanceRecord {
        id: uuid::Uuid::new_v4().to_string(),
        student_id,
        course_id: Some(course_id),
        student_name: input.student_name,
        timestamp: Some(input.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis())),
        student_dni: input.student_dni,
        recorded_at: Some(now_iso()),
        session_id: None,
        course_name: None,
        teacher_id: None,
        student_email: None,
        student_phone: None,
        marked_at: None,
    };
    records::insert(store, &format!("{}/{}", ATTENDANCE_PATH, record.id), &record).await?;
    tracing::info!("✅ Presença registada: {}", record.id);
    Ok(record)
}

pub async fn find_attendance_by_id(store: &dyn KvStore, id: &str) -> AppResult<Option<AttendanceRecord>> {
    records::fetch(store, &records::record_path(ATTENDANCE_PATH, id)?).await
}

/// Todos os registos, mais recentes primeiro.
pub async fn list_attendance(store: &dyn KvStore) -> AppResult<Vec<AttendanceRecord>> {
    let mut all: Vec<AttendanceRecord> = records::fetch_all(store, ATTENDANCE_PATH).await?;
    all.sort_by_key(|r| std::cmp::Reverse(sort_key(r)));
    Ok(all)
}

fn sort_key(record: &AttendanceRecord) -> String {
    record
        .marked_at
        .clone()
        .or_else(|| record.recorded_at.clone())
        .unwrap_or_default()
}

/// Registos de um aluno (pelo ID do registo do aluno). `NotFound` se o aluno não existir.
pub async fn list_for_student(store: &dyn KvStore, id: &str) -> AppResult<Vec<AttendanceRecord>> {
    let student = student_service::find_student_by_id(store, id)
        .await?
        .ok_or_else(|| AppError::not_found("Aluno"))?;
    Ok(list_attendance(store)
        .await?
        .into_iter()
        .filter(|r| {
            let sid = r.student_id.as_deref();
            sid == Some(student.id.as_str()) || (sid.is_some() && sid == student.student_id.as_deref())
        })
        .collect())
}

/// Registos de uma unidade curricular. `NotFound` se a unidade não existir.
pub async fn list_for_course(store: &dyn KvStore, course_id: &str) -> AppResult<Vec<AttendanceRecord>> {
    course_service::find_course_by_id(store, course_id)
        .await?
        .ok_or_else(|| AppError::not_found("Unidade curricular"))?;
    Ok(list_attendance(store)
        .await?
        .into_iter()
        .filter(|r| r.course_id.as_deref() == Some(course_id))
        .collect())
}

pub async fn delete_attendance(store: &dyn KvStore, id: &str) -> AppResult<bool> {
    records::remove(store, &records::record_path(ATTENDANCE_PATH, id)?).await
}
