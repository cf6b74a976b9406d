// src/services/enrollment_service.rs
use crate::{
    error::{AppError, AppResult},
    models::enrollment::{Enrollment, EnrollmentPatch, EnrollmentStatus, NewEnrollment},
    services::{
        broadcaster::{Broadcaster, LiveEvent},
        records::{self, now_iso},
    },
    store::KvStore,
};
use futures_util::StreamExt;
use std::sync::Arc;

pub const ENROLLMENTS_PATH: &str = "enrollments";

/// Inscreve um aluno numa unidade curricular.
///
/// Com uma inscrição ativa para o mesmo par devolve `Conflict`. Se só existir uma
/// inscrição inativa/concluída, essa é reativada em vez de se criar um segundo registo.
pub async fn enroll_student(store: &dyn KvStore, input: NewEnrollment) -> AppResult<Enrollment> {
    let student_id = records::required(input.student_id, "studentId")?;
    let course_id = records::required(input.course_id, "courseId")?;

    let existing = find_all_for_pair(store, &student_id, &course_id).await?;
    if existing.iter().any(Enrollment::is_active) {
        tracing::debug!("Inscrição duplicada: aluno {} já inscrito em {}", student_id, course_id);
        return Err(AppError::Conflict("O aluno já está inscrito nesta unidade curricular".to_string()));
    }

    if let Some(previous) = existing.into_iter().next() {
        let patch = EnrollmentPatch {
            carrera: input.carrera,
            ciclo: input.ciclo,
            status: Some(EnrollmentStatus::Active),
        };
        let reactivated = update_enrollment(store, &previous.id, &patch)
            .await?
            .ok_or(AppError::Internal)?;
        tracing::info!("✅ Inscrição {} reativada ({} em {})", reactivated.id, student_id, course_id);
        return Ok(reactivated);
    }

    let now = now_iso();
    let enrollment = Enrollment {
        id: uuid::Uuid::new_v4().to_string(),
        student_id,
        course_id,
        carrera: input.carrera.unwrap_or_default(),
        ciclo: input.ciclo.unwrap_or_default(),
        status: EnrollmentStatus::Active,
        enrolled_at: Some(now.clone()),
        updated_at: Some(now),
    };
    records::insert(store, &format!("{}/{}", ENROLLMENTS_PATH, enrollment.id), &enrollment).await?;
    tracing::info!(
        "✅ Aluno {} inscrito em {} ({})",
        enrollment.student_id,
        enrollment.course_id,
        enrollment.id
    );
    Ok(enrollment)
}

async fn find_all_for_pair(store: &dyn KvStore, student_id: &str, course_id: &str) -> AppResult<Vec<Enrollment>> {
    Ok(list_enrollments(store)
        .await?
        .into_iter()
        .filter(|e| e.student_id == student_id && e.course_id == course_id)
        .collect())
}

/// Inscrição do par (aluno, unidade), preferindo a ativa se houver mais de uma.
pub async fn find_by_student_and_course(
    store: &dyn KvStore,
    student_id: &str,
    course_id: &str,
) -> AppResult<Option<Enrollment>> {
    let mut found = find_all_for_pair(store, student_id, course_id).await?;
    found.sort_by_key(|e| !e.is_active());
    Ok(found.into_iter().next())
}

pub async fn find_enrollment_by_id(store: &dyn KvStore, id: &str) -> AppResult<Option<Enrollment>> {
    records::fetch(store, &records::record_path(ENROLLMENTS_PATH, id)?).await
}

pub async fn list_enrollments(store: &dyn KvStore) -> AppResult<Vec<Enrollment>> {
    records::fetch_all(store, ENROLLMENTS_PATH).await
}

/// Todas as inscrições de um aluno (qualquer estado).
pub async fn list_for_student(store: &dyn KvStore, student_id: &str) -> AppResult<Vec<Enrollment>> {
    Ok(list_enrollments(store)
        .await?
        .into_iter()
        .filter(|e| e.student_id == student_id)
        .collect())
}

/// Inscrições ativas de uma unidade curricular.
pub async fn list_active_for_course(store: &dyn KvStore, course_id: &str) -> AppResult<Vec<Enrollment>> {
    Ok(list_enrollments(store)
        .await?
        .into_iter()
        .filter(|e| e.course_id == course_id && e.is_active())
        .collect())
}

pub async fn update_enrollment(
    store: &dyn KvStore,
    id: &str,
    patch: &EnrollmentPatch,
) -> AppResult<Option<Enrollment>> {
    records::merge(store, &records::record_path(ENROLLMENTS_PATH, id)?, patch).await
}

pub async fn delete_enrollment(store: &dyn KvStore, id: &str) -> AppResult<bool> {
    records::remove(store, &records::record_path(ENROLLMENTS_PATH, id)?).await
}

/// Anula a inscrição ativa do par, mudando o estado para `inactive`.
pub async fn unenroll(store: &dyn KvStore, student_id: &str, course_id: &str) -> AppResult<Enrollment> {
    let active = find_all_for_pair(store, student_id, course_id)
        .await?
        .into_iter()
        .find(Enrollment::is_active)
        .ok_or_else(|| AppError::not_found("Inscrição ativa"))?;

    let patch = EnrollmentPatch {
        status: Some(EnrollmentStatus::Inactive),
        ..Default::default()
    };
    let updated = update_enrollment(store, &active.id, &patch)
        .await?
        .ok_or_else(|| AppError::not_found("Inscrição"))?;
    tracing::info!("Inscrição {} anulada ({} em {})", updated.id, student_id, course_id);
    Ok(updated)
}

/// Reencaminha as mudanças em `enrollments/` para os clientes SSE como eventos `enrollment`.
/// Termina quando o stream do armazenamento termina.
pub async fn forward_enrollment_changes(store: Arc<dyn KvStore>, broadcaster: Broadcaster) {
    let mut changes = store.watch(ENROLLMENTS_PATH);
    tracing::info!("👀 A observar alterações em '{}'", ENROLLMENTS_PATH);
    while let Some(event) = changes.next().await {
        broadcaster.publish(LiveEvent::new("enrollment", &event));
    }
    tracing::warn!("Observação de '{}' terminou.", ENROLLMENTS_PATH);
}
