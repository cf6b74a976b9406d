// src/services/student_service.rs
use crate::{
    error::AppResult,
    models::student::{NewStudent, Student, StudentPatch},
    services::records::{self, now_iso},
    store::KvStore,
};

pub const STUDENTS_PATH: &str = "students";

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Cria um aluno. `name` é obrigatório.
pub async fn create_student(store: &dyn KvStore, input: NewStudent) -> AppResult<Student> {
    let name = records::required(input.name, "name")?;
    let now = now_iso();
    let student = Student {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        email: non_empty(input.email),
        phone: non_empty(input.phone),
        student_id: non_empty(input.student_id),
        created_at: Some(now.clone()),
        updated_at: Some(now),
    };

    records::insert(store, &format!("{}/{}", STUDENTS_PATH, student.id), &student).await?;
    tracing::info!("✅ Aluno criado: {} ({})", student.name, student.id);
    Ok(student)
}

pub async fn find_student_by_id(store: &dyn KvStore, id: &str) -> AppResult<Option<Student>> {
    records::fetch(store, &records::record_path(STUDENTS_PATH, id)?).await
}

/// Procura pelo número de matrícula (leitura da coleção inteira, sem índice).
pub async fn find_student_by_student_id(store: &dyn KvStore, student_id: &str) -> AppResult<Option<Student>> {
    let students = list_students(store).await?;
    Ok(students
        .into_iter()
        .find(|s| s.student_id.as_deref() == Some(student_id)))
}

/// Lista de alunos ordenada por nome.
pub async fn list_students(store: &dyn KvStore) -> AppResult<Vec<Student>> {
    let mut students: Vec<Student> = records::fetch_all(store, STUDENTS_PATH).await?;
    students.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(students)
}

pub async fn update_student(store: &dyn KvStore, id: &str, patch: &StudentPatch) -> AppResult<Option<Student>> {
    let updated = records::merge(store, &records::record_path(STUDENTS_PATH, id)?, patch).await?;
    if updated.is_some() {
        tracing::info!("✅ Aluno atualizado: {}", id);
    }
    Ok(updated)
}

pub async fn delete_student(store: &dyn KvStore, id: &str) -> AppResult<bool> {
    let deleted = records::remove(store, &records::record_path(STUDENTS_PATH, id)?).await?;
    if deleted {
        tracing::info!("🗑️ Aluno apagado: {}", id);
    }
    Ok(deleted)
}

/// Cria o aluno na primeira leitura de QR ou atualiza os contactos nas seguintes.
/// Contactos em falta no pedido mantêm os valores guardados.
pub async fn upsert_from_scan(
    store: &dyn KvStore,
    student_id: &str,
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
) -> AppResult<Student> {
    match find_student_by_student_id(store, student_id).await? {
        Some(existing) => {
            let patch = StudentPatch {
                name: name.map(str::to_string),
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
                student_id: None,
            };
            let updated = update_student(store, &existing.id, &patch).await?;
            Ok(updated.unwrap_or(existing))
        }
        None => {
            let input = NewStudent {
                // Sem nome, o número de matrícula serve de nome.
                name: Some(name.unwrap_or(student_id).to_string()),
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
                student_id: Some(student_id.to_string()),
            };
            create_student(store, input).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AppError, store::SqliteStore};

    #[tokio::test]
    async fn create_then_get_round_trips_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        let created = create_student(
            &store,
            NewStudent {
                name: Some("Ana".into()),
                email: Some("ana@x.com".into()),
                phone: Some("+351 900".into()),
                student_id: Some("2024001".into()),
            },
        )
        .await
        .unwrap();

        let fetched = find_student_by_id(&store, &created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.student_id.as_deref(), Some("2024001"));
        assert!(fetched.created_at.is_some());
    }

    #[tokio::test]
    async fn create_requires_name() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = create_student(&store, NewStudent::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn update_and_delete_signal_missing_ids() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(update_student(&store, "nope", &StudentPatch::default()).await.unwrap().is_none());
        assert!(!delete_student(&store, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn update_is_shallow_merge_with_new_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        let created = create_student(
            &store,
            NewStudent {
                name: Some("Ana".into()),
                email: Some("ana@x.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let patch = StudentPatch {
            phone: Some("123".into()),
            ..Default::default()
        };
        let updated = update_student(&store, &created.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.name, "Ana");
        assert_eq!(updated.email.as_deref(), Some("ana@x.com"));
        assert_eq!(updated.phone.as_deref(), Some("123"));
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn upsert_creates_once_then_merges_contacts() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = upsert_from_scan(&store, "S1", Some("Ana"), Some("a@x"), None).await.unwrap();
        let second = upsert_from_scan(&store, "S1", Some("Ana Maria"), None, Some("999")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Ana Maria");
        assert_eq!(second.email.as_deref(), Some("a@x"));
        assert_eq!(second.phone.as_deref(), Some("999"));
        assert_eq!(list_students(&store).await.unwrap().len(), 1);
    }
}
