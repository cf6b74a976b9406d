// src/services/course_service.rs
use crate::{
    error::AppResult,
    models::course::{Course, CoursePatch, NewCourse},
    services::records::{self, now_iso},
    store::KvStore,
};

pub const COURSES_PATH: &str = "courses";

/// Monta um `Course` novo (sem gravar). Usado também nas unidades de cada docente.
pub fn build_course(id: String, input: NewCourse) -> AppResult<Course> {
    let name = records::required(input.name, "name")?;
    let now = now_iso();
    Ok(Course {
        id,
        name,
        code: input.code,
        description: input.description,
        schedule: input.schedule,
        instructor: input.instructor,
        room: input.room,
        is_default: input.is_default,
        created_at: Some(now.clone()),
        updated_at: Some(now),
    })
}

pub async fn create_course(store: &dyn KvStore, input: NewCourse) -> AppResult<Course> {
    let course = build_course(uuid::Uuid::new_v4().to_string(), input)?;
    records::insert(store, &format!("{}/{}", COURSES_PATH, course.id), &course).await?;
    tracing::info!("✅ Unidade curricular criada: {} ({})", course.name, course.id);
    Ok(course)
}

pub async fn find_course_by_id(store: &dyn KvStore, id: &str) -> AppResult<Option<Course>> {
    records::fetch(store, &records::record_path(COURSES_PATH, id)?).await
}

pub async fn list_courses(store: &dyn KvStore) -> AppResult<Vec<Course>> {
    let mut courses: Vec<Course> = records::fetch_all(store, COURSES_PATH).await?;
    courses.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(courses)
}

pub async fn update_course(store: &dyn KvStore, id: &str, patch: &CoursePatch) -> AppResult<Option<Course>> {
    records::merge(store, &records::record_path(COURSES_PATH, id)?, patch).await
}

/// Apaga só a unidade: inscrições e presenças que a referem ficam como estão.
pub async fn delete_course(store: &dyn KvStore, id: &str) -> AppResult<bool> {
    let deleted = records::remove(store, &records::record_path(COURSES_PATH, id)?).await?;
    if deleted {
        tracing::info!("🗑️ Unidade curricular apagada: {} (sem cascata)", id);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    #[tokio::test]
    async fn crud_cycle() {
        let store = SqliteStore::in_memory().await.unwrap();
        let course = create_course(
            &store,
            NewCourse {
                name: Some("Bases de Datos".into()),
                code: Some("BD1".into()),
                room: Some("Lab 3".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(find_course_by_id(&store, &course.id).await.unwrap(), Some(course.clone()));

        let patch = CoursePatch {
            room: Some("Aula 201".into()),
            ..Default::default()
        };
        let updated = update_course(&store, &course.id, &patch).await.unwrap().unwrap();
        assert_eq!(updated.room.as_deref(), Some("Aula 201"));
        assert_eq!(updated.code.as_deref(), Some("BD1"));

        assert!(delete_course(&store, &course.id).await.unwrap());
        assert!(find_course_by_id(&store, &course.id).await.unwrap().is_none());
        assert!(list_courses(&store).await.unwrap().is_empty());
    }
}
