// src/services/teacher_service.rs
//! Dados de cada docente em `teachers/<uid>/{courses,students,attendance}`.
//! Estes registos também são escritos diretamente pelos browsers, por isso são
//! devolvidos como JSON cru (com a chave em `key`).

use crate::{
    error::{AppError, AppResult},
    models::{
        course::{NewCourse, DEFAULT_COURSES},
        student::NewStudent,
        teacher::{TeacherCollection, TeacherProfile},
    },
    services::{course_service, records},
    store::{tree, KvStore},
};
use serde_json::{Map, Value};

fn teacher_path(uid: &str) -> AppResult<String> {
    records::record_path("teachers", uid)
}

pub async fn list_collection(store: &dyn KvStore, uid: &str, collection: TeacherCollection) -> AppResult<Vec<Value>> {
    let path = tree::join(&teacher_path(uid)?, collection.as_str());
    records::fetch_keyed(store, &path).await
}

/// Prepara a conta de um docente: grava o perfil e cria as unidades predefinidas
/// se ainda não tiver nenhuma. Devolve quantas unidades foram criadas.
pub async fn init_teacher(store: &dyn KvStore, uid: &str, profile: TeacherProfile) -> AppResult<usize> {
    let base = teacher_path(uid)?;

    if let Ok(Value::Object(fields)) = serde_json::to_value(&profile) {
        if !fields.is_empty() {
            let mut fields: Map<String, Value> = fields;
            fields.insert("updatedAt".to_string(), Value::String(records::now_iso()));
            store.update(&base, fields).await?;
        }
    }

    let courses_path = tree::join(&base, TeacherCollection::Courses.as_str());
    if store.read(&courses_path).await?.is_some() {
        tracing::debug!("Docente {} já tem unidades; nada a criar.", uid);
        return Ok(0);
    }

    for default in DEFAULT_COURSES {
        let input = NewCourse {
            name: Some(default.name.to_string()),
            code: None,
            description: Some(default.description.to_string()),
            schedule: Some(default.schedule.to_string()),
            instructor: Some(default.instructor.to_string()),
            room: Some(default.room.to_string()),
            is_default: true,
        };
        push_course(store, &courses_path, input).await?;
    }
    tracing::info!("✅ {} unidades predefinidas criadas para o docente {}", DEFAULT_COURSES.len(), uid);
    Ok(DEFAULT_COURSES.len())
}

pub async fn add_course(store: &dyn KvStore, uid: &str, input: NewCourse) -> AppResult<Value> {
    let path = tree::join(&teacher_path(uid)?, TeacherCollection::Courses.as_str());
    push_course(store, &path, input).await
}

async fn push_course(store: &dyn KvStore, collection: &str, input: NewCourse) -> AppResult<Value> {
    // O id fica vazio: nestas coleções a identidade é a chave gerada pelo push.
    let course = course_service::build_course(String::new(), input)?;
    push_record(store, collection, &course).await
}

/// Acrescenta um aluno à lista privada do docente. A lista global `students/` não muda,
/// por isso não há evento `students`; os browsers seguem `teachers/<uid>` pelo store.
pub async fn add_student(store: &dyn KvStore, uid: &str, input: NewStudent) -> AppResult<Value> {
    let name = records::required(input.name, "name")?;
    let now = records::now_iso();
    let mut fields = Map::new();
    fields.insert("name".to_string(), Value::String(name));
    for (field, value) in [("email", input.email), ("phone", input.phone), ("studentId", input.student_id)] {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            fields.insert(field.to_string(), Value::String(value));
        }
    }
    fields.insert("createdAt".to_string(), Value::String(now.clone()));
    fields.insert("updatedAt".to_string(), Value::String(now));

    let path = tree::join(&teacher_path(uid)?, TeacherCollection::Students.as_str());
    push_record(store, &path, &Value::Object(fields)).await
}

async fn push_record<T: serde::Serialize>(store: &dyn KvStore, collection: &str, record: &T) -> AppResult<Value> {
    let mut value = serde_json::to_value(record).map_err(|e| {
        tracing::error!("Erro ao serializar registo para '{}': {:?}", collection, e);
        AppError::Internal
    })?;
    if let Value::Object(fields) = &mut value {
        // `id` vazio e campos nulos não são guardados.
        fields.retain(|key, v| !v.is_null() && !(key == "id" && v.as_str() == Some("")));
    }
    let key = store.push(collection, value.clone()).await?;
    if let Value::Object(fields) = &mut value {
        fields.insert("key".to_string(), Value::String(key.clone()));
    }
    tracing::info!("✅ Registo {} criado em '{}'", key, collection);
    Ok(value)
}
