// src/models/teacher.rs
use serde::{Deserialize, Serialize};

/// Dados do docente em `teachers/<uid>` (ao lado das suas coleções).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
}

/// Coleções de cada docente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeacherCollection {
    Courses,
    Students,
    Attendance,
}

impl TeacherCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeacherCollection::Courses => "courses",
            TeacherCollection::Students => "students",
            TeacherCollection::Attendance => "attendance",
        }
    }
}
