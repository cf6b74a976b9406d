// src/models/enrollment.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    #[default]
    Active,
    Inactive,
    Completed,
}

/// Relação aluno <-> unidade curricular, em `enrollments/<id>`.
/// Anular a inscrição muda o estado; o registo nunca é apagado por isso.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub carrera: String,
    #[serde(default)]
    pub ciclo: String,
    #[serde(default)]
    pub status: EnrollmentStatus,
    #[serde(default)]
    pub enrolled_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEnrollment {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub carrera: Option<String>,
    pub ciclo: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciclo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EnrollmentStatus>,
}

/// Corpo de POST /api/enrollments/unenroll.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnenrollRequest {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
}
