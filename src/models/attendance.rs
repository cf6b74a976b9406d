// src/models/attendance.rs
use serde::{Deserialize, Serialize};

/// Registo em `attendance/<id>`.
///
/// A coleção mistura duas origens: check-ins avulsos (modelo antigo, sem sessão) e
/// as cópias globais das marcações de sessões. Os campos de cada origem são opcionais.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,

    // --- check-in avulso ---
    /// Epoch em milissegundos, como enviado pelo cliente.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_dni: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,

    // --- cópia de uma marcação de sessão ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_at: Option<String>,
}

/// Corpo de POST /api/attendance (formato flexível vindo do QR antigo).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttendance {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub timestamp: Option<i64>,
    pub student_name: Option<String>,
    pub student_dni: Option<String>,
}
