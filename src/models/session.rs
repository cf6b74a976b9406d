// src/models/session.rs
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Closed,
}

/// Uma marcação de presença dentro de uma sessão.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_email: Option<String>,
    #[serde(default)]
    pub student_phone: Option<String>,
    #[serde(default)]
    pub marked_at: String,
}

impl AttendanceMark {
    /// Chave canónica em `sessions/<id>/attendees/<chave>`.
    pub fn key(&self) -> Option<String> {
        attendee_key(self.student_id.as_deref(), self.student_name.as_deref())
    }
}

/// Sessão de chamada em `sessions/<sessionId>`.
///
/// Os `attendees` são sempre um mapa chave -> marcação. Dados antigos guardados como
/// array (ou com chaves numéricas) são normalizados na leitura.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub teacher_id: String,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub qr_url: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub closed_at: Option<String>,
    #[serde(default, deserialize_with = "deserialize_attendees")]
    pub attendees: BTreeMap<String, AttendanceMark>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Já existe uma marcação para esta chave (ou para o mesmo número de aluno)?
    pub fn has_attendee(&self, key: &str, student_id: Option<&str>) -> bool {
        self.attendees.contains_key(key)
            || student_id.is_some_and(|id| {
                self.attendees
                    .values()
                    .any(|mark| mark.student_id.as_deref() == Some(id))
            })
    }

    /// Relatório da sessão, com as marcações ordenadas por hora.
    pub fn report(&self) -> SessionAttendance {
        let mut attendees: Vec<AttendanceMark> = self.attendees.values().cloned().collect();
        attendees.sort_by(|a, b| a.marked_at.cmp(&b.marked_at));
        SessionAttendance {
            session_id: self.session_id.clone(),
            course_id: self.course_id.clone(),
            course_name: self.course_name.clone(),
            total_attendees: attendees.len(),
            attendees,
            created_at: self.created_at.clone(),
            closed_at: self.closed_at.clone(),
        }
    }
}

fn deserialize_attendees<'de, D>(deserializer: D) -> Result<BTreeMap<String, AttendanceMark>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(normalize_attendees(raw))
}

/// Converte array ou mapa de marcações no mapa canónico. Entradas ilegíveis são ignoradas.
pub fn normalize_attendees(raw: Option<Value>) -> BTreeMap<String, AttendanceMark> {
    let entries: Vec<(Option<String>, Value)> = match raw {
        Some(Value::Array(items)) => items.into_iter().map(|v| (None, v)).collect(),
        Some(Value::Object(map)) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        _ => Vec::new(),
    };

    let mut attendees = BTreeMap::new();
    for (raw_key, value) in entries {
        if value.is_null() {
            continue;
        }
        match serde_json::from_value::<AttendanceMark>(value) {
            Ok(mark) => {
                if let Some(key) = mark.key().or(raw_key) {
                    attendees.insert(key, mark);
                }
            }
            Err(e) => tracing::warn!("Marcação de presença ilegível ignorada: {}", e),
        }
    }
    attendees
}

/// Marcação guardada fora da sua chave canónica (array antigo ou chave antiga).
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyAttendee {
    /// Chave em que está guardada agora (ex.: "0").
    pub stored_key: String,
    /// Chave canónica para onde deve ir.
    pub key: String,
    pub value: Value,
}

/// Entradas dos attendees guardados que não estão no formato canónico.
pub fn legacy_attendees(raw: Option<&Value>) -> Vec<LegacyAttendee> {
    let entries: Vec<(String, &Value)> = match raw {
        Some(Value::Array(items)) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|(stored_key, value)| {
            let key = serde_json::from_value::<AttendanceMark>(value.clone()).ok()?.key()?;
            (key != stored_key).then(|| LegacyAttendee {
                stored_key,
                key,
                value: value.clone(),
            })
        })
        .collect()
}

/// Prefixo das chaves de leituras só com nome. Numa chave codificada cada '%' é
/// seguido de dois dígitos hexadecimais, por isso nenhum número de aluno gera este prefixo.
const NAME_KEY_PREFIX: &str = "%nome-";

/// Chave de um aluno dentro da sessão: o número de matrícula codificado ou, na falta
/// dele, o nome em minúsculas. A codificação é injetiva: IDs diferentes dão chaves diferentes.
pub fn attendee_key(student_id: Option<&str>, student_name: Option<&str>) -> Option<String> {
    if let Some(id) = student_id.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(encode_key(id));
    }
    student_name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| format!("{}{}", NAME_KEY_PREFIX, encode_key(&name.to_lowercase())))
}

/// Percent-encoding dos caracteres proibidos em chaves (e do próprio '%').
fn encode_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '.' | '#' | '$' | '[' | ']' | '/' | '%') || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                key.push_str(&format!("%{:02X}", byte));
            }
        } else {
            key.push(c);
        }
    }
    key
}

// --- Pedidos e respostas da API ---

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub teacher_id: Option<String>,
    pub teacher_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
    pub qr_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceRequest {
    pub student_id: Option<String>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub student_phone: Option<String>,
    /// Só exigido quando a verificação CAPTCHA está ativa.
    pub captcha_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAttendance {
    pub session_id: String,
    pub course_id: String,
    pub course_name: Option<String>,
    pub total_attendees: usize,
    pub attendees: Vec<AttendanceMark>,
    pub created_at: String,
    pub closed_at: Option<String>,
}
