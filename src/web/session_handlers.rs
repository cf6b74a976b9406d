// src/web/session_handlers.rs
use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::session::{AttendanceMark, MarkAttendanceRequest, NewSession, Session, SessionAttendance},
    state::AppState,
    web::{mw_auth::CurrentUser, mw_teacher},
};
use axum::{
    extract::{Extension, Path, State},
    http::{header::HOST, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    session_id: String,
    qr_url: String,
    message: &'static str,
}

#[derive(Serialize)]
pub struct CloseSessionResponse {
    message: &'static str,
    session: Session,
}

#[derive(Serialize)]
pub struct MarkAttendanceResponse {
    message: &'static str,
    attendance: AttendanceMark,
}

/// Base pública dos links de QR: `PUBLIC_BASE_URL` ou o `Host` do pedido.
fn public_base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(base) = &config.public_base_url {
        return base.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    format!("{}://{}", proto, host)
}

// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(input): Json<NewSession>,
) -> AppResult<(StatusCode, Json<CreateSessionResponse>)> {
    if let Some(teacher_id) = input.teacher_id.as_deref() {
        mw_teacher::ensure_can_act_for(&user, teacher_id)?;
    }
    let base_url = public_base_url(&state.config, &headers);
    let created = state.sessions.create(input, &base_url).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: created.session_id,
            qr_url: created.qr_url,
            message: "Sessão criada. Partilhe este QR com os alunos.",
        }),
    ))
}

// GET /api/sessions
pub async fn list_sessions(State(state): State<AppState>) -> AppResult<Json<Vec<Session>>> {
    Ok(Json(state.sessions.list().await?))
}

// GET /api/sessions/{id}
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Session>> {
    state
        .sessions
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Sessão"))
}

// PATCH /api/sessions/{id}/close
pub async fn close_session(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<CloseSessionResponse>> {
    if user.0.is_some() {
        let session = state
            .sessions
            .get(&id)
            .await?
            .ok_or_else(|| AppError::not_found("Sessão"))?;
        mw_teacher::ensure_can_act_for(&user, &session.teacher_id)?;
    }
    let session = state.sessions.close(&id).await?;
    Ok(Json(CloseSessionResponse {
        message: "Sessão fechada",
        session,
    }))
}

// POST /api/sessions/{id}/attendance
pub async fn mark_attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MarkAttendanceRequest>,
) -> AppResult<(StatusCode, Json<MarkAttendanceResponse>)> {
    if let Some(captcha) = &state.captcha {
        let remote_ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim);
        captcha.verify(request.captcha_token.as_deref(), remote_ip).await?;
    }

    let attendance = state.sessions.mark(&id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(MarkAttendanceResponse {
            message: "Presença registada",
            attendance,
        }),
    ))
}

// GET /api/sessions/{id}/attendance
pub async fn session_attendance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionAttendance>> {
    Ok(Json(state.sessions.report(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn base_url_prefers_configured_value() {
        let mut config = Config::local("sqlite::memory:");
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("sala.local:5000"));
        assert_eq!(public_base_url(&config, &headers), "http://sala.local:5000");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(public_base_url(&config, &headers), "https://sala.local:5000");

        config.public_base_url = Some("https://chamada.example".into());
        assert_eq!(public_base_url(&config, &headers), "https://chamada.example");
    }
}
