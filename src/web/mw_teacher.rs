// src/web/mw_teacher.rs
use crate::{error::AppError, web::mw_auth::CurrentUser};
use axum::{
    extract::{Extension, Path, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;

/// Só o próprio docente (ou um admin) acede a `/api/teachers/{uid}/...`.
/// Deve ser executado *depois* do middleware `require_auth`.
pub async fn require_teacher_owner(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let uid = params.get("uid").map(String::as_str).unwrap_or_default();
    match user {
        // Autenticação desligada
        None => Ok(next.run(request).await),
        Some(user) if user.can_act_for(uid) => Ok(next.run(request).await),
        Some(user) => {
            tracing::warn!("Docente MW: {} tentou aceder aos dados de {}.", user.uid, uid);
            Err(AppError::Forbidden)
        }
    }
}

/// Falha com `Forbidden` se o utilizador autenticado não puder agir por `teacher_id`.
pub fn ensure_can_act_for(user: &CurrentUser, teacher_id: &str) -> Result<(), AppError> {
    match &user.0 {
        Some(user) if !user.can_act_for(teacher_id) => {
            tracing::warn!("{} tentou agir em nome do docente {}.", user.uid, teacher_id);
            Err(AppError::Forbidden)
        }
        _ => Ok(()),
    }
}
