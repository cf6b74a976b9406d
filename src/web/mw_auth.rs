// src/web/mw_auth.rs
use crate::{error::AppError, services::token_service::{self, AuthUser}, state::AppState};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

/// Utilizador do pedido, posto nas extensões por `require_auth`.
/// `None` quando a autenticação está desligada.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Option<AuthUser>);

// Middleware que exige um ID token Firebase válido
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(verifier) = state.verifier.clone() else {
        request.extensions_mut().insert(CurrentUser(None));
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(token) = token_service::bearer_token(header).map(str::to_string) else {
        tracing::debug!("Autenticação MW: pedido sem bearer token para {}", request.uri().path());
        return Err(AppError::Unauthorized("Token de autenticação em falta".to_string()));
    };

    let user = verifier.verify(&token).await?;
    tracing::debug!("Autenticação MW: utilizador '{}' autenticado.", user.uid);
    request.extensions_mut().insert(CurrentUser(Some(user)));
    Ok(next.run(request).await)
}
