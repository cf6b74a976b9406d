// src/web/system_handlers.rs
use crate::{
    config::FirebaseClientConfig,
    error::AppResult,
    state::AppState,
};
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    ok: bool,
    store: &'static str,
    version: &'static str,
}

// GET /api/health
pub async fn health(State(state): State<AppState>) -> AppResult<Json<Health>> {
    state.store.ping().await?;
    Ok(Json(Health {
        ok: true,
        store: state.store.backend(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

// GET /api/config/firebase
pub async fn firebase_config(State(state): State<AppState>) -> Json<FirebaseClientConfig> {
    Json(state.config.client.clone())
}
