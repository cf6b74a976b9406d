// src/lib.rs
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod store;
pub mod web;

use crate::state::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Router completo da aplicação, com as camadas comuns.
pub fn build_router(app_state: AppState) -> Router {
    web::routes::create_router(app_state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
