// src/error.rs
use crate::store::StoreError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // --- Erros do cliente (4xx): esperados, não são falhas do servidor ---
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Esta sessão já não está ativa")]
    SessionClosed,

    #[error("O aluno não está inscrito nesta unidade curricular")]
    NotEnrolled,

    #[error("Não autorizado: {0}")]
    Unauthorized(String),

    #[error("Acesso negado")]
    Forbidden,

    #[error("Verificação CAPTCHA falhou")]
    Captcha,

    // --- Erros do servidor (5xx) ---
    #[error("Erro no armazenamento: {0}")]
    Store(#[from] StoreError),

    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro interno inesperado")]
    Internal,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::SessionClosed | AppError::Captcha => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::NotEnrolled => StatusCode::FORBIDDEN,
            AppError::Store(_) | AppError::Config(_) | AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} não encontrado(a)", what))
    }
}

// Como converter AppError numa resposta HTTP
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        let message = if status.is_server_error() {
            // Detalhe completo só no log; o cliente recebe uma mensagem genérica.
            tracing::error!("Erro processado: {:?}", self);
            match self {
                AppError::Store(_) => "Erro ao aceder aos dados.".to_string(),
                AppError::Config(_) => "Erro de configuração.".to_string(),
                _ => "Ocorreu um erro inesperado.".to_string(),
            }
        } else {
            tracing::debug!("Pedido rejeitado ({}): {}", status.as_u16(), self);
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

// Tipo Result padrão para a aplicação
pub type AppResult<T = ()> = Result<T, AppError>;
