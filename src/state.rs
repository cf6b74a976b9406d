// src/state.rs
use crate::{
    config::Config,
    services::{
        broadcaster::Broadcaster, captcha_service::CaptchaVerifier, session_service::SessionService,
        token_service::{FirebaseTokenVerifier, TokenVerifier},
    },
    store::KvStore,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub config: Arc<Config>,
    // Clientes ligados a /api/events
    pub broadcaster: Broadcaster,
    pub sessions: SessionService,
    // `None` = rotas de docente abertas (AUTH_ENABLED=false)
    pub verifier: Option<Arc<dyn TokenVerifier>>,
    pub captcha: Option<CaptchaVerifier>,
}

impl AppState {
    /// Monta o estado a partir da configuração e de um armazenamento já ligado.
    pub fn new(config: Config, store: Arc<dyn KvStore>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chamada/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Cliente HTTP com opções padrão ({})", e);
                reqwest::Client::new()
            });

        let broadcaster = Broadcaster::default();
        let sessions = SessionService::new(store.clone(), broadcaster.clone(), config.ack_mode, config.scan_policy);
        let verifier = config.auth_project_id.clone().map(|project_id| {
            Arc::new(FirebaseTokenVerifier::new(http.clone(), project_id)) as Arc<dyn TokenVerifier>
        });
        let captcha = config
            .recaptcha_secret
            .clone()
            .map(|secret| CaptchaVerifier::new(http.clone(), secret));

        Self {
            store,
            config: Arc::new(config),
            broadcaster,
            sessions,
            verifier,
            captcha,
        }
    }

    /// Troca o verificador de tokens (usado pelos testes).
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }
}

// Permite extrair o broadcaster diretamente (usado pelo stream de /api/events)
impl axum::extract::FromRef<AppState> for Broadcaster {
    fn from_ref(state: &AppState) -> Broadcaster {
        state.broadcaster.clone()
    }
}

