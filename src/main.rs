// src/main.rs
use chamada::{
    config::Config,
    db,
    services::enrollment_service,
    state::AppState,
};
use std::{env, net::SocketAddr};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuração do Logging (Tracing) ---
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                env::var("RUST_LOG")
                    .unwrap_or_else(|_| "chamada=debug,tower_http=info,sqlx=warn".into())
                    .into()
            }),
        )
        .with(fmt::layer())
        .init();

    tracing::info!("🚀 Iniciando servidor de chamadas...");

    // --- Configuração (falha logo se faltar algo obrigatório) ---
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuração inválida: {}", e);
            return Err(anyhow::anyhow!("Configuração inválida: {}", e));
        }
    };
    tracing::info!(
        "⚙️ Armazenamento: {:?}, ack: {:?}, leituras: {:?}, auth: {}",
        config.backend,
        config.ack_mode,
        config.scan_policy,
        if config.auth_project_id.is_some() { "ligada" } else { "desligada" }
    );
    if config.recaptcha_secret.is_some() {
        tracing::info!("🤖 Verificação CAPTCHA ativa nas leituras de QR.");
    }

    // --- Armazenamento ---
    let store = match db::connect_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("❌ Falha crítica ao ligar ao armazenamento: {}", e);
            return Err(anyhow::anyhow!("Falha ao ligar ao armazenamento: {}", e));
        }
    };
    if let Err(e) = store.ping().await {
        tracing::warn!("⚠️ Armazenamento não respondeu ao arranque: {}", e);
    }

    let port = config.port;
    let app_state = AppState::new(config, store);

    // Alterações às inscrições seguem para os clientes SSE
    tokio::spawn(enrollment_service::forward_enrollment_changes(
        app_state.store.clone(),
        app_state.broadcaster.clone(),
    ));

    // --- Endereço e Listener ---
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("📡 Servidor escutando em http://{}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("❌ Falha ao iniciar listener na porta {}: {}", port, e);
            return Err(e.into());
        }
    };

    tracing::info!("🛠️ Construindo router e aplicando middlewares...");
    let app = chamada::build_router(app_state);

    tracing::info!("👂 Servidor pronto para aceitar conexões...");
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        tracing::error!("❌ Erro fatal no servidor: {}", e);
        return Err(e.into());
    }

    Ok(())
}
