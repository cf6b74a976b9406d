// src/services/token_service.rs
//! Verificação dos ID tokens Firebase enviados como `Authorization: Bearer <token>`.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const JWKS_TTL: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Utilizador autenticado, inserido como extensão do pedido pelo middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }

    /// Pode agir em nome do docente `uid`?
    pub fn can_act_for(&self, uid: &str) -> bool {
        self.is_admin() || self.uid == uid
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> AppResult<AuthUser>;
}

pub struct FirebaseTokenVerifier {
    http: reqwest::Client,
    project_id: String,
    jwks_url: String,
    keys: RwLock<Option<(JwkSet, Instant)>>,
}

impl FirebaseTokenVerifier {
    pub fn new(http: reqwest::Client, project_id: String) -> Self {
        Self {
            http,
            project_id,
            jwks_url: GOOGLE_JWKS_URL.to_string(),
            keys: RwLock::new(None),
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
        validation
    }

    /// Chave pública do `kid`; renova o JWKS se estiver velho ou não tiver o `kid`.
    async fn key_for(&self, kid: &str) -> AppResult<DecodingKey> {
        {
            let keys = self.keys.read().await;
            if let Some((set, fetched_at)) = keys.as_ref() {
                if fetched_at.elapsed() < JWKS_TTL {
                    if let Some(jwk) = set.find(kid) {
                        return decoding_key(jwk);
                    }
                }
            }
        }

        let set = self.fetch_jwks().await?;
        let key = set.find(kid).map(decoding_key);
        *self.keys.write().await = Some((set, Instant::now()));
        key.unwrap_or_else(|| Err(AppError::Unauthorized("chave de assinatura desconhecida".to_string())))
    }

    async fn fetch_jwks(&self) -> AppResult<JwkSet> {
        tracing::debug!("Atualizando chaves públicas dos ID tokens");
        let response = self
            .http
            .get(&self.jwks_url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!("Não foi possível obter o JWKS: {}", e);
                AppError::Internal
            })?;
        response.json().await.map_err(|e| {
            tracing::error!("JWKS ilegível: {}", e);
            AppError::Internal
        })
    }
}

fn decoding_key(jwk: &jsonwebtoken::jwk::Jwk) -> AppResult<DecodingKey> {
    DecodingKey::from_jwk(jwk).map_err(|e| {
        tracing::error!("Chave JWK inválida: {}", e);
        AppError::Internal
    })
}

#[async_trait]
impl TokenVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> AppResult<AuthUser> {
        let header =
            decode_header(token).map_err(|_| AppError::Unauthorized("token malformado".to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::Unauthorized("token sem kid".to_string()))?;
        let key = self.key_for(&kid).await?;

        let data = decode::<IdTokenClaims>(token, &key, &self.validation()).map_err(|e| {
            tracing::debug!("ID token recusado: {}", e);
            AppError::Unauthorized("token inválido ou expirado".to_string())
        })?;
        let claims = data.claims;
        if claims.sub.is_empty() {
            return Err(AppError::Unauthorized("token sem utilizador".to_string()));
        }
        Ok(AuthUser {
            uid: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Extrai o token de um cabeçalho `Authorization: Bearer <token>`.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
