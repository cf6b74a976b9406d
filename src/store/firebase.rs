// src/store/firebase.rs
//! Backend de produção: API REST da Firebase Realtime Database.
//!
//! Autenticação com a conta de serviço: um JWT RS256 assinado localmente é trocado
//! por um access token OAuth2, guardado em cache até perto de expirar.

use super::{tree, watch, KvStore, StoreError, StoreResult, StoreWatch};
use async_trait::async_trait;
use futures_util::StreamExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DATABASE_SCOPES: &str =
    "https://www.googleapis.com/auth/firebase.database https://www.googleapis.com/auth/userinfo.email";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
// Renova o token um pouco antes de expirar.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Campos da conta de serviço que interessam (o JSON completo tem mais).
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct TokenSource {
    account: ServiceAccount,
    cached: Mutex<Option<(String, Instant)>>,
}

impl TokenSource {
    async fn access_token(&self, http: &reqwest::Client) -> StoreResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + TOKEN_MARGIN < *expires_at {
                return Ok(token.clone());
            }
        }

        tracing::debug!("Pedindo novo access token para {}", self.account.client_email);
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            scope: DATABASE_SCOPES,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| StoreError::Auth(format!("chave privada inválida: {}", e)))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| StoreError::Auth(format!("falha ao assinar JWT: {}", e)))?;

        let response = http
            .post(&self.account.token_uri)
            .timeout(REQUEST_TIMEOUT)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("token endpoint devolveu {}: {}", status, body)));
        }
        let token: TokenResponse = response.json().await?;

        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        *cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

#[derive(Clone)]
pub struct FirebaseStore {
    http: reqwest::Client,
    base_url: String,
    auth: Option<Arc<TokenSource>>,
}

impl FirebaseStore {
    /// `account = None` só faz sentido com regras públicas (ex.: emulador).
    pub fn new(database_url: &str, account: Option<ServiceAccount>) -> StoreResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("chamada/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: database_url.trim_end_matches('/').to_string(),
            auth: account.map(|account| {
                Arc::new(TokenSource {
                    account,
                    cached: Mutex::new(None),
                })
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        // Chaves podem ter espaços, '?' ou '%' (ex.: "%nome-ana paula").
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}.json", self.base_url, encoded.join("/"))
    }

    async fn authed(&self, request: RequestBuilder) -> StoreResult<RequestBuilder> {
        match &self.auth {
            Some(source) => {
                let token = source.access_token(&self.http).await?;
                Ok(request.query(&[("access_token", token)]))
            }
            None => Ok(request),
        }
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = self.authed(request.timeout(REQUEST_TIMEOUT)).await?.send().await?;
        check_status(response).await
    }

    async fn open_stream(&self, path: &str) -> StoreResult<Response> {
        let request = self
            .http
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = self.authed(request).await?.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> StoreResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status(status, body))
}

#[async_trait]
impl KvStore for FirebaseStore {
    fn backend(&self) -> &'static str {
        "firebase"
    }

    async fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        let path = tree::normalize_path(path)?;
        let value: Value = self.send(self.http.get(self.url(&path))).await?.json().await?;
        Ok(tree::prune(value))
    }

    async fn write(&self, path: &str, value: Value) -> StoreResult {
        let path = tree::normalize_path(path)?;
        self.send(self.http.put(self.url(&path)).query(&[("print", "silent")]).json(&value))
            .await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult {
        let path = tree::normalize_path(path)?;
        self.send(self.http.patch(self.url(&path)).query(&[("print", "silent")]).json(&fields))
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult {
        let path = tree::normalize_path(path)?;
        self.send(self.http.delete(self.url(&path))).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let path = tree::normalize_path(path)?;
        let pushed: PushResponse = self.send(self.http.post(self.url(&path)).json(&value)).await?.json().await?;
        Ok(pushed.name)
    }

    async fn put_if_absent(&self, path: &str, value: Value) -> StoreResult<bool> {
        let path = tree::normalize_path(path)?;
        let current = self
            .send(self.http.get(self.url(&path)).header("X-Firebase-ETag", "true"))
            .await?;
        let etag = current
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Status(200, "resposta sem ETag".to_string()))?;
        let existing: Value = current.json().await?;
        if tree::prune(existing).is_some() {
            return Ok(false);
        }

        let request = self
            .http
            .put(self.url(&path))
            .timeout(REQUEST_TIMEOUT)
            .header(reqwest::header::IF_MATCH, etag)
            .query(&[("print", "silent")])
            .json(&value);
        let response = self.authed(request).await?.send().await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            tracing::debug!("put_if_absent em '{}': outro escritor chegou primeiro.", path);
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    fn watch(&self, path: &str) -> StoreWatch {
        let store = self.clone();
        let path = path.trim_matches('/').to_string();

        Box::pin(async_stream::stream! {
            let mut snapshot: Option<Value> = None;
            let mut delivered_initial = false;

            loop {
                let response = match store.open_stream(&path).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!("Streaming de '{}' indisponível: {}. Nova tentativa em {:?}.", path, e, RECONNECT_DELAY);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                };
                tracing::debug!("Streaming de '{}' aberto.", path);

                let mut parser = watch::SseParser::default();
                let mut bytes = response.bytes_stream();
                'connection: while let Some(chunk) = bytes.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            tracing::warn!("Streaming de '{}' interrompido: {}", path, e);
                            break 'connection;
                        }
                    };
                    for (name, data) in parser.feed(&chunk) {
                        match name.as_str() {
                            "put" | "patch" => {
                                let payload: StreamPayload = match serde_json::from_str(&data) {
                                    Ok(payload) => payload,
                                    Err(e) => {
                                        tracing::warn!("Evento '{}' ilegível em '{}': {}", name, path, e);
                                        continue;
                                    }
                                };
                                let before = snapshot.clone();
                                if name == "put" {
                                    watch::apply_put(&mut snapshot, &payload.path, payload.data);
                                } else if let Value::Object(fields) = payload.data {
                                    watch::apply_patch(&mut snapshot, &payload.path, fields);
                                }
                                let events = if delivered_initial {
                                    watch::diff_events(&path, before.as_ref(), snapshot.as_ref())
                                } else {
                                    delivered_initial = true;
                                    watch::initial_events(&path, snapshot.as_ref())
                                };
                                for event in events {
                                    yield event;
                                }
                            }
                            "keep-alive" => {}
                            "auth_revoked" => {
                                tracing::info!("Token do streaming de '{}' expirou; reconectando.", path);
                                break 'connection;
                            }
                            "cancel" => {
                                tracing::error!("Streaming de '{}' cancelado pelas regras de segurança.", path);
                                return;
                            }
                            other => tracing::trace!("Evento de streaming ignorado: {}", other),
                        }
                    }
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_encode_each_segment() {
        let store = FirebaseStore::new("https://demo.firebaseio.com/", None).unwrap();
        assert_eq!(
            store.url("sessions/abc/attendees/%nome-ana paula"),
            "https://demo.firebaseio.com/sessions/abc/attendees/%25nome-ana%20paula.json"
        );
        assert_eq!(store.url(""), "https://demo.firebaseio.com/.json");
    }

    #[test]
    fn service_account_defaults_token_uri() {
        let account: ServiceAccount = serde_json::from_str(
            r#"{"project_id":"demo","client_email":"x@demo.iam","private_key":"k"}"#,
        )
        .unwrap();
        assert_eq!(account.token_uri, DEFAULT_TOKEN_URI);
    }
}
