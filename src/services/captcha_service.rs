// src/services/captcha_service.rs
//! Verificação reCAPTCHA das leituras de QR (só quando `RECAPTCHA_SECRET` está definido).

use crate::error::{AppError, AppResult};
use serde::Deserialize;

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

#[derive(Clone)]
pub struct CaptchaVerifier {
    http: reqwest::Client,
    secret: String,
    endpoint: String,
}

impl CaptchaVerifier {
    pub fn new(http: reqwest::Client, secret: String) -> Self {
        Self {
            http,
            secret,
            endpoint: SITEVERIFY_URL.to_string(),
        }
    }

    /// Verifica o token do browser. Token em falta ou recusado -> `AppError::Captcha`;
    /// falha a falar com o serviço -> `AppError::Internal`.
    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> AppResult<()> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Captcha)?;

        let mut params = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            params.push(("remoteip", ip));
        }

        let response = self
            .http
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Pedido de verificação CAPTCHA falhou: {}", e);
                AppError::Internal
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Verificação CAPTCHA devolveu HTTP {}", status.as_u16());
            return Err(AppError::Internal);
        }
        let body: SiteVerifyResponse = response.json().await.map_err(|e| {
            tracing::error!("Resposta CAPTCHA ilegível: {}", e);
            AppError::Internal
        })?;
        check(body)
    }
}

fn check(body: SiteVerifyResponse) -> AppResult<()> {
    if body.success {
        Ok(())
    } else {
        tracing::debug!("CAPTCHA recusado: {:?}", body.error_codes);
        Err(AppError::Captcha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_siteverify_maps_to_captcha_error() {
        let body: SiteVerifyResponse =
            serde_json::from_str(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#).unwrap();
        assert!(matches!(check(body), Err(AppError::Captcha)));

        let ok: SiteVerifyResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(check(ok).is_ok());
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let verifier = CaptchaVerifier::new(reqwest::Client::new(), "secret".into());
        assert!(matches!(verifier.verify(None, None).await, Err(AppError::Captcha)));
        assert!(matches!(verifier.verify(Some("  "), None).await, Err(AppError::Captcha)));
    }
}
