//! Transactional mail API dispatcher. Requests may carry an HMAC signature header.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use keepsake_core::config::NotifyConfig;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::{dispatcher::Dispatcher, error::NotifyError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Keepsake-Signature";

/// Request body, shaped like the common mail APIs (`to` is a list).
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
    signing_secret: Option<String>,
}

impl HttpDispatcher {
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| NotifyError::ConfigError("notify.endpoint is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            signing_secret: config.signing_secret.clone(),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let to = to.trim();
        if to.is_empty() || !to.contains('@') {
            return Err(NotifyError::InvalidAddress(to.to_string()));
        }

        let payload = serde_json::to_vec(&SendRequest {
            from: &self.from,
            to: [to],
            subject,
            text: body,
        })
        .map_err(|e| NotifyError::SendFailed(format!("encode request: {e}")))?;

        let mut req = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(ref secret) = self.signing_secret {
            req = req.header(SIGNATURE_HEADER, sign(secret, &payload)?);
        }

        let resp = req.body(payload).send().await?;
        let status = resp.status();
        if status.is_success() {
            debug!(to, subject, "mail API accepted notification");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        warn!(to, status = status.as_u16(), "mail API rejected notification");
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// `sha256=<hex>` over the exact request bytes.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String, NotifyError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| NotifyError::ConfigError(format!("signing secret: {e}")))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_and_keyed() {
        let a = sign("secret", b"{\"x\":1}").unwrap();
        let b = sign("secret", b"{\"x\":1}").unwrap();
        let c = sign("other", b"{\"x\":1}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("sha256="));
        assert_eq!(a.len(), "sha256=".len() + 64);
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let config = NotifyConfig::default();
        assert!(matches!(
            HttpDispatcher::from_config(&config),
            Err(NotifyError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn malformed_address_is_rejected_before_any_request() {
        let config = NotifyConfig {
            endpoint: Some("http://127.0.0.1:9/unused".into()),
            ..NotifyConfig::default()
        };
        let dispatcher = HttpDispatcher::from_config(&config).unwrap();
        let err = dispatcher.send("not-an-address", "s", "b").await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidAddress(_)));
    }
}
