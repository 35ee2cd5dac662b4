//! Bot-check gate backed by Cloudflare Turnstile.
//!
//! Fail closed everywhere: no secret, no token, transport error, timeout,
//! non-2xx, or a body we cannot read all mean "not a human".

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait BotCheck: Send + Sync {
    /// `true` only when the external service positively confirms the token.
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> bool;
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Clone)]
pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    verify_url: String,
    timeout: Duration,
}

impl TurnstileVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret: secret.filter(|s| !s.is_empty()),
            verify_url: DEFAULT_VERIFY_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn siteverify(&self, secret: &str, token: &str, remote_ip: Option<&str>) -> Result<bool, String> {
        let mut form = vec![("secret", secret), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }
        let res = self.client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !res.status().is_success() {
            return Err(format!("status {}", res.status()));
        }
        let body = res
            .json::<SiteVerifyResponse>()
            .await
            .map_err(|e| format!("malformed response: {e}"))?;
        if !body.success {
            debug!(error_codes = ?body.error_codes, "turnstile rejected token");
        }
        Ok(body.success)
    }
}

#[async_trait]
impl BotCheck for TurnstileVerifier {
    async fn verify(&self, token: &str, remote_ip: Option<&str>) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            warn!("turnstile secret not configured; rejecting submission");
            return false;
        };
        if token.is_empty() {
            return false;
        }
        match tokio::time::timeout(self.timeout, self.siteverify(secret, token, remote_ip)).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => {
                warn!(error = %e, "turnstile verification error");
                false
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "turnstile verification timed out");
                false
            }
        }
    }
}
