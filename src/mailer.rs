use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport: {0}")]
    Transport(String),
    #[error("mail api returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("mail api timed out")]
    Timeout,
    #[error("no recipients")]
    NoRecipients,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Posts messages as JSON to a transactional mail HTTP API.
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpMailer {
    pub fn new(api_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post(&self, message: &EmailMessage) -> Result<(), MailError> {
        let mut req = self.client.post(&self.api_url).json(message);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.map_err(|e| {
            error!("mail api connection error: {e}");
            MailError::Transport(e.to_string())
        })?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            error!("mail api failed. status={status} body={body}");
            return Err(MailError::Rejected { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        tokio::time::timeout(self.timeout, self.post(message))
            .await
            .map_err(|_| MailError::Timeout)?
    }
}
