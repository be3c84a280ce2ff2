//! SMS notification relay client
//!
//! Contract: POST `{to, message}` with `Authorization: Bearer <token>`,
//! response `{ok, error?}`. Each call is a single attempt; the relay's
//! immediate answer is the only delivery confirmation we get.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("relay unreachable: {0}")]
    Transport(String),
    #[error("relay rejected message (HTTP {status}): {error}")]
    Rejected { status: u16, error: String },
    #[error("relay sent an unreadable response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait NotificationRelay: Send + Sync {
    async fn send(&self, to: &str, message: &str, token: &str) -> Result<(), RelayError>;
}

#[derive(Debug, Serialize)]
pub struct RelayRequest<'a> {
    pub to: &'a str,
    pub message: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RelayResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Log send failure (cold path)
#[cold]
fn log_send_failed(to: &str, e: &RelayError, latency_us: u64) {
    error!(to = %to, error = %e, latency_us = %latency_us, "relay_send_failed");
}

pub struct HttpNotificationRelay {
    url: String,
    client: reqwest::Client,
}

impl HttpNotificationRelay {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        // One client for the session so connections are pooled across sends
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn interpret(status: reqwest::StatusCode, body: &str) -> Result<(), RelayError> {
        let parsed: Result<RelayResponse, _> = serde_json::from_str(body);

        if !status.is_success() {
            let detail = parsed
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(RelayError::Rejected { status: status.as_u16(), error: detail });
        }

        let response = parsed.map_err(|e| RelayError::Malformed(e.to_string()))?;
        if response.ok == Some(false) {
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                error: response.error.unwrap_or_else(|| "relay reported failure".to_string()),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationRelay for HttpNotificationRelay {
    async fn send(&self, to: &str, message: &str, token: &str) -> Result<(), RelayError> {
        let start = Instant::now();

        let result = async {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(token)
                .json(&RelayRequest { to, message })
                .send()
                .await
                .map_err(|e| RelayError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response.text().await.map_err(|e| RelayError::Transport(e.to_string()))?;
            Self::interpret(status, &body)
        }
        .await;

        let latency_us = start.elapsed().as_micros() as u64;
        match &result {
            Ok(()) => debug!(to = %to, latency_us = %latency_us, "relay_send_ok"),
            Err(e) => log_send_failed(to, e, latency_us),
        }
        result
    }
}
