//! Bearer credential providers for the notification relay
//!
//! Tokens are fetched fresh for every send and never cached here, so an
//! expired session is noticed on the next dispatch instead of silently
//! reused.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("credential source unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> Result<String, CredentialError>;
}

/// Fixed token, or none at all (signed-out user)
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }

    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> Result<String, CredentialError> {
        self.token
            .clone()
            .ok_or_else(|| CredentialError::Unauthenticated("no signed-in user".to_string()))
    }
}

/// Reads the token from an environment variable on every call
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn token(&self) -> Result<String, CredentialError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(CredentialError::Unauthenticated(format!("{} is not set", self.var))),
        }
    }
}

/// Reads the token from a file on every call, so an external refresher can
/// rotate it underneath us
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for FileCredentials {
    async fn token(&self) -> Result<String, CredentialError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CredentialError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let token = content.trim();
        if token.is_empty() {
            return Err(CredentialError::Unauthenticated(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        Ok(token.to_string())
    }
}
