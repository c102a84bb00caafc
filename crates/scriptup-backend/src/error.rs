use thiserror::Error;

use crate::types::ScriptId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Script not found: {id}")]
    NotFound { id: ScriptId },

    #[error("Invalid script: {details}")]
    InvalidScript { details: String },

    #[error("IO error ({kind}): {message}")]
    IoError {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("Storage error in {context}: {details}")]
    Storage {
        context: &'static str,
        details: String,
    },
}

impl BackendError {
    pub fn invalid_script(details: impl Into<String>) -> Self {
        Self::InvalidScript {
            details: details.into(),
        }
    }

    pub fn storage(context: &'static str, details: impl Into<String>) -> Self {
        Self::Storage {
            context,
            details: details.into(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Failure of a single conditional fetch.
///
/// `status` is `None` when no HTTP response was received at all (DNS,
/// connection, TLS or body read failures).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} fetching {url}: {details}", self.status_label())]
pub struct FetchError {
    pub url: String,
    pub status: Option<u16>,
    pub details: String,
}

impl FetchError {
    pub fn request(url: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            details: details.into(),
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            details: format!("HTTP {status}"),
        }
    }

    #[must_use]
    pub fn status_label(&self) -> String {
        self.status
            .map_or_else(|| "network error".to_string(), |status| status.to_string())
    }
}
