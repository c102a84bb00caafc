use scriptup_backend::ScriptId;
use thiserror::Error;

use crate::settings::SettingsError;
use crate::single_instance::AcquireError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Usage(String),

    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] scriptup_platform::AppPathsError),

    #[error("failed to create application directories: {0}")]
    Dirs(#[source] std::io::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Instance(#[from] AcquireError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("no installed script with id {0}")]
    UnknownScript(ScriptId),
}

impl AppError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Instance(AcquireError::AlreadyRunning) => 3,
            Self::UnknownScript(_) => 4,
            _ => 1,
        }
    }
}
