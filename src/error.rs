use thiserror::Error;
use tokio::io;

use crate::auth::AuthError;
use crate::storage::StoreError;
use crate::views::ValidationError;

pub type ServiceResult<T> = core::result::Result<T, ServiceError>;

pub type MirrorResult<T> = core::result::Result<T, MirrorError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    FromString(String),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Mirror(#[from] MirrorError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    IoError(#[from] io::Error),
    #[error("{0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("{0}")]
    Prompt(#[from] dialoguer::Error),
}

/// Failures talking to the hosted backend or its realtime endpoint.
///
/// These never reach the UI directly: the mirror logs them and degrades to
/// local-only mode. Only the outbox status and [`crate::remote::RemoteMirror::diagnose`]
/// hand them back to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("remote mirror is not configured")]
    Disabled,
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode backend response: {0}")]
    Decode(String),
    #[error("background task failed: {0}")]
    Join(String),
    #[error("realtime error: {0}")]
    Realtime(String),
}

impl MirrorError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::Network(_) | MirrorError::Join(_) | MirrorError::Realtime(_) => true,
            MirrorError::Api { status, .. } => *status == 429 || *status >= 500,
            MirrorError::Disabled | MirrorError::Decode(_) => false,
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(err: serde_json::Error) -> Self {
        MirrorError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_retried() {
        assert!(MirrorError::Network("reset".into()).is_transient());
        assert!(
            MirrorError::Api {
                status: 503,
                message: "unavailable".into()
            }
            .is_transient()
        );
        assert!(
            MirrorError::Api {
                status: 429,
                message: "slow down".into()
            }
            .is_transient()
        );
        assert!(
            !MirrorError::Api {
                status: 400,
                message: "bad column".into()
            }
            .is_transient()
        );
        assert!(!MirrorError::Decode("eof".into()).is_transient());
    }
}
