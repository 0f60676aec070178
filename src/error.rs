//! Error types for the intake pipeline.

use std::path::PathBuf;

/// The raw message could not be parsed into a MIME tree.
#[derive(Debug, thiserror::Error)]
#[error("malformed MIME message: {0}")]
pub struct ParseError(#[from] pub mailparse::MailParseError);

/// Appending a record to the local store failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A write failed and the partial line could not be removed.
    #[error("I/O error on {path}, partial write left in place: {source}")]
    Torn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Only a cleanly failed write can be repeated without duplicating or tearing a line.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Obtaining a bearer token from the login endpoint failed.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("login rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("login response missing token: {0}")]
    InvalidResponse(String),
}

/// Submitting a record to the processing endpoint failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("could not obtain token: {0}")]
    Auth(#[from] AuthError),

    #[error("submit request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("submit rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl DeliveryError {
    /// HTTP status of a rejected submit; `None` for network-level failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Auth(AuthError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Auth(AuthError::Transport(_)) => true,
            Self::Rejected { status, .. } | Self::Auth(AuthError::Rejected { status, .. }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::Auth(AuthError::InvalidResponse(_)) => false,
        }
    }
}

/// Any failure of a single intake cycle. The intake loop recovers from all of them.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("pipe error on {path}: {source}")]
    Pipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
