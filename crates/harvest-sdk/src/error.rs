//! Error taxonomy shared across the harvest SDK.

use alloy_primitives::B256;
use thiserror::Error;

/// Result type alias that carries [`BundleError`] failures.
pub type Result<T> = std::result::Result<T, BundleError>;

/// Unified error taxonomy for bundle assembly and proposal submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// Malformed address, amount or missing required field. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Gas simulation failed; callers recover with a fallback limit.
    #[error("gas estimation failed: {0}")]
    Estimation(String),
    /// Transient RPC/HTTP failure (connection, timeout, 5xx).
    #[error("network failure: {0}")]
    Network(String),
    /// The coordination service recomputed a different transaction hash.
    #[error("digest mismatch: local {local}, service reported {reported:?}: {message}")]
    DigestMismatch {
        local: B256,
        reported: Option<B256>,
        message: String,
    },
    /// The coordination service refused the request for any other reason.
    #[error("submission rejected (HTTP {status}): {message}")]
    Submission { status: u16, message: String },
    /// Key material could not produce or verify a signature.
    #[error("signing failed: {0}")]
    Signing(String),
    /// The bundle record could not be written or read back.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl BundleError {
    /// Numeric representation associated with the error.
    pub fn code(&self) -> u16 {
        match self {
            BundleError::Validation(_) => 1001,
            BundleError::Estimation(_) => 2001,
            BundleError::Network(_) => 3001,
            BundleError::DigestMismatch { .. } => 4001,
            BundleError::Submission { .. } => 4002,
            BundleError::Signing(_) => 4101,
            BundleError::Persistence(_) => 5001,
        }
    }

    /// Only network failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, BundleError::Network(_))
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        BundleError::Validation(format!("json: {err}"))
    }
}
