//! Shared error type across jobtrack crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Missing or malformed request input.
    InvalidRequest,
    /// No matching pod, or the pod is excluded by the selector.
    NotFound,
    /// Counter label present but not a valid integer.
    CorruptCounter,
    /// Concurrent writers kept winning until the retry budget ran out.
    Conflict,
    /// Record store unreachable or rejected the call.
    StoreUnavailable,
    /// Store interaction exceeded its time budget.
    Timeout,
    /// Caller or process canceled the update.
    Canceled,
    /// Invalid startup configuration.
    Config,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::InvalidRequest => "INVALID_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::CorruptCounter => "CORRUPT_COUNTER",
            ClientCode::Conflict => "CONFLICT",
            ClientCode::StoreUnavailable => "STORE_UNAVAILABLE",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::Canceled => "CANCELED",
            ClientCode::Config => "CONFIG",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, JobTrackError>;

/// Unified error type used by core and webhook.
#[derive(Debug, Error)]
pub enum JobTrackError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("pod {name} not found in namespace {namespace}")]
    NotFound { namespace: String, name: String },
    #[error("invalid {label} label value: {value:?}")]
    CorruptCounterValue { label: String, value: String },
    #[error("counter overflow")]
    CounterOverflow,
    #[error("write conflict: {0}")]
    WriteConflict(String),
    #[error("write conflict persisted after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: u32 },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("failed to update pod label: {0}")]
    WriteFailed(String),
    #[error("store interaction timed out")]
    Timeout,
    #[error("update canceled")]
    Canceled,
    #[error("config: {0}")]
    Config(String),
}

impl JobTrackError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            JobTrackError::InvalidRequest(_) => ClientCode::InvalidRequest,
            JobTrackError::NotFound { .. } => ClientCode::NotFound,
            JobTrackError::CorruptCounterValue { .. } => ClientCode::CorruptCounter,
            JobTrackError::CounterOverflow => ClientCode::Internal,
            JobTrackError::WriteConflict(_) | JobTrackError::ConflictRetriesExhausted { .. } => {
                ClientCode::Conflict
            }
            JobTrackError::StoreUnavailable(_) | JobTrackError::WriteFailed(_) => {
                ClientCode::StoreUnavailable
            }
            JobTrackError::Timeout => ClientCode::Timeout,
            JobTrackError::Canceled => ClientCode::Canceled,
            JobTrackError::Config(_) => ClientCode::Config,
        }
    }

    /// Only a version conflict on the conditional write is worth another
    /// read-compute-write cycle. Everything else is stable or infrastructural.
    pub fn is_conflict(&self) -> bool {
        matches!(self, JobTrackError::WriteConflict(_))
    }
}
