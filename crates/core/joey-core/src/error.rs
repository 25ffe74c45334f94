//! Error types for Joey AI

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Status attached to a transport failure.
///
/// Every failure raised at the transport boundary carries one of these so the
/// retry controller can log and branch on it without seeing raw client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    /// Backend answered with a non-2xx HTTP status
    Http(u16),
    /// No data arrived within the allowed window
    Timeout,
    /// Connection could not be established or was dropped
    Network,
    /// The response body could not be understood
    Malformed,
}

impl fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportStatus::Http(code) => write!(f, "{}", code),
            TransportStatus::Timeout => f.write_str("timeout"),
            TransportStatus::Network => f.write_str("network"),
            TransportStatus::Malformed => f.write_str("malformed"),
        }
    }
}

/// Terminal outcome of one logical send after every attempt failed.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalFailure {
    /// Short human-readable message
    pub message: String,
    /// Number of attempts made, stream attempt included
    pub attempts: usize,
    /// Status of the last failed attempt
    pub last_status: Option<TransportStatus>,
    /// Exact outbound payload, pretty-printed for copying
    pub payload: String,
}

/// Main error type for Joey AI operations
#[derive(Debug, Error)]
pub enum JoeyError {
    /// Transport failure with a typed status
    #[error("Transport error ({status}): {message}")]
    Transport {
        /// Failure status (`timeout` for inactivity)
        status: TransportStatus,
        /// Details for diagnostics
        message: String,
    },

    /// Every retry attempt failed
    #[error("Retry failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Attempts made
        attempts: usize,
        /// Error of the last attempt
        source: Box<JoeyError>,
    },

    /// The send was cancelled by the caller
    #[error("Send cancelled")]
    Cancelled,

    /// The backend is offline; the send was never started
    #[error("Backend is offline")]
    Offline,

    /// A send is already in flight for this conversation
    #[error("A send is already in progress for this conversation")]
    Busy,

    /// Terminal failure of a logical send
    #[error("Send failed after {} attempts: {}", .0.attempts, .0.message)]
    SendFailed(Box<TerminalFailure>),

    /// A writer lost its claim on the pending slot
    #[error("Pending slot is no longer owned by this attempt")]
    StaleSlot,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error (generic)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for JoeyError {
    fn from(e: reqwest::Error) -> Self {
        let status = if e.is_timeout() {
            TransportStatus::Timeout
        } else if e.is_decode() {
            TransportStatus::Malformed
        } else if let Some(code) = e.status() {
            TransportStatus::Http(code.as_u16())
        } else {
            TransportStatus::Network
        };
        JoeyError::Transport {
            status,
            message: e.to_string(),
        }
    }
}

impl JoeyError {
    /// Create a transport error
    pub fn transport(status: TransportStatus, msg: impl Into<String>) -> Self {
        JoeyError::Transport {
            status,
            message: msg.into(),
        }
    }

    /// Create an inactivity timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::transport(TransportStatus::Timeout, msg)
    }

    /// Create a malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::transport(TransportStatus::Malformed, msg)
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        JoeyError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        JoeyError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        JoeyError::NotFound(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        JoeyError::Other(msg.into())
    }

    /// Whether the retry controller may try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, JoeyError::Transport { .. })
    }

    /// Status of the underlying transport failure, if any
    pub fn transport_status(&self) -> Option<TransportStatus> {
        match self {
            JoeyError::Transport { status, .. } => Some(*status),
            JoeyError::RetriesExhausted { source, .. } => source.transport_status(),
            _ => None,
        }
    }
}

/// Result type alias for Joey AI operations
pub type Result<T> = std::result::Result<T, JoeyError>;
