//! Custom error types for the SDK.
//!
//! This module defines the public error type, `SdkError`, and the error type driver
//! callbacks return, `DriverError`. Using the `thiserror` crate, it provides a
//! centralized and consistent way to report the failures that are allowed to cross
//! the public API boundary.
//!
//! ## Error Hierarchy
//!
//! Only two categories reach callers of the SDK:
//!
//! - **Caller usage errors** (`InvalidArgument`, `NotRunning`, `Cache`, `Encode`): invalid
//!   arguments to outbound calls, or calls made while the session is not running.
//! - **Fatal configuration errors** (`Config`, `Configuration`, `Document`): the
//!   configuration file or the platform's device document cannot be decoded at all,
//!   for example because a range action string is not recognized.
//!
//! Everything else is absorbed where it happens:
//!
//! - Transient transport errors ([`crate::session::TransportError`]) are handled by the
//!   reconnection path of the session manager.
//! - Tag configuration faults and sample-level faults ([`crate::pipeline::StageError`])
//!   are logged by the processing pipeline and cost only the affected field.
//! - Driver callback failures (`DriverError`) are wrapped into the `{code, result}`
//!   response envelope and never stall a stream listener.

use thiserror::Error;

use crate::pipeline::CacheError;
use crate::session::{ConnectionState, TransportError};

/// Convenience alias for results using the SDK error type.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Primary error type for the SDK's public API.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration file parsing failed.
    ///
    /// **Source**: Wraps `figment::Error` (TOML syntax, missing fields, type mismatches,
    /// bad environment overrides).
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A device configuration document could not be decoded.
    ///
    /// This is the fatal configuration path: unknown action strings, malformed
    /// condition lists and the like reject the whole document.
    #[error("Invalid device document: {0}")]
    Document(#[from] serde_json::Error),

    /// An outbound payload could not be encoded as JSON.
    #[error("Failed to encode outbound payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The caller passed an invalid argument (blank id, empty field map, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An outbound call was made while the session was not running.
    #[error("Session is not running (state: {state})")]
    NotRunning {
        /// State observed when the call was rejected
        state: ConnectionState,
    },

    /// Cache key validation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The transport could not be constructed.
    ///
    /// Transport failures at runtime are handled by the session manager and never
    /// surface here.
    #[error("Transport setup failed: {0}")]
    TransportSetup(#[from] TransportError),

    /// The session manager task has exited.
    #[error("Session manager is no longer running")]
    SessionTerminated,
}

impl From<figment::Error> for SdkError {
    fn from(err: figment::Error) -> Self {
        SdkError::Config(Box::new(err))
    }
}

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a driver callback failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Configuration,
    Communication,
    InvalidParameter,
    Timeout,
    Unsupported,
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Unsupported => "unsupported",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Error returned by a driver callback.
///
/// The message becomes the `result` of a `{code: 500, ...}` response envelope.
#[derive(Error, Debug, Clone)]
#[error("{kind} error: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a command the driver does not implement.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            DriverErrorKind::Unsupported,
            format!("{} is not supported by this driver", operation),
        )
    }
}

impl From<anyhow::Error> for DriverError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(DriverErrorKind::Unknown, format!("{:#}", err))
    }
}
