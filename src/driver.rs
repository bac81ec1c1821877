//! Driver callback surface.
//!
//! A driver implements [`Driver`] with its own payload types. Inbound commands are
//! decoded into those types before the callback runs; a payload that does not
//! decode is answered with code 400 without reaching the driver.
//!
//! # Example
//! ```no_run
//! use async_trait::async_trait;
//! use driver_sdk::{CommandContext, Driver, DriverError};
//! use serde::Deserialize;
//! use serde_json::{json, Value};
//!
//! #[derive(Deserialize)]
//! struct Settings {
//!     #[serde(default)]
//!     poll_ms: u64,
//! }
//!
//! #[derive(Deserialize)]
//! struct Switch {
//!     on: bool,
//! }
//!
//! struct Relay;
//!
//! #[async_trait]
//! impl Driver for Relay {
//!     type Config = Settings;
//!     type Command = Switch;
//!     type Tag = Value;
//!
//!     async fn start(&self, config: Settings) -> Result<(), DriverError> {
//!         tracing::info!(poll_ms = config.poll_ms, "relay driver started");
//!         Ok(())
//!     }
//!
//!     async fn schema(&self) -> Result<String, DriverError> {
//!         Ok(r#"{"type":"object"}"#.to_string())
//!     }
//!
//!     async fn run(&self, ctx: &CommandContext, command: Switch) -> Result<Value, DriverError> {
//!         Ok(json!({ "device": ctx.device_id(), "on": command.on }))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DriverError;

/// Envelope code for a successful callback.
pub const CODE_OK: u16 = 200;
/// Envelope code for a payload that could not be decoded.
pub const CODE_BAD_REQUEST: u16 = 400;
/// Envelope code for a failed callback.
pub const CODE_DRIVER_ERROR: u16 = 500;

/// Addressing of one inbound command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandContext {
    pub request_id: String,
    pub serial_no: String,
    pub table_id: String,
    /// One id for `run`/`writeTag`, the full list for `batchRun`
    pub device_ids: Vec<String>,
}

impl CommandContext {
    /// The target device of a single-device command.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_ids.first().map(String::as_str)
    }
}

/// Callbacks a driver exposes to the platform.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Decoded from the `start` document (the same JSON the device registry reads).
    type Config: DeserializeOwned + Send + 'static;
    /// Payload of `run` and `batchRun`.
    type Command: DeserializeOwned + Send + 'static;
    /// Payload of `writeTag`.
    type Tag: DeserializeOwned + Send + 'static;

    async fn start(&self, config: Self::Config) -> Result<(), DriverError>;

    /// Called once when the session is stopped. Errors are logged.
    async fn stop(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn schema(&self) -> Result<String, DriverError>;

    async fn run(&self, ctx: &CommandContext, command: Self::Command) -> Result<Value, DriverError>;

    async fn write_tag(&self, ctx: &CommandContext, tag: Self::Tag) -> Result<Value, DriverError> {
        let _ = (ctx, tag);
        Err(DriverError::unsupported("writeTag"))
    }

    async fn batch_run(&self, ctx: &CommandContext, command: Self::Command) -> Result<Value, DriverError> {
        let _ = (ctx, command);
        Err(DriverError::unsupported("batchRun"))
    }

    /// Echoes the request unless overridden.
    async fn debug(&self, request: Value) -> Result<Value, DriverError> {
        Ok(request)
    }
}

/// Uniform `{code, result}` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub result: Value,
}

impl Envelope {
    pub fn ok(result: Value) -> Self {
        Self {
            code: CODE_OK,
            result,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: CODE_BAD_REQUEST,
            result: Value::String(message.into()),
        }
    }

    pub fn driver_error(err: &DriverError) -> Self {
        Self {
            code: CODE_DRIVER_ERROR,
            result: Value::String(err.to_string()),
        }
    }

    /// Wrap a callback result.
    pub fn from_result(result: Result<Value, DriverError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(err) => Self::driver_error(&err),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// JSON encoding written on the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|err| {
            tracing::error!(error = %err, "Failed to encode response envelope");
            format!(r#"{{"code":{},"result":"unencodable result"}}"#, CODE_DRIVER_ERROR).into_bytes()
        })
    }
}
