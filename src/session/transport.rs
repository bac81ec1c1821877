//! Transport seam between the session manager and the platform.
//!
//! The session manager and the outbound gateway only talk to a [`Transport`].
//! [`GrpcTransport`](super::GrpcTransport) is the production implementation;
//! [`MockTransport`](super::MockTransport) scripts the platform side in tests.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc;

/// Command stream methods. A session holds exactly one open stream per method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandMethod {
    Schema,
    Start,
    Run,
    WriteTag,
    BatchRun,
    Debug,
}

impl CommandMethod {
    /// The fixed set of streams opened together for every connection.
    pub const ALL: [CommandMethod; 6] = [
        CommandMethod::Start,
        CommandMethod::Schema,
        CommandMethod::Run,
        CommandMethod::WriteTag,
        CommandMethod::BatchRun,
        CommandMethod::Debug,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandMethod::Schema => "schema",
            CommandMethod::Start => "start",
            CommandMethod::Run => "run",
            CommandMethod::WriteTag => "writeTag",
            CommandMethod::BatchRun => "batchRun",
            CommandMethod::Debug => "debug",
        }
    }
}

impl fmt::Display for CommandMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound command, normalized across methods.
///
/// `targets` holds the single device id of `run`/`writeTag`, the device id list of
/// `batchRun`, and is empty otherwise. `payload` is the opaque command (or, for
/// `start` and `debug`, the request data).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    pub request_id: String,
    pub serial_no: String,
    pub table_id: String,
    pub targets: Vec<String>,
    pub payload: Vec<u8>,
}

impl CommandRequest {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_serial_no(mut self, serial_no: impl Into<String>) -> Self {
        self.serial_no = serial_no.into();
        self
    }

    #[must_use]
    pub fn with_target(mut self, table_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        self.table_id = table_id.into();
        self.targets = vec![device_id.into()];
        self
    }

    #[must_use]
    pub fn with_targets(mut self, table_id: impl Into<String>, device_ids: Vec<String>) -> Self {
        self.table_id = table_id.into();
        self.targets = device_ids;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// Response to one [`CommandRequest`]; `payload` is the encoded `{code, result}` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub request_id: String,
    pub payload: Vec<u8>,
}

/// An open bidirectional command stream.
pub struct CommandStream {
    /// Requests pushed by the platform. Ends when the peer closes the stream.
    pub inbound: BoxStream<'static, Result<CommandRequest, TransportError>>,
    /// Responses going back. Dropping the sender half-closes the stream.
    pub outbound: mpsc::Sender<CommandResponse>,
}

impl fmt::Debug for CommandStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStream").finish_non_exhaustive()
    }
}

/// Identity attached to every call of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub project_id: String,
    pub driver_id: String,
    pub driver_name: String,
    pub service_id: String,
}

/// Serving status reported by the platform's health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
    ServiceUnknown,
}

/// Error reported by the platform inside a health check response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

/// Result of one health check call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub status: ServingStatus,
    pub errors: Vec<RemoteError>,
}

impl HealthReport {
    pub fn serving() -> Self {
        Self {
            status: ServingStatus::Serving,
            errors: Vec::new(),
        }
    }

    pub fn not_serving() -> Self {
        Self {
            status: ServingStatus::NotServing,
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.status == ServingStatus::Serving
    }
}

/// Unary call made by the outbound gateway. Payloads are JSON documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A processed sample
    Point { data: Vec<u8> },
    /// A device event
    Event { data: Vec<u8> },
    /// A command log line
    CommandLog { data: Vec<u8> },
    /// A partial update of one table row
    UpdateTableData {
        table_id: String,
        row_id: String,
        data: Vec<u8>,
    },
}

impl Outbound {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::Point { .. } => "writePoint",
            Outbound::Event { .. } => "event",
            Outbound::CommandLog { .. } => "commandLog",
            Outbound::UpdateTableData { .. } => "updateTableData",
        }
    }

    /// JSON payload of the call.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match self {
            Outbound::Point { data }
            | Outbound::Event { data }
            | Outbound::CommandLog { data }
            | Outbound::UpdateTableData { data, .. } => data,
        }
    }
}

/// Platform reply to a unary call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnaryReply {
    pub status: bool,
    pub info: String,
    pub detail: String,
}

/// Transient transport failures. Absorbed by the session manager's reconnect path.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Invalid platform endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Identity header '{header}' is not valid metadata")]
    InvalidMetadata { header: &'static str },

    #[error("Failed to open {method} stream: {reason}")]
    Open { method: CommandMethod, reason: String },

    #[error("{operation} call failed: {reason}")]
    Rpc {
        operation: &'static str,
        reason: String,
    },

    #[error("{method} stream failed: {reason}")]
    Stream { method: CommandMethod, reason: String },
}

/// Connection to the platform.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the command stream for `method`, tagged with `identity`.
    async fn open(&self, method: CommandMethod, identity: &Identity) -> Result<CommandStream, TransportError>;

    /// One unary health check.
    async fn health_check(&self, identity: &Identity) -> Result<HealthReport, TransportError>;

    /// One unary outbound call.
    async fn send(&self, identity: &Identity, message: Outbound) -> Result<UnaryReply, TransportError>;
}
