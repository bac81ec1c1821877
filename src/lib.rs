//! # Driver SDK Runtime Core
//!
//! This crate is the runtime a device driver links against to talk to the
//! platform. A driver implements the [`Driver`] trait; the SDK keeps the
//! platform session alive, routes inbound commands to the driver and runs
//! outbound samples through a processing pipeline before sending them.
//!
//! ## Crate Structure
//!
//! - **`driver`**: The `Driver` callback trait, `CommandContext` and the `{code, result}`
//!   response envelope.
//! - **`session`**: `SessionManager`, the connection state machine over the platform's
//!   command streams, plus the `Transport` seam with its gRPC and in-memory implementations.
//! - **`pipeline`**: `ProcessingPipeline` and its stages: linear mapping, scale/round and
//!   range validity, backed by the `LastValidValueCache`.
//! - **`gateway`**: `OutboundGateway` for samples, events, logs and resource updates.
//! - **`registry`**: The device → table map and tag configuration delivered by `start`.
//! - **`model`**: Tag configuration, samples and events.
//! - **`config`**: Layered configuration (TOML file plus `DRIVER_SDK_` environment overrides).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: `SdkError` for the public API and `DriverError` for driver callbacks.
//! - **`sdk`**: `DriverSdk`, which wires all of the above together.

pub mod config;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod sdk;
pub mod session;

pub use config::{IdentityConfig, LogFormat, LoggingConfig, PlatformConfig, SdkConfig, SessionSettings};
pub use driver::{CommandContext, Driver, Envelope, CODE_BAD_REQUEST, CODE_DRIVER_ERROR, CODE_OK};
pub use error::{DriverError, DriverErrorKind, SdkError, SdkResult};
pub use gateway::{Delivery, DropReason, OutboundGateway, SampleOutcome};
pub use model::{
    Condition, ConditionKind, ConditionMode, Event, Field, FieldType, InvalidAction, LinearMapping, LogLevel,
    ProcessedField, ProcessedSample, RangeAction, RangeSpec, Sample, TagSpec,
};
pub use pipeline::{
    FieldStage, LastValidValueCache, ProcessingPipeline, Stage, StageContext, StageError, StageOutput,
};
pub use registry::{DeviceDocument, DeviceRegistry};
pub use sdk::{DriverSdk, DriverSdkBuilder};
pub use session::{ConnectionState, GrpcTransport, Identity, MockTransport, SessionManager, Transport};
