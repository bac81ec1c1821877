//! Wire contract for the driver SDK.
//!
//! This crate contains the protobuf messages and the gRPC client for the
//! `driver.DriverService` described in `proto/driver.proto`. The bindings are
//! checked in, in the shape `tonic-build` emits, so building the SDK does not
//! require `protoc`.
//!
//! # Architecture
//!
//! The proto types are kept separate from the SDK's domain types to:
//! - Avoid transport-layer coupling in the processing pipeline
//! - Keep the external contract (field names, tags) in one reviewed place
//! - Provide a clear boundary for conversions (done by the SDK's gRPC transport)

#![allow(missing_docs)] // Generated-style code doesn't have docs

pub mod driver;

// Re-export commonly used types at crate root
pub use driver::*;

/// Fully qualified service name, as used in request paths.
pub const SERVICE_NAME: &str = "driver.DriverService";
