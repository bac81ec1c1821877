//! Platform session: connection state machine, health check and command dispatch.
//!
//! [`SessionManager`] keeps the full set of command streams open. When a health
//! check fails or any stream closes it reopens all of them, retrying the whole
//! batch at a fixed interval until it succeeds or `stop()` is called.
//!
//! # Tasks
//!
//! | Task | Count | Lifetime |
//! |---|---|---|
//! | actor | 1 | until every handle is dropped |
//! | connect loop | 0..=1 | `Connecting`/`Reconnecting` |
//! | health loop | 0..=1 | `Running` |
//! | stream listener | one per [`CommandMethod`] | `Running` |

mod actor;
mod dispatch;
mod grpc;
mod health;
mod listener;
pub mod mock;
mod state;
mod transport;

pub use actor::SessionManager;
pub use dispatch::{CommandHandler, DriverDispatcher};
pub use grpc::{GrpcTransport, HEADER_DRIVER_ID, HEADER_DRIVER_NAME, HEADER_PROJECT_ID, HEADER_SERVICE_ID};
pub use mock::MockTransport;
pub use state::{ConnectionState, HealthStatus};
pub use transport::{
    CommandMethod, CommandRequest, CommandResponse, CommandStream, HealthReport, Identity,
    Outbound, RemoteError, ServingStatus, Transport, TransportError, UnaryReply,
};
