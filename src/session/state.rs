//! Connection state machine and health diagnostics.
//!
//! ```text
//! Closed ──start()──> Connecting ──streams open──> Running
//!   ▲                     │                        │    ▲
//!   │                     │          health fail / │    │ streams
//!   │                     │          stream closed ▼    │ reopened
//!   │                     │                     Reconnecting
//!   │                     │                        │
//!   │                     └──────stop()──────┐     │ stop()
//!   │                                        ▼     ▼
//!   └──────────────────────────────────── Closing
//! ```

use std::fmt;
use std::time::Instant;

/// Lifecycle state of the platform session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session; only an explicit `start()` leaves this state.
    #[default]
    Closed,
    /// First batch of command streams is being opened.
    Connecting,
    /// All command streams are open and the health check is active.
    Running,
    /// The session failed and the command streams are being reopened.
    Reconnecting,
    /// `stop()` is tearing the session down.
    Closing,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Closed, Connecting)
                | (Connecting, Running)
                | (Running, Reconnecting)
                | (Reconnecting, Running)
                | (Connecting | Running | Reconnecting, Closing)
                | (Closing, Closed)
        )
    }

    #[must_use]
    pub fn is_running(self) -> bool {
        self == ConnectionState::Running
    }

    /// True while a connect loop may be active.
    #[must_use]
    pub fn is_connecting(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Closed => "Closed",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Running => "Running",
            ConnectionState::Reconnecting => "Reconnecting",
            ConnectionState::Closing => "Closing",
        };
        f.write_str(label)
    }
}

/// Health check bookkeeping, readable through the session manager handle.
#[derive(Debug, Clone, Default)]
pub struct HealthStatus {
    /// When the last health check was performed.
    pub last_check: Option<Instant>,
    /// When the last successful health check completed.
    pub last_success: Option<Instant>,
    /// Number of consecutive health check failures.
    pub consecutive_failures: u32,
    /// RTT of the last successful health check in milliseconds.
    pub last_rtt_ms: Option<f64>,
    /// Total number of failed checks since the manager was created.
    pub total_errors: u32,
    /// When the last error occurred.
    pub last_error_at: Option<Instant>,
    /// The last error message for diagnostics.
    pub last_error_message: Option<String>,
}

impl HealthStatus {
    pub(crate) fn record_success(&mut self, rtt_ms: f64) {
        let now = Instant::now();
        self.last_check = Some(now);
        self.last_success = Some(now);
        self.consecutive_failures = 0;
        self.last_rtt_ms = Some(rtt_ms);
    }

    pub(crate) fn record_failure(&mut self, message: impl Into<String>) {
        let now = Instant::now();
        self.last_check = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_errors = self.total_errors.saturating_add(1);
        self.last_error_at = Some(now);
        self.last_error_message = Some(message.into());
    }
}
