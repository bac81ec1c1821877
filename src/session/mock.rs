//! Scriptable in-memory transport.
//!
//! Plays the platform side of a session without a network: tests decide which
//! stream opens fail and what the health check reports, push inbound commands,
//! and read back the responses and unary calls the SDK produced.
//!
//! ```no_run
//! # async fn demo() {
//! use driver_sdk::session::{CommandMethod, CommandRequest, MockTransport};
//!
//! let transport = MockTransport::new();
//! transport.fail_next_opens(2);
//! // ... start a session on `transport` ...
//! transport.push_request(CommandMethod::Run, CommandRequest::new("r-1"));
//! let response = transport.next_response(CommandMethod::Run).await;
//! # let _ = response;
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::transport::{
    CommandMethod, CommandRequest, CommandResponse, CommandStream, HealthReport, Identity,
    Outbound, Transport, TransportError, UnaryReply,
};

/// How long [`MockTransport::next_response`] waits before giving up.
const RESPONSE_WAIT: Duration = Duration::from_secs(2);

/// Platform ends of one open stream.
struct ServerStream {
    requests: mpsc::UnboundedSender<Result<CommandRequest, TransportError>>,
    responses: Arc<tokio::sync::Mutex<mpsc::Receiver<CommandResponse>>>,
}

#[derive(Default)]
struct MockState {
    open_attempts: AtomicUsize,
    fail_next_opens: AtomicUsize,
    fail_all_opens: AtomicBool,
    opens_by_method: Mutex<HashMap<CommandMethod, usize>>,
    streams: Mutex<HashMap<CommandMethod, ServerStream>>,
    identities: Mutex<Vec<Identity>>,
    health_script: Mutex<VecDeque<Result<HealthReport, TransportError>>>,
    health_checks: AtomicUsize,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<Outbound>>,
}

/// In-memory [`Transport`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    //--------------------------------------------------------------------------
    // Stream opening
    //--------------------------------------------------------------------------

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.state.fail_next_opens.store(count, Ordering::SeqCst);
    }

    /// Make every call to `open` fail until switched off.
    pub fn set_opens_failing(&self, failing: bool) {
        self.state.fail_all_opens.store(failing, Ordering::SeqCst);
    }

    /// Total calls to `open`, failed ones included.
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    /// Successful opens of `method`.
    #[must_use]
    pub fn opens(&self, method: CommandMethod) -> usize {
        self.state
            .opens_by_method
            .lock()
            .get(&method)
            .copied()
            .unwrap_or_default()
    }

    /// Identities presented on successful opens, in order.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        self.state.identities.lock().clone()
    }

    //--------------------------------------------------------------------------
    // Command streams
    //--------------------------------------------------------------------------

    /// Push a request on the current stream of `method`. False if none is open.
    pub fn push_request(&self, method: CommandMethod, request: CommandRequest) -> bool {
        self.state
            .streams
            .lock()
            .get(&method)
            .map(|stream| stream.requests.send(Ok(request)).is_ok())
            .unwrap_or(false)
    }

    /// Fail the current stream of `method` with a transport error.
    pub fn fail_stream(&self, method: CommandMethod, reason: &str) -> bool {
        let error = TransportError::Stream {
            method,
            reason: reason.to_string(),
        };
        self.state
            .streams
            .lock()
            .get(&method)
            .map(|stream| stream.requests.send(Err(error)).is_ok())
            .unwrap_or(false)
    }

    /// Close the current stream of `method` from the platform side.
    pub fn close_stream(&self, method: CommandMethod) -> bool {
        self.state.streams.lock().remove(&method).is_some()
    }

    /// Next response written on the current stream of `method`, waiting briefly.
    pub async fn next_response(&self, method: CommandMethod) -> Option<CommandResponse> {
        self.next_response_within(method, RESPONSE_WAIT).await
    }

    /// Like [`next_response`](Self::next_response) with an explicit wait.
    pub async fn next_response_within(&self, method: CommandMethod, wait: Duration) -> Option<CommandResponse> {
        let responses = self
            .state
            .streams
            .lock()
            .get(&method)
            .map(|stream| Arc::clone(&stream.responses))?;
        let mut responses = responses.lock().await;
        tokio::time::timeout(wait, responses.recv()).await.ok().flatten()
    }

    //--------------------------------------------------------------------------
    // Health checks
    //--------------------------------------------------------------------------

    /// Queue health check results. Once the queue is empty the platform is serving.
    pub fn push_health(&self, result: Result<HealthReport, TransportError>) {
        self.state.health_script.lock().push_back(result);
    }

    #[must_use]
    pub fn health_checks(&self) -> usize {
        self.state.health_checks.load(Ordering::SeqCst)
    }

    //--------------------------------------------------------------------------
    // Unary calls
    //--------------------------------------------------------------------------

    pub fn set_sends_failing(&self, failing: bool) {
        self.state.fail_sends.store(failing, Ordering::SeqCst);
    }

    /// Unary calls received so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Outbound> {
        self.state.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, method: CommandMethod, identity: &Identity) -> Result<CommandStream, TransportError> {
        let state = &self.state;
        state.open_attempts.fetch_add(1, Ordering::SeqCst);

        let scripted_failure = state
            .fail_next_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || state.fail_all_opens.load(Ordering::SeqCst) {
            return Err(TransportError::Open {
                method,
                reason: "mock: open refused".into(),
            });
        }

        let (requests, inbound) = mpsc::unbounded_channel();
        let (outbound, responses) = mpsc::channel(16);
        state.streams.lock().insert(
            method,
            ServerStream {
                requests,
                responses: Arc::new(tokio::sync::Mutex::new(responses)),
            },
        );
        *state.opens_by_method.lock().entry(method).or_default() += 1;
        state.identities.lock().push(identity.clone());

        Ok(CommandStream {
            inbound: UnboundedReceiverStream::new(inbound).boxed(),
            outbound,
        })
    }

    async fn health_check(&self, _identity: &Identity) -> Result<HealthReport, TransportError> {
        self.state.health_checks.fetch_add(1, Ordering::SeqCst);
        let scripted = self.state.health_script.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(HealthReport::serving()))
    }

    async fn send(&self, _identity: &Identity, message: Outbound) -> Result<UnaryReply, TransportError> {
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Rpc {
                operation: message.name(),
                reason: "mock: unavailable".into(),
            });
        }
        self.state.sent.lock().push(message);
        Ok(UnaryReply {
            status: true,
            ..Default::default()
        })
    }
}
