//! Per-stream command listener.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::actor::SessionEvent;
use super::dispatch::CommandHandler;
use super::transport::{CommandMethod, CommandResponse, CommandStream};

/// Serve one command stream until it closes or the generation is cancelled.
///
/// Requests are handled one at a time, so responses leave in request order.
/// Every request gets exactly one response while the session is alive. Closure
/// by the peer is reported once to the actor; cancellation is not reported.
pub(crate) async fn listen(
    generation: u64,
    method: CommandMethod,
    stream: CommandStream,
    handler: Arc<dyn CommandHandler>,
    token: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let CommandStream {
        mut inbound,
        outbound,
    } = stream;
    tracing::debug!(generation, method = %method, "Command listener started");

    let closed_by_peer = loop {
        let next = tokio::select! {
            _ = token.cancelled() => break false,
            next = inbound.next() => next,
        };

        let request = match next {
            Some(Ok(request)) => request,
            Some(Err(err)) => {
                tracing::warn!(generation, method = %method, error = %err, "Command stream failed");
                break true;
            }
            None => {
                tracing::info!(generation, method = %method, "Command stream closed by peer");
                break true;
            }
        };

        let payload = tokio::select! {
            _ = token.cancelled() => break false,
            payload = handler.handle(method, &request) => payload,
        };

        let response = CommandResponse {
            request_id: request.request_id,
            payload,
        };
        let sent = tokio::select! {
            _ = token.cancelled() => break false,
            sent = outbound.send(response) => sent,
        };
        if sent.is_err() {
            tracing::warn!(generation, method = %method, "Response channel closed");
            break true;
        }
    };

    if closed_by_peer {
        let _ = events.send(SessionEvent::StreamClosed { generation, method });
    }
}
