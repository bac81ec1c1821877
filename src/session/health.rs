//! Keepalive health check loop.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::actor::SessionEvent;
use super::state::HealthStatus;
use super::transport::{Identity, Transport};
use crate::config::SessionSettings;

/// Check health every keepalive interval while the session is running.
///
/// The first failing check (transport error, timeout or non-serving status) is
/// reported to the actor and ends the loop. Remote errors listed in a serving
/// response are logged only.
pub(crate) async fn health_loop(
    generation: u64,
    transport: Arc<dyn Transport>,
    identity: Identity,
    settings: SessionSettings,
    health: Arc<Mutex<HealthStatus>>,
    token: CancellationToken,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(settings.keepalive_interval) => {}
        }

        let started = Instant::now();
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = tokio::time::timeout(settings.health_timeout, transport.health_check(&identity)) => result,
        };

        let failure = match result {
            Ok(Ok(report)) if report.is_serving() => {
                for remote in &report.errors {
                    tracing::warn!(
                        generation,
                        code = %remote.code,
                        message = %remote.message,
                        "Platform reported an error"
                    );
                }
                let rtt_ms = started.elapsed().as_secs_f64() * 1000.0;
                health.lock().record_success(rtt_ms);
                tracing::trace!(generation, rtt_ms, "Health check ok");
                continue;
            }
            Ok(Ok(report)) => format!("platform status {:?}", report.status),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("no reply within {:?}", settings.health_timeout),
        };

        health.lock().record_failure(failure.clone());
        let _ = events.send(SessionEvent::HealthFailed {
            generation,
            reason: failure,
        });
        return;
    }
}
