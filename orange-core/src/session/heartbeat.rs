//! Liveness loop for one link.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::OrangeError;
use crate::network::link::{LinkEvents, LinkFailure, Outbound, try_enqueue};

/// Every `interval`: a protocol ping, then the application heartbeat
/// `envelope`. A ping that cannot be written reports a failure for
/// `generation` and ends the loop. Cancelling `token` ends it silently.
pub async fn run(
    token: CancellationToken,
    interval: Duration,
    sender: mpsc::Sender<Outbound>,
    envelope: String,
    generation: u64,
    events: Arc<dyn LinkEvents>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = ping(&sender, interval) => result,
        };
        if let Err(e) = result {
            debug!(generation, "ping failed: {e}");
            events.on_failure(generation, LinkFailure::Heartbeat(e.to_string()));
            break;
        }

        trace!(generation, "heartbeat");
        try_enqueue(&sender, Outbound::Text(envelope.clone()));
    }
}

/// Queue a ping and wait for the writer to report on it.
async fn ping(sender: &mpsc::Sender<Outbound>, deadline: Duration) -> Result<(), OrangeError> {
    let (ack, done) = oneshot::channel();
    sender
        .send_timeout(Outbound::Ping(ack), deadline)
        .await
        .map_err(|_| OrangeError::ChannelClosed)?;
    tokio::time::timeout(deadline, done)
        .await
        .map_err(|_| OrangeError::Timeout(deadline))?
        .map_err(|_| OrangeError::ChannelClosed)?
}

// ── Tests ────────────────────────────────────────────────────────
