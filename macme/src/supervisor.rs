//! The Service Orchestrator (C8): wires Marathon's event stream to the
//! reconciler, reconnecting the subscription with bounded exponential
//! backoff, and drives a periodic safety-net sync alongside it.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use macme_marathon::MarathonClient;
use macme_reconciler::Reconciler;

/// Event types that plausibly change an app's domain mapping (§4.8,
/// §9 "open question: event types", decided in DESIGN.md): app
/// creation/update, task status transitions, and health flips. Marathon
/// emits a much larger event vocabulary (deployment events, framework
/// events, etc.) that this system has no reason to resync on.
pub const RESYNC_EVENT_TYPES: &[&str] = &[
    "api_post_event",
    "status_update_event",
    "health_status_changed_event",
];

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Opens the Marathon event subscription and triggers a sync on every
/// event that arrives. On disconnect (transport error or a line-length
/// violation), reconnects after a backoff that doubles each consecutive
/// failure, capped at [`MAX_BACKOFF`], and resets to [`INITIAL_BACKOFF`]
/// after any connection that stays up long enough to deliver an event.
/// Never returns; intended to be driven from its own `tokio::spawn`.
pub async fn run_event_subscription(marathon: Arc<MarathonClient>, reconciler: Arc<Reconciler>) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        tracing::info!("opening Marathon event subscription");
        match marathon.get_events(RESYNC_EVENT_TYPES).await {
            Ok(stream) => {
                let mut stream = Box::pin(stream);
                let mut saw_event = false;

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(event) => {
                            saw_event = true;
                            tracing::debug!(event_type = %event.event_type, "resync triggered");
                            if let Err(e) = reconciler.trigger().await {
                                tracing::error!("sync triggered by event failed: {e}");
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Marathon event stream error: {e}");
                            break;
                        }
                    }
                }

                backoff = if saw_event { INITIAL_BACKOFF } else { next_backoff(backoff) };
            }
            Err(e) => {
                tracing::warn!("failed to open Marathon event subscription: {e}");
                backoff = next_backoff(backoff);
            }
        }

        tracing::info!(delay_secs = backoff.as_secs(), "reconnecting after backoff");
        tokio::time::sleep(backoff).await;
    }
}

/// Runs `reconciler.trigger()` every `period` as a safety net in case an
/// event was missed or Marathon's stream silently dropped a delta.
/// Never returns.
pub async fn run_periodic_sync(reconciler: Arc<Reconciler>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The orchestrator already runs an immediate sync on startup (§4.8);
    // skip firing this on the first tick so we don't duplicate it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        tracing::info!("periodic safety-net sync firing");
        if let Err(e) = reconciler.trigger().await {
            tracing::error!("periodic sync failed: {e}");
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    std::cmp::min(current * 2, MAX_BACKOFF)
}
