pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::queries;
use crate::models::BookingEvent;
use crate::state::AppState;

/// Outbound delivery of booking events to whoever must be told.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &BookingEvent) -> anyhow::Result<()>;
}

/// Used when no transport is configured; events still reach the event log
/// and live subscribers.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, event: &BookingEvent) -> anyhow::Result<()> {
        tracing::debug!(
            booking_id = %event.booking_id,
            new_status = %event.new_status,
            "no notification transport configured"
        );
        Ok(())
    }
}

/// Records, broadcasts and dispatches every event of a committed write.
/// Never fails: delivery problems are logged and dropped.
pub fn emit(state: &Arc<AppState>, events: Vec<BookingEvent>) {
    for mut event in events {
        let inserted = state
            .db()
            .and_then(|db| queries::insert_booking_event(&db, &event));

        match inserted {
            Ok(id) => event.id = id,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    booking_id = %event.booking_id,
                    "failed to record booking event"
                );
            }
        }

        // Broadcast to SSE subscribers; ignore if no receivers
        let _ = state.events_tx.send(event.clone());

        let notifier = Arc::clone(&state.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&event).await {
                tracing::warn!(
                    error = %e,
                    booking_id = %event.booking_id,
                    new_status = %event.new_status,
                    "notification delivery failed"
                );
            }
        });
    }
}
