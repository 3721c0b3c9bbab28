use anyhow::Context;
use async_trait::async_trait;

use super::Notifier;
use crate::models::BookingEvent;

/// POSTs each event as JSON to a fixed endpoint.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, event: &BookingEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({
                "event_type": "booking.status_changed",
                "booking_id": event.booking_id,
                "booking_code": event.booking_code,
                "old_status": event.old_status,
                "new_status": event.new_status,
                "actor": event.actor,
                "reason": event.reason,
                "occurred_at": event.created_at,
            }))
            .send()
            .await
            .context("failed to send booking notification")?
            .error_for_status()
            .context("notification endpoint returned error")?;

        Ok(())
    }
}
