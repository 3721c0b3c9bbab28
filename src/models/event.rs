use serde::{Deserialize, Serialize};

use super::BookingStatus;

/// One status change, as handed to the notification transport.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BookingEvent {
    /// Assigned once the event is persisted; zero before that.
    pub id: i64,
    pub booking_id: String,
    pub booking_code: String,
    pub old_status: Option<BookingStatus>,
    pub new_status: BookingStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: String,
}
