use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const SUPERSEDED_REASON: &str = "superseded by a confirmed booking";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub code: String,
    pub resource_ref: String,
    pub service_ref: String,
    pub requester_ref: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: BookingStatus,
    pub decline_reason: String,
    pub cancel_reason: String,
    pub last_actor: Option<String>,
    pub payment: Payment,
    /// Optimistic concurrency token, bumped on every successful save.
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub status_changed_at: NaiveDateTime,
}

impl Booking {
    pub fn is_superseded(&self) -> bool {
        self.status == BookingStatus::Canceled && self.cancel_reason == SUPERSEDED_REASON
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Requested,
    Reviewed,
    Approved,
    Completed,
    Declined,
    Canceled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Requested,
        BookingStatus::Reviewed,
        BookingStatus::Approved,
        BookingStatus::Completed,
        BookingStatus::Declined,
        BookingStatus::Canceled,
    ];

    /// Statuses that still compete for a resource/date slot.
    pub const ACTIVE: [BookingStatus; 3] = [
        BookingStatus::Requested,
        BookingStatus::Reviewed,
        BookingStatus::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Reviewed => "reviewed",
            BookingStatus::Approved => "approved",
            BookingStatus::Completed => "completed",
            BookingStatus::Declined => "declined",
            BookingStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(BookingStatus::Requested),
            "reviewed" => Some(BookingStatus::Reviewed),
            "approved" => Some(BookingStatus::Approved),
            "completed" => Some(BookingStatus::Completed),
            "declined" => Some(BookingStatus::Declined),
            "canceled" => Some(BookingStatus::Canceled),
            _ => None,
        }
    }

    /// The single authoritative transition table.
    pub fn allowed_targets(&self) -> &'static [BookingStatus] {
        match self {
            BookingStatus::Requested => &[
                BookingStatus::Reviewed,
                BookingStatus::Approved,
                BookingStatus::Declined,
                BookingStatus::Canceled,
            ],
            BookingStatus::Reviewed => &[
                BookingStatus::Approved,
                BookingStatus::Declined,
                BookingStatus::Canceled,
            ],
            BookingStatus::Approved => &[BookingStatus::Completed, BookingStatus::Canceled],
            BookingStatus::Completed | BookingStatus::Declined | BookingStatus::Canceled => &[],
        }
    }

    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, BookingStatus::Declined | BookingStatus::Canceled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub status: PaymentStatus,
    pub method: Option<String>,
    /// Minor currency units.
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub order_id: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<NaiveDateTime>,
}

impl Default for Payment {
    fn default() -> Self {
        Self {
            status: PaymentStatus::Pending,
            method: None,
            amount: None,
            currency: None,
            order_id: None,
            transaction_id: None,
            paid_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_targets() {
        for status in [
            BookingStatus::Completed,
            BookingStatus::Declined,
            BookingStatus::Canceled,
        ] {
            assert!(!status.is_active());
            for target in BookingStatus::ALL {
                assert!(!status.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_transition_table() {
        use BookingStatus::*;
        assert!(Requested.can_transition_to(Reviewed));
        assert!(Requested.can_transition_to(Approved));
        assert!(Reviewed.can_transition_to(Declined));
        assert!(Approved.can_transition_to(Completed));
        assert!(Approved.can_transition_to(Canceled));

        assert!(!Requested.can_transition_to(Completed));
        assert!(!Requested.can_transition_to(Requested));
        assert!(!Reviewed.can_transition_to(Reviewed));
        assert!(!Reviewed.can_transition_to(Requested));
        assert!(!Approved.can_transition_to(Declined));
        assert!(!Approved.can_transition_to(Approved));
    }

    #[test]
    fn test_status_string_roundtrip_rejects_unknown() {
        for status in BookingStatus::ALL {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("cancelled"), None);
        assert_eq!(PaymentStatus::parse("paid"), Some(PaymentStatus::Paid));
        assert_eq!(PaymentStatus::parse(""), None);
    }

    #[test]
    fn test_active_set() {
        assert!(BookingStatus::Requested.is_active());
        assert!(BookingStatus::Approved.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(!BookingStatus::Canceled.is_active());
    }
}
