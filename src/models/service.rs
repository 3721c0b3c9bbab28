use serde::{Deserialize, Serialize};

/// A bookable service as published by the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceOffering {
    pub resource_ref: String,
    pub service_ref: String,
    /// Minor currency units.
    pub price: i64,
    pub currency: String,
    pub is_free: bool,
    /// How many days ahead a booking may be placed; 0 means unlimited.
    pub advance_booking_window_days: i64,
}
