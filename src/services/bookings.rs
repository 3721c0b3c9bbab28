//! The engine's request-facing operations. Each one commits through the
//! lifecycle and then hands the produced events to the notification emitter.

use std::sync::Arc;

use crate::errors::AppError;
use crate::models::{Actor, Booking, BookingStatus};
use crate::services::lifecycle::{self, NewBooking};
use crate::services::{conflicts, notifications};
use crate::state::AppState;

pub fn submit_booking(state: &Arc<AppState>, new: &NewBooking) -> Result<Booking, AppError> {
    let today = chrono::Utc::now().date_naive();
    let committed = {
        let mut db = state.db()?;
        lifecycle::submit(&mut db, &state.config, new, today)?
    };
    notifications::emit(state, committed.events);
    Ok(committed.value)
}

pub fn transition_booking(
    state: &Arc<AppState>,
    booking_id: &str,
    target: BookingStatus,
    actor: &Actor,
    reason: Option<&str>,
) -> Result<Booking, AppError> {
    let committed = {
        let mut db = state.db()?;
        lifecycle::transition(&mut db, &state.config, booking_id, target, actor, reason)?
    };
    notifications::emit(state, committed.events);

    // The approval lost to a booking approved earlier on the same key.
    let booking = committed.value;
    if target == BookingStatus::Approved && booking.status != BookingStatus::Approved {
        return Err(AppError::Superseded(Box::new(booking)));
    }
    Ok(booking)
}

pub fn get_conflicts(state: &Arc<AppState>, booking_id: &str) -> Result<Vec<String>, AppError> {
    let db = state.db()?;
    conflicts::find_conflict_ids(&db, booking_id)
}
