//! Booking lifecycle: submission, the transition table and the conflict
//! cascade that follows every approval.

use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{
    Actor, Booking, BookingEvent, BookingStatus, Payment, SUPERSEDED_REASON,
};
use crate::services::conflicts;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub resource_ref: String,
    pub service_ref: String,
    pub requester_ref: String,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

/// A committed write together with the events it produced.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub events: Vec<BookingEvent>,
}

pub fn submit(
    conn: &mut Connection,
    config: &AppConfig,
    new: &NewBooking,
    today: NaiveDate,
) -> Result<Committed<Booking>, AppError> {
    for (name, value) in [
        ("resource_ref", &new.resource_ref),
        ("service_ref", &new.service_ref),
        ("requester_ref", &new.requester_ref),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} must not be empty")));
        }
    }

    if let (Some(start), Some(end)) = (new.start_time, new.end_time) {
        if end <= start {
            return Err(AppError::Validation(
                "end_time must be after start_time".to_string(),
            ));
        }
    }

    if new.date < today {
        return Err(AppError::Validation(format!(
            "cannot book {} in the past",
            new.date
        )));
    }

    let service = queries::get_service(conn, &new.resource_ref, &new.service_ref)?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "service {} of {}",
                new.service_ref, new.resource_ref
            ))
        })?;

    // A window too large to represent is as good as unlimited.
    let last_bookable = Duration::try_days(service.advance_booking_window_days)
        .and_then(|window| today.checked_add_signed(window));
    if service.advance_booking_window_days > 0
        && last_bookable.is_some_and(|last| new.date > last)
    {
        return Err(AppError::Validation(format!(
            "bookings open at most {} days in advance",
            service.advance_booking_window_days
        )));
    }

    let actor = Actor::Requester(new.requester_ref.clone());

    db::in_write_tx(conn, config.max_write_retries, |tx| {
        let now = queries::now();
        let code = allocate_code(tx, &config.booking_code_prefix, config.code_generation_attempts)?;
        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            code,
            resource_ref: new.resource_ref.clone(),
            service_ref: new.service_ref.clone(),
            requester_ref: new.requester_ref.clone(),
            date: new.date,
            start_time: new.start_time,
            end_time: new.end_time,
            status: BookingStatus::Requested,
            decline_reason: String::new(),
            cancel_reason: String::new(),
            last_actor: Some(actor.to_string()),
            payment: Payment::default(),
            version: 1,
            created_at: now,
            updated_at: now,
            status_changed_at: now,
        };
        queries::insert_booking(tx, &booking)?;

        tracing::info!(booking_id = %booking.id, code = %booking.code, "booking submitted");

        let events = vec![event_for(&booking, None, &actor, None)];
        Ok(Committed {
            value: booking,
            events,
        })
    })
}

/// Picks the next sequential code. Candidates already taken (or lost to a
/// concurrent insert) are skipped, up to `attempts` tries.
fn allocate_code(conn: &Connection, prefix: &str, attempts: u32) -> Result<String, AppError> {
    let base = queries::count_bookings(conn)?;
    for attempt in 0..i64::from(attempts) {
        let candidate = format!("{prefix}{:06}", base + 1 + attempt);
        if !queries::code_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        tracing::debug!(code = %candidate, "booking code taken, trying next");
    }

    tracing::error!(attempts, "booking code generation exhausted");
    Err(AppError::CodeGenerationExhausted)
}

pub fn transition(
    conn: &mut Connection,
    config: &AppConfig,
    booking_id: &str,
    target: BookingStatus,
    actor: &Actor,
    reason: Option<&str>,
) -> Result<Committed<Booking>, AppError> {
    db::in_write_tx(conn, config.max_write_retries, |tx| {
        let booking = queries::get_booking(tx, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

        let mut events = Vec::new();
        let booking = apply_transition(tx, booking, target, actor, reason, &mut events)?;
        Ok(Committed {
            value: booking,
            events,
        })
    })
}

/// Validates a status change against the transition table and the actor's
/// permissions.
pub fn check_transition(
    booking: &Booking,
    target: BookingStatus,
    actor: &Actor,
    reason: Option<&str>,
) -> Result<(), AppError> {
    if let Actor::Requester(requester) = actor {
        if *requester != booking.requester_ref {
            return Err(AppError::Forbidden);
        }
        // Requesters may only withdraw a booking nobody has looked at yet.
        if booking.status != BookingStatus::Requested || target != BookingStatus::Canceled {
            return Err(AppError::InvalidTransition {
                from: booking.status,
                to: target,
            });
        }
    }

    if !booking.status.can_transition_to(target) {
        if target == BookingStatus::Approved && booking.is_superseded() {
            return Err(AppError::Superseded(Box::new(booking.clone())));
        }
        return Err(AppError::InvalidTransition {
            from: booking.status,
            to: target,
        });
    }

    if target.requires_reason() && reason.map_or(true, |r| r.trim().is_empty()) {
        return Err(AppError::MissingReason(target));
    }

    Ok(())
}

/// Applies one transition on `conn` (which must be inside the caller's write
/// transaction), appending an event per status change to `events`. Approval
/// cancels every competing active booking in the same transaction.
///
/// An approval whose key is already held by an approved booking is not
/// applied: the booking is canceled as superseded instead and returned in
/// that state, so the caller can commit the cancellation and report it.
pub fn apply_transition(
    conn: &Connection,
    booking: Booking,
    target: BookingStatus,
    actor: &Actor,
    reason: Option<&str>,
    events: &mut Vec<BookingEvent>,
) -> Result<Booking, AppError> {
    check_transition(&booking, target, actor, reason)?;

    if target == BookingStatus::Approved {
        if let Some(holder) = approved_holder(conn, &booking)? {
            return supersede(conn, booking, &holder, events);
        }
    }

    let from = booking.status;
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());
    let saved = queries::save_booking(conn, &with_status(booking, target, actor, reason))?;

    tracing::info!(
        booking_id = %saved.id,
        code = %saved.code,
        from = %from,
        to = %target,
        actor = %actor,
        "booking transitioned"
    );
    events.push(event_for(&saved, Some(from), actor, reason));

    if target == BookingStatus::Approved {
        cancel_conflicts(conn, &saved, events)?;
    }

    Ok(saved)
}

/// The approved booking already holding one of `booking`'s keys, if any.
pub fn approved_holder(conn: &Connection, booking: &Booking) -> Result<Option<Booking>, AppError> {
    Ok(conflicts::find_conflicts(conn, booking)?
        .into_iter()
        .find(|other| other.status == BookingStatus::Approved))
}

/// Cancels `booking` because `holder` was approved on the same key first.
pub fn supersede(
    conn: &Connection,
    booking: Booking,
    holder: &Booking,
    events: &mut Vec<BookingEvent>,
) -> Result<Booking, AppError> {
    let from = booking.status;
    let saved = queries::save_booking(
        conn,
        &with_status(booking, BookingStatus::Canceled, &Actor::System, Some(SUPERSEDED_REASON)),
    )?;

    tracing::warn!(
        booking_id = %saved.id,
        approved_id = %holder.id,
        "approval lost to an already approved booking, canceled as superseded"
    );
    events.push(event_for(&saved, Some(from), &Actor::System, Some(SUPERSEDED_REASON)));
    Ok(saved)
}

fn cancel_conflicts(
    conn: &Connection,
    approved: &Booking,
    events: &mut Vec<BookingEvent>,
) -> Result<(), AppError> {
    for sibling in conflicts::find_conflicts(conn, approved)? {
        let from = sibling.status;
        let canceled = with_status(
            sibling,
            BookingStatus::Canceled,
            &Actor::System,
            Some(SUPERSEDED_REASON),
        );
        match queries::save_booking(conn, &canceled) {
            Ok(saved) => {
                tracing::info!(
                    booking_id = %saved.id,
                    approved_id = %approved.id,
                    "conflicting booking canceled"
                );
                events.push(event_for(&saved, Some(from), &Actor::System, Some(SUPERSEDED_REASON)));
            }
            Err(e @ (AppError::StaleWrite(_) | AppError::NotFound(_))) => {
                tracing::warn!(
                    booking_id = %canceled.id,
                    error = %e,
                    "could not cancel conflicting booking, skipping"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn with_status(
    mut booking: Booking,
    target: BookingStatus,
    actor: &Actor,
    reason: Option<&str>,
) -> Booking {
    let now = queries::now();
    let reason = reason.unwrap_or_default().to_string();

    booking.status = target;
    booking.decline_reason = if target == BookingStatus::Declined {
        reason.clone()
    } else {
        String::new()
    };
    booking.cancel_reason = if target == BookingStatus::Canceled {
        reason
    } else {
        String::new()
    };
    booking.last_actor = Some(actor.to_string());
    booking.updated_at = now;
    booking.status_changed_at = now;
    booking
}

fn event_for(
    booking: &Booking,
    old_status: Option<BookingStatus>,
    actor: &Actor,
    reason: Option<&str>,
) -> BookingEvent {
    BookingEvent {
        id: 0,
        booking_id: booking.id.clone(),
        booking_code: booking.code.clone(),
        old_status,
        new_status: booking.status,
        actor: actor.to_string(),
        reason: reason.map(str::to_string),
        created_at: booking.status_changed_at.format(queries::DATETIME_FMT).to_string(),
    }
}
