use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::check_auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Actor, Booking, BookingEvent, BookingStatus};
use crate::services::bookings;
use crate::services::lifecycle::NewBooking;
use crate::state::AppState;

// POST /api/bookings
pub async fn submit_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = bookings::submit_booking(&state, &payload)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let db = state.db()?;
    let booking = queries::get_booking(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

// GET /api/bookings/:id/events
pub async fn get_booking_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<BookingEvent>>, AppError> {
    let db = state.db()?;
    if queries::get_booking(&db, &id)?.is_none() {
        return Err(AppError::NotFound(format!("booking {id}")));
    }
    Ok(Json(queries::get_events_for_booking(&db, &id)?))
}

// GET /api/bookings/:id/conflicts
#[derive(Serialize)]
pub struct ConflictsResponse {
    booking_id: String,
    conflicts: Vec<String>,
}

pub async fn get_conflicts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConflictsResponse>, AppError> {
    let conflicts = bookings::get_conflicts(&state, &id)?;
    Ok(Json(ConflictsResponse {
        booking_id: id,
        conflicts,
    }))
}

// POST /api/bookings/:id/transition
#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: BookingStatus,
    pub reviewer: String,
    pub reason: Option<String>,
}

pub async fn transition_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Booking>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if payload.reviewer.trim().is_empty() {
        return Err(AppError::Validation("reviewer must not be empty".to_string()));
    }
    let actor = Actor::Reviewer(payload.reviewer.trim().to_string());
    let booking = bookings::transition_booking(
        &state,
        &id,
        payload.status,
        &actor,
        payload.reason.as_deref(),
    )?;
    Ok(Json(booking))
}

// POST /api/bookings/:id/cancel
#[derive(Deserialize)]
pub struct CancelRequest {
    pub requester_ref: String,
    pub reason: String,
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<Booking>, AppError> {
    let actor = Actor::Requester(payload.requester_ref);
    let booking = bookings::transition_booking(
        &state,
        &id,
        BookingStatus::Canceled,
        &actor,
        Some(&payload.reason),
    )?;
    Ok(Json(booking))
}
