use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use super::check_auth;
use crate::db::queries::{self, BookingFilter};
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, ServiceOffering};
use crate::state::AppState;

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub resource_ref: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let status = query
        .status
        .as_deref()
        .map(|s| {
            BookingStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown status {s:?}")))
        })
        .transpose()?;

    let filter = BookingFilter {
        status,
        resource_ref: query.resource_ref.as_deref(),
        date: query.date,
    };
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let db = state.db()?;
    Ok(Json(queries::list_bookings(&db, &filter, limit)?))
}

// PUT /api/admin/services
const MAX_ADVANCE_BOOKING_WINDOW_DAYS: i64 = 3650;

pub async fn upsert_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(service): Json<ServiceOffering>,
) -> Result<Json<ServiceOffering>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if service.resource_ref.trim().is_empty() || service.service_ref.trim().is_empty() {
        return Err(AppError::Validation(
            "resource_ref and service_ref are required".to_string(),
        ));
    }
    if service.price < 0 || service.advance_booking_window_days < 0 {
        return Err(AppError::Validation(
            "price and advance_booking_window_days must not be negative".to_string(),
        ));
    }
    if service.advance_booking_window_days > MAX_ADVANCE_BOOKING_WINDOW_DAYS {
        return Err(AppError::Validation(format!(
            "advance_booking_window_days must be at most {MAX_ADVANCE_BOOKING_WINDOW_DAYS}"
        )));
    }
    if service.currency.trim().len() != 3 {
        return Err(AppError::Validation(
            "currency must be a three-letter code".to_string(),
        ));
    }

    let db = state.db()?;
    queries::upsert_service(&db, &service)?;
    tracing::info!(
        resource_ref = %service.resource_ref,
        service_ref = %service.service_ref,
        price = service.price,
        "service offering saved"
    );
    Ok(Json(service))
}
