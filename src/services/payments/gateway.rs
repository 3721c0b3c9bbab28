//! Bridges the provider's order/capture protocol to booking transitions.
//!
//! Provider calls happen outside the database lock. Every booking mutation
//! re-reads the row inside a write transaction, so a duplicated or
//! out-of-order capture callback observes the first one's result and turns
//! into a no-op.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::{CaptureStatus, OrderMetadata, ProviderCapture, ProviderFailure};
use crate::config::AppConfig;
use crate::db::{self, queries};
use crate::errors::AppError;
use crate::models::{Actor, Booking, BookingStatus, PaymentStatus, ServiceOffering};
use crate::services::{lifecycle, notifications};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub status: CaptureStatus,
    pub transaction_id: Option<String>,
    pub amount: Option<i64>,
    /// True when the order had already been captured and nothing changed.
    pub replayed: bool,
    pub booking: Booking,
}

impl CaptureResult {
    fn replay(booking: Booking) -> Self {
        Self {
            status: CaptureStatus::Succeeded,
            transaction_id: booking.payment.transaction_id.clone(),
            amount: booking.payment.amount,
            replayed: true,
            booking,
        }
    }

    fn applied(status: CaptureStatus, booking: Booking) -> Self {
        Self {
            status,
            transaction_id: booking.payment.transaction_id.clone(),
            amount: booking.payment.amount,
            replayed: false,
            booking,
        }
    }
}

/// Server-side checks on an order request; nothing here trusts the client.
pub fn validate_order(
    booking: &Booking,
    service: &ServiceOffering,
    amount: i64,
    currency: &str,
    min_amount: i64,
) -> Result<(), AppError> {
    if booking.payment.status == PaymentStatus::Paid {
        return Err(AppError::Validation(format!(
            "booking {} is already paid",
            booking.code
        )));
    }
    if !booking.status.is_active() {
        return Err(not_payable(booking));
    }
    if service.is_free {
        return Err(AppError::FreeService);
    }
    if amount != service.price || !currency.eq_ignore_ascii_case(&service.currency) {
        return Err(AppError::AmountMismatch {
            supplied: amount,
            expected: service.price,
            currency: service.currency.clone(),
        });
    }
    if amount < min_amount {
        return Err(AppError::BelowMinimum {
            amount,
            minimum: min_amount,
        });
    }
    Ok(())
}

fn not_payable(booking: &Booking) -> AppError {
    if booking.is_superseded() {
        AppError::Superseded(Box::new(booking.clone()))
    } else {
        AppError::InvalidTransition {
            from: booking.status,
            to: BookingStatus::Approved,
        }
    }
}

pub async fn create_order(
    state: &Arc<AppState>,
    booking_id: &str,
    amount: i64,
    currency: &str,
) -> Result<String, AppError> {
    let (booking, service) = {
        let db = state.db()?;
        let booking = queries::get_booking(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        let service = queries::get_service(&db, &booking.resource_ref, &booking.service_ref)?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "service {} of {}",
                    booking.service_ref, booking.resource_ref
                ))
            })?;
        (booking, service)
    };

    validate_order(
        &booking,
        &service,
        amount,
        currency,
        state.config.min_payment_amount,
    )?;

    let metadata = OrderMetadata {
        booking_id: booking.id.clone(),
        booking_code: booking.code.clone(),
    };
    let provider = state.payments.as_ref();
    let service_currency = service.currency.as_str();
    let metadata_ref = &metadata;
    let order_id = call_provider(&state.config, "create_order", move || {
        provider.create_order(amount, service_currency, metadata_ref)
    })
    .await?;

    {
        let mut db = state.db()?;
        db::in_write_tx(&mut db, state.config.max_write_retries, |tx| {
            let mut current = queries::get_booking(tx, &booking.id)?
                .ok_or_else(|| AppError::NotFound(format!("booking {}", booking.id)))?;
            if current.payment.status == PaymentStatus::Paid {
                return Err(AppError::Validation(format!(
                    "booking {} is already paid",
                    current.code
                )));
            }
            if !current.status.is_active() {
                return Err(not_payable(&current));
            }

            current.payment.status = PaymentStatus::Pending;
            current.payment.method = Some(provider.method().to_string());
            current.payment.amount = Some(amount);
            current.payment.currency = Some(service.currency.clone());
            current.payment.order_id = Some(order_id.clone());
            current.payment.transaction_id = None;
            current.payment.paid_at = None;
            current.updated_at = queries::now();
            queries::save_booking(tx, &current)
        })?;
    }

    tracing::info!(booking_id = %booking.id, order_id = %order_id, amount, "payment order created");
    Ok(order_id)
}

enum CaptureApplied {
    Done(CaptureResult, Vec<crate::models::BookingEvent>),
    /// Money was taken but the booking can no longer be approved.
    NeedsRefund(Booking, Vec<crate::models::BookingEvent>),
}

pub async fn capture(state: &Arc<AppState>, order_id: &str) -> Result<CaptureResult, AppError> {
    let booking = {
        let db = state.db()?;
        queries::get_booking_by_order_id(&db, order_id)?
            .ok_or_else(|| AppError::NotFound(format!("payment order {order_id}")))?
    };

    if booking.payment.status == PaymentStatus::Paid {
        tracing::info!(booking_id = %booking.id, order_id, "capture replayed, nothing to do");
        return Ok(CaptureResult::replay(booking));
    }
    if !booking.status.is_active() {
        return Err(not_payable(&booking));
    }

    let provider = state.payments.as_ref();
    let captured = call_provider(&state.config, "capture", move || provider.capture(order_id)).await?;

    let applied = {
        let mut db = state.db()?;
        db::in_write_tx(&mut db, state.config.max_write_retries, |tx| {
            let current = queries::get_booking(tx, &booking.id)?
                .ok_or_else(|| AppError::NotFound(format!("booking {}", booking.id)))?;
            apply_capture(tx, current, &captured)
        })?
    };

    match applied {
        CaptureApplied::Done(result, events) => {
            tracing::info!(
                booking_id = %result.booking.id,
                order_id,
                status = ?result.status,
                replayed = result.replayed,
                "capture applied"
            );
            notifications::emit(state, events);
            Ok(result)
        }
        CaptureApplied::NeedsRefund(current, events) => {
            notifications::emit(state, events);
            refund_capture(state, current, &captured).await
        }
    }
}

fn apply_capture(
    tx: &rusqlite::Connection,
    mut current: Booking,
    captured: &ProviderCapture,
) -> Result<CaptureApplied, AppError> {
    let mut events = Vec::new();

    if current.payment.status == PaymentStatus::Paid {
        return Ok(CaptureApplied::Done(CaptureResult::replay(current), events));
    }

    if captured.status == CaptureStatus::Failed {
        current.payment.status = PaymentStatus::Failed;
        current.updated_at = queries::now();
        let saved = queries::save_booking(tx, &current)?;
        tracing::warn!(booking_id = %saved.id, "provider reported a failed capture");
        return Ok(CaptureApplied::Done(
            CaptureResult::applied(CaptureStatus::Failed, saved),
            events,
        ));
    }

    if let (Some(expected), Some(actual)) = (current.payment.amount, captured.amount) {
        if expected != actual {
            tracing::warn!(
                booking_id = %current.id,
                expected,
                actual,
                "captured amount differs from the order amount"
            );
        }
    }

    if !current.status.is_active() {
        return Ok(CaptureApplied::NeedsRefund(current, events));
    }

    if current.status != BookingStatus::Approved {
        if let Some(holder) = lifecycle::approved_holder(tx, &current)? {
            let superseded = lifecycle::supersede(tx, current, &holder, &mut events)?;
            return Ok(CaptureApplied::NeedsRefund(superseded, events));
        }
    }

    let now = queries::now();
    current.payment.status = PaymentStatus::Paid;
    current.payment.transaction_id = captured.transaction_id.clone();
    current.payment.amount = captured.amount.or(current.payment.amount);
    current.payment.paid_at = Some(now);

    let saved = if current.status == BookingStatus::Approved {
        current.updated_at = now;
        queries::save_booking(tx, &current)?
    } else {
        lifecycle::apply_transition(
            tx,
            current,
            BookingStatus::Approved,
            &Actor::System,
            None,
            &mut events,
        )?
    };

    Ok(CaptureApplied::Done(
        CaptureResult::applied(CaptureStatus::Succeeded, saved),
        events,
    ))
}

async fn refund_capture(
    state: &Arc<AppState>,
    booking: Booking,
    captured: &ProviderCapture,
) -> Result<CaptureResult, AppError> {
    let Some(transaction_id) = captured.transaction_id.clone() else {
        tracing::error!(
            booking_id = %booking.id,
            "payment captured for a closed booking without a transaction id, refund manually"
        );
        return Err(not_payable(&booking));
    };
    let amount = captured.amount.or(booking.payment.amount).unwrap_or_default();
    let currency = booking.payment.currency.clone().unwrap_or_default();

    let provider = state.payments.as_ref();
    let txn = transaction_id.as_str();
    let cur = currency.as_str();
    if let Err(e) = call_provider(&state.config, "refund", move || provider.refund(txn, amount, cur)).await {
        tracing::error!(
            booking_id = %booking.id,
            transaction_id = %transaction_id,
            error = %e,
            "refund of capture on closed booking failed, refund manually"
        );
        return Err(e);
    }

    let refunded = {
        let mut db = state.db()?;
        db::in_write_tx(&mut db, state.config.max_write_retries, |tx| {
            let mut current = queries::get_booking(tx, &booking.id)?
                .ok_or_else(|| AppError::NotFound(format!("booking {}", booking.id)))?;
            current.payment.status = PaymentStatus::Refunded;
            current.payment.transaction_id = Some(transaction_id.clone());
            current.payment.amount = Some(amount);
            current.updated_at = queries::now();
            queries::save_booking(tx, &current)
        })?
    };

    tracing::warn!(
        booking_id = %refunded.id,
        transaction_id = %transaction_id,
        "capture arrived after the booking closed, payment refunded"
    );
    Err(not_payable(&refunded))
}

/// Calls the provider under the configured timeout, retrying transient
/// failures with exponential backoff.
async fn call_provider<T, F, Fut>(config: &AppConfig, operation: &str, mut call: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderFailure>>,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match tokio::time::timeout(config.provider_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(ProviderFailure::Rejected(msg))) => {
                tracing::warn!(operation, error = %msg, "payment provider rejected request");
                return Err(AppError::ProviderError(msg));
            }
            Ok(Err(ProviderFailure::Transient(msg))) => AppError::ProviderError(msg),
            Err(_) => AppError::ProviderTimeout,
        };

        if attempt >= config.provider_max_retries {
            tracing::warn!(operation, attempts = attempt + 1, error = %err, "payment provider call failed");
            return Err(err);
        }

        let delay = config.provider_retry_delay * 2u32.saturating_pow(attempt);
        attempt += 1;
        tracing::warn!(
            operation,
            attempt,
            error = %err,
            "payment provider call failed, retrying in {:?}",
            delay
        );
        tokio::time::sleep(delay).await;
    }
}
