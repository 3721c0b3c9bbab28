use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::errors::AppError;
use crate::models::{Booking, BookingEvent, BookingStatus, Payment, PaymentStatus, ServiceOffering};

pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FMT: &str = "%Y-%m-%d";
pub const TIME_FMT: &str = "%H:%M";

const BOOKING_COLUMNS: &str = "id, code, resource_ref, service_ref, requester_ref, date, start_time, end_time, \
     status, decline_reason, cancel_reason, last_actor, payment_status, payment_method, payment_amount, \
     payment_currency, payment_order_id, payment_transaction_id, paid_at, version, created_at, updated_at, \
     status_changed_at";

/// Current UTC time at the precision the store keeps.
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

const ACTIVE_FILTER: &str = "status IN ('requested', 'reviewed', 'approved')";

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> Result<(), AppError> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)"
        ),
        params![
            booking.id,
            booking.code,
            booking.resource_ref,
            booking.service_ref,
            booking.requester_ref,
            booking.date.format(DATE_FMT).to_string(),
            booking.start_time.map(|t| t.format(TIME_FMT).to_string()),
            booking.end_time.map(|t| t.format(TIME_FMT).to_string()),
            booking.status.as_str(),
            booking.decline_reason,
            booking.cancel_reason,
            booking.last_actor,
            booking.payment.status.as_str(),
            booking.payment.method,
            booking.payment.amount,
            booking.payment.currency,
            booking.payment.order_id,
            booking.payment.transaction_id,
            booking.payment.paid_at.map(|t| t.format(DATETIME_FMT).to_string()),
            booking.version,
            booking.created_at.format(DATETIME_FMT).to_string(),
            booking.updated_at.format(DATETIME_FMT).to_string(),
            booking.status_changed_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

/// Writes every mutable field of `booking`, provided the stored version still
/// equals `booking.version`. Returns the booking carrying its new version.
pub fn save_booking(conn: &Connection, booking: &Booking) -> Result<Booking, AppError> {
    let count = conn.execute(
        "UPDATE bookings SET
           status = ?1, decline_reason = ?2, cancel_reason = ?3, last_actor = ?4,
           payment_status = ?5, payment_method = ?6, payment_amount = ?7, payment_currency = ?8,
           payment_order_id = ?9, payment_transaction_id = ?10, paid_at = ?11,
           updated_at = ?12, status_changed_at = ?13, version = version + 1
         WHERE id = ?14 AND version = ?15",
        params![
            booking.status.as_str(),
            booking.decline_reason,
            booking.cancel_reason,
            booking.last_actor,
            booking.payment.status.as_str(),
            booking.payment.method,
            booking.payment.amount,
            booking.payment.currency,
            booking.payment.order_id,
            booking.payment.transaction_id,
            booking.payment.paid_at.map(|t| t.format(DATETIME_FMT).to_string()),
            booking.updated_at.format(DATETIME_FMT).to_string(),
            booking.status_changed_at.format(DATETIME_FMT).to_string(),
            booking.id,
            booking.version,
        ],
    )?;

    if count == 0 {
        return match get_booking(conn, &booking.id)? {
            Some(_) => Err(AppError::StaleWrite(booking.id.clone())),
            None => Err(AppError::NotFound(format!("booking {}", booking.id))),
        };
    }

    let mut saved = booking.clone();
    saved.version += 1;
    Ok(saved)
}

pub fn get_booking(conn: &Connection, id: &str) -> Result<Option<Booking>, AppError> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn get_booking_by_order_id(
    conn: &Connection,
    order_id: &str,
) -> Result<Option<Booking>, AppError> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_order_id = ?1"),
            params![order_id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn code_exists(conn: &Connection, code: &str) -> Result<bool, AppError> {
    let exists = conn.query_row(
        "SELECT COUNT(*) > 0 FROM bookings WHERE code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn count_bookings(conn: &Connection) -> Result<i64, AppError> {
    let count = conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))?;
    Ok(count)
}

pub fn query_active_by_resource_date(
    conn: &Connection,
    resource_ref: &str,
    date: NaiveDate,
) -> Result<Vec<Booking>, AppError> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE resource_ref = ?1 AND date = ?2 AND {ACTIVE_FILTER} ORDER BY created_at ASC, code ASC"
        ),
        params![resource_ref, date.format(DATE_FMT).to_string()],
    )
}

pub fn query_active_by_requester_date(
    conn: &Connection,
    requester_ref: &str,
    date: NaiveDate,
) -> Result<Vec<Booking>, AppError> {
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE requester_ref = ?1 AND date = ?2 AND {ACTIVE_FILTER} ORDER BY created_at ASC, code ASC"
        ),
        params![requester_ref, date.format(DATE_FMT).to_string()],
    )
}

#[derive(Debug, Default)]
pub struct BookingFilter<'a> {
    pub status: Option<BookingStatus>,
    pub resource_ref: Option<&'a str>,
    pub date: Option<NaiveDate>,
}

pub fn list_bookings(
    conn: &Connection,
    filter: &BookingFilter<'_>,
    limit: i64,
) -> Result<Vec<Booking>, AppError> {
    let date = filter.date.map(|d| d.format(DATE_FMT).to_string());
    query_bookings(
        conn,
        &format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR resource_ref = ?2)
               AND (?3 IS NULL OR date = ?3)
             ORDER BY date DESC, created_at DESC LIMIT ?4"
        ),
        params![filter.status.map(|s| s.as_str()), filter.resource_ref, date, limit],
    )
}

fn query_bookings(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Booking>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .map_err(|e| AppError::Internal(format!("bad timestamp {s:?}: {e}")))
}

fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(s, TIME_FMT)
        .map_err(|e| AppError::Internal(format!("bad time {s:?}: {e}")))
}

fn parse_booking_row(row: &Row<'_>) -> Result<Booking, AppError> {
    let date_str: String = row.get(5)?;
    let start_str: Option<String> = row.get(6)?;
    let end_str: Option<String> = row.get(7)?;
    let status_str: String = row.get(8)?;
    let payment_status_str: String = row.get(12)?;
    let paid_at_str: Option<String> = row.get(18)?;
    let created_at_str: String = row.get(20)?;
    let updated_at_str: String = row.get(21)?;
    let status_changed_str: String = row.get(22)?;

    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| AppError::Internal(format!("unknown booking status {status_str:?}")))?;
    let payment_status = PaymentStatus::parse(&payment_status_str).ok_or_else(|| {
        AppError::Internal(format!("unknown payment status {payment_status_str:?}"))
    })?;

    Ok(Booking {
        id: row.get(0)?,
        code: row.get(1)?,
        resource_ref: row.get(2)?,
        service_ref: row.get(3)?,
        requester_ref: row.get(4)?,
        date: NaiveDate::parse_from_str(&date_str, DATE_FMT)
            .map_err(|e| AppError::Internal(format!("bad date {date_str:?}: {e}")))?,
        start_time: start_str.as_deref().map(parse_time).transpose()?,
        end_time: end_str.as_deref().map(parse_time).transpose()?,
        status,
        decline_reason: row.get(9)?,
        cancel_reason: row.get(10)?,
        last_actor: row.get(11)?,
        payment: Payment {
            status: payment_status,
            method: row.get(13)?,
            amount: row.get(14)?,
            currency: row.get(15)?,
            order_id: row.get(16)?,
            transaction_id: row.get(17)?,
            paid_at: paid_at_str.as_deref().map(parse_datetime).transpose()?,
        },
        version: row.get(19)?,
        created_at: parse_datetime(&created_at_str)?,
        updated_at: parse_datetime(&updated_at_str)?,
        status_changed_at: parse_datetime(&status_changed_str)?,
    })
}

// ── Services ──

pub fn get_service(
    conn: &Connection,
    resource_ref: &str,
    service_ref: &str,
) -> Result<Option<ServiceOffering>, AppError> {
    let service = conn
        .query_row(
            "SELECT resource_ref, service_ref, price, currency, is_free, advance_booking_window_days
             FROM services WHERE resource_ref = ?1 AND service_ref = ?2",
            params![resource_ref, service_ref],
            |row| {
                Ok(ServiceOffering {
                    resource_ref: row.get(0)?,
                    service_ref: row.get(1)?,
                    price: row.get(2)?,
                    currency: row.get(3)?,
                    is_free: row.get::<_, i32>(4)? != 0,
                    advance_booking_window_days: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(service)
}

pub fn upsert_service(conn: &Connection, service: &ServiceOffering) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO services (resource_ref, service_ref, price, currency, is_free, advance_booking_window_days)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(resource_ref, service_ref) DO UPDATE SET
           price = excluded.price,
           currency = excluded.currency,
           is_free = excluded.is_free,
           advance_booking_window_days = excluded.advance_booking_window_days",
        params![
            service.resource_ref,
            service.service_ref,
            service.price,
            service.currency,
            service.is_free as i32,
            service.advance_booking_window_days,
        ],
    )?;
    Ok(())
}

// ── Booking Events ──

pub fn insert_booking_event(conn: &Connection, event: &BookingEvent) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO booking_events (booking_id, booking_code, old_status, new_status, actor, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.booking_id,
            event.booking_code,
            event.old_status.map(|s| s.as_str()),
            event.new_status.as_str(),
            event.actor,
            event.reason,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking_events_since(
    conn: &Connection,
    since_id: i64,
) -> Result<Vec<BookingEvent>, AppError> {
    query_events(
        conn,
        "SELECT id, booking_id, booking_code, old_status, new_status, actor, reason, created_at
         FROM booking_events WHERE id > ?1 ORDER BY id ASC",
        params![since_id],
    )
}

pub fn get_events_for_booking(
    conn: &Connection,
    booking_id: &str,
) -> Result<Vec<BookingEvent>, AppError> {
    query_events(
        conn,
        "SELECT id, booking_id, booking_code, old_status, new_status, actor, reason, created_at
         FROM booking_events WHERE booking_id = ?1 ORDER BY id ASC",
        params![booking_id],
    )
}

fn query_events(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<BookingEvent>, AppError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_event_row(row)))?;

    let mut events = vec![];
    for row in rows {
        events.push(row??);
    }
    Ok(events)
}

fn parse_event_row(row: &Row<'_>) -> Result<BookingEvent, AppError> {
    let old_status: Option<String> = row.get(3)?;
    let new_status: String = row.get(4)?;

    Ok(BookingEvent {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        booking_code: row.get(2)?,
        old_status: old_status.as_deref().and_then(BookingStatus::parse),
        new_status: BookingStatus::parse(&new_status)
            .ok_or_else(|| AppError::Internal(format!("unknown booking status {new_status:?}")))?,
        actor: row.get(5)?,
        reason: row.get(6)?,
        created_at: row.get(7)?,
    })
}
