use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;

/// Active bookings that collide with `booking` on its resource/date or its
/// requester/date key, excluding `booking` itself. Ordered by code.
///
/// Must be called on the same connection (and transaction) that will write
/// the outcome, so the result is a consistent snapshot.
pub fn find_conflicts(conn: &Connection, booking: &Booking) -> Result<Vec<Booking>, AppError> {
    let by_resource =
        queries::query_active_by_resource_date(conn, &booking.resource_ref, booking.date)?;
    let by_requester =
        queries::query_active_by_requester_date(conn, &booking.requester_ref, booking.date)?;

    let mut conflicts = BTreeMap::new();
    for other in by_resource.into_iter().chain(by_requester) {
        if other.id == booking.id {
            continue;
        }
        conflicts.entry(other.code.clone()).or_insert(other);
    }

    Ok(conflicts.into_values().collect())
}

pub fn find_conflict_ids(conn: &Connection, booking_id: &str) -> Result<Vec<String>, AppError> {
    let booking = queries::get_booking(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    Ok(find_conflicts(conn, &booking)?
        .into_iter()
        .map(|b| b.id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{BookingStatus, Payment};
    use chrono::NaiveDate;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn insert(conn: &Connection, id: &str, resource: &str, requester: &str, date: &str) -> Booking {
        insert_with_status(conn, id, resource, requester, date, BookingStatus::Requested)
    }

    fn insert_with_status(
        conn: &Connection,
        id: &str,
        resource: &str,
        requester: &str,
        date: &str,
        status: BookingStatus,
    ) -> Booking {
        let now = chrono::Utc::now().naive_utc();
        let booking = Booking {
            id: id.to_string(),
            code: format!("BK-{id}"),
            resource_ref: resource.to_string(),
            service_ref: "svc".to_string(),
            requester_ref: requester.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            start_time: None,
            end_time: None,
            status,
            decline_reason: String::new(),
            cancel_reason: String::new(),
            last_actor: None,
            payment: Payment::default(),
            version: 1,
            created_at: now,
            updated_at: now,
            status_changed_at: now,
        };
        queries::insert_booking(conn, &booking).unwrap();
        booking
    }

    #[test]
    fn test_no_conflicts_for_lone_booking() {
        let conn = setup_db();
        insert(&conn, "a", "org-1", "alice", "2030-06-01");
        assert!(find_conflict_ids(&conn, "a").unwrap().is_empty());
    }

    #[test]
    fn test_resource_collision() {
        let conn = setup_db();
        insert(&conn, "a", "org-1", "alice", "2030-06-01");
        insert(&conn, "b", "org-1", "bob", "2030-06-01");
        insert(&conn, "c", "org-1", "carol", "2030-06-02");
        insert(&conn, "d", "org-2", "dave", "2030-06-01");

        assert_eq!(find_conflict_ids(&conn, "a").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_requester_collision_across_resources() {
        let conn = setup_db();
        insert(&conn, "a", "org-1", "alice", "2030-06-01");
        insert(&conn, "b", "org-2", "alice", "2030-06-01");
        insert(&conn, "c", "org-3", "alice", "2030-06-02");

        assert_eq!(find_conflict_ids(&conn, "a").unwrap(), vec!["b"]);
    }

    #[test]
    fn test_union_is_deduplicated() {
        let conn = setup_db();
        insert(&conn, "a", "org-1", "alice", "2030-06-01");
        // Same resource and same requester: matches both keys.
        insert(&conn, "b", "org-1", "alice", "2030-06-01");
        insert(&conn, "c", "org-2", "alice", "2030-06-01");
        insert(&conn, "d", "org-1", "bob", "2030-06-01");

        assert_eq!(find_conflict_ids(&conn, "a").unwrap(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_terminal_bookings_do_not_conflict() {
        let conn = setup_db();
        insert(&conn, "a", "org-1", "alice", "2030-06-01");
        insert_with_status(&conn, "b", "org-1", "bob", "2030-06-01", BookingStatus::Completed);
        insert_with_status(&conn, "c", "org-1", "carol", "2030-06-01", BookingStatus::Canceled);
        insert_with_status(&conn, "d", "org-1", "dave", "2030-06-01", BookingStatus::Declined);
        insert_with_status(&conn, "e", "org-1", "erin", "2030-06-01", BookingStatus::Approved);
        insert_with_status(&conn, "f", "org-1", "frank", "2030-06-01", BookingStatus::Reviewed);

        assert_eq!(find_conflict_ids(&conn, "a").unwrap(), vec!["e", "f"]);
    }

    #[test]
    fn test_unknown_booking() {
        let conn = setup_db();
        let err = find_conflict_ids(&conn, "nope").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
