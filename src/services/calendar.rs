use chrono::{Duration, NaiveDateTime};

use crate::models::{Booking, BookingStatus};

fn ics_status(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Requested | BookingStatus::Reviewed => "TENTATIVE",
        BookingStatus::Approved | BookingStatus::Completed => "CONFIRMED",
        BookingStatus::Declined | BookingStatus::Canceled => "CANCELLED",
    }
}

pub fn generate_ics(booking: &Booking) -> String {
    let (dtstart, dtend) = match booking.start_time {
        Some(start) => {
            let start_dt = NaiveDateTime::new(booking.date, start);
            let end = booking
                .end_time
                .map(|end| NaiveDateTime::new(booking.date, end))
                .unwrap_or(start_dt + Duration::hours(1));
            (
                format!("DTSTART:{}", start_dt.format("%Y%m%dT%H%M%S")),
                format!("DTEND:{}", end.format("%Y%m%dT%H%M%S")),
            )
        }
        // All-day booking
        None => (
            format!("DTSTART;VALUE=DATE:{}", booking.date.format("%Y%m%d")),
            format!(
                "DTEND;VALUE=DATE:{}",
                (booking.date + Duration::days(1)).format("%Y%m%d")
            ),
        ),
    };
    let dtstamp = booking.updated_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@appointments", booking.id);
    let summary = format!("Booking {} ({})", booking.code, booking.service_ref);
    let status = ics_status(booking.status);

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Appointments//Reservation Engine//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         {dtstart}\r\n\
         {dtend}\r\n\
         SUMMARY:{summary}\r\n\
         LOCATION:{location}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n",
        location = booking.resource_ref,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Payment;
    use chrono::{NaiveDate, NaiveTime};

    fn booking(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Booking {
        let stamp = NaiveDateTime::parse_from_str("2030-03-10 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Booking {
            id: "test-123".to_string(),
            code: "BK-000042".to_string(),
            resource_ref: "org-barber".to_string(),
            service_ref: "haircut".to_string(),
            requester_ref: "alice".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 3, 15).unwrap(),
            start_time: start,
            end_time: end,
            status: BookingStatus::Approved,
            decline_reason: String::new(),
            cancel_reason: String::new(),
            last_actor: None,
            payment: Payment::default(),
            version: 1,
            created_at: stamp,
            updated_at: stamp,
            status_changed_at: stamp,
        }
    }

    #[test]
    fn test_generate_ics_with_times() {
        let ics = generate_ics(&booking(
            NaiveTime::from_hms_opt(14, 0, 0),
            NaiveTime::from_hms_opt(15, 30, 0),
        ));
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("DTSTART:20300315T140000"));
        assert!(ics.contains("DTEND:20300315T153000"));
        assert!(ics.contains("SUMMARY:Booking BK-000042 (haircut)"));
        assert!(ics.contains("LOCATION:org-barber"));
        assert!(ics.contains("STATUS:CONFIRMED"));
        assert!(ics.contains("UID:test-123@appointments"));
        assert!(ics.contains("END:VCALENDAR"));
    }

    #[test]
    fn test_generate_ics_all_day() {
        let ics = generate_ics(&booking(None, None));
        assert!(ics.contains("DTSTART;VALUE=DATE:20300315"));
        assert!(ics.contains("DTEND;VALUE=DATE:20300316"));
    }

    #[test]
    fn test_generate_ics_start_only_defaults_to_an_hour() {
        let mut b = booking(NaiveTime::from_hms_opt(9, 0, 0), None);
        b.status = BookingStatus::Requested;
        let ics = generate_ics(&b);
        assert!(ics.contains("DTEND:20300315T100000"));
        assert!(ics.contains("STATUS:TENTATIVE"));
    }
}
