pub mod bookings;
pub mod calendar;
pub mod conflicts;
pub mod lifecycle;
pub mod notifications;
pub mod payments;
