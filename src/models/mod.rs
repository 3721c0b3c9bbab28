pub mod actor;
pub mod booking;
pub mod event;
pub mod service;

pub use actor::Actor;
pub use booking::{Booking, BookingStatus, Payment, PaymentStatus, SUPERSEDED_REASON};
pub use event::BookingEvent;
pub use service::ServiceOffering;
