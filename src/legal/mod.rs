pub mod audit;
pub mod calendar;
pub mod service;

pub use audit::{AuditTrail, ChainVerification};
pub use calendar::{
    CalendarEvent, CalendarReminder, CalendarSync, CollectionCalendar, DEADLINE_SOURCE,
    project_deadline, status_glyph,
};
pub use service::LegalPracticeService;
