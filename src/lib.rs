//! slotbook — the availability & booking scheduling engine of a
//! driving-lesson marketplace.
//!
//! An instructor's bookable calendar is a set of (date, period) slots
//! with finite capacity. Students request lessons against a slot; the
//! instructor holds, confirms (assigning a concrete time), or rejects
//! them; slot visibility (`available` / `tentative` / `booked`) is always
//! derived from the booking ledger, never stored. Calendars live behind
//! per-instructor locks, every transition is WAL-logged for replay, and
//! background tasks complete past lessons and compact the log.
//!
//! A transport layer maps the engine's operation set to routes; nothing
//! in this crate speaks HTTP.

pub mod calendar;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod service;
pub mod wal;

pub use calendar::{Horizon, ViewMode};
pub use config::SchedulerConfig;
pub use engine::{Engine, EngineError};
pub use model::{
    Booking, BookingStatus, DayAvailability, DaySettings, LessonDetails, Period, SlotStatus,
    Transmission, WeekdayPolicy,
};
pub use service::Scheduler;
