use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{BookingStatus, Period};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Confirmed demand already saturates the slot's capacity.
    CapacityExceeded { capacity: u32 },
    /// The period is disabled, or the date is a non-operating weekday.
    SlotClosed { date: NaiveDate, period: Period },
    /// Date is in the past or beyond the permitted booking window.
    OutOfHorizon { date: NaiveDate },
    /// Transition attempted on a booking whose state forbids it.
    InvalidState { id: Ulid, status: BookingStatus },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::CapacityExceeded { capacity } => {
                write!(f, "capacity {capacity} exceeded: slot no longer available")
            }
            EngineError::SlotClosed { date, period } => {
                write!(f, "slot closed: {date} {period}")
            }
            EngineError::OutOfHorizon { date } => {
                write!(f, "date outside the permitted window: {date}")
            }
            EngineError::InvalidState { id, status } => {
                write!(f, "invalid transition for booking {id} in state {status}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
