//! Admission checks shared by the mutation paths.
//!
//! These run inside the calendar's write lock so the capacity decision
//! and the insert/transition are one critical section — a status rendered
//! earlier is never trusted.

use chrono::NaiveDate;

use crate::calendar::Horizon;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Local calendar date. Horizon comparisons are whole-day (midnight)
/// semantics, independent of wall-clock time.
pub(crate) fn today_local() -> NaiveDate {
    chrono::Local::now().date_naive()
}

pub(crate) fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity < 1 || capacity > MAX_SLOT_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity out of range"));
    }
    Ok(())
}

pub(crate) fn validate_details(details: &LessonDetails) -> Result<(), EngineError> {
    if details.course.len() > MAX_COURSE_LEN {
        return Err(EngineError::LimitExceeded("course reference too long"));
    }
    if let Some(ref point) = details.meeting_point
        && point.len() > MAX_TEXT_LEN {
            return Err(EngineError::LimitExceeded("meeting point too long"));
        }
    if let Some(ref notes) = details.notes
        && notes.len() > MAX_TEXT_LEN {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
    Ok(())
}

pub(crate) fn check_horizon(
    date: NaiveDate,
    today: NaiveDate,
    horizon: Horizon,
) -> Result<(), EngineError> {
    if !horizon.contains(today, date) {
        return Err(EngineError::OutOfHorizon { date });
    }
    Ok(())
}

/// A booking request is refused when the slot is closed (disabled period
/// or holiday) or when confirmed demand alone saturates capacity. Holds
/// beyond capacity are permitted: the slot reads `tentative` and the
/// instructor arbitrates by confirming or rejecting.
pub(crate) fn check_admission(
    state: &CalendarState,
    date: NaiveDate,
    period: Period,
) -> Result<(), EngineError> {
    let settings = state.day_settings(date);
    if settings.holiday || !*settings.enabled.get(period) {
        return Err(EngineError::SlotClosed { date, period });
    }
    let capacity = *settings.capacity.get(period);
    if state.demand(date, period).confirmed >= capacity {
        return Err(EngineError::CapacityExceeded { capacity });
    }
    Ok(())
}

/// Confirmation re-validates the hard cap at the moment of transition:
/// counting every *other* confirmed booking on the slot, confirming this
/// one must not push confirmed demand past capacity.
pub(crate) fn check_confirmation(
    state: &CalendarState,
    booking: &Booking,
) -> Result<(), EngineError> {
    let settings = state.day_settings(booking.date);
    let capacity = *settings.capacity.get(booking.period);
    let confirmed_others = state
        .slot_bookings(booking.date, booking.period)
        .filter(|b| b.id != booking.id && b.status == BookingStatus::Confirmed)
        .count() as u32;
    if confirmed_others >= capacity {
        return Err(EngineError::CapacityExceeded { capacity });
    }
    Ok(())
}
