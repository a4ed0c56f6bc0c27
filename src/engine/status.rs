//! The slot status resolver.
//!
//! Pure functions from day settings + demand to a derived status. The
//! result is never cached: it is cheap to recompute and caching would
//! invite staleness between a transition and the next read.

use chrono::NaiveDate;

use crate::model::{CalendarState, DayAvailability, DaySettings, Demand, PerPeriod, Period, SlotStatus};

/// Derive the visible status of one slot.
///
/// Confirmed bookings take priority over holds when checking the hard
/// cap: a slot is never `available` once confirmed demand alone would
/// make one more confirmation exceed capacity.
pub fn resolve(settings: &DaySettings, period: Period, demand: Demand) -> SlotStatus {
    if settings.holiday || !*settings.enabled.get(period) {
        return SlotStatus::Booked;
    }
    let capacity = *settings.capacity.get(period);
    if demand.confirmed >= capacity {
        SlotStatus::Booked
    } else if demand.total() >= capacity {
        SlotStatus::Tentative
    } else {
        SlotStatus::Available
    }
}

/// Status of one slot on a calendar, demand counted from the ledger.
pub fn slot_status(state: &CalendarState, date: NaiveDate, period: Period) -> SlotStatus {
    resolve(&state.day_settings(date), period, state.demand(date, period))
}

/// All three period statuses for one date, as calendar views render them.
pub fn day_availability(state: &CalendarState, date: NaiveDate) -> DayAvailability {
    let settings = state.day_settings(date);
    DayAvailability {
        date,
        holiday: settings.holiday,
        periods: PerPeriod {
            morning: resolve(&settings, Period::Morning, state.demand(date, Period::Morning)),
            afternoon: resolve(&settings, Period::Afternoon, state.demand(date, Period::Afternoon)),
            evening: resolve(&settings, Period::Evening, state.demand(date, Period::Evening)),
        },
    }
}
