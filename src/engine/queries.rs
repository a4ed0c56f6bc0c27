use chrono::NaiveDate;
use ulid::Ulid;

use crate::calendar::{self, Horizon, ViewMode};
use crate::limits::*;
use crate::model::*;

use super::status;
use super::{Engine, EngineError};

impl Engine {
    /// Per-date, per-period status for a date range. Read-only; runs
    /// concurrently with other readers and with writes to other
    /// calendars.
    pub async fn availability(
        &self,
        instructor_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayAvailability>, EngineError> {
        if from > to {
            return Err(EngineError::LimitExceeded("inverted date range"));
        }
        if (to - from).num_days() >= MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;

        let mut days = Vec::new();
        let mut date = from;
        while date <= to {
            days.push(status::day_availability(&guard, date));
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        Ok(days)
    }

    /// The windower composed with availability: the cell sequence of a
    /// calendar view with statuses filled in, `None` for alignment
    /// blanks. Refuses anchors whose window escapes the caller's horizon.
    pub async fn window_availability(
        &self,
        instructor_id: Ulid,
        mode: ViewMode,
        anchor: NaiveDate,
        today: NaiveDate,
        horizon: Horizon,
    ) -> Result<Vec<Option<DayAvailability>>, EngineError> {
        let (_, end) = calendar::window_span(mode, anchor);
        if end > horizon.end(today) || end < today {
            return Err(EngineError::OutOfHorizon { date: anchor });
        }
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;

        Ok(calendar::window(mode, anchor)
            .into_iter()
            .map(|cell| cell.map(|date| status::day_availability(&guard, date)))
            .collect())
    }

    pub async fn slot_status(
        &self,
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
    ) -> Result<SlotStatus, EngineError> {
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;
        Ok(status::slot_status(&guard, date, period))
    }

    /// Capacity-store accessor: materialized settings or policy-derived
    /// defaults, resolved in one place.
    pub async fn day_settings(
        &self,
        instructor_id: Ulid,
        date: NaiveDate,
    ) -> Result<DaySettings, EngineError> {
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;
        Ok(guard.day_settings(date))
    }

    pub async fn weekday_policy(&self, instructor_id: Ulid) -> Result<WeekdayPolicy, EngineError> {
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;
        Ok(guard.policy)
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let instructor_id = self
            .booking_instructor(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Bookings on one calendar, active only unless terminal records are
    /// requested (rejected/cancelled/completed stay out of the active
    /// ledger but remain queryable).
    pub async fn instructor_bookings(
        &self,
        instructor_id: Ulid,
        include_terminal: bool,
    ) -> Result<Vec<Booking>, EngineError> {
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.read().await;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| include_terminal || !b.status.is_terminal())
            .cloned()
            .collect())
    }

    /// A student's bookings across every calendar.
    pub async fn student_bookings(&self, student_id: Ulid) -> Vec<Booking> {
        let ids: Vec<Ulid> = self.calendars.iter().map(|e| *e.key()).collect();
        let mut out = Vec::new();
        for id in ids {
            if let Some(shared) = self.calendar(&id) {
                let guard = shared.read().await;
                out.extend(
                    guard
                        .bookings
                        .iter()
                        .filter(|b| b.student_id == student_id)
                        .cloned(),
                );
            }
        }
        out
    }
}
