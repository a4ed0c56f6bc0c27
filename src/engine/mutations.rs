use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::calendar::Horizon;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::admission::{
    check_admission, check_confirmation, check_horizon, today_local, validate_capacity,
    validate_details,
};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_calendar(&self, instructor_id: Ulid) -> Result<(), EngineError> {
        if self.calendars.len() >= MAX_CALENDARS {
            return Err(EngineError::LimitExceeded("too many calendars"));
        }
        if self.calendars.contains_key(&instructor_id) {
            return Err(EngineError::AlreadyExists(instructor_id));
        }

        let event = Event::CalendarCreated { instructor_id };
        self.wal_append(&event).await?;
        self.calendars.insert(
            instructor_id,
            Arc::new(RwLock::new(CalendarState::new(instructor_id))),
        );
        self.notify.send(instructor_id, &event);
        metrics::gauge!(observability::CALENDARS_ACTIVE).set(self.calendars.len() as f64);
        Ok(())
    }

    /// Idempotent capacity upsert for one slot. Instructor horizon applies.
    pub async fn set_capacity(
        &self,
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
        capacity: u32,
    ) -> Result<(), EngineError> {
        validate_capacity(capacity)?;
        check_horizon(date, today_local(), Horizon::INSTRUCTOR)?;
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let mut guard = shared.write().await;

        let event = Event::CapacitySet {
            instructor_id,
            date,
            period,
            capacity,
        };
        self.persist_and_apply(instructor_id, &mut guard, &event).await
    }

    /// Enable or disable one slot. Disabling never cancels the confirmed
    /// bookings already on it — it only stops new ones; the slot reads
    /// `booked` while the existing lessons stay valid.
    pub async fn set_enabled(
        &self,
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
        enabled: bool,
    ) -> Result<(), EngineError> {
        check_horizon(date, today_local(), Horizon::INSTRUCTOR)?;
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let mut guard = shared.write().await;

        let event = Event::PeriodEnabledSet {
            instructor_id,
            date,
            period,
            enabled,
        };
        self.persist_and_apply(instructor_id, &mut guard, &event).await
    }

    /// Combined slot upsert (the transport's PUT availability): enabled
    /// flag plus optional capacity, applied under one lock acquisition.
    pub async fn configure_slot(
        &self,
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
        enabled: bool,
        capacity: Option<u32>,
    ) -> Result<(), EngineError> {
        if let Some(capacity) = capacity {
            validate_capacity(capacity)?;
        }
        check_horizon(date, today_local(), Horizon::INSTRUCTOR)?;
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let mut guard = shared.write().await;

        let event = Event::PeriodEnabledSet {
            instructor_id,
            date,
            period,
            enabled,
        };
        self.persist_and_apply(instructor_id, &mut guard, &event).await?;

        if let Some(capacity) = capacity {
            let event = Event::CapacitySet {
                instructor_id,
                date,
                period,
                capacity,
            };
            self.persist_and_apply(instructor_id, &mut guard, &event).await?;
        }
        Ok(())
    }

    /// Replace the instructor's accepted weekdays and cascade the change
    /// through the configured horizon. Bulk and idempotent: re-applying
    /// the same policy is a no-op on the resulting state.
    pub async fn set_weekday_policy(
        &self,
        instructor_id: Ulid,
        policy: WeekdayPolicy,
    ) -> Result<(), EngineError> {
        let today = today_local();
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let mut guard = shared.write().await;

        let event = Event::WeekdayPolicySet {
            instructor_id,
            accepted: policy.accepted(),
            from: today,
            to: Horizon::INSTRUCTOR.end(today),
        };
        self.persist_and_apply(instructor_id, &mut guard, &event).await
    }

    /// Student-side booking request. The capacity check and the insert
    /// run under the calendar's write lock — one critical section, so
    /// racing requests can never overshoot confirmed capacity.
    pub async fn request_booking(
        &self,
        student_id: Ulid,
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
        details: LessonDetails,
    ) -> Result<Booking, EngineError> {
        validate_details(&details)?;
        check_horizon(date, today_local(), Horizon::STUDENT)?;
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let mut guard = shared.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_CALENDAR {
            return Err(EngineError::LimitExceeded("too many bookings on calendar"));
        }

        if let Err(e) = check_admission(&guard, date, period) {
            metrics::counter!(
                observability::REQUESTS_REFUSED_TOTAL,
                "reason" => observability::refusal_label(&e)
            )
            .increment(1);
            return Err(e);
        }

        let booking = Booking::requested(
            Ulid::new(),
            instructor_id,
            student_id,
            date,
            period,
            details,
        );
        let event = Event::BookingRequested {
            id: booking.id,
            instructor_id,
            student_id,
            date,
            period,
            details: booking.details.clone(),
        };
        self.persist_and_apply(instructor_id, &mut guard, &event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "request_booking").increment(1);
        Ok(booking)
    }

    /// Instructor acknowledgement: pending → tentative. Re-holding an
    /// already-tentative booking is a retry-safe no-op.
    pub async fn place_hold(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let (instructor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?
            .clone();

        match current.status {
            BookingStatus::Pending => {
                let event = Event::BookingHeld {
                    id: booking_id,
                    instructor_id,
                };
                self.persist_and_apply(instructor_id, &mut guard, &event).await?;
                metrics::counter!(observability::OPS_TOTAL, "op" => "place_hold").increment(1);
                self.updated(&guard, booking_id)
            }
            BookingStatus::Tentative => Ok(current),
            status => Err(EngineError::InvalidState {
                id: booking_id,
                status,
            }),
        }
    }

    /// The only way a booking acquires a concrete wall-clock time.
    /// Capacity is re-validated here, at the moment of confirmation —
    /// never trusted from a previously rendered status. Re-confirming a
    /// confirmed booking reschedules its time.
    pub async fn confirm_with_time(
        &self,
        booking_id: Ulid,
        time: NaiveTime,
    ) -> Result<Booking, EngineError> {
        let (instructor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?
            .clone();
        if current.status.is_terminal() {
            return Err(EngineError::InvalidState {
                id: booking_id,
                status: current.status,
            });
        }

        check_confirmation(&guard, &current)?;

        let event = Event::BookingConfirmed {
            id: booking_id,
            instructor_id,
            time,
        };
        self.persist_and_apply(instructor_id, &mut guard, &event).await?;
        metrics::counter!(observability::OPS_TOTAL, "op" => "confirm").increment(1);
        self.updated(&guard, booking_id)
    }

    /// Instructor declines a request. Valid from pending/tentative only;
    /// repeating it on an already-rejected booking is a no-op.
    pub async fn reject(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let (instructor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?
            .clone();

        match current.status {
            BookingStatus::Pending | BookingStatus::Tentative => {
                let event = Event::BookingRejected {
                    id: booking_id,
                    instructor_id,
                };
                self.persist_and_apply(instructor_id, &mut guard, &event).await?;
                metrics::counter!(observability::OPS_TOTAL, "op" => "reject").increment(1);
                self.updated(&guard, booking_id)
            }
            BookingStatus::Rejected => Ok(current),
            status => Err(EngineError::InvalidState {
                id: booking_id,
                status,
            }),
        }
    }

    /// Student- or policy-initiated cancellation. Valid from any
    /// non-terminal state; repeating it is a no-op. The freed capacity is
    /// visible on the next status read — cancelled bookings count nothing.
    pub async fn cancel(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let (instructor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?
            .clone();

        match current.status {
            BookingStatus::Pending | BookingStatus::Tentative | BookingStatus::Confirmed => {
                let event = Event::BookingCancelled {
                    id: booking_id,
                    instructor_id,
                };
                self.persist_and_apply(instructor_id, &mut guard, &event).await?;
                metrics::counter!(observability::OPS_TOTAL, "op" => "cancel").increment(1);
                self.updated(&guard, booking_id)
            }
            BookingStatus::Cancelled => Ok(current),
            status => Err(EngineError::InvalidState {
                id: booking_id,
                status,
            }),
        }
    }

    /// Confirmed → completed once the lesson date has passed. Driven by
    /// the reaper sweep; idempotent on already-completed bookings.
    pub async fn complete(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let (instructor_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?
            .clone();

        match current.status {
            BookingStatus::Confirmed => {
                let event = Event::BookingCompleted {
                    id: booking_id,
                    instructor_id,
                };
                self.persist_and_apply(instructor_id, &mut guard, &event).await?;
                metrics::counter!(observability::OPS_TOTAL, "op" => "complete").increment(1);
                self.updated(&guard, booking_id)
            }
            BookingStatus::Completed => Ok(current),
            status => Err(EngineError::InvalidState {
                id: booking_id,
                status,
            }),
        }
    }

    fn updated(&self, state: &CalendarState, booking_id: Ulid) -> Result<Booking, EngineError> {
        state
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Confirmed bookings whose date has passed, for the reaper to
    /// complete. Skips calendars under contention — the next sweep gets
    /// them.
    pub fn collect_past_confirmed(&self, today: NaiveDate) -> Vec<(Ulid, Ulid)> {
        let mut past = Vec::new();
        for entry in self.calendars.iter() {
            let shared = entry.value().clone();
            if let Ok(guard) = shared.try_read() {
                for booking in &guard.bookings {
                    if booking.date >= today {
                        break; // sorted by date
                    }
                    if booking.status == BookingStatus::Confirmed {
                        past.push((booking.id, guard.instructor_id));
                    }
                }
            }
        }
        past
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let ids: Vec<Ulid> = self.calendars.iter().map(|e| *e.key()).collect();
        for id in ids {
            let Some(shared) = self.calendar(&id) else {
                continue;
            };
            let guard = shared.read().await;
            emit_calendar(&guard, &mut events);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}

/// Emit the minimal event sequence that recreates one calendar: creation,
/// weekday policy, non-default slot settings, then each booking replayed
/// to its current status.
fn emit_calendar(state: &CalendarState, events: &mut Vec<Event>) {
    let instructor_id = state.instructor_id;
    events.push(Event::CalendarCreated { instructor_id });

    if state.policy != WeekdayPolicy::default() {
        let (from, to) = match (state.days.keys().next(), state.days.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                let today = today_local();
                (today, today)
            }
        };
        events.push(Event::WeekdayPolicySet {
            instructor_id,
            accepted: state.policy.accepted(),
            from,
            to,
        });
    }

    for (date, settings) in &state.days {
        let derived = DaySettings::derived(*date, &state.policy);
        for period in Period::ALL {
            if settings.capacity.get(period) != derived.capacity.get(period) {
                events.push(Event::CapacitySet {
                    instructor_id,
                    date: *date,
                    period,
                    capacity: *settings.capacity.get(period),
                });
            }
            if settings.enabled.get(period) != derived.enabled.get(period) {
                events.push(Event::PeriodEnabledSet {
                    instructor_id,
                    date: *date,
                    period,
                    enabled: *settings.enabled.get(period),
                });
            }
        }
    }

    for booking in &state.bookings {
        events.push(Event::BookingRequested {
            id: booking.id,
            instructor_id,
            student_id: booking.student_id,
            date: booking.date,
            period: booking.period,
            details: booking.details.clone(),
        });
        let time = booking.confirmed_time.unwrap_or_default();
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Tentative => events.push(Event::BookingHeld {
                id: booking.id,
                instructor_id,
            }),
            BookingStatus::Confirmed => events.push(Event::BookingConfirmed {
                id: booking.id,
                instructor_id,
                time,
            }),
            BookingStatus::Completed => {
                events.push(Event::BookingConfirmed {
                    id: booking.id,
                    instructor_id,
                    time,
                });
                events.push(Event::BookingCompleted {
                    id: booking.id,
                    instructor_id,
                });
            }
            BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                id: booking.id,
                instructor_id,
            }),
            BookingStatus::Rejected => events.push(Event::BookingRejected {
                id: booking.id,
                instructor_id,
            }),
        }
    }
}
