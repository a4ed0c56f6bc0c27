mod admission;
mod error;
mod mutations;
mod queries;
mod status;

pub use error::EngineError;
pub use status::{day_availability, resolve, slot_status};

pub(crate) use admission::today_local;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedCalendar = Arc<RwLock<CalendarState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── The engine ───────────────────────────────────────────

/// The scheduling ledger: one calendar per instructor, each behind its
/// own lock so mutations serialize per instructor while reads and other
/// instructors' calendars proceed concurrently.
pub struct Engine {
    calendars: DashMap<Ulid, SharedCalendar>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → instructor id
    booking_index: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a CalendarState (no locking — caller holds
/// the write lock or sole ownership during replay).
fn apply_event(state: &mut CalendarState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::CapacitySet {
            date, period, capacity, ..
        } => {
            state.upsert_day(*date).capacity.set(*period, *capacity);
        }
        Event::PeriodEnabledSet {
            date, period, enabled, ..
        } => {
            state.upsert_day(*date).enabled.set(*period, *enabled);
        }
        Event::WeekdayPolicySet {
            accepted, from, to, ..
        } => {
            apply_weekday_policy(state, *accepted, *from, *to);
        }
        Event::BookingRequested {
            id,
            instructor_id,
            student_id,
            date,
            period,
            details,
        } => {
            state.insert_booking(Booking::requested(
                *id,
                *instructor_id,
                *student_id,
                *date,
                *period,
                details.clone(),
            ));
            index.insert(*id, *instructor_id);
        }
        Event::BookingHeld { id, .. } => {
            if let Some(b) = state.booking_mut(*id) {
                b.status = BookingStatus::Tentative;
            }
        }
        Event::BookingConfirmed { id, time, .. } => {
            if let Some(b) = state.booking_mut(*id) {
                b.status = BookingStatus::Confirmed;
                b.confirmed_time = Some(*time);
            }
        }
        Event::BookingRejected { id, .. } => {
            if let Some(b) = state.booking_mut(*id) {
                b.status = BookingStatus::Rejected;
                b.confirmed_time = None;
            }
        }
        Event::BookingCancelled { id, .. } => {
            if let Some(b) = state.booking_mut(*id) {
                b.status = BookingStatus::Cancelled;
                b.confirmed_time = None;
            }
        }
        Event::BookingCompleted { id, .. } => {
            if let Some(b) = state.booking_mut(*id) {
                b.status = BookingStatus::Completed;
            }
        }
        // CalendarCreated is handled at the DashMap level, not here
        Event::CalendarCreated { .. } => {}
    }
}

/// The weekday-policy cascade: a bulk re-derivation, not an incremental
/// patch, so policy and per-date entries cannot drift apart.
fn apply_weekday_policy(
    state: &mut CalendarState,
    accepted: [bool; 7],
    from: NaiveDate,
    to: NaiveDate,
) {
    state.policy = WeekdayPolicy::from_accepted(accepted);

    // Re-derive every materialized date from `from` onward. Dates leaving
    // holiday status get their periods re-enabled; their visible status is
    // recomputed from the ledger on the next read, so existing bookings
    // still count. Manual enable/disable overrides on non-holiday dates
    // are preserved.
    let dates: Vec<NaiveDate> = state.days.range(from..).map(|(date, _)| *date).collect();
    for date in dates {
        let holiday = state.policy.is_holiday(date);
        if let Some(entry) = state.days.get_mut(&date) {
            if holiday {
                entry.holiday = true;
                entry.enabled = PerPeriod::uniform(false);
            } else if entry.holiday {
                entry.holiday = false;
                entry.enabled = PerPeriod::uniform(true);
            }
        }
    }

    // Materialize holiday closures across the applied range so the entry
    // map alone answers calendar reads for it.
    let mut date = from;
    while date <= to {
        if state.policy.is_holiday(date) {
            state.upsert_day(date);
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            calendars: DashMap::new(),
            wal_tx,
            notify,
            booking_index: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use
        // blocking_write here because this may run inside an async context.
        for event in &events {
            match event {
                Event::CalendarCreated { instructor_id } => {
                    let state = CalendarState::new(*instructor_id);
                    engine
                        .calendars
                        .insert(*instructor_id, Arc::new(RwLock::new(state)));
                }
                other => {
                    if let Some(entry) = engine.calendars.get(&other.instructor_id()) {
                        let shared = entry.value().clone();
                        let mut guard = shared.try_write().expect("replay: uncontended write");
                        apply_event(&mut guard, other, &engine.booking_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write an event to the WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn calendar(&self, instructor_id: &Ulid) -> Option<SharedCalendar> {
        self.calendars.get(instructor_id).map(|e| e.value().clone())
    }

    pub fn booking_instructor(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        instructor_id: Ulid,
        state: &mut CalendarState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_event(state, event, &self.booking_index);
        self.notify.send(instructor_id, event);
        Ok(())
    }

    /// Lookup booking → calendar, acquire the calendar's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<CalendarState>), EngineError> {
        let instructor_id = self
            .booking_instructor(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let shared = self
            .calendar(&instructor_id)
            .ok_or(EngineError::NotFound(instructor_id))?;
        let guard = shared.write_owned().await;
        Ok((instructor_id, guard))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
