use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::engine::Engine;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that moves confirmed bookings into `completed` once
/// their lesson date has passed.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        sweep(&engine, crate::engine::today_local()).await;
    }
}

/// One completion sweep. Every transition goes through the normal
/// mutation path so it is WAL-logged and published like any other.
pub async fn sweep(engine: &Engine, today: NaiveDate) {
    let past = engine.collect_past_confirmed(today);
    for (booking_id, _instructor_id) in past {
        match engine.complete(booking_id).await {
            Ok(_) => {
                info!("completed past lesson {booking_id}");
                metrics::counter!(crate::observability::LESSONS_COMPLETED_TOTAL).increment(1);
            }
            Err(e) => {
                // May have transitioned concurrently — that's fine
                debug!("sweep skip {booking_id}: {e}");
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::{Days, NaiveTime};
    use ulid::Ulid;

    use crate::model::{BookingStatus, LessonDetails, Period, Transmission};
    use crate::notify::NotifyHub;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn details() -> LessonDetails {
        LessonDetails {
            course: "B-license standard".into(),
            price: 5500,
            meeting_point: None,
            notes: None,
            transmission: Transmission::Manual,
            instructor_vehicle: true,
            pickup: false,
        }
    }

    #[tokio::test]
    async fn sweep_completes_past_confirmed_lessons() {
        let path = test_wal_path("sweep_completes.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let instructor = Ulid::new();
        engine.create_calendar(instructor).await.unwrap();

        let today = chrono::Local::now().date_naive();
        let confirmed = engine
            .request_booking(Ulid::new(), instructor, today, Period::Morning, details())
            .await
            .unwrap();
        engine
            .confirm_with_time(confirmed.id, NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .await
            .unwrap();
        let pending = engine
            .request_booking(Ulid::new(), instructor, today, Period::Afternoon, details())
            .await
            .unwrap();

        // From tomorrow's point of view, today's confirmed lesson is past.
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap();
        sweep(&engine, tomorrow).await;

        let swept = engine.get_booking(confirmed.id).await.unwrap();
        assert_eq!(swept.status, BookingStatus::Completed);
        assert!(swept.confirmed_time.is_some());

        // Unconfirmed requests are not the reaper's business.
        let untouched = engine.get_booking(pending.id).await.unwrap();
        assert_eq!(untouched.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn sweep_leaves_future_lessons_alone() {
        let path = test_wal_path("sweep_future.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let instructor = Ulid::new();
        engine.create_calendar(instructor).await.unwrap();

        let today = chrono::Local::now().date_naive();
        let next_week = today.checked_add_days(Days::new(7)).unwrap();
        let booking = engine
            .request_booking(Ulid::new(), instructor, next_week, Period::Morning, details())
            .await
            .unwrap();
        engine
            .confirm_with_time(booking.id, NaiveTime::from_hms_opt(10, 0, 0).unwrap())
            .await
            .unwrap();

        sweep(&engine, today).await;

        let unchanged = engine.get_booking(booking.id).await.unwrap();
        assert_eq!(unchanged.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let path = test_wal_path("sweep_idempotent.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path, notify).unwrap());

        let instructor = Ulid::new();
        engine.create_calendar(instructor).await.unwrap();

        let today = chrono::Local::now().date_naive();
        let booking = engine
            .request_booking(Ulid::new(), instructor, today, Period::Evening, details())
            .await
            .unwrap();
        engine
            .confirm_with_time(booking.id, NaiveTime::from_hms_opt(18, 30, 0).unwrap())
            .await
            .unwrap();

        let tomorrow = today.checked_add_days(Days::new(1)).unwrap();
        sweep(&engine, tomorrow).await;
        sweep(&engine, tomorrow).await;

        let swept = engine.get_booking(booking.id).await.unwrap();
        assert_eq!(swept.status, BookingStatus::Completed);
    }
}
