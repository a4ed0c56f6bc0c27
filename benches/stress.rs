use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, Local, NaiveDate, NaiveTime};
use ulid::Ulid;

use slotbook::model::{LessonDetails, Transmission};
use slotbook::notify::NotifyHub;
use slotbook::{Engine, Period};

const REQUESTS: usize = 2_000;
const AVAILABILITY_READS: usize = 1_000;
const BOOKABLE_DAYS: u64 = 14;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
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

struct Calendar {
    instructor: Ulid,
    capacity: u32,
}

async fn setup(engine: &Engine, today: NaiveDate) -> Vec<Calendar> {
    let capacities = [1, 1, 1, 1, 1, 5, 5, 5, 10, 10];
    let mut calendars = Vec::new();

    for &capacity in &capacities {
        let instructor = Ulid::new();
        engine.create_calendar(instructor).await.expect("create calendar");
        for offset in 1..=BOOKABLE_DAYS {
            let date = today + Days::new(offset);
            for period in Period::ALL {
                engine
                    .set_capacity(instructor, date, period, capacity)
                    .await
                    .expect("set capacity");
            }
        }
        calendars.push(Calendar { instructor, capacity });
    }

    let slots: u64 = calendars.len() as u64 * BOOKABLE_DAYS * Period::ALL.len() as u64;
    let seats: u64 = calendars
        .iter()
        .map(|c| u64::from(c.capacity) * BOOKABLE_DAYS * Period::ALL.len() as u64)
        .sum();
    println!("  created {} calendars, {slots} slots, {seats} seats", calendars.len());
    calendars
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join("slotbook_bench");
    std::fs::create_dir_all(&dir).expect("bench data dir");
    let wal_path = dir.join(format!("stress_{}.wal", Ulid::new()));

    let engine = Arc::new(Engine::new(wal_path.clone(), Arc::new(NotifyHub::new())).expect("open engine"));
    let today = Local::now().date_naive();

    println!("setup:");
    let calendars = setup(&engine, today).await;

    // Phase 1: booking requests, round-robin over calendars/dates/periods.
    let mut request_latencies = Vec::with_capacity(REQUESTS);
    let mut bookings = Vec::with_capacity(REQUESTS);
    let phase_start = Instant::now();
    for i in 0..REQUESTS {
        let calendar = &calendars[i % calendars.len()];
        let date = today + Days::new((i as u64 % BOOKABLE_DAYS) + 1);
        let period = Period::ALL[i % Period::ALL.len()];

        let start = Instant::now();
        let result = engine
            .request_booking(Ulid::new(), calendar.instructor, date, period, details())
            .await;
        request_latencies.push(start.elapsed());
        if let Ok(booking) = result {
            bookings.push(booking.id);
        }
    }
    let request_secs = phase_start.elapsed().as_secs_f64();

    println!("requests:");
    print_latency("request_booking", &mut request_latencies);
    println!(
        "    accepted={}, throughput={:.0}/s",
        bookings.len(),
        bookings.len() as f64 / request_secs
    );

    // Phase 2: the instructors confirm until each slot's hard cap refuses.
    let mut confirm_latencies = Vec::with_capacity(bookings.len());
    let mut confirmed = 0usize;
    let mut refused = 0usize;
    let time = NaiveTime::from_hms_opt(9, 0, 0).expect("valid time");
    for &id in &bookings {
        let start = Instant::now();
        match engine.confirm_with_time(id, time).await {
            Ok(_) => confirmed += 1,
            Err(_) => refused += 1,
        }
        confirm_latencies.push(start.elapsed());
    }

    println!("confirmations:");
    print_latency("confirm_with_time", &mut confirm_latencies);
    println!("    confirmed={confirmed}, refused at capacity={refused}");

    // Phase 3: calendar reads over the whole bookable window.
    let mut read_latencies = Vec::with_capacity(AVAILABILITY_READS);
    let to = today + Days::new(BOOKABLE_DAYS);
    for i in 0..AVAILABILITY_READS {
        let calendar = &calendars[i % calendars.len()];
        let start = Instant::now();
        engine
            .availability(calendar.instructor, today, to)
            .await
            .expect("availability");
        read_latencies.push(start.elapsed());
    }

    println!("reads:");
    print_latency("availability", &mut read_latencies);

    let _ = std::fs::remove_file(&wal_path);
}
