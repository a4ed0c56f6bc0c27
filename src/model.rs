use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Default lesson capacity for any (date, period) slot an instructor has
/// not configured explicitly.
pub const DEFAULT_CAPACITY: u32 = 2;

/// Coarse time-of-day bucket a calendar day is divided into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Morning,
    Afternoon,
    Evening,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Morning, Period::Afternoon, Period::Evening];

    pub fn label(self) -> &'static str {
        match self {
            Period::Morning => "morning",
            Period::Afternoon => "afternoon",
            Period::Evening => "evening",
        }
    }

    fn index(self) -> u8 {
        match self {
            Period::Morning => 0,
            Period::Afternoon => 1,
            Period::Evening => 2,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerPeriod<T> {
    pub morning: T,
    pub afternoon: T,
    pub evening: T,
}

impl<T> PerPeriod<T> {
    pub fn get(&self, period: Period) -> &T {
        match period {
            Period::Morning => &self.morning,
            Period::Afternoon => &self.afternoon,
            Period::Evening => &self.evening,
        }
    }

    pub fn get_mut(&mut self, period: Period) -> &mut T {
        match period {
            Period::Morning => &mut self.morning,
            Period::Afternoon => &mut self.afternoon,
            Period::Evening => &mut self.evening,
        }
    }

    pub fn set(&mut self, period: Period, value: T) {
        *self.get_mut(period) = value;
    }
}

impl<T: Clone> PerPeriod<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            morning: value.clone(),
            afternoon: value.clone(),
            evening: value,
        }
    }
}

/// Derived visibility of a slot. Never stored — always recomputed from
/// day settings plus the bookings sharing the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Tentative,
    Booked,
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SlotStatus::Available => "available",
            SlotStatus::Tentative => "tentative",
            SlotStatus::Booked => "booked",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Tentative,
    Confirmed,
    Completed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rejected
        )
    }

    /// Pending and tentative bookings are unconfirmed holds on a slot.
    pub fn is_hold(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Tentative)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Tentative => "tentative",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transmission {
    Manual,
    Automatic,
}

/// Course details a student attaches to a booking request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDetails {
    pub course: String,
    /// Price in minor currency units.
    pub price: u32,
    pub meeting_point: Option<String>,
    pub notes: Option<String>,
    pub transmission: Transmission,
    pub instructor_vehicle: bool,
    pub pickup: bool,
}

/// A booking occupies exactly one (date, period) slot for its lifetime.
/// `confirmed_time` is `Some` iff status is confirmed or completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub instructor_id: Ulid,
    pub student_id: Ulid,
    pub date: NaiveDate,
    pub period: Period,
    pub confirmed_time: Option<NaiveTime>,
    pub status: BookingStatus,
    pub details: LessonDetails,
}

impl Booking {
    /// A freshly requested booking: pending, no concrete time yet.
    pub fn requested(
        id: Ulid,
        instructor_id: Ulid,
        student_id: Ulid,
        date: NaiveDate,
        period: Period,
        details: LessonDetails,
    ) -> Self {
        Self {
            id,
            instructor_id,
            student_id,
            date,
            period,
            confirmed_time: None,
            status: BookingStatus::Pending,
            details,
        }
    }

    fn sort_key(&self) -> (NaiveDate, u8, Ulid) {
        (self.date, self.period.index(), self.id)
    }
}

/// Demand against a slot, split by booking status class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Demand {
    pub confirmed: u32,
    pub tentative: u32,
}

impl Demand {
    pub fn total(self) -> u32 {
        self.confirmed + self.tentative
    }
}

/// Weekdays an instructor accepts bookings on. Indexed Sunday-first to
/// match the calendar grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayPolicy {
    accepted: [bool; 7],
}

impl Default for WeekdayPolicy {
    fn default() -> Self {
        Self { accepted: [true; 7] }
    }
}

impl WeekdayPolicy {
    pub fn from_weekdays(weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        let mut accepted = [false; 7];
        for day in weekdays {
            accepted[day.num_days_from_sunday() as usize] = true;
        }
        Self { accepted }
    }

    pub fn from_accepted(accepted: [bool; 7]) -> Self {
        Self { accepted }
    }

    pub fn accepted(&self) -> [bool; 7] {
        self.accepted
    }

    pub fn accepts(&self, weekday: Weekday) -> bool {
        self.accepted[weekday.num_days_from_sunday() as usize]
    }

    /// A date whose weekday is excluded is a holiday: closed for all
    /// periods regardless of capacity.
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        !self.accepts(date.weekday())
    }
}

/// Capacity-store entry for one calendar day. Absent dates derive this
/// via `derived` — defaulting lives here, never at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySettings {
    pub capacity: PerPeriod<u32>,
    pub enabled: PerPeriod<bool>,
    pub holiday: bool,
}

impl DaySettings {
    pub fn open_default() -> Self {
        Self {
            capacity: PerPeriod::uniform(DEFAULT_CAPACITY),
            enabled: PerPeriod::uniform(true),
            holiday: false,
        }
    }

    pub fn holiday_closed() -> Self {
        Self {
            capacity: PerPeriod::uniform(DEFAULT_CAPACITY),
            enabled: PerPeriod::uniform(false),
            holiday: true,
        }
    }

    /// Defaults for an unconfigured date under the given weekday policy.
    pub fn derived(date: NaiveDate, policy: &WeekdayPolicy) -> Self {
        if policy.is_holiday(date) {
            Self::holiday_closed()
        } else {
            Self::open_default()
        }
    }
}

/// One instructor's full calendar: weekday policy, sparse day settings,
/// and the booking ledger, sorted by (date, period, id).
#[derive(Debug, Clone)]
pub struct CalendarState {
    pub instructor_id: Ulid,
    pub policy: WeekdayPolicy,
    pub days: BTreeMap<NaiveDate, DaySettings>,
    pub bookings: Vec<Booking>,
}

impl CalendarState {
    pub fn new(instructor_id: Ulid) -> Self {
        Self {
            instructor_id,
            policy: WeekdayPolicy::default(),
            days: BTreeMap::new(),
            bookings: Vec::new(),
        }
    }

    /// Settings for a date, materialized or derived from policy defaults.
    pub fn day_settings(&self, date: NaiveDate) -> DaySettings {
        match self.days.get(&date) {
            Some(settings) => *settings,
            None => DaySettings::derived(date, &self.policy),
        }
    }

    /// Materialize the entry for a date so it can be mutated in place.
    pub fn upsert_day(&mut self, date: NaiveDate) -> &mut DaySettings {
        let derived = DaySettings::derived(date, &self.policy);
        self.days.entry(date).or_insert(derived)
    }

    /// Insert maintaining sort order by (date, period, id).
    pub fn insert_booking(&mut self, booking: Booking) {
        let key = booking.sort_key();
        let pos = self
            .bookings
            .binary_search_by(|b| b.sort_key().cmp(&key))
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings occupying one slot. Binary search skips earlier dates.
    pub fn slot_bookings(
        &self,
        date: NaiveDate,
        period: Period,
    ) -> impl Iterator<Item = &Booking> {
        let start = self.bookings.partition_point(|b| b.date < date);
        self.bookings[start..]
            .iter()
            .take_while(move |b| b.date == date)
            .filter(move |b| b.period == period)
    }

    /// Count demand for a slot. Confirmed bookings and unconfirmed holds
    /// are tallied separately; terminal bookings count nothing.
    pub fn demand(&self, date: NaiveDate, period: Period) -> Demand {
        let mut demand = Demand::default();
        for booking in self.slot_bookings(date, period) {
            match booking.status {
                BookingStatus::Confirmed => demand.confirmed += 1,
                BookingStatus::Pending | BookingStatus::Tentative => demand.tentative += 1,
                BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Rejected => {}
            }
        }
        demand
    }
}

/// The event types — flat, no nesting beyond the details struct. This is
/// the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CalendarCreated {
        instructor_id: Ulid,
    },
    CapacitySet {
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
        capacity: u32,
    },
    PeriodEnabledSet {
        instructor_id: Ulid,
        date: NaiveDate,
        period: Period,
        enabled: bool,
    },
    /// Carries the exact date range the cascade covered so replay is
    /// deterministic regardless of when it runs.
    WeekdayPolicySet {
        instructor_id: Ulid,
        accepted: [bool; 7],
        from: NaiveDate,
        to: NaiveDate,
    },
    BookingRequested {
        id: Ulid,
        instructor_id: Ulid,
        student_id: Ulid,
        date: NaiveDate,
        period: Period,
        details: LessonDetails,
    },
    BookingHeld {
        id: Ulid,
        instructor_id: Ulid,
    },
    BookingConfirmed {
        id: Ulid,
        instructor_id: Ulid,
        time: NaiveTime,
    },
    BookingRejected {
        id: Ulid,
        instructor_id: Ulid,
    },
    BookingCancelled {
        id: Ulid,
        instructor_id: Ulid,
    },
    BookingCompleted {
        id: Ulid,
        instructor_id: Ulid,
    },
}

impl Event {
    /// Which calendar the event routes to during replay and notify.
    pub fn instructor_id(&self) -> Ulid {
        match self {
            Event::CalendarCreated { instructor_id }
            | Event::CapacitySet { instructor_id, .. }
            | Event::PeriodEnabledSet { instructor_id, .. }
            | Event::WeekdayPolicySet { instructor_id, .. }
            | Event::BookingRequested { instructor_id, .. }
            | Event::BookingHeld { instructor_id, .. }
            | Event::BookingConfirmed { instructor_id, .. }
            | Event::BookingRejected { instructor_id, .. }
            | Event::BookingCancelled { instructor_id, .. }
            | Event::BookingCompleted { instructor_id, .. } => *instructor_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// Per-date availability as rendered in calendar views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub holiday: bool,
    pub periods: PerPeriod<SlotStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
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

    fn booking_on(date: NaiveDate, period: Period, status: BookingStatus) -> Booking {
        let mut b = Booking::requested(
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            date,
            period,
            details(),
        );
        b.status = status;
        b
    }

    #[test]
    fn per_period_get_set() {
        let mut caps = PerPeriod::uniform(2u32);
        assert_eq!(*caps.get(Period::Evening), 2);
        caps.set(Period::Afternoon, 5);
        assert_eq!(*caps.get(Period::Afternoon), 5);
        assert_eq!(*caps.get(Period::Morning), 2);
    }

    #[test]
    fn weekday_policy_default_accepts_all() {
        let policy = WeekdayPolicy::default();
        assert!(!policy.is_holiday(date(2025, 1, 10))); // a Friday
        assert!(!policy.is_holiday(date(2025, 1, 12))); // a Sunday
    }

    #[test]
    fn weekday_policy_excluded_day_is_holiday() {
        let policy = WeekdayPolicy::from_weekdays([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]);
        assert!(policy.accepts(Weekday::Mon));
        assert!(!policy.accepts(Weekday::Sun));
        assert!(policy.is_holiday(date(2025, 1, 11))); // Saturday
        assert!(!policy.is_holiday(date(2025, 1, 13))); // Monday
    }

    #[test]
    fn day_settings_derived_from_policy() {
        let policy = WeekdayPolicy::from_weekdays([Weekday::Mon]);
        let open = DaySettings::derived(date(2025, 1, 13), &policy); // Monday
        assert!(!open.holiday);
        assert!(*open.enabled.get(Period::Morning));
        assert_eq!(*open.capacity.get(Period::Morning), DEFAULT_CAPACITY);

        let closed = DaySettings::derived(date(2025, 1, 14), &policy); // Tuesday
        assert!(closed.holiday);
        assert!(!*closed.enabled.get(Period::Evening));
    }

    #[test]
    fn booking_insert_keeps_date_order() {
        let mut state = CalendarState::new(Ulid::new());
        state.insert_booking(booking_on(date(2025, 3, 10), Period::Morning, BookingStatus::Pending));
        state.insert_booking(booking_on(date(2025, 3, 8), Period::Evening, BookingStatus::Pending));
        state.insert_booking(booking_on(date(2025, 3, 9), Period::Morning, BookingStatus::Pending));
        let dates: Vec<NaiveDate> = state.bookings.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(2025, 3, 8), date(2025, 3, 9), date(2025, 3, 10)]);
    }

    #[test]
    fn slot_bookings_filters_date_and_period() {
        let mut state = CalendarState::new(Ulid::new());
        state.insert_booking(booking_on(date(2025, 3, 9), Period::Morning, BookingStatus::Pending));
        state.insert_booking(booking_on(date(2025, 3, 9), Period::Afternoon, BookingStatus::Pending));
        state.insert_booking(booking_on(date(2025, 3, 10), Period::Morning, BookingStatus::Pending));

        let hits: Vec<_> = state.slot_bookings(date(2025, 3, 9), Period::Morning).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].period, Period::Morning);
    }

    #[test]
    fn demand_ignores_terminal_bookings() {
        let d = date(2025, 3, 9);
        let mut state = CalendarState::new(Ulid::new());
        state.insert_booking(booking_on(d, Period::Morning, BookingStatus::Confirmed));
        state.insert_booking(booking_on(d, Period::Morning, BookingStatus::Pending));
        state.insert_booking(booking_on(d, Period::Morning, BookingStatus::Tentative));
        state.insert_booking(booking_on(d, Period::Morning, BookingStatus::Cancelled));
        state.insert_booking(booking_on(d, Period::Morning, BookingStatus::Rejected));

        let demand = state.demand(d, Period::Morning);
        assert_eq!(demand.confirmed, 1);
        assert_eq!(demand.tentative, 2);
        assert_eq!(demand.total(), 3);
    }

    #[test]
    fn day_settings_defaults_when_absent() {
        let state = CalendarState::new(Ulid::new());
        let settings = state.day_settings(date(2025, 6, 1));
        assert_eq!(*settings.capacity.get(Period::Morning), DEFAULT_CAPACITY);
        assert!(*settings.enabled.get(Period::Afternoon));
        assert!(!settings.holiday);
    }

    #[test]
    fn upsert_day_derives_holiday_under_policy() {
        let mut state = CalendarState::new(Ulid::new());
        state.policy = WeekdayPolicy::from_weekdays([Weekday::Mon]);
        let entry = state.upsert_day(date(2025, 1, 14)); // Tuesday
        assert!(entry.holiday);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingRequested {
            id: Ulid::new(),
            instructor_id: Ulid::new(),
            student_id: Ulid::new(),
            date: date(2025, 4, 2),
            period: Period::Afternoon,
            details: details(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn booking_json_shape_is_lowercase() {
        let b = booking_on(date(2025, 5, 1), Period::Morning, BookingStatus::Pending);
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["period"], "morning");
        assert!(json["confirmed_time"].is_null());
    }
}
