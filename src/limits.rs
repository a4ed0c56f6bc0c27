//! Engine-wide bounds. Every growth path checks one of these and fails
//! with `EngineError::LimitExceeded` instead of growing without bound.

/// Max instructor calendars per ledger.
pub const MAX_CALENDARS: usize = 10_000;

/// Max booking records (any status) on a single calendar.
pub const MAX_BOOKINGS_PER_CALENDAR: usize = 50_000;

/// Max per-period lesson capacity an instructor may configure.
pub const MAX_SLOT_CAPACITY: u32 = 16;

/// Max length of a course reference string.
pub const MAX_COURSE_LEN: usize = 128;

/// Max length of free-text booking fields (meeting point, notes).
pub const MAX_TEXT_LEN: usize = 1024;

/// Widest date range an availability query may cover, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;

/// WAL appends between automatic compactions.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
