//! Calendar windowing and navigation.
//!
//! Pure date arithmetic: no locking, no IO. Grids are Sunday-aligned.
//! Navigation is clamped to [the window containing today, today + horizon];
//! a refused step returns `None` and the caller disables the control —
//! never wraps, never substitutes a different date.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Navigation mode of a calendar view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Month,
    Week,
    TwoWeek,
}

/// How far into the future a view may navigate, in whole months from today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon {
    months: u32,
}

impl Horizon {
    /// Instructors configure availability up to 4 months out.
    pub const INSTRUCTOR: Horizon = Horizon { months: 4 };
    /// Students book up to 2 months out.
    pub const STUDENT: Horizon = Horizon { months: 2 };

    pub const fn months(self) -> u32 {
        self.months
    }

    pub fn end(self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_months(Months::new(self.months))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Whether a date is bookable/configurable relative to today.
    pub fn contains(self, today: NaiveDate, date: NaiveDate) -> bool {
        date >= today && date <= self.end(today)
    }
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_sunday()))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

/// First and last real date covered by the window anchored at `anchor`.
pub fn window_span(mode: ViewMode, anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
    match mode {
        ViewMode::Month => (month_start(anchor), month_end(anchor)),
        ViewMode::Week => {
            let start = week_start(anchor);
            (start, start + Days::new(6))
        }
        ViewMode::TwoWeek => {
            let start = week_start(anchor);
            (start, start + Days::new(13))
        }
    }
}

/// The cell sequence of a calendar view. Month grids carry leading `None`
/// blanks so the first day lands in its weekday column; week grids are
/// always dense.
pub fn window(mode: ViewMode, anchor: NaiveDate) -> Vec<Option<NaiveDate>> {
    match mode {
        ViewMode::Month => {
            let start = month_start(anchor);
            let lead = start.weekday().num_days_from_sunday() as usize;
            let mut cells: Vec<Option<NaiveDate>> = vec![None; lead];
            cells.extend(
                start
                    .iter_days()
                    .take(month_end(anchor).day() as usize)
                    .map(Some),
            );
            cells
        }
        ViewMode::Week => week_start(anchor).iter_days().take(7).map(Some).collect(),
        ViewMode::TwoWeek => week_start(anchor).iter_days().take(14).map(Some).collect(),
    }
}

/// Anchor of the next window, or `None` when the step would produce a
/// window extending past `today + horizon`.
pub fn next_anchor(
    mode: ViewMode,
    anchor: NaiveDate,
    today: NaiveDate,
    horizon: Horizon,
) -> Option<NaiveDate> {
    let candidate = match mode {
        ViewMode::Month => month_start(anchor).checked_add_months(Months::new(1))?,
        ViewMode::Week => week_start(anchor).checked_add_days(Days::new(7))?,
        ViewMode::TwoWeek => week_start(anchor).checked_add_days(Days::new(14))?,
    };
    let (_, end) = window_span(mode, candidate);
    (end <= horizon.end(today)).then_some(candidate)
}

/// Anchor of the previous window, or `None` when the step would leave the
/// window containing today (fully-past windows are unreachable).
pub fn prev_anchor(mode: ViewMode, anchor: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let candidate = match mode {
        ViewMode::Month => month_start(anchor).checked_sub_months(Months::new(1))?,
        ViewMode::Week => week_start(anchor).checked_sub_days(Days::new(7))?,
        ViewMode::TwoWeek => week_start(anchor).checked_sub_days(Days::new(14))?,
    };
    let floor = match mode {
        ViewMode::Month => month_start(today),
        ViewMode::Week | ViewMode::TwoWeek => week_start(today),
    };
    (candidate >= floor).then_some(candidate)
}
