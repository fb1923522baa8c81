//! Half-open interval arithmetic for availability windows and sessions.
//!
//! All session intervals are `[start, end)`: two intervals that merely touch
//! at a boundary do not overlap, so back-to-back bookings are legal.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};

/// Half-open overlap test. `a_end == b_start` is not an overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Containment test for recurring windows: compares time-of-day only, the
/// calendar date of the stored window is irrelevant.
pub fn within_recurring_window(
    window_start: NaiveTime,
    window_end: NaiveTime,
    req_start: NaiveTime,
    req_end: NaiveTime,
) -> bool {
    window_start <= req_start && req_end <= window_end
}

/// Containment test for one-off windows, over absolute timestamps.
pub fn within_fixed_window(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    req_start: DateTime<Utc>,
    req_end: DateTime<Utc>,
) -> bool {
    window_start <= req_start && req_end <= window_end
}

/// Maps a calendar date onto the application's day-of-week convention:
/// 0 = Monday .. 6 = Sunday. Kept as a named function so the convention has
/// exactly one home.
pub fn day_of_week_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Window { start, end }
    }
}

/// Remainders of a window after a booked slice is carved out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub left: Option<Window>,
    pub right: Option<Window>,
}

impl Split {
    pub fn is_consumed(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Carves `booked` out of `window`, assuming `booked` is contained in
/// `window`. Returns zero, one, or two non-empty remainders; the union of
/// the remainders and the booked slice is exactly the original window.
pub fn split(window: Window, booked: Window) -> Split {
    let left = (window.start < booked.start).then(|| Window::new(window.start, booked.start));
    let right = (booked.end < window.end).then(|| Window::new(booked.end, window.end));
    Split { left, right }
}
