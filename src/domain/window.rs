//! Reporting windows for ticket searches.

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// One day's reporting window.
///
/// A window runs from `start_hour` on one calendar day to one second
/// before `start_hour` on the next, so consecutive windows tile the
/// timeline without overlap. Both bounds are inclusive in helpdesk
/// search queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// Window for the day `days_ago` calendar days before today.
    pub fn days_back(days_ago: u32, start_hour: u32) -> Self {
        Self::days_back_from(Utc::now(), days_ago, start_hour)
    }

    /// Same as [`days_back`](Self::days_back) but anchored to an
    /// explicit clock reading. Only the date of `now` matters: runs at
    /// 01:00 and 23:00 on the same day produce the same window.
    pub fn days_back_from(now: DateTime<Utc>, days_ago: u32, start_hour: u32) -> Self {
        let day = now.date_naive() - Duration::days(days_ago as i64);
        let start = day.and_time(NaiveTime::MIN).and_utc() + Duration::hours(start_hour as i64);
        let end = start + Duration::seconds(86_399);
        Self { start, end }
    }
}
