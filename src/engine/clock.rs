use chrono::{Local, NaiveDate, Utc};

use crate::model::Ms;

/// Source of "today" for the booking window and of record timestamps.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now_ms(&self) -> Ms;
}

/// Office-local calendar date, wall-clock timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_ms(&self) -> Ms {
        Utc::now().timestamp_millis()
    }
}

/// A clock pinned to one date; timestamps are midnight UTC of that date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }

    fn now_ms(&self) -> Ms {
        self.0
            .and_hms_opt(0, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp_millis())
    }
}
