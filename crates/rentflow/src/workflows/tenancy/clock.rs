use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Source of "now" for the engines so transitions can be replayed at fixed instants.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for demos and tests. The guarded value is a plain timestamp, so a
/// poisoned lock still holds a usable reading.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Noon UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self::new(noon(date))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.reading() = now;
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.set(noon(date));
    }

    pub fn advance(&self, by: Duration) {
        *self.reading() += by;
    }

    fn reading(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.reading()
    }
}

fn noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN))
        .and_utc()
}
