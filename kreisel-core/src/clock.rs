//! Source of "today" for the date rules.

use std::sync::Mutex;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, Utc};

pub trait Clock: Send + Sync {
    /// Current calendar date in the lending desk's local time.
    fn today(&self) -> NaiveDate;

    /// Current instant, used for creation timestamps.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
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

    /// A clock standing at noon UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self::new(noon(date))
    }

    pub fn set_today(&self, date: NaiveDate) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = noon(date);
    }

    pub fn advance_days(&self, days: u64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + Days::new(days);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default())
        .and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_moves_only_when_advanced() {
        let start = NaiveDate::from_ymd_opt(2025, 2, 27).unwrap();
        let clock = FixedClock::on(start);
        assert_eq!(clock.today(), start);

        clock.advance_days(2);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        clock.set_today(start);
        assert_eq!(clock.today(), start);
    }
}
