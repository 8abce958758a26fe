//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the telemetry core."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Timelike};

/// Wall-clock source. Forecast marking and sample timestamps read time through
/// this trait so tests can pin the current hour.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local time including its UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Hour of day (0-23) in the clock's local offset.
    fn current_hour(&self) -> u32 {
        self.now().hour()
    }
}

/// Clock handle shared between the stream driver and its sources.
pub type SharedClock = Arc<dyn Clock>;

/// Host wall clock in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        DateTime::<FixedOffset>::from(Local::now())
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<FixedOffset>,
}

impl FixedClock {
    pub fn new(instant: DateTime<FixedOffset>) -> Self {
        Self { instant }
    }

    /// Clock pinned to `hour:00` UTC on a fixed weekday (Monday 2024-06-03).
    /// Hours beyond 23 wrap.
    pub fn at_hour(hour: u32) -> Self {
        let naive = NaiveDate::from_ymd_opt(2024, 6, 3)
            .and_then(|date| date.and_hms_opt(hour % 24, 0, 0))
            .unwrap_or_default();
        Self {
            instant: naive.and_utc().fixed_offset(),
        }
    }

    pub fn shared(self) -> SharedClock {
        Arc::new(self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.instant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_pinned_hour() {
        let clock = FixedClock::at_hour(14);
        assert_eq!(clock.current_hour(), 14);
        assert_eq!(clock.now().minute(), 0);
    }

    #[test]
    fn fixed_clock_wraps_hours() {
        assert_eq!(FixedClock::at_hour(25).current_hour(), 1);
    }

    #[test]
    fn system_clock_hour_is_in_range() {
        assert!(SystemClock.current_hour() < 24);
    }
}
