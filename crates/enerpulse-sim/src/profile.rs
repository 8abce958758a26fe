//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Synthetic facility load profile."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::f64::consts::PI;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};

const SPIKE_THRESHOLD_FACTOR: f64 = 1.8;
const SEASONAL_AMPLITUDE: f64 = 0.2;
const SEASONAL_PEAK_DAY: f64 = 15.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// Facility consumption model: business hours run hot, nights and weekends
/// run cold, and HVAC load peaks in mid-winter and mid-summer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProfile {
    base_load_kw: f64,
}

impl LoadProfile {
    pub fn new(base_load_kw: f64) -> Self {
        Self {
            base_load_kw: base_load_kw.max(0.0),
        }
    }

    pub fn base_load_kw(&self) -> f64 {
        self.base_load_kw
    }

    /// Usage above this level is treated as a spike.
    pub fn spike_threshold_kw(&self) -> f64 {
        self.base_load_kw * SPIKE_THRESHOLD_FACTOR
    }

    pub fn hourly_factor(hour: u32) -> f64 {
        match hour % 24 {
            9..=17 => 1.5,
            18..=21 => 1.2,
            0..=5 => 0.6,
            _ => 1.0,
        }
    }

    /// Hourly factor blended linearly toward the next hour.
    pub fn smoothed_hourly_factor(fractional_hour: f64) -> f64 {
        let wrapped = fractional_hour.rem_euclid(24.0);
        let hour = wrapped.floor() as u32;
        let weight = wrapped - f64::from(hour);
        let current = Self::hourly_factor(hour);
        let next = Self::hourly_factor(hour + 1);
        current + (next - current) * weight
    }

    pub fn weekly_factor(weekday: Weekday) -> f64 {
        match weekday {
            Weekday::Sat | Weekday::Sun => 0.7,
            _ => 1.0,
        }
    }

    pub fn seasonal_factor(day_of_year: u32) -> f64 {
        1.0 + SEASONAL_AMPLITUDE
            * (2.0 * PI * (f64::from(day_of_year) - SEASONAL_PEAK_DAY) / DAYS_PER_YEAR).cos()
    }

    /// Expected consumption at `at` before noise.
    pub fn expected_load_kw<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> f64 {
        self.base_load_kw
            * Self::smoothed_hourly_factor(fractional_hour(at))
            * Self::weekly_factor(at.weekday())
            * Self::seasonal_factor(at.ordinal())
    }
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self::new(150.0)
    }
}

/// Hour of day including minutes and seconds, e.g. `13.5` at 13:30.
pub fn fractional_hour<Tz: TimeZone>(at: &DateTime<Tz>) -> f64 {
    f64::from(at.hour()) + f64::from(at.minute()) / 60.0 + f64::from(at.second()) / 3600.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
            .and_utc()
    }

    #[test]
    fn hourly_bands_match_business_day() {
        assert_eq!(LoadProfile::hourly_factor(3), 0.6);
        assert_eq!(LoadProfile::hourly_factor(7), 1.0);
        assert_eq!(LoadProfile::hourly_factor(12), 1.5);
        assert_eq!(LoadProfile::hourly_factor(19), 1.2);
        assert_eq!(LoadProfile::hourly_factor(23), 1.0);
    }

    #[test]
    fn smoothing_blends_adjacent_hours() {
        assert_eq!(LoadProfile::smoothed_hourly_factor(8.0), 1.0);
        assert!((LoadProfile::smoothed_hourly_factor(8.5) - 1.25).abs() < 1e-9);
        assert!((LoadProfile::smoothed_hourly_factor(23.5) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn weekends_and_seasons_scale_load() {
        let profile = LoadProfile::default();
        // 2024-01-15 is a Monday at the seasonal peak.
        let monday = at(2024, 1, 15, 12, 0);
        let saturday = at(2024, 1, 20, 12, 0);
        let weekday_load = profile.expected_load_kw(&monday);
        assert!((weekday_load - 150.0 * 1.5 * 1.2).abs() < 1e-9);
        let weekend_load = profile.expected_load_kw(&saturday);
        assert!(weekend_load < weekday_load * 0.71);
        assert!(LoadProfile::seasonal_factor(197) < 0.81);
    }

    #[test]
    fn spike_threshold_scales_with_base() {
        assert_eq!(LoadProfile::new(100.0).spike_threshold_kw(), 180.0);
        assert_eq!(LoadProfile::new(-5.0).base_load_kw(), 0.0);
    }
}
