/*
* Usage accounting types
* ----------------------
* UsageDelta:    what one tick contributes, already in accumulation units
* UsageTotals:   the running totals of a session, frozen once it ends
* ResourceUsage: totals converted to the hourly units used in reports
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tick's contribution to the running totals.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct UsageDelta {
    pub cpu_core_seconds: f64,
    pub ram_gb_seconds: f64,
    pub storage_gb_hours: f64,
    pub bandwidth_gb: f64,
    pub estimated_kwh: f64,
}

impl UsageDelta {
    /// Drops negative and non-finite components so totals can only grow.
    pub fn sanitized(self) -> Self {
        fn clean(v: f64) -> f64 {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                0.0
            }
        }

        Self {
            cpu_core_seconds: clean(self.cpu_core_seconds),
            ram_gb_seconds: clean(self.ram_gb_seconds),
            storage_gb_hours: clean(self.storage_gb_hours),
            bandwidth_gb: clean(self.bandwidth_gb),
            estimated_kwh: clean(self.estimated_kwh),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UsageTotals {
    pub cpu_core_seconds: f64,
    pub ram_gb_seconds: f64,
    pub storage_gb_hours: f64,
    pub bandwidth_gb: f64,
    pub estimated_kwh: f64,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub samples: u64,
}

impl UsageTotals {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            cpu_core_seconds: 0.0,
            ram_gb_seconds: 0.0,
            storage_gb_hours: 0.0,
            bandwidth_gb: 0.0,
            estimated_kwh: 0.0,
            start_timestamp: start,
            end_timestamp: None,
            samples: 0,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.end_timestamp.is_some()
    }

    /// Folds one tick into the totals. Returns false (and changes nothing)
    /// once the totals are frozen.
    pub fn apply(&mut self, delta: &UsageDelta) -> bool {
        if self.is_frozen() {
            return false;
        }

        let delta = delta.sanitized();
        self.cpu_core_seconds += delta.cpu_core_seconds;
        self.ram_gb_seconds += delta.ram_gb_seconds;
        self.storage_gb_hours += delta.storage_gb_hours;
        self.bandwidth_gb += delta.bandwidth_gb;
        self.estimated_kwh += delta.estimated_kwh;
        self.samples += 1;
        true
    }

    pub fn freeze(&mut self, at: DateTime<Utc>) {
        if self.end_timestamp.is_none() {
            self.end_timestamp = Some(at);
        }
    }

    /// Session length in hours, measured to `end_timestamp` or to `now` while live.
    pub fn duration_hours(&self, now: DateTime<Utc>) -> f64 {
        let end = self.end_timestamp.unwrap_or(now);
        let millis = (end - self.start_timestamp).num_milliseconds().max(0);
        millis as f64 / 3_600_000.0
    }

    pub fn resource_usage(&self) -> ResourceUsage {
        ResourceUsage {
            cpu_core_hours: self.cpu_core_seconds / 3600.0,
            ram_gb_hours: self.ram_gb_seconds / 3600.0,
            storage_gb_hours: self.storage_gb_hours,
            bandwidth_gb: self.bandwidth_gb,
            estimated_kwh: self.estimated_kwh,
        }
    }
}

impl Default for UsageTotals {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_core_hours: f64,
    pub ram_gb_hours: f64,
    pub storage_gb_hours: f64,
    pub bandwidth_gb: f64,
    pub estimated_kwh: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn delta() -> UsageDelta {
        UsageDelta {
            cpu_core_seconds: 5.0,
            ram_gb_seconds: 2.0,
            storage_gb_hours: 0.001,
            bandwidth_gb: 0.002,
            estimated_kwh: 0.0001,
        }
    }

    #[test]
    fn apply_accumulates_every_field() {
        let mut totals = UsageTotals::default();
        assert!(totals.apply(&delta()));
        assert!(totals.apply(&delta()));

        assert_eq!(totals.cpu_core_seconds, 10.0);
        assert_eq!(totals.ram_gb_seconds, 4.0);
        assert!((totals.storage_gb_hours - 0.002).abs() < 1e-12);
        assert!((totals.bandwidth_gb - 0.004).abs() < 1e-12);
        assert!((totals.estimated_kwh - 0.0002).abs() < 1e-12);
        assert_eq!(totals.samples, 2);
    }

    #[test]
    fn frozen_totals_ignore_new_ticks() {
        let mut totals = UsageTotals::default();
        totals.apply(&delta());
        totals.freeze(Utc::now());

        let before = totals.clone();
        assert!(!totals.apply(&delta()));
        assert_eq!(totals, before);
    }

    #[test]
    fn negative_and_nan_components_are_dropped() {
        let mut totals = UsageTotals::default();
        totals.apply(&UsageDelta {
            cpu_core_seconds: -3.0,
            ram_gb_seconds: f64::NAN,
            storage_gb_hours: f64::INFINITY,
            bandwidth_gb: 1.0,
            estimated_kwh: 0.0,
        });

        assert_eq!(totals.cpu_core_seconds, 0.0);
        assert_eq!(totals.ram_gb_seconds, 0.0);
        assert_eq!(totals.storage_gb_hours, 0.0);
        assert_eq!(totals.bandwidth_gb, 1.0);
    }

    #[test]
    fn duration_uses_end_timestamp_once_frozen() {
        let start = Utc::now();
        let mut totals = UsageTotals::new(start);
        totals.freeze(start + Duration::minutes(90));

        let much_later = start + Duration::hours(10);
        assert!((totals.duration_hours(much_later) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn resource_usage_converts_seconds_to_hours() {
        let mut totals = UsageTotals::default();
        totals.cpu_core_seconds = 7200.0;
        totals.ram_gb_seconds = 1800.0;

        let usage = totals.resource_usage();
        assert_eq!(usage.cpu_core_hours, 2.0);
        assert_eq!(usage.ram_gb_hours, 0.5);
    }
}
