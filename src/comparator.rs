//! Schedule comparator: which shift window is the most profitable overall.
//!
//! Also hosts the weekly analysis, the same window evaluated on seven
//! consecutive days.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MAX_SHIFT_HOURS;
use crate::error::{OptimizerError, Result};
use crate::model::{duration_hours, epochs_for_hours, CityId, ClusterId, OptimizationResult};
use crate::optimizer::Optimizer;

/// A candidate shift: start hour and length in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShiftWindow {
    pub start_hour: u32,
    pub duration: u32,
}

impl ShiftWindow {
    pub fn new(start_hour: u32, duration: u32) -> Self {
        ShiftWindow { start_hour, duration }
    }

    /// Early, day, late and night shifts of 8h plus shorter/longer morning shifts.
    pub fn default_candidates() -> Vec<ShiftWindow> {
        [(6, 8), (8, 8), (10, 8), (14, 8), (18, 8), (22, 8), (8, 4), (8, 6), (8, 10), (8, 12)]
            .into_iter()
            .map(|(h, d)| ShiftWindow::new(h, d))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 23 {
            return Err(OptimizerError::InvalidHour(self.start_hour as i64));
        }
        if self.duration == 0 || self.duration > MAX_SHIFT_HOURS {
            return Err(OptimizerError::InvalidDuration(self.duration as i64));
        }
        Ok(())
    }
}

impl fmt::Display for ShiftWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_hour, self.duration)
    }
}

/// Parses `HOUR:DURATION`, e.g. `22:8`.
impl FromStr for ShiftWindow {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || OptimizerError::InvalidWindow(format!("'{}' (expected HOUR:DURATION)", s));
        let (hour, duration) = s.trim().split_once(':').ok_or_else(invalid)?;
        let start_hour = hour.trim().parse().map_err(|_| invalid())?;
        let duration = duration.trim().parse().map_err(|_| invalid())?;
        Ok(ShiftWindow { start_hour, duration })
    }
}

/// Descending by hourly rate; earlier start then shorter shift on ties.
pub fn by_hourly_rate(a: &OptimizationResult, b: &OptimizationResult) -> Ordering {
    OrderedFloat(b.hourly_rate)
        .cmp(&OrderedFloat(a.hourly_rate))
        .then_with(|| a.start_hour.cmp(&b.start_hour))
        .then_with(|| a.duration.cmp(&b.duration))
        .then_with(|| a.start_cluster.cmp(&b.start_cluster))
}

/// Earnings of one day of the weekly analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEarnings {
    pub date: String,
    pub day_of_week: String,
    pub total_earnings: f64,
    pub hourly_rate: f64,
    pub used_fallback_data: bool,
}

impl Optimizer {
    /// Evaluate every window and rank them by hourly rate.
    ///
    /// With `fixed_start` every window starts there; otherwise each window
    /// uses the best starting cluster for that window.
    pub fn compare_schedules(
        &self,
        city: CityId,
        windows: &[ShiftWindow],
        fixed_start: Option<&ClusterId>,
        date: NaiveDate,
    ) -> Result<Vec<OptimizationResult>> {
        for window in windows {
            window.validate()?;
        }
        let data = self.city(city)?;
        if let Some(cluster) = fixed_start {
            data.cluster_index(cluster)?;
        }

        let mut results = windows
            .par_iter()
            .map(|w| -> Result<Option<OptimizationResult>> {
                match fixed_start {
                    Some(cluster) => self.solve(city, cluster, w.start_hour, w.duration, date).map(Some),
                    None => Ok(self
                        .find_best_starts(city, w.start_hour, w.duration, 1, date)?
                        .into_iter()
                        .next()),
                }
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        results.sort_by(by_hourly_rate);

        if let Some(best) = results.first() {
            log::info!(
                "City {}: best of {} windows starts {:02}:00 for {}h at {:.2}/h",
                city,
                windows.len(),
                best.start_hour,
                duration_hours(best.duration),
                best.hourly_rate
            );
        }
        Ok(results)
    }

    /// The same shift from `cluster` on the seven days starting at `week_start`.
    pub fn weekly_analysis(
        &self,
        city: CityId,
        cluster: &ClusterId,
        start_hour: u32,
        duration: u32,
        week_start: NaiveDate,
    ) -> Result<Vec<DailyEarnings>> {
        ShiftWindow::new(start_hour, duration).validate()?;
        let engine = self.engine(city)?;
        let epochs = epochs_for_hours(duration);

        (0..7u64)
            .map(|offset| {
                let date = week_start.checked_add_days(Days::new(offset)).ok_or_else(|| {
                    OptimizerError::InvalidWindow(format!("date overflow after {}", week_start))
                })?;
                let result = engine.solve(cluster, start_hour, epochs, date)?;
                Ok(DailyEarnings {
                    date: date.format("%Y-%m-%d").to_string(),
                    day_of_week: date.format("%A").to_string(),
                    total_earnings: result.total_earnings,
                    hourly_rate: result.hourly_rate,
                    used_fallback_data: result.used_fallback_data,
                })
            })
            .collect()
    }
}
