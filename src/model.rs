//! Core domain types shared by the demand model, the DP engine and the
//! analysis drivers.

use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::EPOCH_MINUTES;

/// City identifier as used by the ride data (`city_id` column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(pub u32);

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cluster identifier, e.g. `c_3_2`. Lexicographic order is the tie-break order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        ClusterId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(s: &str) -> Self {
        ClusterId(s.to_string())
    }
}

impl From<String> for ClusterId {
    fn from(s: String) -> Self {
        ClusterId(s)
    }
}

/// A geographic zone of a city
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub city: CityId,
    /// Centroid latitude (display only)
    pub lat: f64,
    /// Centroid longitude (display only)
    pub lon: f64,
}

impl Cluster {
    pub fn new(id: impl Into<ClusterId>, city: CityId, lat: f64, lon: f64) -> Self {
        Cluster { id: id.into(), city, lat, lon }
    }
}

/// Day-of-week variation the demand model distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => DayType::Weekend,
            _ => DayType::Weekday,
        }
    }
}

/// What the driver does during one step of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Stay,
    Relocate,
}

/// One transition of an optimal path, in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// Cluster the driver is in when the step starts
    pub cluster: ClusterId,
    /// Wall-clock hour (0-23) at which the step starts
    pub hour: u32,
    /// Epochs consumed by the step
    pub epochs: u32,
    pub action: Action,
    /// Cluster the driver is in when the step ends
    pub destination: ClusterId,
    /// Net earnings of the step
    pub earnings: f64,
}

/// Result of one DP run from a single starting cluster and window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub city: CityId,
    pub start_cluster: ClusterId,
    pub start_hour: u32,
    /// Shift length in epochs; always the sum of `epochs` along `path`
    pub duration: u32,
    pub total_earnings: f64,
    pub hourly_rate: f64,
    pub path: Vec<PathStep>,
    /// True if any demand lookup along the way had to use the floor fallback
    pub used_fallback_data: bool,
}

impl OptimizationResult {
    pub fn new(
        city: CityId,
        start_cluster: ClusterId,
        start_hour: u32,
        path: Vec<PathStep>,
        used_fallback_data: bool,
    ) -> Self {
        let duration: u32 = path.iter().map(|s| s.epochs).sum();
        let total_earnings: f64 = path.iter().map(|s| s.earnings).sum();
        let hours = duration_hours(duration);
        let hourly_rate = if hours > 0.0 { total_earnings / hours } else { 0.0 };

        OptimizationResult {
            city,
            start_cluster,
            start_hour,
            duration,
            total_earnings,
            hourly_rate,
            path,
            used_fallback_data,
        }
    }

    /// Cluster ids the driver occupies at the start of each step.
    pub fn cluster_sequence(&self) -> Vec<ClusterId> {
        self.path.iter().map(|s| s.cluster.clone()).collect()
    }

    /// First three clusters of the path joined by arrows, `...` when longer.
    pub fn path_preview(&self) -> String {
        let ids: Vec<&str> = self.path.iter().take(3).map(|s| s.cluster.as_str()).collect();
        let mut preview = ids.join(" -> ");
        if self.path.len() > 3 {
            preview.push_str("...");
        }
        preview
    }

    /// Cluster the driver ends the shift in.
    pub fn final_cluster(&self) -> &ClusterId {
        self.path.last().map(|s| &s.destination).unwrap_or(&self.start_cluster)
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shift from {} at {:02}:00 (city {})", self.start_cluster, self.start_hour, self.city)?;
        writeln!(f, "  Duration: {} epochs", self.duration)?;
        writeln!(f, "  Total earnings: {:.2}", self.total_earnings)?;
        writeln!(f, "  Hourly rate: {:.2}", self.hourly_rate)?;
        if self.used_fallback_data {
            writeln!(f, "  Warning: fallback demand data used")?;
        }
        writeln!(f, "  Path: {}", self.path_preview())
    }
}

/// Convert an epoch count into hours.
pub fn duration_hours(epochs: u32) -> f64 {
    epochs as f64 * EPOCH_MINUTES as f64 / 60.0
}

/// Epochs in a shift of whole hours. Saturates instead of overflowing;
/// durations are range-checked before they get here.
pub fn epochs_for_hours(hours: u32) -> u32 {
    hours.saturating_mul(60) / EPOCH_MINUTES
}
