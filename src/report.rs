//! Typed analysis requests and the JSON report they produce.
//!
//! A request is range-checked before any reference data is touched, then
//! checked against the loaded model (city, cluster) before any DP runs.
//! The report is deterministic: same data and request, same bytes.

use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::comparator::{DailyEarnings, ShiftWindow};
use crate::config::{EPOCH_MINUTES, MAX_SHIFT_HOURS};
use crate::error::{OptimizerError, Result};
use crate::model::{CityId, ClusterId, OptimizationResult, PathStep};
use crate::optimizer::Optimizer;
use crate::popularity::ClusterPopularity;

/// Which analysis to run. Hours and durations stay signed so out-of-range
/// values can be reported as given.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisMode {
    BestPositions { hour: i64, duration: i64, top_k: usize },
    CompareSchedules { windows: Vec<ShiftWindow>, cluster: Option<ClusterId> },
    SingleCluster { cluster: ClusterId, hour: i64, duration: i64 },
    Weekly { cluster: ClusterId, hour: i64, duration: i64 },
    Popularity { hour: i64 },
}

impl AnalysisMode {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisMode::BestPositions { .. } => "best_positions",
            AnalysisMode::CompareSchedules { .. } => "schedule_comparison",
            AnalysisMode::SingleCluster { .. } => "single_cluster",
            AnalysisMode::Weekly { .. } => "weekly_analysis",
            AnalysisMode::Popularity { .. } => "cluster_popularity",
        }
    }

    fn cluster(&self) -> Option<&ClusterId> {
        match self {
            AnalysisMode::CompareSchedules { cluster, .. } => cluster.as_ref(),
            AnalysisMode::SingleCluster { cluster, .. } | AnalysisMode::Weekly { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub city: CityId,
    pub date: NaiveDate,
    pub mode: AnalysisMode,
}

fn check_hour(hour: i64) -> Result<u32> {
    if (0..=23).contains(&hour) {
        Ok(hour as u32)
    } else {
        Err(OptimizerError::InvalidHour(hour))
    }
}

fn check_duration(duration: i64) -> Result<u32> {
    if (1..=MAX_SHIFT_HOURS as i64).contains(&duration) {
        Ok(duration as u32)
    } else {
        Err(OptimizerError::InvalidDuration(duration))
    }
}

impl AnalysisRequest {
    pub fn new(city: CityId, date: NaiveDate, mode: AnalysisMode) -> Self {
        AnalysisRequest { city, date, mode }
    }

    /// Parameter checks that need no reference data.
    pub fn validate_ranges(&self) -> Result<()> {
        match &self.mode {
            AnalysisMode::BestPositions { hour, duration, top_k } => {
                check_hour(*hour)?;
                check_duration(*duration)?;
                if *top_k == 0 {
                    return Err(OptimizerError::InvalidTopK(*top_k));
                }
            }
            AnalysisMode::CompareSchedules { windows, .. } => {
                for window in windows {
                    window.validate()?;
                }
            }
            AnalysisMode::SingleCluster { hour, duration, .. } | AnalysisMode::Weekly { hour, duration, .. } => {
                check_hour(*hour)?;
                check_duration(*duration)?;
            }
            AnalysisMode::Popularity { hour } => {
                check_hour(*hour)?;
            }
        }
        Ok(())
    }

    /// Full validation against the loaded model.
    pub fn validate(&self, optimizer: &Optimizer) -> Result<()> {
        self.validate_ranges()?;
        let data = optimizer.city(self.city)?;
        if let Some(cluster) = self.mode.cluster() {
            data.cluster_index(cluster)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestPositionEntry {
    pub rank: usize,
    pub cluster: ClusterId,
    pub lat: f64,
    pub lon: f64,
    pub earnings: f64,
    pub hourly_rate: f64,
    pub path: Vec<ClusterId>,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub start_hour: u32,
    pub duration: u32,
    pub cluster: ClusterId,
    pub total_earnings: f64,
    pub hourly_rate: f64,
    pub path_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleClusterEntry {
    pub cluster: ClusterId,
    pub start_hour: u32,
    pub duration: u32,
    pub total_earnings: f64,
    pub hourly_rate: f64,
    /// Earnings of never leaving the start cluster
    pub stay_earnings: f64,
    pub final_cluster: ClusterId,
    pub path: Vec<ClusterId>,
    pub steps: Vec<PathStep>,
}

/// Only the section of the requested mode is serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_positions: Option<Vec<BestPositionEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_comparison: Option<Vec<ScheduleEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_cluster: Option<SingleClusterEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_analysis: Option<Vec<DailyEarnings>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_popularity: Option<Vec<ClusterPopularity>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub city_id: CityId,
    pub date: String,
    pub analysis: Analysis,
    pub warnings: Vec<String>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut json = self.to_json()?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn hours(epochs: u32) -> u32 {
    epochs * EPOCH_MINUTES / 60
}

fn fallback_warnings(results: &[OptimizationResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.used_fallback_data)
        .map(|r| {
            format!(
                "Fallback demand rate used for the shift from {} at {:02}:00 ({}h)",
                r.start_cluster,
                r.start_hour,
                hours(r.duration)
            )
        })
        .collect()
}

/// Run one analysis end to end.
pub fn run(optimizer: &Optimizer, request: &AnalysisRequest) -> Result<AnalysisReport> {
    request.validate(optimizer)?;
    let city = request.city;
    let date = request.date;
    let data = optimizer.city(city)?;

    log::info!("Running {} for city {} on {}", request.mode.name(), city, date);

    let mut analysis = Analysis::default();
    let mut warnings = Vec::new();

    match &request.mode {
        AnalysisMode::BestPositions { hour, duration, top_k } => {
            let results = optimizer.find_best_starts(city, check_hour(*hour)?, check_duration(*duration)?, *top_k, date)?;
            warnings.extend(fallback_warnings(&results));
            let entries = results
                .iter()
                .enumerate()
                .map(|(i, r)| -> Result<BestPositionEntry> {
                    let cluster = data.cluster(data.cluster_index(&r.start_cluster)?);
                    Ok(BestPositionEntry {
                        rank: i + 1,
                        cluster: r.start_cluster.clone(),
                        lat: cluster.lat,
                        lon: cluster.lon,
                        earnings: r.total_earnings,
                        hourly_rate: r.hourly_rate,
                        path: r.cluster_sequence(),
                        steps: r.path.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            analysis.best_positions = Some(entries);
        }
        AnalysisMode::CompareSchedules { windows, cluster } => {
            let results = optimizer.compare_schedules(city, windows, cluster.as_ref(), date)?;
            warnings.extend(fallback_warnings(&results));
            analysis.schedule_comparison = Some(
                results
                    .iter()
                    .map(|r| ScheduleEntry {
                        start_hour: r.start_hour,
                        duration: hours(r.duration),
                        cluster: r.start_cluster.clone(),
                        total_earnings: r.total_earnings,
                        hourly_rate: r.hourly_rate,
                        path_preview: r.path_preview(),
                    })
                    .collect(),
            );
        }
        AnalysisMode::SingleCluster { cluster, hour, duration } => {
            let (hour, duration) = (check_hour(*hour)?, check_duration(*duration)?);
            let engine = optimizer.engine(city)?;
            let epochs = duration * 60 / EPOCH_MINUTES;
            let result = engine.solve(cluster, hour, epochs, date)?;
            let stay_earnings = engine.stay_earnings(cluster, hour, epochs, date)?;
            warnings.extend(fallback_warnings(std::slice::from_ref(&result)));
            analysis.single_cluster = Some(SingleClusterEntry {
                cluster: cluster.clone(),
                start_hour: hour,
                duration,
                total_earnings: result.total_earnings,
                hourly_rate: result.hourly_rate,
                stay_earnings,
                final_cluster: result.final_cluster().clone(),
                path: result.cluster_sequence(),
                steps: result.path,
            });
        }
        AnalysisMode::Weekly { cluster, hour, duration } => {
            let week = optimizer.weekly_analysis(city, cluster, check_hour(*hour)?, check_duration(*duration)?, date)?;
            for day in week.iter().filter(|d| d.used_fallback_data) {
                warnings.push(format!(
                    "Fallback demand rate used for the shift from {} on {} ({})",
                    cluster, day.date, day.day_of_week
                ));
            }
            analysis.weekly_analysis = Some(week);
        }
        AnalysisMode::Popularity { hour } => {
            let rows = optimizer.cluster_popularity(city, check_hour(*hour)?, date)?;
            if rows.iter().all(|r| r.outgoing_trips == 0 && r.incoming_trips == 0) {
                warnings.push(format!("No trips observed in city {} at {:02}:00", city, hour));
            }
            for row in rows.iter().filter(|r| r.used_fallback_data) {
                warnings.push(format!(
                    "Fallback demand rate used for cluster {} at {:02}:00",
                    row.cluster, hour
                ));
            }
            analysis.cluster_popularity = Some(rows);
        }
    }

    for warning in &warnings {
        log::warn!("{}", warning);
    }

    Ok(AnalysisReport {
        city_id: city,
        date: date.format("%Y-%m-%d").to_string(),
        analysis,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::demand::{CityData, DemandModel, TravelCost};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 16).unwrap()
    }

    fn optimizer() -> Optimizer {
        let city = CityData::builder(CityId(1))
            .cluster("c_1_1", 12.9, 77.5)
            .cluster("c_1_2", 12.8, 77.6)
            .flat_rate("c_1_1", 5.0)
            .flat_rate("c_1_2", 15.0)
            .travel("c_1_1", "c_1_2", None, TravelCost::new(10.0, 0.0))
            .flow("c_1_1", "c_1_2", 8, 4)
            .build()
            .unwrap();
        let sparse = CityData::builder(CityId(2))
            .cluster("c_2_1", 0.0, 0.0)
            .fallback_rate(2.0)
            .build()
            .unwrap();
        Optimizer::new(DemandModel::new(vec![city, sparse]), OptimizerConfig::default())
    }

    fn request(city: u32, mode: AnalysisMode) -> AnalysisRequest {
        AnalysisRequest::new(CityId(city), date(), mode)
    }

    #[test]
    fn test_ranges_checked_before_data() {
        let opt = optimizer();
        let bad_hour = request(9, AnalysisMode::BestPositions { hour: -1, duration: 4, top_k: 3 });
        assert!(matches!(run(&opt, &bad_hour), Err(OptimizerError::InvalidHour(-1))));

        let bad_duration = request(1, AnalysisMode::SingleCluster { cluster: "c_1_1".into(), hour: 8, duration: 0 });
        assert!(matches!(bad_duration.validate_ranges(), Err(OptimizerError::InvalidDuration(0))));

        let unknown_city = request(9, AnalysisMode::Popularity { hour: 8 });
        assert!(unknown_city.validate_ranges().is_ok());
        assert!(matches!(run(&opt, &unknown_city), Err(OptimizerError::UnknownCity { .. })));

        let unknown_cluster = request(1, AnalysisMode::Weekly { cluster: "c_9_9".into(), hour: 8, duration: 4 });
        assert!(matches!(run(&opt, &unknown_cluster), Err(OptimizerError::UnknownCluster { .. })));
    }

    #[test]
    fn test_best_positions_report() {
        let opt = optimizer();
        let report = run(&opt, &request(1, AnalysisMode::BestPositions { hour: 8, duration: 2, top_k: 5 })).unwrap();
        let best = report.analysis.best_positions.as_ref().unwrap();
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].rank, 1);
        assert_eq!(best[0].cluster.as_str(), "c_1_2");
        assert!((best[0].earnings - 30.0).abs() < 1e-10);
        assert_eq!(best[0].lat, 12.8);
        assert_eq!(best[0].path.len(), best[0].steps.len());
        // c_1_1 relocates first (0) then earns 15
        assert!((best[1].earnings - 15.0).abs() < 1e-10);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_only_requested_section_serialized() {
        let opt = optimizer();
        let report = run(&opt, &request(1, AnalysisMode::Popularity { hour: 8 })).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let analysis = value["analysis"].as_object().unwrap();
        assert_eq!(analysis.len(), 1);
        assert!(analysis.contains_key("cluster_popularity"));
        assert_eq!(value["city_id"], 1);
        assert_eq!(value["date"], "2023-01-16");
    }

    #[test]
    fn test_empty_comparison_is_empty_list() {
        let opt = optimizer();
        let report = run(&opt, &request(1, AnalysisMode::CompareSchedules { windows: vec![], cluster: None })).unwrap();
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["analysis"]["schedule_comparison"], serde_json::json!([]));
    }

    #[test]
    fn test_single_cluster_against_stay() {
        let opt = optimizer();
        let mode = AnalysisMode::SingleCluster { cluster: "c_1_1".into(), hour: 8, duration: 3 };
        let report = run(&opt, &request(1, mode)).unwrap();
        let entry = report.analysis.single_cluster.unwrap();
        assert!((entry.stay_earnings - 15.0).abs() < 1e-10);
        assert!((entry.total_earnings - 30.0).abs() < 1e-10);
        assert_eq!(entry.final_cluster.as_str(), "c_1_2");
    }

    #[test]
    fn test_fallback_is_reported() {
        let opt = optimizer();
        let mode = AnalysisMode::SingleCluster { cluster: "c_2_1".into(), hour: 8, duration: 2 };
        let report = run(&opt, &request(2, mode)).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!((report.analysis.single_cluster.unwrap().total_earnings - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_fallback_reported_for_weekly_and_popularity() {
        let opt = optimizer();
        let weekly = AnalysisMode::Weekly { cluster: "c_2_1".into(), hour: 8, duration: 2 };
        let report = run(&opt, &request(2, weekly)).unwrap();
        assert_eq!(report.warnings.len(), 7);
        assert!(report.analysis.weekly_analysis.unwrap().iter().all(|d| d.used_fallback_data));

        let report = run(&opt, &request(2, AnalysisMode::Popularity { hour: 8 })).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("c_2_1")));

        let report = run(&opt, &request(1, AnalysisMode::Popularity { hour: 8 })).unwrap();
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_json_is_deterministic() {
        let opt = optimizer();
        let req = request(1, AnalysisMode::CompareSchedules { windows: ShiftWindow::default_candidates(), cluster: None });
        let first = run(&opt, &req).unwrap().to_json().unwrap();
        let second = run(&opt, &req).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }
}
