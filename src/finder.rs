//! Best-position finder: which starting cluster pays most for a fixed window.

use std::cmp::Ordering;

use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::comparator::ShiftWindow;
use crate::error::{OptimizerError, Result};
use crate::model::{epochs_for_hours, CityId, OptimizationResult};
use crate::optimizer::Optimizer;

/// Descending by total earnings, ascending cluster id on ties.
pub fn by_earnings(a: &OptimizationResult, b: &OptimizationResult) -> Ordering {
    OrderedFloat(b.total_earnings)
        .cmp(&OrderedFloat(a.total_earnings))
        .then_with(|| a.start_cluster.cmp(&b.start_cluster))
}

impl Optimizer {
    /// Run the DP from every cluster of `city` and keep the `top_k` best.
    pub fn find_best_starts(
        &self,
        city: CityId,
        hour: u32,
        duration_hours: u32,
        top_k: usize,
        date: NaiveDate,
    ) -> Result<Vec<OptimizationResult>> {
        if top_k == 0 {
            return Err(OptimizerError::InvalidTopK(top_k));
        }
        ShiftWindow::new(hour, duration_hours).validate()?;
        let data = self.city(city)?;
        if data.num_clusters() == 0 {
            return Err(OptimizerError::EmptyResult(city));
        }

        let engine = self.engine(city)?;
        let epochs = epochs_for_hours(duration_hours);

        let mut results = data
            .clusters()
            .par_iter()
            .map(|cluster| engine.solve(&cluster.id, hour, epochs, date))
            .collect::<Result<Vec<_>>>()?;

        results.sort_by(by_earnings);
        results.truncate(top_k);

        log::debug!(
            "City {}: evaluated {} starting clusters for {:02}:00 + {}h, best {:?}",
            city,
            data.num_clusters(),
            hour,
            duration_hours,
            results.first().map(|r| r.start_cluster.as_str())
        );
        Ok(results)
    }
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
        let city = CityData::builder(CityId(5))
            .cluster("c_5_1", 0.0, 0.0)
            .cluster("c_5_2", 0.0, 0.0)
            .cluster("c_5_3", 0.0, 0.0)
            .cluster("c_5_4", 0.0, 0.0)
            .flat_rate("c_5_1", 5.0)
            .flat_rate("c_5_2", 9.0)
            .flat_rate("c_5_3", 9.0)
            .flat_rate("c_5_4", 1.0)
            .travel("c_5_4", "c_5_2", None, TravelCost::new(30.0, 1.0))
            .build()
            .unwrap();
        let empty = CityData::builder(CityId(6)).build().unwrap();
        Optimizer::new(DemandModel::new(vec![city, empty]), OptimizerConfig::default())
    }

    #[test]
    fn test_sorted_descending_with_id_tiebreak() {
        let opt = optimizer();
        let results = opt.find_best_starts(CityId(5), 8, 3, 10, date()).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.start_cluster.as_str()).collect();
        assert_eq!(ids, vec!["c_5_2", "c_5_3", "c_5_4", "c_5_1"]);
        for pair in results.windows(2) {
            assert!(pair[0].total_earnings >= pair[1].total_earnings);
        }
        // c_5_4 relocates: -1 + 9 + 9
        assert!((results[2].total_earnings - 17.0).abs() < 1e-10);
    }

    #[test]
    fn test_length_is_min_of_top_k_and_clusters() {
        let opt = optimizer();
        assert_eq!(opt.find_best_starts(CityId(5), 8, 3, 2, date()).unwrap().len(), 2);
        assert_eq!(opt.find_best_starts(CityId(5), 8, 3, 4, date()).unwrap().len(), 4);
        assert_eq!(opt.find_best_starts(CityId(5), 8, 3, 50, date()).unwrap().len(), 4);
    }

    #[test]
    fn test_errors() {
        let opt = optimizer();
        assert!(matches!(
            opt.find_best_starts(CityId(5), 8, 3, 0, date()),
            Err(OptimizerError::InvalidTopK(0))
        ));
        assert!(matches!(
            opt.find_best_starts(CityId(6), 8, 3, 5, date()),
            Err(OptimizerError::EmptyResult(_))
        ));
        assert!(matches!(
            opt.find_best_starts(CityId(5), 8, 0, 5, date()),
            Err(OptimizerError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_duration_above_a_day_rejected() {
        let opt = optimizer();
        assert!(matches!(
            opt.find_best_starts(CityId(5), 8, 25, 1, date()),
            Err(OptimizerError::InvalidDuration(25))
        ));
        assert!(matches!(
            opt.find_best_starts(CityId(5), 8, u32::MAX, 1, date()),
            Err(OptimizerError::InvalidDuration(d)) if d == u32::MAX as i64
        ));
        assert!(opt.find_best_starts(CityId(5), 8, 24, 1, date()).is_ok());
    }

    #[test]
    fn test_deterministic() {
        let opt = optimizer();
        let first = opt.find_best_starts(CityId(5), 22, 6, 3, date()).unwrap();
        let second = opt.find_best_starts(CityId(5), 22, 6, 3, date()).unwrap();
        assert_eq!(first, second);
    }
}
