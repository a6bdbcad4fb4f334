//! Cluster popularity at a given hour: trip flows in and out of each cluster
//! next to its modeled earning rate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::model::{duration_hours, CityId, ClusterId, DayType};
use crate::optimizer::Optimizer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPopularity {
    pub cluster: ClusterId,
    pub incoming_trips: u32,
    pub outgoing_trips: u32,
    /// Outgoing minus incoming
    pub net_flow: i64,
    pub earning_rate_per_hour: f64,
    /// The rate is the city fallback, not observed demand
    pub used_fallback_data: bool,
}

impl Optimizer {
    /// Popularity of every cluster of `city` at `hour`, busiest origins first.
    pub fn cluster_popularity(&self, city: CityId, hour: u32, date: NaiveDate) -> Result<Vec<ClusterPopularity>> {
        if hour > 23 {
            return Err(OptimizerError::InvalidHour(hour as i64));
        }
        let data = self.city(city)?;
        let n = data.num_clusters();
        let day = DayType::of(date);
        let per_hour = duration_hours(1);

        let mut rows: Vec<ClusterPopularity> = (0..n)
            .map(|c| {
                let lookup = data.rate_at(c, hour as i64, day);
                let outgoing: u32 = (0..n).map(|d| data.flow(c, d, hour as i64)).sum();
                let incoming: u32 = (0..n).map(|o| data.flow(o, c, hour as i64)).sum();
                ClusterPopularity {
                    cluster: data.cluster(c).id.clone(),
                    incoming_trips: incoming,
                    outgoing_trips: outgoing,
                    net_flow: outgoing as i64 - incoming as i64,
                    earning_rate_per_hour: lookup.value() / per_hour,
                    used_fallback_data: lookup.is_fallback(),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.outgoing_trips
                .cmp(&a.outgoing_trips)
                .then_with(|| a.cluster.cmp(&b.cluster))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::demand::{CityData, DemandModel};

    #[test]
    fn test_flows_and_ordering() {
        let city = CityData::builder(CityId(2))
            .cluster("a", 0.0, 0.0)
            .cluster("b", 0.0, 0.0)
            .cluster("c", 0.0, 0.0)
            .flat_rate("b", 7.5)
            .flow("a", "b", 9, 3)
            .flow("b", "a", 9, 5)
            .flow("b", "c", 9, 1)
            .flow("c", "c", 9, 2)
            .flow("a", "b", 10, 40)
            .build()
            .unwrap();
        let opt = Optimizer::new(DemandModel::new(vec![city]), OptimizerConfig::default());
        let date = NaiveDate::from_ymd_opt(2023, 1, 16).unwrap();

        let rows = opt.cluster_popularity(CityId(2), 9, date).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.cluster.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        assert_eq!(rows[0].outgoing_trips, 6);
        assert_eq!(rows[0].incoming_trips, 3);
        assert_eq!(rows[0].net_flow, 3);
        assert_eq!(rows[0].earning_rate_per_hour, 7.5);
        assert!(!rows[0].used_fallback_data);
        assert!(rows[1].used_fallback_data);

        assert_eq!(rows[1].net_flow, -2);
        assert_eq!(rows[2].incoming_trips, 3);
    }

    #[test]
    fn test_invalid_hour() {
        let opt = Optimizer::new(DemandModel::default(), OptimizerConfig::default());
        let date = NaiveDate::from_ymd_opt(2023, 1, 16).unwrap();
        assert!(matches!(
            opt.cluster_popularity(CityId(1), 24, date),
            Err(OptimizerError::InvalidHour(24))
        ));
    }
}
