//! Demand / earnings model.
//!
//! Static reference data per city: the cluster set, the expected earnings per
//! epoch of working in a cluster during a given hour, and the directed travel
//! costs between clusters. Everything here is immutable once built.
//!
//! Hours passed to lookups are taken modulo 24, so a caller can describe a
//! window that crosses midnight (22 -> 2) as the plain sequence 22, 23, 24, 25.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, Result};
use crate::model::{CityId, Cluster, ClusterId, DayType};

/// Demand statistics for one (cluster, hour, day type) slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandProfile {
    /// Trips observed starting in the slot
    pub trips: u32,
    /// Mean fare of those trips
    pub avg_fare: f64,
    /// Smoothed demand, trips per epoch per observed day
    pub intensity: f64,
    /// Expected earnings per epoch
    pub rate: f64,
}

impl DemandProfile {
    /// Profile carrying only an earnings rate.
    pub fn with_rate(rate: f64) -> Self {
        DemandProfile { trips: 0, avg_fare: rate, intensity: 1.0, rate }
    }
}

/// Expected travel between two clusters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelCost {
    pub travel_minutes: f64,
    /// Earnings forgone / cost incurred by relocating
    pub opportunity_cost: f64,
}

impl TravelCost {
    pub fn new(travel_minutes: f64, opportunity_cost: f64) -> Self {
        TravelCost { travel_minutes, opportunity_cost }
    }
}

/// Outcome of a rate lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DemandLookup {
    Observed(f64),
    /// No profile exists for the slot; the city's fallback rate was used
    Fallback(f64),
}

impl DemandLookup {
    pub fn value(self) -> f64 {
        match self {
            DemandLookup::Observed(v) | DemandLookup::Fallback(v) => v,
        }
    }

    pub fn is_fallback(self) -> bool {
        matches!(self, DemandLookup::Fallback(_))
    }
}

#[derive(Debug, Clone, Default)]
struct TravelTable {
    hourly: BTreeMap<u32, TravelCost>,
    overall: Option<TravelCost>,
}

impl TravelTable {
    fn at(&self, hour: u32) -> Option<TravelCost> {
        self.hourly.get(&hour).copied().or(self.overall)
    }
}

/// Reduce any hour (possibly past midnight or negative) to 0..=23.
#[inline]
pub fn normalize_hour(hour: i64) -> u32 {
    hour.rem_euclid(24) as u32
}

/// Reference data of one city
#[derive(Debug, Clone)]
pub struct CityData {
    pub id: CityId,
    clusters: Vec<Cluster>,
    index: HashMap<ClusterId, usize>,
    /// `None` day type is the all-days aggregate
    profiles: HashMap<(usize, u32, Option<DayType>), DemandProfile>,
    travel: HashMap<(usize, usize), TravelTable>,
    /// Trip counts (origin, destination, hour)
    flows: HashMap<(usize, usize, u32), u32>,
    fallback_rate: f64,
}

impl CityData {
    pub fn builder(id: CityId) -> CityDataBuilder {
        CityDataBuilder::new(id)
    }

    /// Clusters sorted by id
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster(&self, idx: usize) -> &Cluster {
        &self.clusters[idx]
    }

    pub fn cluster_index(&self, id: &ClusterId) -> Result<usize> {
        self.index.get(id).copied().ok_or_else(|| OptimizerError::UnknownCluster {
            city: self.id,
            cluster: id.clone(),
        })
    }

    /// Expected earnings for one epoch in cluster `idx` starting at `hour`.
    ///
    /// Day-type specific profile first, then the all-days aggregate, then the
    /// city fallback (flagged).
    pub fn rate_at(&self, idx: usize, hour: i64, day: DayType) -> DemandLookup {
        let h = normalize_hour(hour);
        self.profiles
            .get(&(idx, h, Some(day)))
            .or_else(|| self.profiles.get(&(idx, h, None)))
            .map(|p| DemandLookup::Observed(p.rate.max(0.0)))
            .unwrap_or(DemandLookup::Fallback(self.fallback_rate))
    }

    pub fn profile(&self, idx: usize, hour: i64, day: Option<DayType>) -> Option<&DemandProfile> {
        self.profiles.get(&(idx, normalize_hour(hour), day))
    }

    /// Travel cost from `origin` to `destination` for a departure at `hour`.
    /// Falls back to the all-hours mean; `None` if the pair was never observed.
    pub fn travel_cost(&self, origin: usize, destination: usize, hour: i64) -> Option<TravelCost> {
        self.travel
            .get(&(origin, destination))
            .and_then(|t| t.at(normalize_hour(hour)))
    }

    /// Destinations with a travel record from `origin`, sorted by cluster index.
    pub fn destinations(&self, origin: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .travel
            .keys()
            .filter(|(o, d)| *o == origin && *d != origin)
            .map(|&(_, d)| d)
            .collect();
        out.sort_unstable();
        out
    }

    /// Trips from `origin` to `destination` starting at `hour`.
    pub fn flow(&self, origin: usize, destination: usize, hour: i64) -> u32 {
        self.flows
            .get(&(origin, destination, normalize_hour(hour)))
            .copied()
            .unwrap_or(0)
    }
}

/// Incremental construction of a [`CityData`]
#[derive(Debug, Clone)]
pub struct CityDataBuilder {
    id: CityId,
    clusters: Vec<Cluster>,
    profiles: Vec<(ClusterId, u32, Option<DayType>, DemandProfile)>,
    travel: Vec<(ClusterId, ClusterId, Option<u32>, TravelCost)>,
    flows: Vec<(ClusterId, ClusterId, u32, u32)>,
    fallback_rate: f64,
}

impl CityDataBuilder {
    pub fn new(id: CityId) -> Self {
        CityDataBuilder {
            id,
            clusters: Vec::new(),
            profiles: Vec::new(),
            travel: Vec::new(),
            flows: Vec::new(),
            fallback_rate: 0.0,
        }
    }

    pub fn cluster(mut self, id: impl Into<ClusterId>, lat: f64, lon: f64) -> Self {
        self.clusters.push(Cluster::new(id, self.id, lat, lon));
        self
    }

    /// All-days earnings rate for one hour
    pub fn rate(self, cluster: impl Into<ClusterId>, hour: u32, rate: f64) -> Self {
        self.profile(cluster, hour, None, DemandProfile::with_rate(rate))
    }

    pub fn rate_for_day(self, cluster: impl Into<ClusterId>, hour: u32, day: DayType, rate: f64) -> Self {
        self.profile(cluster, hour, Some(day), DemandProfile::with_rate(rate))
    }

    /// Same all-days rate for every hour of the day
    pub fn flat_rate(mut self, cluster: impl Into<ClusterId>, rate: f64) -> Self {
        let cluster = cluster.into();
        for hour in 0..24 {
            self = self.rate(cluster.clone(), hour, rate);
        }
        self
    }

    pub fn profile(
        mut self,
        cluster: impl Into<ClusterId>,
        hour: u32,
        day: Option<DayType>,
        profile: DemandProfile,
    ) -> Self {
        self.profiles.push((cluster.into(), hour, day, profile));
        self
    }

    /// Directed travel cost; `hour == None` sets the all-hours value.
    pub fn travel(
        mut self,
        origin: impl Into<ClusterId>,
        destination: impl Into<ClusterId>,
        hour: Option<u32>,
        cost: TravelCost,
    ) -> Self {
        self.travel.push((origin.into(), destination.into(), hour, cost));
        self
    }

    pub fn flow(
        mut self,
        origin: impl Into<ClusterId>,
        destination: impl Into<ClusterId>,
        hour: u32,
        trips: u32,
    ) -> Self {
        self.flows.push((origin.into(), destination.into(), hour, trips));
        self
    }

    pub fn fallback_rate(mut self, rate: f64) -> Self {
        self.fallback_rate = rate;
        self
    }

    pub fn build(self) -> Result<CityData> {
        let city = self.id;
        let mut clusters = self.clusters;
        clusters.sort_by(|a, b| a.id.cmp(&b.id));
        clusters.dedup_by(|a, b| a.id == b.id);

        let index: HashMap<ClusterId, usize> = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        let lookup = |id: &ClusterId| -> Result<usize> {
            index.get(id).copied().ok_or_else(|| OptimizerError::MalformedData {
                line: None,
                message: format!("cluster {} referenced but not defined for city {}", id, city),
            })
        };
        let check_hour = |hour: u32| -> Result<u32> {
            if hour < 24 {
                Ok(hour)
            } else {
                Err(OptimizerError::MalformedData {
                    line: None,
                    message: format!("hour {} out of range for city {}", hour, city),
                })
            }
        };

        let mut profiles = HashMap::with_capacity(self.profiles.len());
        for (cluster, hour, day, profile) in &self.profiles {
            if !(profile.rate.is_finite() && profile.rate >= 0.0) {
                return Err(OptimizerError::MalformedData {
                    line: None,
                    message: format!("negative or non-finite rate for cluster {} at hour {}", cluster, hour),
                });
            }
            profiles.insert((lookup(cluster)?, check_hour(*hour)?, *day), *profile);
        }

        let mut travel: HashMap<(usize, usize), TravelTable> = HashMap::new();
        for (origin, destination, hour, cost) in &self.travel {
            let table = travel.entry((lookup(origin)?, lookup(destination)?)).or_default();
            match hour {
                Some(h) => {
                    table.hourly.insert(check_hour(*h)?, *cost);
                }
                None => table.overall = Some(*cost),
            }
        }

        let mut flows = HashMap::new();
        for (origin, destination, hour, trips) in &self.flows {
            *flows
                .entry((lookup(origin)?, lookup(destination)?, check_hour(*hour)?))
                .or_insert(0) += trips;
        }

        Ok(CityData {
            id: city,
            clusters,
            index,
            profiles,
            travel,
            flows,
            fallback_rate: self.fallback_rate.max(0.0),
        })
    }
}

/// Reference data for every supported city
#[derive(Debug, Clone, Default)]
pub struct DemandModel {
    cities: BTreeMap<CityId, CityData>,
}

impl DemandModel {
    pub fn new(cities: impl IntoIterator<Item = CityData>) -> Self {
        DemandModel {
            cities: cities.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    pub fn city(&self, city: CityId) -> Result<&CityData> {
        self.cities.get(&city).ok_or_else(|| OptimizerError::UnknownCity {
            city,
            available: self.city_ids(),
        })
    }

    pub fn city_ids(&self) -> Vec<CityId> {
        self.cities.keys().copied().collect()
    }

    /// Expected earnings per epoch for working in `cluster` during `hour`.
    pub fn expected_rate(&self, city: CityId, cluster: &ClusterId, hour: i64, day: DayType) -> Result<f64> {
        let data = self.city(city)?;
        let idx = data.cluster_index(cluster)?;
        Ok(data.rate_at(idx, hour, day).value())
    }
}
