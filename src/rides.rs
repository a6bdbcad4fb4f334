//! Loading of the ride-trip reference data.
//!
//! The input is a CSV of completed rides, one row per trip, already tagged
//! with pickup/drop-off clusters. Rides are aggregated per city into the
//! [`DemandModel`]: cluster centroids, smoothed hourly demand per day type,
//! and directed mean travel times between clusters.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::{OptimizerConfig, EPOCH_MINUTES};
use crate::demand::{CityData, DemandModel, DemandProfile, TravelCost};
use crate::error::{OptimizerError, Result};
use crate::model::{CityId, DayType};

const TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// One row of the ride-trip CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRecord {
    pub ride_id: String,
    pub city_id: u32,
    pub pickup_cluster: String,
    pub dropoff_cluster: String,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub drop_lat: f64,
    pub drop_lon: f64,
    pub start_time: String,
    pub duration_mins: f64,
    pub fare_amount: f64,
}

impl RideRecord {
    pub fn start(&self) -> Result<NaiveDateTime> {
        let raw = self.start_time.trim();
        TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .ok_or_else(|| OptimizerError::MalformedData {
                line: None,
                message: format!("ride {}: invalid start_time '{}'", self.ride_id, raw),
            })
    }

    fn validate(&self) -> Result<()> {
        if !self.fare_amount.is_finite() || self.fare_amount < 0.0 {
            return Err(OptimizerError::MalformedData {
                line: None,
                message: format!("ride {}: invalid fare {}", self.ride_id, self.fare_amount),
            });
        }
        if !self.duration_mins.is_finite() || self.duration_mins < 0.0 {
            return Err(OptimizerError::MalformedData {
                line: None,
                message: format!("ride {}: invalid duration {}", self.ride_id, self.duration_mins),
            });
        }
        Ok(())
    }
}

/// Read ride records from any CSV source with a header row.
pub fn read_rides<R: Read>(reader: R) -> Result<Vec<RideRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rides = Vec::new();
    for record in csv_reader.deserialize() {
        let ride: RideRecord = record?;
        ride.validate()?;
        rides.push(ride);
    }
    Ok(rides)
}

/// Read ride records from a CSV file
pub fn load_rides<P: AsRef<Path>>(path: P) -> Result<Vec<RideRecord>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        OptimizerError::MissingReferenceData(format!("cannot open {}: {}", path.display(), e))
    })?;
    read_rides(file)
}

/// Load and aggregate the ride CSV into a demand model.
pub fn load_model<P: AsRef<Path>>(path: P, config: &OptimizerConfig) -> Result<DemandModel> {
    let rides = load_rides(&path)?;
    if rides.is_empty() {
        return Err(OptimizerError::MissingReferenceData(format!(
            "{} contains no rides",
            path.as_ref().display()
        )));
    }
    build_model(&rides, config)
}

/// Aggregate rides into per-city reference data.
pub fn build_model(rides: &[RideRecord], config: &OptimizerConfig) -> Result<DemandModel> {
    let mut by_city: BTreeMap<u32, Vec<&RideRecord>> = BTreeMap::new();
    for ride in rides {
        by_city.entry(ride.city_id).or_default().push(ride);
    }

    let mut cities = Vec::with_capacity(by_city.len());
    for (city_id, city_rides) in by_city {
        let city = build_city(CityId(city_id), &city_rides, config)?;
        log::debug!(
            "City {}: {} rides, {} clusters",
            city_id,
            city_rides.len(),
            city.num_clusters()
        );
        cities.push(city);
    }

    log::info!("Loaded {} rides for {} cities", rides.len(), cities.len());
    Ok(DemandModel::new(cities))
}

#[derive(Default)]
struct Coordinates {
    lats: Vec<f64>,
    lons: Vec<f64>,
}

fn build_city(city: CityId, rides: &[&RideRecord], config: &OptimizerConfig) -> Result<CityData> {
    let epoch_share = EPOCH_MINUTES as f64 / 60.0;

    let mut coords: BTreeMap<&str, Coordinates> = BTreeMap::new();
    let mut dates: HashMap<DayType, BTreeSet<NaiveDate>> = HashMap::new();
    let mut all_dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut slot_fares: HashMap<(&str, u32, DayType), Vec<f64>> = HashMap::new();
    let mut cluster_fares: HashMap<&str, Vec<f64>> = HashMap::new();
    let mut city_fares: Vec<f64> = Vec::with_capacity(rides.len());
    let mut hourly_durations: BTreeMap<(&str, &str, u32), Vec<f64>> = BTreeMap::new();
    let mut durations: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    let mut flows: BTreeMap<(&str, &str, u32), u32> = BTreeMap::new();

    for ride in rides {
        let start = ride.start()?;
        let date = start.date();
        let hour = start.hour();
        let day = DayType::of(date);
        let pickup = ride.pickup_cluster.as_str();
        let dropoff = ride.dropoff_cluster.as_str();

        let p = coords.entry(pickup).or_default();
        p.lats.push(ride.pickup_lat);
        p.lons.push(ride.pickup_lon);
        let d = coords.entry(dropoff).or_default();
        d.lats.push(ride.drop_lat);
        d.lons.push(ride.drop_lon);

        dates.entry(day).or_default().insert(date);
        all_dates.insert(date);

        slot_fares.entry((pickup, hour, day)).or_default().push(ride.fare_amount);
        cluster_fares.entry(pickup).or_default().push(ride.fare_amount);
        city_fares.push(ride.fare_amount);

        hourly_durations
            .entry((pickup, dropoff, hour))
            .or_default()
            .push(ride.duration_mins);
        durations.entry((pickup, dropoff)).or_default().push(ride.duration_mins);
        *flows.entry((pickup, dropoff, hour)).or_insert(0) += 1;
    }

    let city_mean_fare = city_fares.iter().mean();
    let mut builder = CityData::builder(city)
        .fallback_rate(config.lambda_floor * city_mean_fare * epoch_share);

    for (&cluster, c) in &coords {
        builder = builder.cluster(cluster, c.lats.iter().mean(), c.lons.iter().mean());
    }

    let profile = |trips: &[f64], days: usize, fallback_fare: f64| -> DemandProfile {
        let count = trips.len();
        let avg_fare = if count > 0 { trips.iter().mean() } else { fallback_fare };
        let smoothed = (count as f64 + config.epsilon) / days.max(1) as f64;
        let intensity = smoothed.max(config.lambda_floor) * epoch_share;
        DemandProfile {
            trips: count as u32,
            avg_fare,
            intensity,
            rate: intensity * avg_fare,
        }
    };

    let day_types = [DayType::Weekday, DayType::Weekend];
    for &cluster in coords.keys() {
        let fallback_fare = cluster_fares
            .get(cluster)
            .map(|f| f.iter().mean())
            .unwrap_or(city_mean_fare);

        for hour in 0..24u32 {
            let mut combined: Vec<f64> = Vec::new();
            for day in day_types {
                let fares = slot_fares.get(&(cluster, hour, day)).map(Vec::as_slice).unwrap_or(&[]);
                combined.extend_from_slice(fares);
                let observed_days = dates.get(&day).map(BTreeSet::len).unwrap_or(0);
                if observed_days > 0 {
                    builder = builder.profile(cluster, hour, Some(day), profile(fares, observed_days, fallback_fare));
                }
            }
            builder = builder.profile(cluster, hour, None, profile(&combined, all_dates.len(), fallback_fare));
        }
    }

    for (&(origin, destination, hour), minutes) in &hourly_durations {
        let mean = minutes.iter().mean();
        builder = builder.travel(
            origin,
            destination,
            Some(hour),
            TravelCost::new(mean, mean * config.relocation_cost_per_minute),
        );
    }
    for (&(origin, destination), minutes) in &durations {
        let mean = minutes.iter().mean();
        builder = builder.travel(
            origin,
            destination,
            None,
            TravelCost::new(mean, mean * config.relocation_cost_per_minute),
        );
    }
    for (&(origin, destination, hour), &trips) in &flows {
        builder = builder.flow(origin, destination, hour, trips);
    }

    builder.build()
}
