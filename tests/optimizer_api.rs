//! End-to-end checks of the public API: CSV in, ranked shifts and JSON out.

use chrono::NaiveDate;

use shift_optimizer::comparator::ShiftWindow;
use shift_optimizer::config::OptimizerConfig;
use shift_optimizer::demand::{CityData, DemandModel, TravelCost};
use shift_optimizer::model::{duration_hours, epochs_for_hours, CityId, ClusterId};
use shift_optimizer::report::{self, AnalysisMode, AnalysisRequest};
use shift_optimizer::rides::{build_model, read_rides};
use shift_optimizer::{ErrorKind, Optimizer, OptimizerError};

// ============================================================================
// Fixtures
// ============================================================================

const RIDES: &str = "\
ride_id,city_id,pickup_cluster,dropoff_cluster,pickup_lat,pickup_lon,drop_lat,drop_lon,start_time,duration_mins,fare_amount
r01,3,c_3_1,c_3_2,12.97,77.59,12.93,77.62,2023-01-16 07:15:00,25,180.0
r02,3,c_3_1,c_3_3,12.97,77.59,12.91,77.65,2023-01-16 08:05:00,40,260.0
r03,3,c_3_1,c_3_2,12.97,77.59,12.93,77.62,2023-01-16 08:30:00,20,150.0
r04,3,c_3_2,c_3_1,12.93,77.62,12.97,77.59,2023-01-16 09:10:00,30,190.0
r05,3,c_3_2,c_3_3,12.93,77.62,12.91,77.65,2023-01-16 17:45:00,15,120.0
r06,3,c_3_3,c_3_1,12.91,77.65,12.97,77.59,2023-01-16 18:20:00,55,340.0
r07,3,c_3_3,c_3_2,12.91,77.65,12.93,77.62,2023-01-16 19:00:00,18,130.0
r08,3,c_3_3,c_3_3,12.91,77.65,12.91,77.65,2023-01-16 21:40:00,10,90.0
r09,3,c_3_2,c_3_2,12.93,77.62,12.93,77.62,2023-01-17 22:15:00,12,95.0
r10,3,c_3_1,c_3_2,12.97,77.59,12.93,77.62,2023-01-17 08:10:00,22,170.0
r11,3,c_3_2,c_3_1,12.93,77.62,12.97,77.59,2023-01-17 23:30:00,35,230.0
r12,3,c_3_3,c_3_1,12.91,77.65,12.97,77.59,2023-01-14 01:05:00,50,400.0
r13,3,c_3_3,c_3_2,12.91,77.65,12.93,77.62,2023-01-14 02:20:00,16,150.0
r14,3,c_3_1,c_3_1,12.97,77.59,12.97,77.59,2023-01-14 12:00:00,9,80.0
r15,1,c_1_1,c_1_2,28.61,77.21,28.57,77.25,2023-01-16 10:00:00,28,210.0
r16,1,c_1_2,c_1_1,28.57,77.25,28.61,77.21,2023-01-16 19:30:00,33,240.0
";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 16).unwrap()
}

fn loaded_optimizer() -> Optimizer {
    let config = OptimizerConfig {
        relocation_cost_per_minute: 0.5,
        ..Default::default()
    };
    let rides = read_rides(RIDES.as_bytes()).unwrap();
    let model = build_model(&rides, &config).unwrap();
    Optimizer::new(model, config)
}

/// A pays 10 per hour, B pays 3; moving A -> B takes an hour and costs 1.
fn two_cluster_optimizer() -> Optimizer {
    let city = CityData::builder(CityId(7))
        .cluster("A", 0.0, 0.0)
        .cluster("B", 0.0, 0.0)
        .flat_rate("A", 10.0)
        .flat_rate("B", 3.0)
        .travel("A", "B", None, TravelCost::new(45.0, 1.0))
        .travel("B", "A", None, TravelCost::new(45.0, 1.0))
        .build()
        .unwrap();
    Optimizer::new(DemandModel::new(vec![city]), OptimizerConfig::default())
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn csv_cities_and_clusters_are_loaded() {
    let opt = loaded_optimizer();
    assert_eq!(opt.model().city_ids(), vec![CityId(1), CityId(3)]);

    let city = opt.city(CityId(3)).unwrap();
    let ids: Vec<&str> = city.clusters().iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c_3_1", "c_3_2", "c_3_3"]);
}

// ============================================================================
// Engine properties
// ============================================================================

#[test]
fn two_cluster_example_stays_put() {
    let opt = two_cluster_optimizer();
    let result = opt.solve(CityId(7), &"A".into(), 9, 2, date()).unwrap();

    let sequence: Vec<&str> = result.path.iter().map(|s| s.cluster.as_str()).collect();
    assert_eq!(sequence, vec!["A", "A"]);
    assert!((result.total_earnings - 20.0).abs() < 1e-10);
    assert!((result.hourly_rate - 10.0).abs() < 1e-10);
}

#[test]
fn never_worse_than_staying() {
    let opt = loaded_optimizer();
    let engine = opt.engine(CityId(3)).unwrap();
    for cluster in opt.city(CityId(3)).unwrap().clusters() {
        for hour in [0, 7, 12, 17, 22] {
            for duration in [1, 4, 8] {
                let epochs = epochs_for_hours(duration);
                let best = engine.solve(&cluster.id, hour, epochs, date()).unwrap();
                let stay = engine.stay_earnings(&cluster.id, hour, epochs, date()).unwrap();
                assert!(best.total_earnings >= stay - 1e-9, "{} at {}h for {}h", cluster.id, hour, duration);
            }
        }
    }
}

#[test]
fn longer_shifts_never_earn_less() {
    let opt = loaded_optimizer();
    let start = ClusterId::from("c_3_3");
    let mut previous = f64::NEG_INFINITY;
    for duration in 1..=24 {
        let result = opt.solve(CityId(3), &start, 17, duration, date()).unwrap();
        assert!(result.total_earnings >= previous - 1e-9, "duration {}", duration);
        previous = result.total_earnings;
    }
}

#[test]
fn path_covers_exactly_the_shift() {
    let opt = loaded_optimizer();
    for duration in [1, 3, 8, 13] {
        let result = opt.solve(CityId(3), &"c_3_1".into(), 20, duration, date()).unwrap();
        let epochs: u32 = result.path.iter().map(|s| s.epochs).sum();
        assert_eq!(epochs, result.duration);
        assert_eq!(result.duration, epochs_for_hours(duration));

        let earned: f64 = result.path.iter().map(|s| s.earnings).sum();
        assert!((earned - result.total_earnings).abs() < 1e-9);

        for pair in result.path.windows(2) {
            assert_eq!(pair[0].destination, pair[1].cluster);
            assert_eq!((pair[0].hour + pair[0].epochs) % 24, pair[1].hour);
        }
    }
}

// ============================================================================
// Finder and comparator
// ============================================================================

#[test]
fn best_starts_sorted_and_truncated() {
    let opt = loaded_optimizer();
    for top_k in [1, 2, 3, 10] {
        let results = opt.find_best_starts(CityId(3), 18, 6, top_k, date()).unwrap();
        assert_eq!(results.len(), top_k.min(3));
        for pair in results.windows(2) {
            assert!(pair[0].total_earnings >= pair[1].total_earnings);
            if pair[0].total_earnings == pair[1].total_earnings {
                assert!(pair[0].start_cluster < pair[1].start_cluster);
            }
        }
    }
}

#[test]
fn schedule_comparison_sorted_by_hourly_rate() {
    let opt = loaded_optimizer();
    let windows = ShiftWindow::default_candidates();
    let results = opt.compare_schedules(CityId(3), &windows, None, date()).unwrap();
    assert_eq!(results.len(), windows.len());
    for pair in results.windows(2) {
        assert!(pair[0].hourly_rate >= pair[1].hourly_rate);
    }
    for r in &results {
        assert!((r.total_earnings / duration_hours(r.duration) - r.hourly_rate).abs() < 1e-9);
    }
}

// ============================================================================
// Errors and reports
// ============================================================================

#[test]
fn unknown_city_is_an_input_error() {
    let opt = loaded_optimizer();
    let err = opt.find_best_starts(CityId(9), 8, 4, 5, date()).unwrap_err();
    assert!(matches!(err, OptimizerError::UnknownCity { .. }));
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(err.to_string().contains("Available cities: [1, 3]"));
}

#[test]
fn zero_duration_is_rejected() {
    let opt = loaded_optimizer();
    assert!(matches!(
        opt.solve(CityId(3), &"c_3_1".into(), 8, 0, date()),
        Err(OptimizerError::InvalidDuration(0))
    ));

    let request = AnalysisRequest::new(
        CityId(3),
        date(),
        AnalysisMode::BestPositions { hour: 8, duration: 0, top_k: 3 },
    );
    assert!(matches!(request.validate_ranges(), Err(OptimizerError::InvalidDuration(0))));
}

#[test]
fn report_is_byte_identical_across_runs() {
    let request = AnalysisRequest::new(
        CityId(3),
        date(),
        AnalysisMode::BestPositions { hour: 22, duration: 8, top_k: 3 },
    );
    let first = report::run(&loaded_optimizer(), &request).unwrap().to_json().unwrap();
    let second = report::run(&loaded_optimizer(), &request).unwrap().to_json().unwrap();
    assert_eq!(first, second);

    let value: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(value["city_id"], 3);
    assert_eq!(value["analysis"]["best_positions"].as_array().unwrap().len(), 3);
    assert_eq!(value["analysis"]["best_positions"][0]["rank"], 1);
}
