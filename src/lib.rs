//! Shift Optimizer Library
//!
//! Plans where a ride-hailing driver should wait and when to relocate during
//! a shift so that expected earnings are maximized.
//!
//! # Features
//!
//! - Demand/earnings model built from historical ride records (CSV)
//! - Per-city transition graph with travel times and relocation costs
//! - Exact dynamic programming over (cluster, remaining epochs)
//! - Best starting positions, schedule comparison, weekly analysis
//! - Cluster popularity (trip flows) at a given hour
//! - Deterministic JSON reports
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use shift_optimizer::config::OptimizerConfig;
//! use shift_optimizer::model::CityId;
//! use shift_optimizer::optimizer::Optimizer;
//! use shift_optimizer::rides::load_model;
//!
//! let config = OptimizerConfig::default();
//! let model = load_model("data/ride_trips_with_clusters.csv", &config).unwrap();
//! let optimizer = Optimizer::new(model, config);
//!
//! let date = NaiveDate::from_ymd_opt(2023, 1, 16).unwrap();
//! let best = optimizer.find_best_starts(CityId(3), 22, 8, 5, date).unwrap();
//! for result in &best {
//!     println!("{}: {:.2}", result.start_cluster, result.total_earnings);
//! }
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod demand;
pub mod rides;
pub mod graph;
pub mod engine;
pub mod optimizer;
pub mod finder;
pub mod comparator;
pub mod popularity;
pub mod report;

pub use config::OptimizerConfig;
pub use error::{ErrorKind, OptimizerError, Result};
pub use model::{CityId, ClusterId, OptimizationResult};
pub use optimizer::Optimizer;
pub use report::{AnalysisMode, AnalysisReport, AnalysisRequest};
