//! Shift Optimizer - Command Line Interface
//!
//! Loads the ride data once, runs one analysis and prints the JSON report.

use clap::{Args, Parser, Subcommand};
use shift_optimizer::comparator::ShiftWindow;
use shift_optimizer::config::OptimizerConfig;
use shift_optimizer::error::{ErrorKind, OptimizerError, Result};
use shift_optimizer::model::{CityId, ClusterId};
use shift_optimizer::optimizer::Optimizer;
use shift_optimizer::report::{self, AnalysisMode, AnalysisRequest};
use shift_optimizer::rides::load_model;

use chrono::{Local, NaiveDate};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "shift-optimizer")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Shift and relocation planner for ride-hailing drivers")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// Ride records CSV
    #[arg(long, global = true, default_value = "data/ride_trips_with_clusters.csv")]
    data: PathBuf,

    /// Date of the shift (YYYY-MM-DD), defaults to today
    #[arg(long, global = true)]
    date: Option<String>,

    /// Write the JSON report to this file instead of stdout
    #[arg(long, global = true)]
    json: Option<PathBuf>,

    /// Laplace smoothing added to hourly trip counts
    #[arg(long, global = true)]
    epsilon: Option<f64>,

    /// Minimum demand (trips per hour) assumed anywhere
    #[arg(long, global = true)]
    lambda_floor: Option<f64>,

    /// Cost charged per minute of relocation driving
    #[arg(long, global = true)]
    relocation_cost_per_minute: Option<f64>,

    /// Share of the origin's rate still earned while relocating (0-1)
    #[arg(long, global = true)]
    relocation_share: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank starting clusters for a fixed shift window
    BestPositions {
        #[arg(short, long)]
        city: String,

        /// Start hour (0-23)
        #[arg(long, allow_negative_numbers = true)]
        hour: i64,

        /// Shift length in hours (1-24)
        #[arg(short, long, allow_negative_numbers = true)]
        duration: i64,

        /// Number of clusters to report
        #[arg(short, long, default_value = "10")]
        top_k: usize,
    },

    /// Rank shift windows by hourly rate
    CompareSchedules {
        #[arg(short, long)]
        city: String,

        /// Start every window from this cluster instead of the best one
        #[arg(long)]
        cluster: Option<String>,

        /// Candidate window HOUR:DURATION, repeatable (default: ten standard windows)
        #[arg(short, long = "window", value_name = "H:D")]
        windows: Vec<String>,
    },

    /// Optimal path from one starting cluster
    Analyze {
        #[arg(short, long)]
        city: String,

        #[arg(long)]
        cluster: String,

        #[arg(long, allow_negative_numbers = true)]
        hour: i64,

        #[arg(short, long, allow_negative_numbers = true)]
        duration: i64,
    },

    /// Same shift on the seven days starting at --date
    Weekly {
        #[arg(short, long)]
        city: String,

        #[arg(long)]
        cluster: String,

        #[arg(long, allow_negative_numbers = true)]
        hour: i64,

        #[arg(short, long, allow_negative_numbers = true)]
        duration: i64,
    },

    /// Trip flows in and out of every cluster at an hour
    Popularity {
        #[arg(short, long)]
        city: String,

        #[arg(long, allow_negative_numbers = true)]
        hour: i64,
    },
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match parse_failure(&e) {
            Some(body) => {
                eprintln!("{}", body);
                std::process::exit(ErrorKind::Input.exit_code());
            }
            // --help / --version
            None => e.exit(),
        },
    };

    if let Err(e) = run(cli) {
        eprintln!("{}", error_body(e.kind(), &e.to_string()));
        std::process::exit(e.kind().exit_code());
    }
}

fn error_body(kind: ErrorKind, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": { "kind": kind, "message": message }
    })
}

/// JSON error for a rejected command line; `None` when clap only displays
/// help or version text.
fn parse_failure(e: &clap::Error) -> Option<serde_json::Value> {
    match e.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => None,
        _ => {
            let text = e.to_string();
            let first = text.lines().next().unwrap_or_default().trim();
            let message = first.strip_prefix("error: ").unwrap_or(first);
            Some(error_body(ErrorKind::Input, message))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let common = cli.common;
    let config = build_config(&common)?;
    let date = parse_date(common.date.as_deref())?;
    let request = build_request(cli.command, date)?;

    // reject bad parameters before paying for the data load
    request.validate_ranges()?;

    let start = Instant::now();
    let model = load_model(&common.data, &config)?;
    log::info!("Loaded {} cities from {:?} in {:.2?}", model.city_ids().len(), common.data, start.elapsed());

    let optimizer = Optimizer::new(model, config);
    let report = report::run(&optimizer, &request)?;

    match common.json {
        Some(path) => {
            report.write_to(&path)?;
            log::info!("Report saved to {:?}", path);
        }
        None => {
            let json = report.to_json()?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

fn build_config(common: &CommonArgs) -> Result<OptimizerConfig> {
    let defaults = OptimizerConfig::default();
    let config = OptimizerConfig {
        epsilon: common.epsilon.unwrap_or(defaults.epsilon),
        lambda_floor: common.lambda_floor.unwrap_or(defaults.lambda_floor),
        relocation_cost_per_minute: common
            .relocation_cost_per_minute
            .unwrap_or(defaults.relocation_cost_per_minute),
        relocation_earning_share: common.relocation_share.unwrap_or(defaults.relocation_earning_share),
    };
    config.validate()?;
    Ok(config)
}

fn parse_date(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| OptimizerError::InvalidDate(s.to_string())),
        None => Ok(Local::now().date_naive()),
    }
}

fn parse_city(raw: &str) -> Result<CityId> {
    raw.trim()
        .parse::<u32>()
        .map(CityId)
        .map_err(|_| OptimizerError::InvalidCity(raw.to_string()))
}

fn build_request(command: Commands, date: NaiveDate) -> Result<AnalysisRequest> {
    let (city, mode) = match command {
        Commands::BestPositions { city, hour, duration, top_k } => {
            (city, AnalysisMode::BestPositions { hour, duration, top_k })
        }
        Commands::CompareSchedules { city, cluster, windows } => {
            let windows = if windows.is_empty() {
                ShiftWindow::default_candidates()
            } else {
                windows.iter().map(|w| w.parse()).collect::<Result<Vec<ShiftWindow>>>()?
            };
            let cluster = cluster.map(ClusterId::from);
            (city, AnalysisMode::CompareSchedules { windows, cluster })
        }
        Commands::Analyze { city, cluster, hour, duration } => {
            (city, AnalysisMode::SingleCluster { cluster: cluster.into(), hour, duration })
        }
        Commands::Weekly { city, cluster, hour, duration } => {
            (city, AnalysisMode::Weekly { cluster: cluster.into(), hour, duration })
        }
        Commands::Popularity { city, hour } => (city, AnalysisMode::Popularity { hour }),
    };
    Ok(AnalysisRequest::new(parse_city(&city)?, date, mode))
}
