//! Dynamic-programming optimization engine.
//!
//! Backward induction over the remaining-epoch budget. `V[c][r]` is the best
//! expected earnings reachable from cluster `c` with `r` epochs left:
//!
//! ```text
//! V[c][0] = 0
//! V[c][r] = max over edges (d, k, opp) of c at hour(r), k <= r:
//!               gain(c, d, k, opp, hour(r)) + V[d][r - k]
//! hour(r) = start_hour + (total_epochs - r)
//! ```
//!
//! Staying earns the cluster's rate for one epoch; relocating earns
//! `relocation_earning_share * rate * k` minus the opportunity cost. Ties are
//! broken towards fewer travel epochs, then staying, then the smaller
//! destination, so the output is reproducible.

use chrono::{Days, NaiveDate};

use crate::config::{OptimizerConfig, EPOCHS_PER_DAY};
use crate::demand::{normalize_hour, CityData};
use crate::error::{OptimizerError, Result};
use crate::graph::{Edge, TransitionGraph};
use crate::model::{Action, ClusterId, DayType, OptimizationResult, PathStep};

/// Values closer than this are considered equal for tie-breaking.
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Choice {
    edge: Edge,
    gain: f64,
    fallback: bool,
}

impl Choice {
    /// Tie-break key, smaller is preferred
    fn key(&self, origin: usize) -> (u32, bool, usize) {
        (self.edge.travel_epochs, self.edge.destination != origin, self.edge.destination)
    }
}

/// DP table for one (start hour, duration, date) window, all clusters at once.
#[derive(Debug, Clone)]
pub struct DpTable {
    num_clusters: usize,
    start_hour: u32,
    total_epochs: u32,
    /// `values[r * num_clusters + c]`
    values: Vec<f64>,
    choices: Vec<Option<Choice>>,
}

impl DpTable {
    /// Best earnings from `cluster` with `remaining` epochs left.
    pub fn value(&self, cluster: usize, remaining: u32) -> f64 {
        self.values[remaining as usize * self.num_clusters + cluster]
    }

    pub fn total_epochs(&self) -> u32 {
        self.total_epochs
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    fn choice(&self, cluster: usize, remaining: u32) -> Option<Choice> {
        self.choices[remaining as usize * self.num_clusters + cluster]
    }
}

/// Day type in effect `offset` epochs after `start_hour` on `date`.
pub fn day_type_at(date: NaiveDate, start_hour: u32, offset: u32) -> DayType {
    let days = (start_hour + offset) / EPOCHS_PER_DAY;
    let day = date.checked_add_days(Days::new(days as u64)).unwrap_or(date);
    DayType::of(day)
}

/// Runs the recurrence over one city's reference data.
pub struct DpEngine<'a> {
    data: &'a CityData,
    graph: &'a TransitionGraph,
    config: &'a OptimizerConfig,
}

impl<'a> DpEngine<'a> {
    pub fn new(data: &'a CityData, graph: &'a TransitionGraph, config: &'a OptimizerConfig) -> Self {
        debug_assert_eq!(data.id, graph.city());
        DpEngine { data, graph, config }
    }

    fn validate(&self, start_hour: u32, total_epochs: u32) -> Result<()> {
        if start_hour >= EPOCHS_PER_DAY {
            return Err(OptimizerError::InvalidHour(start_hour as i64));
        }
        if total_epochs == 0 {
            return Err(OptimizerError::InvalidDuration(0));
        }
        Ok(())
    }

    fn gain(&self, origin: usize, edge: &Edge, rate: f64) -> f64 {
        if edge.destination == origin {
            rate
        } else {
            self.config.relocation_earning_share * rate * edge.travel_epochs as f64 - edge.opportunity_cost
        }
    }

    /// Fill the DP table for every cluster.
    pub fn table(&self, start_hour: u32, total_epochs: u32, date: NaiveDate) -> Result<DpTable> {
        self.validate(start_hour, total_epochs)?;

        let n = self.data.num_clusters();
        let rows = total_epochs as usize + 1;
        let mut values = vec![0.0; rows * n];
        let mut choices: Vec<Option<Choice>> = vec![None; rows * n];

        for r in 1..=total_epochs {
            let offset = total_epochs - r;
            let hour = start_hour as i64 + offset as i64;
            let day = day_type_at(date, start_hour, offset);

            for c in 0..n {
                let lookup = self.data.rate_at(c, hour, day);
                let rate = lookup.value();
                let mut best: Option<(f64, Choice)> = None;

                for edge in self.graph.neighbors(c, hour) {
                    if edge.travel_epochs > r {
                        continue;
                    }
                    let gain = self.gain(c, edge, rate);
                    let rest = values[(r - edge.travel_epochs) as usize * n + edge.destination];
                    let candidate = Choice { edge: *edge, gain, fallback: lookup.is_fallback() };
                    let value = gain + rest;

                    let better = match &best {
                        None => true,
                        Some((best_value, best_choice)) => {
                            value > best_value + TIE_EPSILON
                                || ((value - best_value).abs() <= TIE_EPSILON
                                    && candidate.key(c) < best_choice.key(c))
                        }
                    };
                    if better {
                        best = Some((value, candidate));
                    }
                }

                // the stay edge always fits in r >= 1 epochs
                if let Some((value, choice)) = best {
                    values[r as usize * n + c] = value;
                    choices[r as usize * n + c] = Some(choice);
                }
            }
        }

        Ok(DpTable { num_clusters: n, start_hour, total_epochs, values, choices })
    }

    /// Follow the recorded choices from `start` until no epochs remain.
    pub fn reconstruct(&self, table: &DpTable, start: usize) -> OptimizationResult {
        let mut path = Vec::new();
        let mut used_fallback = false;
        let mut cluster = start;
        let mut remaining = table.total_epochs;

        while remaining > 0 {
            let Some(choice) = table.choice(cluster, remaining) else {
                break;
            };
            let offset = table.total_epochs - remaining;
            let destination = choice.edge.destination;
            used_fallback |= choice.fallback;

            path.push(PathStep {
                cluster: self.data.cluster(cluster).id.clone(),
                hour: normalize_hour(table.start_hour as i64 + offset as i64),
                epochs: choice.edge.travel_epochs,
                action: if destination == cluster { Action::Stay } else { Action::Relocate },
                destination: self.data.cluster(destination).id.clone(),
                earnings: choice.gain,
            });

            cluster = destination;
            remaining -= choice.edge.travel_epochs;
        }

        OptimizationResult::new(
            self.data.id,
            self.data.cluster(start).id.clone(),
            table.start_hour,
            path,
            used_fallback,
        )
    }

    /// Best path from `start` for a shift of `total_epochs` starting at `start_hour`.
    pub fn solve(
        &self,
        start: &ClusterId,
        start_hour: u32,
        total_epochs: u32,
        date: NaiveDate,
    ) -> Result<OptimizationResult> {
        let start_idx = self.data.cluster_index(start)?;
        let table = self.table(start_hour, total_epochs, date)?;
        let result = self.reconstruct(&table, start_idx);
        debug_assert_eq!(result.duration, total_epochs);
        Ok(result)
    }

    /// Earnings of never moving from `start` for the whole shift.
    pub fn stay_earnings(
        &self,
        start: &ClusterId,
        start_hour: u32,
        total_epochs: u32,
        date: NaiveDate,
    ) -> Result<f64> {
        let idx = self.data.cluster_index(start)?;
        self.validate(start_hour, total_epochs)?;
        Ok((0..total_epochs)
            .map(|t| {
                let day = day_type_at(date, start_hour, t);
                self.data.rate_at(idx, start_hour as i64 + t as i64, day).value()
            })
            .sum())
    }
}
