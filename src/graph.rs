//! Transition graph: for each (cluster, hour) the moves available at the next
//! decision epoch.
//!
//! The graph is a pure function of a city's static reference data, so it is
//! built at most once per city and kept for the lifetime of the process.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::config::{EPOCHS_PER_DAY, EPOCH_MINUTES};
use crate::demand::{normalize_hour, CityData, DemandModel};
use crate::model::CityId;

/// A directed move out of a cluster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// Destination cluster index
    pub destination: usize,
    /// Epochs consumed by the move (>= 1)
    pub travel_epochs: u32,
    pub opportunity_cost: f64,
}

impl Edge {
    pub fn stay(cluster: usize) -> Self {
        Edge { destination: cluster, travel_epochs: 1, opportunity_cost: 0.0 }
    }
}

/// Epochs needed to cover `minutes` of driving, never less than one.
pub fn travel_epochs(minutes: f64) -> u32 {
    let epochs = (minutes / EPOCH_MINUTES as f64).ceil();
    if epochs.is_finite() && epochs > 1.0 {
        epochs as u32
    } else {
        1
    }
}

#[derive(Debug, Clone)]
pub struct TransitionGraph {
    city: CityId,
    num_clusters: usize,
    /// Indexed by `cluster * EPOCHS_PER_DAY + hour`
    edges: Vec<Vec<Edge>>,
}

impl TransitionGraph {
    pub fn build(data: &CityData) -> Self {
        let n = data.num_clusters();
        let hours = EPOCHS_PER_DAY as usize;
        let mut edges = Vec::with_capacity(n * hours);

        for origin in 0..n {
            let destinations = data.destinations(origin);
            for hour in 0..hours {
                let mut out = vec![Edge::stay(origin)];
                for &destination in &destinations {
                    if let Some(cost) = data.travel_cost(origin, destination, hour as i64) {
                        out.push(Edge {
                            destination,
                            travel_epochs: travel_epochs(cost.travel_minutes),
                            opportunity_cost: cost.opportunity_cost,
                        });
                    }
                }
                // stay edge stays first: it is the only one-epoch self-loop
                out[1..].sort_by_key(|e| (e.travel_epochs, e.destination));
                edges.push(out);
            }
        }

        log::debug!(
            "Built transition graph for city {}: {} clusters, {} edges",
            data.id,
            n,
            edges.iter().map(Vec::len).sum::<usize>()
        );

        TransitionGraph { city: data.id, num_clusters: n, edges }
    }

    pub fn city(&self) -> CityId {
        self.city
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Moves available from `cluster` at `hour` (any integer, wraps at 24).
    /// The first edge is always the stay edge.
    pub fn neighbors(&self, cluster: usize, hour: i64) -> &[Edge] {
        let h = normalize_hour(hour) as usize;
        &self.edges[cluster * EPOCHS_PER_DAY as usize + h]
    }
}

/// Lazily populated per-city graph cache. Each slot is filled at most once.
#[derive(Debug, Default)]
pub struct GraphCache {
    graphs: BTreeMap<CityId, OnceLock<TransitionGraph>>,
}

impl GraphCache {
    pub fn new(model: &DemandModel) -> Self {
        GraphCache {
            graphs: model.city_ids().into_iter().map(|id| (id, OnceLock::new())).collect(),
        }
    }

    /// Graph of `data`'s city, built on first use. `None` for a city the cache
    /// was not created with.
    pub fn get(&self, data: &CityData) -> Option<&TransitionGraph> {
        self.graphs
            .get(&data.id)
            .map(|slot| slot.get_or_init(|| TransitionGraph::build(data)))
    }

    pub fn is_built(&self, city: CityId) -> bool {
        self.graphs.get(&city).map(|slot| slot.get().is_some()).unwrap_or(false)
    }
}
