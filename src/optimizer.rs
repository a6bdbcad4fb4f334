//! In-process entry point: reference data, the per-city graph cache and the
//! configuration, shared read-only by every optimization call.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use crate::comparator::ShiftWindow;
use crate::config::OptimizerConfig;
use crate::demand::{CityData, DemandModel};
use crate::engine::DpEngine;
use crate::error::{OptimizerError, Result};
use crate::graph::{GraphCache, TransitionGraph};
use crate::model::{epochs_for_hours, CityId, ClusterId, DayType, OptimizationResult};

/// A move out of a cluster, with cluster ids resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub destination: ClusterId,
    pub travel_epochs: u32,
    pub opportunity_cost: f64,
}

pub struct Optimizer {
    model: Arc<DemandModel>,
    graphs: GraphCache,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(model: DemandModel, config: OptimizerConfig) -> Self {
        Self::from_shared(Arc::new(model), config)
    }

    pub fn from_shared(model: Arc<DemandModel>, config: OptimizerConfig) -> Self {
        let graphs = GraphCache::new(&model);
        Optimizer { model, graphs, config }
    }

    pub fn model(&self) -> &DemandModel {
        &self.model
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn city(&self, city: CityId) -> Result<&CityData> {
        self.model.city(city)
    }

    /// Transition graph of `city`, built on first request.
    pub fn graph(&self, city: CityId) -> Result<&TransitionGraph> {
        let data = self.city(city)?;
        self.graphs.get(data).ok_or_else(|| {
            OptimizerError::MissingReferenceData(format!("no transition graph slot for city {}", city))
        })
    }

    pub fn engine(&self, city: CityId) -> Result<DpEngine<'_>> {
        let data = self.city(city)?;
        let graph = self.graph(city)?;
        Ok(DpEngine::new(data, graph, &self.config))
    }

    pub fn expected_rate(&self, city: CityId, cluster: &ClusterId, hour: i64, day: DayType) -> Result<f64> {
        self.model.expected_rate(city, cluster, hour, day)
    }

    /// Moves available from `cluster` at `hour`; the stay move comes first.
    pub fn neighbors(&self, city: CityId, cluster: &ClusterId, hour: i64) -> Result<Vec<Neighbor>> {
        let data = self.city(city)?;
        let idx = data.cluster_index(cluster)?;
        let graph = self.graph(city)?;
        Ok(graph
            .neighbors(idx, hour)
            .iter()
            .map(|e| Neighbor {
                destination: data.cluster(e.destination).id.clone(),
                travel_epochs: e.travel_epochs,
                opportunity_cost: e.opportunity_cost,
            })
            .collect())
    }

    /// Best path for a shift of `duration_hours` starting at `start` at `start_hour`.
    pub fn solve(
        &self,
        city: CityId,
        start: &ClusterId,
        start_hour: u32,
        duration_hours: u32,
        date: NaiveDate,
    ) -> Result<OptimizationResult> {
        ShiftWindow::new(start_hour, duration_hours).validate()?;
        let engine = self.engine(city)?;
        engine.solve(start, start_hour, epochs_for_hours(duration_hours), date)
    }
}
