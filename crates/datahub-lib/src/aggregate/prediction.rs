//! Prediction aggregates
//!
//! Container and pod predictions share the metric record shapes. Node
//! predictions are partitioned by the scheduling-state flag, and the two
//! partitions are never merged into each other.

use super::metric::{ContainerMetric, ContainersMetricMap, PodMetric, PodsMetricMap};
use super::shape::Shape;
use crate::models::MetricSet;
use crate::query::Order;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;

pub type ContainerPrediction = ContainerMetric;
pub type ContainersPredictionMap = ContainersMetricMap;
pub type PodPrediction = PodMetric;
pub type PodsPredictionMap = PodsMetricMap;

/// Predictions of one node for one scheduling state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePrediction {
    pub node_name: String,
    /// Whether the prediction is for a placement that is yet to be scheduled
    pub is_scheduled: bool,
    pub predictions: MetricSet,
}

impl NodePrediction {
    pub fn new(node_name: impl Into<String>, is_scheduled: bool, predictions: MetricSet) -> Self {
        Self {
            node_name: node_name.into(),
            is_scheduled,
            predictions,
        }
    }
}

/// Both scheduling-state partitions of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePredictionPartition {
    partitions: BTreeMap<bool, NodePrediction>,
}

impl NodePredictionPartition {
    fn add(&mut self, prediction: NodePrediction) {
        match self.partitions.entry(prediction.is_scheduled) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().predictions.merge(prediction.predictions)
            }
            Entry::Vacant(slot) => {
                slot.insert(prediction);
            }
        }
    }

    pub fn scheduled(&self) -> Option<&NodePrediction> {
        self.partitions.get(&true)
    }

    pub fn unscheduled(&self) -> Option<&NodePrediction> {
        self.partitions.get(&false)
    }

    pub fn get(&self, is_scheduled: bool) -> Option<&NodePrediction> {
        self.partitions.get(&is_scheduled)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Node predictions keyed by node name, then by scheduling state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<NodePrediction>", into = "Vec<NodePrediction>")]
pub struct NodesPredictionMap {
    nodes: BTreeMap<String, NodePredictionPartition>,
}

impl NodesPredictionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node_prediction(&mut self, prediction: NodePrediction) {
        self.nodes
            .entry(prediction.node_name.clone())
            .or_default()
            .add(prediction);
    }

    pub fn merge(&mut self, other: NodesPredictionMap) {
        for prediction in other.into_predictions() {
            self.add_node_prediction(prediction);
        }
    }

    pub fn get(&self, node_name: &str) -> Option<&NodePredictionPartition> {
        self.nodes.get(node_name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, NodePredictionPartition> {
        self.nodes.iter()
    }

    /// Flatten into one record per node and scheduling state
    pub fn into_predictions(self) -> Vec<NodePrediction> {
        self.nodes
            .into_values()
            .flat_map(|partition| partition.partitions.into_values())
            .collect()
    }

    /// Number of distinct nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|partition| partition.partitions.values())
            .map(|p| p.predictions.sample_count())
            .sum()
    }
}

impl From<Vec<NodePrediction>> for NodesPredictionMap {
    fn from(predictions: Vec<NodePrediction>) -> Self {
        let mut map = Self::new();
        for prediction in predictions {
            map.add_node_prediction(prediction);
        }
        map
    }
}

impl From<NodesPredictionMap> for Vec<NodePrediction> {
    fn from(map: NodesPredictionMap) -> Self {
        map.into_predictions()
    }
}

impl Shape for NodesPredictionMap {
    fn sort_by_timestamp(&mut self, order: Order) {
        for partition in self.nodes.values_mut() {
            for prediction in partition.partitions.values_mut() {
                prediction.predictions.sort_by_timestamp(order);
            }
        }
    }

    fn limit(&mut self, limit: usize) {
        for partition in self.nodes.values_mut() {
            for prediction in partition.partitions.values_mut() {
                prediction.predictions.limit(limit);
            }
        }
    }
}
