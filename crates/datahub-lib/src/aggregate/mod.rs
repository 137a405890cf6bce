//! Entity-keyed merge maps and post-aggregation shaping
//!
//! Records fetched concurrently are folded into maps keyed by derived
//! identity. Folding two records with the same identity concatenates their
//! series per metric type. Nothing is replaced, deduplicated or removed.
//! Once a map is complete, [`Shape`] sorts and limits every series in place.

mod metric;
mod prediction;
mod shape;


pub use metric::{
    ContainerMetric, ContainersMetricMap, NodeMetric, NodesMetricMap, PodMetric, PodsMetricMap,
};
pub use prediction::{
    ContainerPrediction, ContainersPredictionMap, NodePrediction, NodePredictionPartition,
    NodesPredictionMap, PodPrediction, PodsPredictionMap,
};
pub use shape::Shape;
