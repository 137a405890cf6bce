//! Datahub library for observed metrics, predictions and recommendations
//!
//! This crate provides the core functionality for:
//! - Concurrent multi-source metric collection with fail-fast fan-out
//! - Merge maps folding container, pod and node series
//! - Prediction and recommendation storage in a time-series store
//! - Latest-value reduction for applying recommendations
//! - Health checks and observability

pub mod aggregate;
pub mod cluster;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod query;
pub mod recommendation;
pub mod reduce;
pub mod source;

pub use cluster::{NamespacedName, Node, NodeUpdate, Pod, PodUpdate, SimulatedSchedulingScore};
pub use collector::{CollectorConfig, Daos, DaosBuilder};
pub use error::{DatahubError, DECREASE_RESOLUTION_MESSAGE};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DatahubMetrics, StructuredLogger};
pub use query::{Order, QueryCondition, QueryParams, TimeRange};
