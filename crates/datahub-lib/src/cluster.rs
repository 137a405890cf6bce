//! Pods, nodes and scheduling scores under management
//!
//! These are the records the cluster status and score stores hold. Pods and
//! nodes are never removed from the store: deleting a pod flags its
//! containers as deleted and deleting a node marks it as out of cluster.

use crate::error::{DatahubError, Result};
use crate::recommendation::ContainerResources;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.name.is_empty()
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A pod and the containers it runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub pod_name: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub containers: Vec<ContainerResources>,
    #[serde(default)]
    pub is_predicted: bool,
    #[serde(default)]
    pub policy: String,
    /// Scaler owning the pod; only stored for predicted pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<NamespacedName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl Pod {
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            ..Self::default()
        }
    }
}

/// Change to the prediction state of a stored pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodUpdate {
    pub namespace: String,
    pub pod_name: String,
    #[serde(default)]
    pub is_predicted: Option<bool>,
}

impl PodUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() || self.pod_name.is_empty() {
            return Err(DatahubError::InvalidArgument(
                "namespace and name of pod are required".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub is_predicted: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, is_predicted: bool) -> Self {
        Self {
            name: name.into(),
            is_predicted,
        }
    }
}

/// Change to the prediction state of a stored node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub name: String,
    #[serde(default)]
    pub is_predicted: Option<bool>,
}

/// Cluster balance before and after a simulated placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSchedulingScore {
    pub timestamp: DateTime<Utc>,
    pub score_before: f64,
    pub score_after: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_update_requires_identity() {
        let update = PodUpdate {
            namespace: "web".to_string(),
            pod_name: String::new(),
            is_predicted: Some(true),
        };
        assert!(matches!(
            update.validate(),
            Err(DatahubError::InvalidArgument(_))
        ));

        let update = PodUpdate {
            pod_name: "api-0".to_string(),
            ..update
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_pod_deserializes_with_defaults() {
        let pod: Pod = serde_json::from_str(r#"{"namespace":"web","pod_name":"api-0"}"#).unwrap();
        assert_eq!(pod, Pod::new("web", "api-0"));
        assert!(pod.scaler.is_none());
    }
}
