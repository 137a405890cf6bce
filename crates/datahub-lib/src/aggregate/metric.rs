//! Identity-keyed aggregates of container, pod and node metrics

use super::shape::Shape;
use crate::models::{ContainerIdentity, MetricSet, PodIdentity};
use crate::query::Order;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, Entry};
use std::collections::BTreeMap;

/// Metrics of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetric {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    pub metrics: MetricSet,
}

impl ContainerMetric {
    pub fn new(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
        metrics: MetricSet,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            container_name: container_name.into(),
            metrics,
        }
    }

    pub fn identity(&self) -> ContainerIdentity {
        ContainerIdentity {
            namespace: self.namespace.clone(),
            pod_name: self.pod_name.clone(),
            container_name: self.container_name.clone(),
        }
    }

    pub fn pod_identity(&self) -> PodIdentity {
        PodIdentity::new(self.namespace.clone(), self.pod_name.clone())
    }

    /// Concatenate another record's series onto this one
    pub fn merge(&mut self, other: ContainerMetric) {
        self.metrics.merge(other.metrics);
    }

    /// Wrap this record in a pod aggregate holding only this container
    pub fn into_pod_metric(self) -> PodMetric {
        let mut containers = ContainersMetricMap::new();
        let namespace = self.namespace.clone();
        let pod_name = self.pod_name.clone();
        containers.add_container_metric(self);
        PodMetric {
            namespace,
            pod_name,
            containers,
        }
    }
}

/// Container records keyed by `namespace/pod/container`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ContainerMetric>", into = "Vec<ContainerMetric>")]
pub struct ContainersMetricMap {
    containers: BTreeMap<ContainerIdentity, ContainerMetric>,
}

impl ContainersMetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, or concatenate it onto the record with the same identity
    pub fn add_container_metric(&mut self, container: ContainerMetric) {
        match self.containers.entry(container.identity()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(container),
            Entry::Vacant(slot) => {
                slot.insert(container);
            }
        }
    }

    pub fn merge(&mut self, other: ContainersMetricMap) {
        for container in other.containers.into_values() {
            self.add_container_metric(container);
        }
    }

    /// Fold every container up into its owning pod
    pub fn build_pods_metric_map(self) -> PodsMetricMap {
        let mut pods = PodsMetricMap::new();
        for container in self.containers.into_values() {
            pods.add_container_metric(container);
        }
        pods
    }

    pub fn get(&self, identity: &ContainerIdentity) -> Option<&ContainerMetric> {
        self.containers.get(identity)
    }

    /// Look up a container by name alone
    pub fn by_name(&self, container_name: &str) -> Option<&ContainerMetric> {
        self.containers
            .values()
            .find(|c| c.container_name == container_name)
    }

    pub fn iter(&self) -> btree_map::Values<'_, ContainerIdentity, ContainerMetric> {
        self.containers.values()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.containers
            .values()
            .map(|c| c.metrics.sample_count())
            .sum()
    }
}

impl From<Vec<ContainerMetric>> for ContainersMetricMap {
    fn from(containers: Vec<ContainerMetric>) -> Self {
        let mut map = Self::new();
        for container in containers {
            map.add_container_metric(container);
        }
        map
    }
}

impl From<ContainersMetricMap> for Vec<ContainerMetric> {
    fn from(map: ContainersMetricMap) -> Self {
        map.containers.into_values().collect()
    }
}

impl Shape for ContainersMetricMap {
    fn sort_by_timestamp(&mut self, order: Order) {
        for container in self.containers.values_mut() {
            container.metrics.sort_by_timestamp(order);
        }
    }

    fn limit(&mut self, limit: usize) {
        for container in self.containers.values_mut() {
            container.metrics.limit(limit);
        }
    }
}

/// Metrics of one pod, one record per container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodMetric {
    pub namespace: String,
    pub pod_name: String,
    pub containers: ContainersMetricMap,
}

impl PodMetric {
    pub fn identity(&self) -> PodIdentity {
        PodIdentity::new(self.namespace.clone(), self.pod_name.clone())
    }

    pub fn merge(&mut self, other: PodMetric) {
        self.containers.merge(other.containers);
    }
}

/// Pod aggregates keyed by `namespace/pod`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PodMetric>", into = "Vec<PodMetric>")]
pub struct PodsMetricMap {
    pods: BTreeMap<PodIdentity, PodMetric>,
}

impl PodsMetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one container record into its pod aggregate
    pub fn add_container_metric(&mut self, container: ContainerMetric) {
        self.add_pod_metric(container.into_pod_metric());
    }

    pub fn add_pod_metric(&mut self, pod: PodMetric) {
        match self.pods.entry(pod.identity()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(pod),
            Entry::Vacant(slot) => {
                slot.insert(pod);
            }
        }
    }

    pub fn merge(&mut self, other: PodsMetricMap) {
        for pod in other.pods.into_values() {
            self.add_pod_metric(pod);
        }
    }

    pub fn get(&self, identity: &PodIdentity) -> Option<&PodMetric> {
        self.pods.get(identity)
    }

    pub fn iter(&self) -> btree_map::Values<'_, PodIdentity, PodMetric> {
        self.pods.values()
    }

    pub fn into_pods(self) -> Vec<PodMetric> {
        self.pods.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.pods.values().map(|p| p.containers.sample_count()).sum()
    }
}

impl From<Vec<PodMetric>> for PodsMetricMap {
    fn from(pods: Vec<PodMetric>) -> Self {
        let mut map = Self::new();
        for pod in pods {
            map.add_pod_metric(pod);
        }
        map
    }
}

impl From<PodsMetricMap> for Vec<PodMetric> {
    fn from(map: PodsMetricMap) -> Self {
        map.into_pods()
    }
}

impl Shape for PodsMetricMap {
    fn sort_by_timestamp(&mut self, order: Order) {
        for pod in self.pods.values_mut() {
            pod.containers.sort_by_timestamp(order);
        }
    }

    fn limit(&mut self, limit: usize) {
        for pod in self.pods.values_mut() {
            pod.containers.limit(limit);
        }
    }
}

/// Metrics of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetric {
    pub node_name: String,
    pub metrics: MetricSet,
}

impl NodeMetric {
    pub fn new(node_name: impl Into<String>, metrics: MetricSet) -> Self {
        Self {
            node_name: node_name.into(),
            metrics,
        }
    }

    pub fn merge(&mut self, other: NodeMetric) {
        self.metrics.merge(other.metrics);
    }
}

/// Node records keyed by node name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<NodeMetric>", into = "Vec<NodeMetric>")]
pub struct NodesMetricMap {
    nodes: BTreeMap<String, NodeMetric>,
}

impl NodesMetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node_metric(&mut self, node: NodeMetric) {
        match self.nodes.entry(node.node_name.clone()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(node),
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
        }
    }

    pub fn merge(&mut self, other: NodesMetricMap) {
        for node in other.nodes.into_values() {
            self.add_node_metric(node);
        }
    }

    pub fn get(&self, node_name: &str) -> Option<&NodeMetric> {
        self.nodes.get(node_name)
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, NodeMetric> {
        self.nodes.values()
    }

    pub fn into_nodes(self) -> Vec<NodeMetric> {
        self.nodes.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.nodes.values().map(|n| n.metrics.sample_count()).sum()
    }
}

impl From<Vec<NodeMetric>> for NodesMetricMap {
    fn from(nodes: Vec<NodeMetric>) -> Self {
        let mut map = Self::new();
        for node in nodes {
            map.add_node_metric(node);
        }
        map
    }
}

impl From<NodesMetricMap> for Vec<NodeMetric> {
    fn from(map: NodesMetricMap) -> Self {
        map.into_nodes()
    }
}

impl Shape for NodesMetricMap {
    fn sort_by_timestamp(&mut self, order: Order) {
        for node in self.nodes.values_mut() {
            node.metrics.sort_by_timestamp(order);
        }
    }

    fn limit(&mut self, limit: usize) {
        for node in self.nodes.values_mut() {
            node.metrics.limit(limit);
        }
    }
}
