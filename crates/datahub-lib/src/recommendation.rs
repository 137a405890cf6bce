//! Resource recommendations and their application to container resources

use crate::models::{MetricSet, MetricType, PodIdentity};
use crate::reduce::reduce_to_latest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recommendation series of one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    pub name: String,
    #[serde(default)]
    pub limit_recommendations: MetricSet,
    #[serde(default)]
    pub request_recommendations: MetricSet,
    #[serde(default)]
    pub initial_limit_recommendations: MetricSet,
    #[serde(default)]
    pub initial_request_recommendations: MetricSet,
}

impl ContainerRecommendation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Latest limits and requests derived from the recommendation series
    pub fn applied_resources(&self) -> ResourceRequirements {
        ResourceRequirements {
            limits: ResourceList::from_latest(&self.limit_recommendations),
            requests: ResourceList::from_latest(&self.request_recommendations),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.limit_recommendations.is_empty()
            && self.request_recommendations.is_empty()
            && self.initial_limit_recommendations.is_empty()
            && self.initial_request_recommendations.is_empty()
    }
}

/// Recommendations of every container in one pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecommendation {
    pub namespace: String,
    pub pod_name: String,
    #[serde(default)]
    pub container_recommendations: Vec<ContainerRecommendation>,
}

impl PodRecommendation {
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            container_recommendations: Vec::new(),
        }
    }

    pub fn identity(&self) -> PodIdentity {
        PodIdentity::new(self.namespace.clone(), self.pod_name.clone())
    }

    pub fn container(&self, name: &str) -> Option<&ContainerRecommendation> {
        self.container_recommendations.iter().find(|c| c.name == name)
    }
}

/// CPU and memory quantities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    /// CPU in millicores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    /// Memory in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
}

impl ResourceList {
    fn from_latest(series: &MetricSet) -> Self {
        let latest = reduce_to_latest(series, &MetricType::ALL);
        Self {
            cpu: latest.get(&MetricType::CpuUsageSecondsPercentage).copied(),
            memory: latest.get(&MetricType::MemoryUsageBytes).copied(),
        }
    }

    /// Overwrite the quantities present in `other`, keep the rest
    fn overlay(&mut self, other: ResourceList) {
        if other.cpu.is_some() {
            self.cpu = other.cpu;
        }
        if other.memory.is_some() {
            self.memory = other.memory;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub requests: ResourceList,
}

/// A container's resource fields as the recommendation target sees them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResources {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl ContainerResources {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: ResourceRequirements::default(),
        }
    }
}

/// Copy the latest recommended limits and requests onto matching containers
///
/// Containers are matched by name. A quantity without a usable sample keeps
/// its current value. Returns the number of containers that matched.
pub fn apply_pod_recommendation(
    containers: &mut [ContainerResources],
    recommendation: &PodRecommendation,
) -> usize {
    let mut matched = 0;

    for container in containers.iter_mut() {
        let Some(recommended) = recommendation.container(&container.name) else {
            debug!(
                pod = %recommendation.identity(),
                container = %container.name,
                "No recommendation for container"
            );
            continue;
        };

        let applied = recommended.applied_resources();
        container.resources.limits.overlay(applied.limits);
        container.resources.requests.overlay(applied.requests);
        matched += 1;
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64, value: &str) -> Sample {
        Sample::new(Utc.timestamp_opt(secs, 0).unwrap(), value)
    }

    fn recommendation() -> PodRecommendation {
        let mut app = ContainerRecommendation::new("app");
        app.limit_recommendations.append(
            MetricType::CpuUsageSecondsPercentage,
            vec![at(10, "500"), at(20, "750"), at(15, "900")],
        );
        app.limit_recommendations
            .append(MetricType::MemoryUsageBytes, vec![at(10, "268435456")]);
        app.request_recommendations
            .append(MetricType::CpuUsageSecondsPercentage, vec![at(10, "250.7")]);
        // Initial series are informational only
        app.initial_limit_recommendations
            .append(MetricType::CpuUsageSecondsPercentage, vec![at(99, "1")]);

        let mut pod = PodRecommendation::new("webapp", "api-0");
        pod.container_recommendations.push(app);
        pod
    }

    #[test]
    fn test_apply_sets_latest_values() {
        let mut containers = vec![ContainerResources::new("app"), ContainerResources::new("sidecar")];
        containers[1].resources.limits.cpu = Some(100);

        let matched = apply_pod_recommendation(&mut containers, &recommendation());

        assert_eq!(matched, 1);
        let app = &containers[0].resources;
        assert_eq!(app.limits.cpu, Some(750));
        assert_eq!(app.limits.memory, Some(268435456));
        assert_eq!(app.requests.cpu, Some(250));
        assert_eq!(app.requests.memory, None);

        // Unmatched container is untouched
        assert_eq!(containers[1].resources.limits.cpu, Some(100));
    }

    #[test]
    fn test_apply_keeps_values_without_usable_sample() {
        let mut containers = vec![ContainerResources::new("app")];
        containers[0].resources.requests.memory = Some(1024);

        let mut pod = PodRecommendation::new("ns", "p");
        let mut app = ContainerRecommendation::new("app");
        app.request_recommendations
            .append(MetricType::MemoryUsageBytes, vec![at(1, "not-a-number")]);
        pod.container_recommendations.push(app);

        apply_pod_recommendation(&mut containers, &pod);
        assert_eq!(containers[0].resources.requests.memory, Some(1024));
    }

    #[test]
    fn test_applied_resources_json_shape() {
        let applied = recommendation().container_recommendations[0].applied_resources();
        let json = serde_json::to_value(applied).unwrap();
        assert_eq!(json["limits"]["cpu"], 750);
        assert!(json["requests"].get("memory").is_none());
    }
}
