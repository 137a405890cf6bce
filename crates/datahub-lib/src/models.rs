//! Core data models for the datahub engine
//!
//! Sample values are carried as strings end-to-end. Numeric parsing only
//! happens where a single value must be derived (see [`crate::reduce`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One timestamped observation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: String,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Category of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// CPU usage in percentage of one core's seconds
    CpuUsageSecondsPercentage,
    /// Memory usage in bytes
    MemoryUsageBytes,
}

impl MetricType {
    pub const ALL: [MetricType; 2] = [
        MetricType::CpuUsageSecondsPercentage,
        MetricType::MemoryUsageBytes,
    ];

    /// Name used for the `metric` tag in the time-series store
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::CpuUsageSecondsPercentage => "cpu_usage_seconds_percentage",
            MetricType::MemoryUsageBytes => "memory_usage_bytes",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu_usage_seconds_percentage" => Ok(MetricType::CpuUsageSecondsPercentage),
            "memory_usage_bytes" => Ok(MetricType::MemoryUsageBytes),
            other => Err(anyhow::anyhow!("unknown metric type: {}", other)),
        }
    }
}

/// Samples grouped by metric type
///
/// A series may hold samples from several fetches concatenated in arrival
/// order. It is only time ordered after [`crate::aggregate::Shape`] runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSet {
    series: BTreeMap<MetricType, Vec<Sample>>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set holding a single series
    pub fn with_series(metric_type: MetricType, samples: Vec<Sample>) -> Self {
        let mut set = Self::new();
        set.series.insert(metric_type, samples);
        set
    }

    /// Append samples to a series, creating it if absent
    pub fn append(&mut self, metric_type: MetricType, mut samples: Vec<Sample>) {
        self.series
            .entry(metric_type)
            .or_default()
            .append(&mut samples);
    }

    /// Fold another set into this one by per-type concatenation
    pub fn merge(&mut self, other: MetricSet) {
        for (metric_type, samples) in other.series {
            self.append(metric_type, samples);
        }
    }

    pub fn get(&self, metric_type: MetricType) -> Option<&[Sample]> {
        self.series.get(&metric_type).map(Vec::as_slice)
    }

    pub fn contains(&self, metric_type: MetricType) -> bool {
        self.series.contains_key(&metric_type)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, MetricType, Vec<Sample>> {
        self.series.iter()
    }

    pub(crate) fn series_mut(&mut self) -> btree_map::ValuesMut<'_, MetricType, Vec<Sample>> {
        self.series.values_mut()
    }

    /// Number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of samples across all series
    pub fn sample_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

impl FromIterator<(MetricType, Vec<Sample>)> for MetricSet {
    fn from_iter<I: IntoIterator<Item = (MetricType, Vec<Sample>)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (metric_type, samples) in iter {
            set.append(metric_type, samples);
        }
        set
    }
}

impl IntoIterator for MetricSet {
    type Item = (MetricType, Vec<Sample>);
    type IntoIter = btree_map::IntoIter<MetricType, Vec<Sample>>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.into_iter()
    }
}

/// Identity of a container: `namespace/pod/container`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerIdentity {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
}

impl ContainerIdentity {
    /// Identity of the owning pod
    pub fn pod(&self) -> PodIdentity {
        PodIdentity {
            namespace: self.namespace.clone(),
            pod_name: self.pod_name.clone(),
        }
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod_name, self.container_name)
    }
}

/// Identity of a pod: `namespace/pod`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodIdentity {
    pub namespace: String,
    pub pod_name: String,
}

impl PodIdentity {
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
        }
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod_name)
    }
}

/// Optional pod filter used when querying sources
///
/// Empty fields do not constrain the query, so the default value matches
/// every pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodFilter {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub pod_name: Option<String>,
}

impl PodFilter {
    pub fn new(namespace: Option<String>, pod_name: Option<String>) -> Self {
        Self {
            namespace: namespace.filter(|s| !s.is_empty()),
            pod_name: pod_name.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.namespace.is_none() && self.pod_name.is_none()
    }
}

impl fmt::Display for PodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.namespace.as_deref().unwrap_or("*"),
            self.pod_name.as_deref().unwrap_or("*")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, value: &str) -> Sample {
        Sample::new(Utc.timestamp_opt(secs, 0).unwrap(), value)
    }

    #[test]
    fn test_metric_type_round_trips_through_str() {
        for metric_type in MetricType::ALL {
            assert_eq!(metric_type.as_str().parse::<MetricType>().unwrap(), metric_type);
        }
        assert!("disk_io".parse::<MetricType>().is_err());
    }

    #[test]
    fn test_metric_set_append_concatenates() {
        let mut set = MetricSet::with_series(MetricType::MemoryUsageBytes, vec![at(2, "20")]);
        set.append(MetricType::MemoryUsageBytes, vec![at(1, "10"), at(2, "20")]);

        let series = set.get(MetricType::MemoryUsageBytes).unwrap();
        assert_eq!(series.len(), 3);
        // Arrival order is kept, duplicates included
        assert_eq!(series[0], at(2, "20"));
        assert_eq!(series[2], at(2, "20"));
    }

    #[test]
    fn test_metric_set_merge_keeps_types_apart() {
        let mut left = MetricSet::with_series(MetricType::CpuUsageSecondsPercentage, vec![at(1, "0.5")]);
        let right = MetricSet::with_series(MetricType::MemoryUsageBytes, vec![at(1, "1024")]);

        left.merge(right);

        assert_eq!(left.len(), 2);
        assert_eq!(left.sample_count(), 2);
        assert!(left.contains(MetricType::MemoryUsageBytes));
    }

    #[test]
    fn test_identity_display() {
        let container = ContainerIdentity {
            namespace: "webapp".to_string(),
            pod_name: "nginx-0".to_string(),
            container_name: "nginx".to_string(),
        };
        assert_eq!(container.to_string(), "webapp/nginx-0/nginx");
        assert_eq!(container.pod().to_string(), "webapp/nginx-0");
    }

    #[test]
    fn test_pod_filter_drops_empty_fields() {
        let filter = PodFilter::new(Some(String::new()), Some("nginx-0".to_string()));
        assert_eq!(filter.namespace, None);
        assert!(!filter.is_wildcard());
        assert!(PodFilter::default().is_wildcard());
        assert_eq!(filter.to_string(), "*/nginx-0");
    }
}
