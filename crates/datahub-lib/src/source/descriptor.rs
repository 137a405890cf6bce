use crate::models::{MetricType, PodFilter};

/// Selector applied to every container query: skip series without a pod and
/// the pause container
pub const CONTAINER_DEFAULT_SELECTOR: &str = r#"pod_name != "",container_name != "POD""#;

const CONTAINER_CPU_METRIC: &str =
    "namespace_pod_name_container_name:container_cpu_usage_seconds_total:sum_rate";
const CONTAINER_MEMORY_METRIC: &str =
    "namespace_pod_name_container_name:container_memory_usage_bytes:sum";
const NODE_CPU_METRIC: &str = "node:node_cpu_utilisation:avg1m";
const NODE_MEMORY_TOTAL_METRIC: &str = "node:node_memory_bytes_total:sum";
const NODE_MEMORY_AVAILABLE_METRIC: &str = "node:node_memory_bytes_available:sum";

/// One metric sub-source of the metrics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricSource {
    ContainerCpu,
    ContainerMemory,
    NodeCpu,
    NodeMemory,
}

impl MetricSource {
    /// Container sub-sources in query order
    pub const CONTAINER: [MetricSource; 2] = [MetricSource::ContainerCpu, MetricSource::ContainerMemory];

    /// Node sub-sources in query order
    pub const NODE: [MetricSource; 2] = [MetricSource::NodeCpu, MetricSource::NodeMemory];

    pub fn name(&self) -> &'static str {
        match self {
            MetricSource::ContainerCpu => "container_cpu",
            MetricSource::ContainerMemory => "container_memory",
            MetricSource::NodeCpu => "node_cpu",
            MetricSource::NodeMemory => "node_memory",
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricSource::ContainerCpu | MetricSource::NodeCpu => MetricType::CpuUsageSecondsPercentage,
            MetricSource::ContainerMemory | MetricSource::NodeMemory => MetricType::MemoryUsageBytes,
        }
    }

    /// PromQL expression for a container sub-source narrowed by a pod filter
    pub fn pod_expression(&self, filter: &PodFilter) -> String {
        let mut selector = CONTAINER_DEFAULT_SELECTOR.to_string();
        if let Some(namespace) = &filter.namespace {
            selector.push_str(&format!(",namespace = {}", promql_quote(namespace)));
        }
        if let Some(pod_name) = &filter.pod_name {
            selector.push_str(&format!(",pod_name = {}", promql_quote(pod_name)));
        }

        match self {
            MetricSource::ContainerCpu => format!("{}{{{}}}", CONTAINER_CPU_METRIC, selector),
            MetricSource::ContainerMemory => format!("{}{{{}}}", CONTAINER_MEMORY_METRIC, selector),
            // Node sources ignore pod filters
            MetricSource::NodeCpu | MetricSource::NodeMemory => self.node_expression(None),
        }
    }

    /// PromQL expression for a node sub-source; `None` selects every node
    pub fn node_expression(&self, node_name: Option<&str>) -> String {
        let selector = node_name
            .filter(|name| !name.is_empty())
            .map(|name| format!("{{node = {}}}", promql_quote(name)))
            .unwrap_or_default();

        match self {
            MetricSource::NodeCpu => format!("{}{}", NODE_CPU_METRIC, selector),
            MetricSource::NodeMemory => format!(
                "{}{} - {}{}",
                NODE_MEMORY_TOTAL_METRIC, selector, NODE_MEMORY_AVAILABLE_METRIC, selector
            ),
            MetricSource::ContainerCpu | MetricSource::ContainerMemory => {
                self.pod_expression(&PodFilter::default())
            }
        }
    }
}

fn promql_quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_expression_keeps_default_selector() {
        let expr = MetricSource::ContainerCpu.pod_expression(&PodFilter::default());
        assert_eq!(
            expr,
            r#"namespace_pod_name_container_name:container_cpu_usage_seconds_total:sum_rate{pod_name != "",container_name != "POD"}"#
        );
    }

    #[test]
    fn test_container_expression_with_filter() {
        let filter = PodFilter::new(Some("webapp".to_string()), Some("nginx-0".to_string()));
        let expr = MetricSource::ContainerMemory.pod_expression(&filter);
        assert!(expr.starts_with("namespace_pod_name_container_name:container_memory_usage_bytes:sum{"));
        assert!(expr.ends_with(r#",namespace = "webapp",pod_name = "nginx-0"}"#));
    }

    #[test]
    fn test_node_expressions() {
        assert_eq!(
            MetricSource::NodeCpu.node_expression(Some("node-1")),
            r#"node:node_cpu_utilisation:avg1m{node = "node-1"}"#
        );
        assert_eq!(MetricSource::NodeCpu.node_expression(None), "node:node_cpu_utilisation:avg1m");
        assert_eq!(
            MetricSource::NodeMemory.node_expression(Some("n")),
            r#"node:node_memory_bytes_total:sum{node = "n"} - node:node_memory_bytes_available:sum{node = "n"}"#
        );
    }

    #[test]
    fn test_label_values_are_quoted() {
        let expr = MetricSource::NodeCpu.node_expression(Some(r#"we"ird"#));
        assert!(expr.contains(r#"{node = "we\"ird"}"#));
    }
}
