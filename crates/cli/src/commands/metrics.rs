//! Observed metric commands

use anyhow::Result;
use chrono::Utc;
use datahub_lib::{MetricSet, MetricType};
use tabled::Tabled;

use super::{default_metrics_lookback, RangeArgs};
use crate::client::{ApiClient, NodeQuery, PodQuery};
use crate::output::{format_timestamp, latest, print_json, print_rows, OutputFormat};

/// One series per row
#[derive(Tabled)]
pub(crate) struct SeriesRow {
    #[tabled(rename = "Entity")]
    pub entity: String,
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Samples")]
    pub samples: usize,
    #[tabled(rename = "Latest")]
    pub latest: String,
    #[tabled(rename = "At")]
    pub at: String,
}

/// Rows for every series of a metric set
pub(crate) fn series_rows(entity: &str, container: &str, metrics: &MetricSet) -> Vec<SeriesRow> {
    metrics
        .iter()
        .map(|(metric_type, samples)| {
            let newest = latest(samples);
            SeriesRow {
                entity: entity.to_string(),
                container: container.to_string(),
                metric: metric_label(*metric_type).to_string(),
                samples: samples.len(),
                latest: newest.map(|s| s.value.clone()).unwrap_or_default(),
                at: format_timestamp(newest),
            }
        })
        .collect()
}

fn metric_label(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::CpuUsageSecondsPercentage => "cpu",
        MetricType::MemoryUsageBytes => "memory",
    }
}

/// List container metrics of the matching pods
pub async fn list_pods(
    client: &ApiClient,
    namespace: Option<String>,
    pod_name: Option<String>,
    range: &RangeArgs,
    format: OutputFormat,
) -> Result<()> {
    let request = PodQuery {
        namespace,
        pod_name,
        query_condition: range.to_query_params(Utc::now(), Some(default_metrics_lookback()))?,
    };
    let pods = client.list_pod_metrics(&request).await?;

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            let rows: Vec<SeriesRow> = pods
                .iter()
                .flat_map(|pod| {
                    let entity = format!("{}/{}", pod.namespace, pod.pod_name);
                    pod.containers
                        .iter()
                        .flat_map(|container| {
                            series_rows(&entity, &container.container_name, &container.metrics)
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            print_rows(rows, "No pod metrics found");
        }
    }

    Ok(())
}

/// List node metrics; no names means every node
pub async fn list_nodes(
    client: &ApiClient,
    node_names: Vec<String>,
    range: &RangeArgs,
    format: OutputFormat,
) -> Result<()> {
    let request = NodeQuery {
        node_names,
        is_scheduled: None,
        query_condition: range.to_query_params(Utc::now(), Some(default_metrics_lookback()))?,
    };
    let nodes = client.list_node_metrics(&request).await?;

    match format {
        OutputFormat::Json => print_json(&nodes)?,
        OutputFormat::Table => {
            let rows: Vec<SeriesRow> = nodes
                .iter()
                .flat_map(|node| series_rows(&node.node_name, "-", &node.metrics))
                .collect();
            print_rows(rows, "No node metrics found");
        }
    }

    Ok(())
}
