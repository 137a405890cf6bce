//! Prediction commands

use anyhow::Result;
use chrono::Utc;
use tabled::Tabled;

use super::metrics::series_rows;
use super::RangeArgs;
use crate::client::{ApiClient, NodeQuery, PodQuery};
use crate::output::{print_json, print_rows, OutputFormat};

/// Row for node predictions table
#[derive(Tabled)]
struct NodePredictionRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Scheduled")]
    scheduled: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Points")]
    points: usize,
    #[tabled(rename = "Last")]
    last: String,
    #[tabled(rename = "At")]
    at: String,
}

/// List container predictions of the matching pods
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
        query_condition: range.to_query_params(Utc::now(), None)?,
    };
    let pods = client.list_pod_predictions(&request).await?;

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            let rows: Vec<_> = pods
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
            print_rows(rows, "No pod predictions found");
        }
    }

    Ok(())
}

/// List node predictions, optionally for one scheduling state
pub async fn list_nodes(
    client: &ApiClient,
    node_names: Vec<String>,
    is_scheduled: Option<bool>,
    range: &RangeArgs,
    format: OutputFormat,
) -> Result<()> {
    let request = NodeQuery {
        node_names,
        is_scheduled,
        query_condition: range.to_query_params(Utc::now(), None)?,
    };
    let nodes = client.list_node_predictions(&request).await?;

    match format {
        OutputFormat::Json => print_json(&nodes)?,
        OutputFormat::Table => {
            let rows = nodes
                .iter()
                .flat_map(|node| {
                    series_rows(&node.node_name, "-", &node.predictions)
                        .into_iter()
                        .map(|series| NodePredictionRow {
                            node: series.entity,
                            scheduled: if node.is_scheduled { "yes" } else { "no" }.to_string(),
                            metric: series.metric,
                            points: series.samples,
                            last: series.latest,
                            at: series.at,
                        })
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            print_rows(rows, "No node predictions found");
        }
    }

    Ok(())
}

