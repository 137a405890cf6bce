//! Recommendation-related CLI commands

use anyhow::Result;
use chrono::Utc;
use tabled::Tabled;

use super::RangeArgs;
use crate::client::{ApiClient, PodQuery, PodRecommendationView};
use crate::output::{format_bytes, format_cpu, format_quantity, print_json, print_rows, OutputFormat};

/// Row for recommendations table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "CPU Req")]
    cpu_request: String,
    #[tabled(rename = "CPU Lim")]
    cpu_limit: String,
    #[tabled(rename = "Mem Req")]
    memory_request: String,
    #[tabled(rename = "Mem Lim")]
    memory_limit: String,
}

fn recommendation_rows(pods: &[PodRecommendationView]) -> Vec<RecommendationRow> {
    pods.iter()
        .flat_map(|pod| {
            pod.applied_resources.iter().map(move |container| {
                let resources = &container.resources;
                RecommendationRow {
                    namespace: pod.namespace.clone(),
                    pod: pod.pod_name.clone(),
                    container: container.name.clone(),
                    cpu_request: format_quantity(resources.requests.cpu, format_cpu),
                    cpu_limit: format_quantity(resources.limits.cpu, format_cpu),
                    memory_request: format_quantity(resources.requests.memory, format_bytes),
                    memory_limit: format_quantity(resources.limits.memory, format_bytes),
                }
            })
        })
        .collect()
}

/// Get recommendations with optional filters
pub async fn get_recommendations(
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
    let pods = client.list_pod_recommendations(&request).await?;

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            print_rows(recommendation_rows(&pods), "No recommendations found");
        }
    }

    Ok(())
}
