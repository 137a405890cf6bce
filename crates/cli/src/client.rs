//! API client for communicating with the Datahub service

use anyhow::{Context, Result};
use datahub_lib::{
    aggregate::{NodeMetric, NodePrediction, PodMetric, PodPrediction},
    recommendation::{ContainerRecommendation, ContainerResources},
    HealthResponse, QueryParams,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the Datahub service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn list_pod_metrics(&self, request: &PodQuery) -> Result<Vec<PodMetric>> {
        let response: PodMetricsResponse = self.post("v1/metrics/pods", request).await?;
        Ok(response.pod_metrics)
    }

    pub async fn list_node_metrics(&self, request: &NodeQuery) -> Result<Vec<NodeMetric>> {
        let response: NodeMetricsResponse = self.post("v1/metrics/nodes", request).await?;
        Ok(response.node_metrics)
    }

    pub async fn list_pod_predictions(&self, request: &PodQuery) -> Result<Vec<PodPrediction>> {
        let response: PodPredictionsResponse =
            self.post("v1/predictions/pods/list", request).await?;
        Ok(response.pod_predictions)
    }

    pub async fn list_node_predictions(&self, request: &NodeQuery) -> Result<Vec<NodePrediction>> {
        let response: NodePredictionsResponse =
            self.post("v1/predictions/nodes/list", request).await?;
        Ok(response.node_predictions)
    }

    pub async fn list_pod_recommendations(
        &self,
        request: &PodQuery,
    ) -> Result<Vec<PodRecommendationView>> {
        let response: PodRecommendationsResponse =
            self.post("v1/recommendations/pods", request).await?;
        Ok(response.pod_recommendations)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("healthz").await
    }
}

// API request and response types

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_condition: Option<QueryParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeQuery {
    pub node_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_scheduled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_condition: Option<QueryParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsResponse {
    pub pod_metrics: Vec<PodMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetricsResponse {
    pub node_metrics: Vec<NodeMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodPredictionsResponse {
    pub pod_predictions: Vec<PodPrediction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePredictionsResponse {
    pub node_predictions: Vec<NodePrediction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRecommendationView {
    pub namespace: String,
    pub pod_name: String,
    #[serde(default)]
    pub container_recommendations: Vec<ContainerRecommendation>,
    #[serde(default)]
    pub applied_resources: Vec<ContainerResources>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodRecommendationsResponse {
    pub pod_recommendations: Vec<PodRecommendationView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
