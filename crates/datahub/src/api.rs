//! HTTP API for queries, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use datahub_lib::{
    aggregate::{
        ContainerPrediction, NodePrediction, NodesMetricMap, NodesPredictionMap, PodsMetricMap,
        PodsPredictionMap,
    },
    cluster::{NamespacedName, Node, NodeUpdate, Pod, PodUpdate, SimulatedSchedulingScore},
    health::{components, ComponentStatus, HealthRegistry},
    observability::DatahubMetrics,
    recommendation::{ContainerResources, PodRecommendation},
    Daos, DatahubError, PodFilter, QueryCondition, QueryParams,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub daos: Daos,
    pub health_registry: HealthRegistry,
    pub metrics: DatahubMetrics,
}

impl AppState {
    pub fn new(daos: Daos, health_registry: HealthRegistry, metrics: DatahubMetrics) -> Self {
        Self {
            daos,
            health_registry,
            metrics,
        }
    }

    /// Run one engine operation, recording its duration, outcome and size
    async fn run<T, Fut>(
        &self,
        operation: &str,
        component: &str,
        size: impl Fn(&T) -> (usize, usize),
        call: Fut,
    ) -> Result<T, ApiError>
    where
        Fut: Future<Output = datahub_lib::error::Result<T>>,
    {
        let started = Instant::now();
        let outcome = call.await;
        self.metrics
            .observe_query_duration(operation, started.elapsed().as_secs_f64());
        self.health_registry.observe(component, &outcome).await;

        match outcome {
            Ok(value) => {
                let (entities, samples) = size(&value);
                self.metrics.record_result(operation, entities, samples);
                Ok(value)
            }
            Err(err) => {
                self.metrics.inc_query_error(operation, &err);
                Err(ApiError(err))
            }
        }
    }
}

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub DatahubError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DatahubError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            DatahubError::QueryConditionExceedsMaximum(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string())
            }
            DatahubError::Upstream { .. } | DatahubError::Internal(_) => {
                error!(error = %self.0, kind = self.0.kind(), "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Pod-scoped list request
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PodRequest {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub pod_name: Option<String>,
    #[serde(default)]
    pub query_condition: Option<QueryParams>,
}

impl PodRequest {
    fn filter(&self) -> PodFilter {
        PodFilter::new(self.namespace.clone(), self.pod_name.clone())
    }
}

/// Node-scoped list request; no names means every node
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeRequest {
    #[serde(default)]
    pub node_names: Vec<String>,
    #[serde(default)]
    pub is_scheduled: Option<bool>,
    #[serde(default)]
    pub query_condition: Option<QueryParams>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateContainerPredictionsRequest {
    #[serde(default)]
    pub container_predictions: Vec<ContainerPrediction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateNodePredictionsRequest {
    #[serde(default)]
    pub node_predictions: Vec<NodePrediction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePodRecommendationsRequest {
    #[serde(default)]
    pub pod_recommendations: Vec<PodRecommendation>,
}

/// Stored pods, optionally narrowed to one scaler
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListPodsRequest {
    #[serde(default)]
    pub scaler: Option<NamespacedName>,
    #[serde(default)]
    pub is_predicted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePodsRequest {
    #[serde(default)]
    pub pods: Vec<Pod>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePodsRequest {
    #[serde(default)]
    pub pods: Vec<PodUpdate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletePodsRequest {
    #[serde(default)]
    pub pods: Vec<NamespacedName>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListNodesRequest {
    #[serde(default)]
    pub is_predicted: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateNodesRequest {
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateNodesRequest {
    #[serde(default)]
    pub nodes: Vec<NodeUpdate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteNodesRequest {
    #[serde(default)]
    pub node_names: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListScoresRequest {
    #[serde(default)]
    pub query_condition: Option<QueryParams>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateScoresRequest {
    #[serde(default)]
    pub scores: Vec<SimulatedSchedulingScore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodsResponse {
    pub pods: Vec<Pod>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodesResponse {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoresResponse {
    pub scores: Vec<SimulatedSchedulingScore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodMetricsResponse {
    pub pod_metrics: PodsMetricMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeMetricsResponse {
    pub node_metrics: NodesMetricMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodPredictionsResponse {
    pub pod_predictions: PodsPredictionMap,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodePredictionsResponse {
    pub node_predictions: NodesPredictionMap,
}

/// A stored recommendation plus the resources it resolves to
#[derive(Debug, Serialize, Deserialize)]
pub struct PodRecommendationView {
    #[serde(flatten)]
    pub recommendation: PodRecommendation,
    pub applied_resources: Vec<ContainerResources>,
}

impl From<PodRecommendation> for PodRecommendationView {
    fn from(recommendation: PodRecommendation) -> Self {
        let applied_resources = recommendation
            .container_recommendations
            .iter()
            .map(|container| ContainerResources {
                name: container.name.clone(),
                resources: container.applied_resources(),
            })
            .collect();
        Self {
            recommendation,
            applied_resources,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PodRecommendationsResponse {
    pub pod_recommendations: Vec<PodRecommendationView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub points_written: usize,
}

async fn list_pod_metrics(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PodRequest>,
) -> Result<Json<PodMetricsResponse>, ApiError> {
    let pod_metrics = state
        .run(
            "list_pod_metrics",
            components::METRICS_BACKEND,
            |pods: &PodsMetricMap| (pods.len(), pods.sample_count()),
            async {
                QueryParams::validate_time_range(request.query_condition.as_ref())?;
                let condition = QueryCondition::normalize(request.query_condition.as_ref());
                state
                    .daos
                    .metrics
                    .list_pod_metrics(request.filter(), &condition)
                    .await
            },
        )
        .await?;

    Ok(Json(PodMetricsResponse { pod_metrics }))
}

async fn list_node_metrics(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NodeRequest>,
) -> Result<Json<NodeMetricsResponse>, ApiError> {
    let node_metrics = state
        .run(
            "list_node_metrics",
            components::METRICS_BACKEND,
            |nodes: &NodesMetricMap| (nodes.len(), nodes.sample_count()),
            async {
                QueryParams::validate_time_range(request.query_condition.as_ref())?;
                let condition = QueryCondition::normalize(request.query_condition.as_ref());
                state
                    .daos
                    .metrics
                    .list_node_metrics(&request.node_names, &condition)
                    .await
            },
        )
        .await?;

    Ok(Json(NodeMetricsResponse { node_metrics }))
}

async fn list_pod_predictions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PodRequest>,
) -> Result<Json<PodPredictionsResponse>, ApiError> {
    let condition = QueryCondition::normalize(request.query_condition.as_ref());
    let pod_predictions = state
        .run(
            "list_pod_predictions",
            components::TIMESERIES_STORE,
            |pods: &PodsPredictionMap| (pods.len(), pods.sample_count()),
            state
                .daos
                .predictions
                .list_pod_predictions(request.filter(), &condition),
        )
        .await?;

    Ok(Json(PodPredictionsResponse { pod_predictions }))
}

async fn list_node_predictions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NodeRequest>,
) -> Result<Json<NodePredictionsResponse>, ApiError> {
    let condition = QueryCondition::normalize(request.query_condition.as_ref());
    let node_predictions = state
        .run(
            "list_node_predictions",
            components::TIMESERIES_STORE,
            |nodes: &NodesPredictionMap| (nodes.len(), nodes.sample_count()),
            state.daos.predictions.list_node_predictions(
                &request.node_names,
                request.is_scheduled,
                &condition,
            ),
        )
        .await?;

    Ok(Json(NodePredictionsResponse { node_predictions }))
}

async fn create_container_predictions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateContainerPredictionsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "create_container_predictions",
            components::TIMESERIES_STORE,
            |points: &usize| (request.container_predictions.len(), *points),
            state
                .daos
                .predictions
                .create_container_predictions(&request.container_predictions),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn create_node_predictions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNodePredictionsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "create_node_predictions",
            components::TIMESERIES_STORE,
            |points: &usize| (request.node_predictions.len(), *points),
            state
                .daos
                .predictions
                .create_node_predictions(&request.node_predictions),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn list_pod_recommendations(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PodRequest>,
) -> Result<Json<PodRecommendationsResponse>, ApiError> {
    let condition = QueryCondition::normalize(request.query_condition.as_ref());
    let filter = request.filter();
    let recommendations = state
        .run(
            "list_pod_recommendations",
            components::TIMESERIES_STORE,
            |pods: &Vec<PodRecommendation>| {
                let containers = pods.iter().map(|p| p.container_recommendations.len()).sum();
                (pods.len(), containers)
            },
            state
                .daos
                .recommendations
                .list_pod_recommendations(&filter, &condition),
        )
        .await?;

    Ok(Json(PodRecommendationsResponse {
        pod_recommendations: recommendations.into_iter().map(Into::into).collect(),
    }))
}

async fn create_pod_recommendations(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePodRecommendationsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "create_pod_recommendations",
            components::TIMESERIES_STORE,
            |points: &usize| (request.pod_recommendations.len(), *points),
            state
                .daos
                .recommendations
                .create_pod_recommendations(&request.pod_recommendations),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn list_pods(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListPodsRequest>,
) -> Result<Json<PodsResponse>, ApiError> {
    let pods = state
        .run(
            "list_pods",
            components::TIMESERIES_STORE,
            |pods: &Vec<Pod>| {
                let containers = pods.iter().map(|p| p.containers.len()).sum();
                (pods.len(), containers)
            },
            state
                .daos
                .cluster_status
                .list_pods(request.scaler.as_ref(), request.is_predicted),
        )
        .await?;

    Ok(Json(PodsResponse { pods }))
}

async fn create_pods(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePodsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "create_pods",
            components::TIMESERIES_STORE,
            |points: &usize| (request.pods.len(), *points),
            state.daos.cluster_status.create_pods(&request.pods),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn update_pods(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdatePodsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "update_pods",
            components::TIMESERIES_STORE,
            |points: &usize| (request.pods.len(), *points),
            state.daos.cluster_status.update_pods(&request.pods),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn delete_pods(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeletePodsRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "delete_pods",
            components::TIMESERIES_STORE,
            |points: &usize| (request.pods.len(), *points),
            state.daos.cluster_status.delete_pods(&request.pods),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn list_nodes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListNodesRequest>,
) -> Result<Json<NodesResponse>, ApiError> {
    let nodes = state
        .run(
            "list_nodes",
            components::TIMESERIES_STORE,
            |nodes: &Vec<Node>| (nodes.len(), nodes.len()),
            state.daos.cluster_status.list_nodes(request.is_predicted),
        )
        .await?;

    Ok(Json(NodesResponse { nodes }))
}

async fn create_nodes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateNodesRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "create_nodes",
            components::TIMESERIES_STORE,
            |points: &usize| (request.nodes.len(), *points),
            state.daos.cluster_status.create_nodes(&request.nodes),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn update_nodes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateNodesRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "update_nodes",
            components::TIMESERIES_STORE,
            |points: &usize| (request.nodes.len(), *points),
            state.daos.cluster_status.update_nodes(&request.nodes),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn delete_nodes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteNodesRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "delete_nodes",
            components::TIMESERIES_STORE,
            |points: &usize| (request.node_names.len(), *points),
            state.daos.cluster_status.delete_nodes(&request.node_names),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

async fn list_scores(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListScoresRequest>,
) -> Result<Json<ScoresResponse>, ApiError> {
    // Scores take open ranges; a missing bound reads to the end of the series
    let condition = QueryCondition::normalize(request.query_condition.as_ref());
    let scores = state
        .run(
            "list_simulated_scheduling_scores",
            components::TIMESERIES_STORE,
            |scores: &Vec<SimulatedSchedulingScore>| (scores.len(), scores.len()),
            state
                .daos
                .scores
                .list_simulated_scheduling_scores(&condition),
        )
        .await?;

    Ok(Json(ScoresResponse { scores }))
}

async fn create_scores(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateScoresRequest>,
) -> Result<Json<WriteResponse>, ApiError> {
    let points_written = state
        .run(
            "create_simulated_scheduling_scores",
            components::TIMESERIES_STORE,
            |points: &usize| (request.scores.len(), *points),
            state
                .daos
                .scores
                .create_simulated_scheduling_scores(&request.scores),
        )
        .await?;

    Ok(Json(WriteResponse { points_written }))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        // Degraded upstreams still serve some queries
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/metrics/pods", post(list_pod_metrics))
        .route("/v1/metrics/nodes", post(list_node_metrics))
        .route("/v1/predictions/pods/list", post(list_pod_predictions))
        .route("/v1/predictions/nodes/list", post(list_node_predictions))
        .route("/v1/predictions/pods", post(create_container_predictions))
        .route("/v1/predictions/nodes", post(create_node_predictions))
        .route("/v1/recommendations/pods", post(list_pod_recommendations))
        .route(
            "/v1/recommendations/pods/create",
            post(create_pod_recommendations),
        )
        .route("/v1/cluster/pods/list", post(list_pods))
        .route("/v1/cluster/pods", post(create_pods))
        .route("/v1/cluster/pods/update", post(update_pods))
        .route("/v1/cluster/pods/delete", post(delete_pods))
        .route("/v1/cluster/nodes/list", post(list_nodes))
        .route("/v1/cluster/nodes", post(create_nodes))
        .route("/v1/cluster/nodes/update", post(update_nodes))
        .route("/v1/cluster/nodes/delete", post(delete_nodes))
        .route("/v1/scores/list", post(list_scores))
        .route("/v1/scores", post(create_scores))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
