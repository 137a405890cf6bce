use super::fanout::{Collector, Emitter};
use super::influxql::{prediction_window, SelectStatement};
use super::metrics::node_targets;
use crate::aggregate::{
    ContainerPrediction, NodePrediction, NodesPredictionMap, PodsPredictionMap, Shape,
};
use crate::error::{DatahubError, Result};
use crate::models::{MetricSet, MetricType, PodFilter, Sample};
use crate::observability::StructuredLogger;
use crate::query::QueryCondition;
use crate::source::{FieldValue, Point, Row, TimeSeriesStore, PREDICTION_DATABASE};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const CONTAINER_MEASUREMENT: &str = "container";
const NODE_MEASUREMENT: &str = "node";

const TAG_NAMESPACE: &str = "namespace";
const TAG_POD_NAME: &str = "pod_name";
const TAG_NAME: &str = "name";
const TAG_METRIC: &str = "metric";
const TAG_IS_SCHEDULED: &str = "is_scheduled";
const FIELD_VALUE: &str = "value";

/// Predicted usage stored in the time-series store
#[derive(Clone)]
pub struct PredictionDao {
    store: Arc<dyn TimeSeriesStore>,
    collector: Collector,
    logger: StructuredLogger,
}

impl PredictionDao {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        collector: Collector,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            collector,
            logger,
        }
    }

    pub async fn list_pod_predictions(
        &self,
        filter: PodFilter,
        condition: &QueryCondition,
    ) -> Result<PodsPredictionMap> {
        let operation = "list_pod_predictions";
        let started = Instant::now();
        self.logger.log_query_started(operation, 1);

        let store = Arc::clone(&self.store);
        let condition = *condition;
        let result = self
            .collector
            .fan_out(
                vec![filter],
                move |filter, emitter| pod_worker(Arc::clone(&store), filter, condition, emitter),
                |pods: &mut PodsPredictionMap, container| pods.add_container_metric(container),
            )
            .await;

        match result {
            Ok(mut pods) => {
                pods.shape(&condition);
                self.logger.log_query_completed(
                    operation,
                    pods.len(),
                    pods.sample_count(),
                    started.elapsed().as_millis(),
                );
                Ok(pods)
            }
            Err(err) => {
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }

    /// Node predictions, optionally narrowed to one scheduling state
    pub async fn list_node_predictions(
        &self,
        node_names: &[String],
        is_scheduled: Option<bool>,
        condition: &QueryCondition,
    ) -> Result<NodesPredictionMap> {
        let operation = "list_node_predictions";
        let started = Instant::now();
        let targets = node_targets(node_names);
        self.logger.log_query_started(operation, targets.len());

        let store = Arc::clone(&self.store);
        let condition = *condition;
        let result = self
            .collector
            .fan_out(
                targets,
                move |node, emitter| {
                    node_worker(Arc::clone(&store), node, is_scheduled, condition, emitter)
                },
                |nodes: &mut NodesPredictionMap, prediction| nodes.add_node_prediction(prediction),
            )
            .await;

        match result {
            Ok(mut nodes) => {
                nodes.shape(&condition);
                self.logger.log_query_completed(
                    operation,
                    nodes.len(),
                    nodes.sample_count(),
                    started.elapsed().as_millis(),
                );
                Ok(nodes)
            }
            Err(err) => {
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }

    /// Store container predictions, one point per sample; returns the point count
    pub async fn create_container_predictions(
        &self,
        predictions: &[ContainerPrediction],
    ) -> Result<usize> {
        let points: Vec<Point> = predictions
            .iter()
            .flat_map(|prediction| {
                prediction.metrics.iter().flat_map(move |(metric_type, samples)| {
                    samples.iter().map(move |sample| {
                        Point::new(CONTAINER_MEASUREMENT, sample.timestamp)
                            .tag(TAG_NAMESPACE, prediction.namespace.as_str())
                            .tag(TAG_POD_NAME, prediction.pod_name.as_str())
                            .tag(TAG_NAME, prediction.container_name.as_str())
                            .tag(TAG_METRIC, metric_type.as_str())
                            .field(FIELD_VALUE, FieldValue::String(sample.value.clone()))
                    })
                })
            })
            .collect();

        self.write("create_container_predictions", points).await
    }

    /// Store node predictions, one point per sample; returns the point count
    pub async fn create_node_predictions(&self, predictions: &[NodePrediction]) -> Result<usize> {
        let points: Vec<Point> = predictions
            .iter()
            .flat_map(|prediction| {
                prediction
                    .predictions
                    .iter()
                    .flat_map(move |(metric_type, samples)| {
                        samples.iter().map(move |sample| {
                            Point::new(NODE_MEASUREMENT, sample.timestamp)
                                .tag(TAG_NAME, prediction.node_name.as_str())
                                .tag(TAG_METRIC, metric_type.as_str())
                                .tag(TAG_IS_SCHEDULED, prediction.is_scheduled.to_string())
                                .field(FIELD_VALUE, FieldValue::String(sample.value.clone()))
                        })
                    })
            })
            .collect();

        self.write("create_node_predictions", points).await
    }

    async fn write(&self, operation: &str, points: Vec<Point>) -> Result<usize> {
        let count = points.len();
        match self.store.write_points(PREDICTION_DATABASE, &points).await {
            Ok(()) => {
                self.logger
                    .log_points_written(operation, PREDICTION_DATABASE, count);
                Ok(count)
            }
            Err(e) => {
                let err = DatahubError::from_upstream(PREDICTION_DATABASE, operation, e);
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }
}

/// Sample carried by one prediction row, if it has a time and a value
fn row_sample(row: &Row) -> Option<Sample> {
    let (Some(timestamp), Some(value)) = (row.time(), row.get(FIELD_VALUE)) else {
        debug!(?row, "Skipping prediction row without time or value");
        return None;
    };
    Some(Sample::new(timestamp, value))
}

async fn pod_worker(
    store: Arc<dyn TimeSeriesStore>,
    filter: PodFilter,
    condition: QueryCondition,
    emitter: Emitter<ContainerPrediction>,
) -> Result<()> {
    for metric_type in MetricType::ALL {
        let statement = SelectStatement::from(CONTAINER_MEASUREMENT)
            .tag_eq_opt(TAG_NAMESPACE, filter.namespace.as_deref())
            .tag_eq_opt(TAG_POD_NAME, filter.pod_name.as_deref())
            .tag_eq(TAG_METRIC, metric_type.as_str());
        let query = prediction_window(statement, &condition, Utc::now()).build();

        let rows = store
            .query(&query, PREDICTION_DATABASE)
            .await
            .map_err(|e| {
                DatahubError::from_upstream(
                    filter.to_string(),
                    format!("container_{}", metric_type),
                    e,
                )
            })?;

        // Rows of one container keep their query order
        let mut containers: BTreeMap<(String, String, String), Vec<Sample>> = BTreeMap::new();
        for row in &rows {
            let Some(sample) = row_sample(row) else {
                continue;
            };
            let key = (
                row.get(TAG_NAMESPACE).unwrap_or_default().to_string(),
                row.get(TAG_POD_NAME).unwrap_or_default().to_string(),
                row.get(TAG_NAME).unwrap_or_default().to_string(),
            );
            containers.entry(key).or_default().push(sample);
        }

        for ((namespace, pod_name, container_name), samples) in containers {
            emitter.emit(ContainerPrediction::new(
                namespace,
                pod_name,
                container_name,
                MetricSet::with_series(metric_type, samples),
            ))?;
        }
    }
    Ok(())
}

async fn node_worker(
    store: Arc<dyn TimeSeriesStore>,
    node: Option<String>,
    is_scheduled: Option<bool>,
    condition: QueryCondition,
    emitter: Emitter<NodePrediction>,
) -> Result<()> {
    let entity = node.as_deref().unwrap_or("*");
    let scheduled_tag = is_scheduled.map(|flag| flag.to_string());

    for metric_type in MetricType::ALL {
        let statement = SelectStatement::from(NODE_MEASUREMENT)
            .tag_eq_opt(TAG_NAME, node.as_deref())
            .tag_eq_opt(TAG_IS_SCHEDULED, scheduled_tag.as_deref())
            .tag_eq(TAG_METRIC, metric_type.as_str());
        let query = prediction_window(statement, &condition, Utc::now()).build();

        let rows = store
            .query(&query, PREDICTION_DATABASE)
            .await
            .map_err(|e| DatahubError::from_upstream(entity, format!("node_{}", metric_type), e))?;

        let mut partitions: BTreeMap<(String, bool), Vec<Sample>> = BTreeMap::new();
        for row in &rows {
            let Some(sample) = row_sample(row) else {
                continue;
            };
            let node_name = row
                .get(TAG_NAME)
                .map(str::to_string)
                .or_else(|| node.clone())
                .unwrap_or_default();
            let scheduled = row.get(TAG_IS_SCHEDULED) == Some("true");
            partitions.entry((node_name, scheduled)).or_default().push(sample);
        }

        for ((node_name, scheduled), samples) in partitions {
            emitter.emit(NodePrediction::new(
                node_name,
                scheduled,
                MetricSet::with_series(metric_type, samples),
            ))?;
        }
    }
    Ok(())
}
