use super::fanout::{Collector, Emitter};
use crate::aggregate::{ContainerMetric, NodeMetric, NodesMetricMap, PodsMetricMap, Shape};
use crate::error::{DatahubError, Result};
use crate::models::{MetricSet, PodFilter};
use crate::observability::StructuredLogger;
use crate::query::QueryCondition;
use crate::source::{MetricSource, MetricsBackend};
use std::sync::Arc;
use std::time::Instant;

const POD_LABEL_NAMESPACE: &str = "namespace";
const POD_LABEL_POD_NAME: &str = "pod_name";
const POD_LABEL_CONTAINER_NAME: &str = "container_name";
const NODE_LABEL: &str = "node";

/// Observed metrics read from the metrics backend
#[derive(Clone)]
pub struct MetricsDao {
    backend: Arc<dyn MetricsBackend>,
    collector: Collector,
    logger: StructuredLogger,
}

impl MetricsDao {
    pub fn new(
        backend: Arc<dyn MetricsBackend>,
        collector: Collector,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            backend,
            collector,
            logger,
        }
    }

    /// Container CPU and memory series for the pods matching `filter`
    pub async fn list_pod_metrics(
        &self,
        filter: PodFilter,
        condition: &QueryCondition,
    ) -> Result<PodsMetricMap> {
        let operation = "list_pod_metrics";
        let started = Instant::now();
        self.logger.log_query_started(operation, 1);

        let backend = Arc::clone(&self.backend);
        let condition = *condition;
        let result = self
            .collector
            .fan_out(
                vec![filter],
                move |filter, emitter| pod_worker(Arc::clone(&backend), filter, condition, emitter),
                |pods: &mut PodsMetricMap, container| pods.add_container_metric(container),
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

    /// Node CPU and memory series; an empty list queries every node at once
    pub async fn list_node_metrics(
        &self,
        node_names: &[String],
        condition: &QueryCondition,
    ) -> Result<NodesMetricMap> {
        let operation = "list_node_metrics";
        let started = Instant::now();
        let targets = node_targets(node_names);
        self.logger.log_query_started(operation, targets.len());

        let backend = Arc::clone(&self.backend);
        let condition = *condition;
        let result = self
            .collector
            .fan_out(
                targets,
                move |node, emitter| node_worker(Arc::clone(&backend), node, condition, emitter),
                |nodes: &mut NodesMetricMap, node| nodes.add_node_metric(node),
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
}

/// One target per node name, or a single wildcard when none are given
pub(crate) fn node_targets(node_names: &[String]) -> Vec<Option<String>> {
    if node_names.is_empty() {
        return vec![None];
    }
    node_names.iter().cloned().map(Some).collect()
}

async fn pod_worker(
    backend: Arc<dyn MetricsBackend>,
    filter: PodFilter,
    condition: QueryCondition,
    emitter: Emitter<ContainerMetric>,
) -> Result<()> {
    for source in MetricSource::CONTAINER {
        let series = backend
            .query_range(
                &source.pod_expression(&filter),
                condition.start_time,
                condition.end_time,
                condition.step,
            )
            .await
            .map_err(|e| DatahubError::from_upstream(filter.to_string(), source.name(), e))?;

        for series in series {
            if series.samples.is_empty() {
                continue;
            }
            let namespace = series.label(POD_LABEL_NAMESPACE).to_string();
            let pod_name = series.label(POD_LABEL_POD_NAME).to_string();
            let container_name = series.label(POD_LABEL_CONTAINER_NAME).to_string();
            emitter.emit(ContainerMetric::new(
                namespace,
                pod_name,
                container_name,
                MetricSet::with_series(source.metric_type(), series.samples),
            ))?;
        }
    }
    Ok(())
}

async fn node_worker(
    backend: Arc<dyn MetricsBackend>,
    node: Option<String>,
    condition: QueryCondition,
    emitter: Emitter<NodeMetric>,
) -> Result<()> {
    let entity = node.as_deref().unwrap_or("*");

    for source in MetricSource::NODE {
        let series = backend
            .query_range(
                &source.node_expression(node.as_deref()),
                condition.start_time,
                condition.end_time,
                condition.step,
            )
            .await
            .map_err(|e| DatahubError::from_upstream(entity, source.name(), e))?;

        for series in series {
            if series.samples.is_empty() {
                continue;
            }
            let node_name = match series.labels.get(NODE_LABEL) {
                Some(name) => name.clone(),
                None => node.clone().unwrap_or_default(),
            };
            emitter.emit(NodeMetric::new(
                node_name,
                MetricSet::with_series(source.metric_type(), series.samples),
            ))?;
        }
    }
    Ok(())
}
