use super::influxql::SelectStatement;
use crate::error::{DatahubError, Result};
use crate::models::{MetricSet, MetricType, PodFilter, Sample};
use crate::observability::StructuredLogger;
use crate::query::QueryCondition;
use crate::recommendation::{ContainerRecommendation, PodRecommendation};
use crate::reduce::parse_value;
use crate::source::{FieldValue, Point, Row, TimeSeriesStore, RECOMMENDATION_DATABASE};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const MEASUREMENT: &str = "container";

const TAG_NAMESPACE: &str = "namespace";
const TAG_POD_NAME: &str = "pod_name";
const TAG_NAME: &str = "name";

/// Which recommendation series a column feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Series {
    Limit,
    Request,
    InitialLimit,
    InitialRequest,
}

/// Field columns of the recommendation measurement
const COLUMNS: [(&str, Series, MetricType); 8] = [
    ("resource_limit_cpu", Series::Limit, MetricType::CpuUsageSecondsPercentage),
    ("resource_limit_memory", Series::Limit, MetricType::MemoryUsageBytes),
    ("resource_request_cpu", Series::Request, MetricType::CpuUsageSecondsPercentage),
    ("resource_request_memory", Series::Request, MetricType::MemoryUsageBytes),
    ("initial_resource_limit_cpu", Series::InitialLimit, MetricType::CpuUsageSecondsPercentage),
    ("initial_resource_limit_memory", Series::InitialLimit, MetricType::MemoryUsageBytes),
    ("initial_resource_request_cpu", Series::InitialRequest, MetricType::CpuUsageSecondsPercentage),
    ("initial_resource_request_memory", Series::InitialRequest, MetricType::MemoryUsageBytes),
];

fn series_mut(container: &mut ContainerRecommendation, series: Series) -> &mut MetricSet {
    match series {
        Series::Limit => &mut container.limit_recommendations,
        Series::Request => &mut container.request_recommendations,
        Series::InitialLimit => &mut container.initial_limit_recommendations,
        Series::InitialRequest => &mut container.initial_request_recommendations,
    }
}

fn series_ref(container: &ContainerRecommendation, series: Series) -> &MetricSet {
    match series {
        Series::Limit => &container.limit_recommendations,
        Series::Request => &container.request_recommendations,
        Series::InitialLimit => &container.initial_limit_recommendations,
        Series::InitialRequest => &container.initial_request_recommendations,
    }
}

/// Resource recommendations stored in the time-series store
#[derive(Clone)]
pub struct RecommendationDao {
    store: Arc<dyn TimeSeriesStore>,
    logger: StructuredLogger,
}

impl RecommendationDao {
    pub fn new(store: Arc<dyn TimeSeriesStore>, logger: StructuredLogger) -> Self {
        Self { store, logger }
    }

    /// Recommendations grouped per pod, in the order pods first appear
    pub async fn list_pod_recommendations(
        &self,
        filter: &PodFilter,
        condition: &QueryCondition,
    ) -> Result<Vec<PodRecommendation>> {
        let operation = "list_pod_recommendations";
        let started = Instant::now();
        self.logger.log_query_started(operation, 1);

        let mut statement = SelectStatement::from(MEASUREMENT)
            .tag_eq_opt(TAG_NAMESPACE, filter.namespace.as_deref())
            .tag_eq_opt(TAG_POD_NAME, filter.pod_name.as_deref());
        if let Some(start) = condition.start_time {
            statement = statement.time_after(start, true);
        }
        if let Some(end) = condition.end_time {
            statement = statement.time_until(end);
        }
        let query = statement
            .group_by(&format!(
                "\"{}\",\"{}\",\"{}\"",
                TAG_NAME, TAG_NAMESPACE, TAG_POD_NAME
            ))
            .order(condition.order)
            .limit(condition.limit)
            .build();

        let rows = match self.store.query(&query, RECOMMENDATION_DATABASE).await {
            Ok(rows) => rows,
            Err(e) => {
                let err = DatahubError::from_upstream(filter.to_string(), operation, e);
                self.logger.log_query_failed(operation, &err);
                return Err(err);
            }
        };

        let pods = group_rows(&rows);
        let samples = pods
            .iter()
            .flat_map(|pod| &pod.container_recommendations)
            .map(|container| {
                COLUMNS
                    .iter()
                    .map(|(_, series, metric_type)| {
                        series_ref(container, *series)
                            .get(*metric_type)
                            .map_or(0, <[Sample]>::len)
                    })
                    .sum::<usize>()
            })
            .sum();
        self.logger.log_query_completed(
            operation,
            pods.len(),
            samples,
            started.elapsed().as_millis(),
        );

        Ok(pods)
    }

    /// Store recommendations, one point per sample; returns the point count
    ///
    /// Samples whose value is not numeric are skipped.
    pub async fn create_pod_recommendations(
        &self,
        recommendations: &[PodRecommendation],
    ) -> Result<usize> {
        let operation = "create_pod_recommendations";
        let mut points = Vec::new();

        for pod in recommendations {
            for container in &pod.container_recommendations {
                for (column, series, metric_type) in COLUMNS {
                    let Some(samples) = series_ref(container, series).get(metric_type) else {
                        continue;
                    };
                    for sample in samples {
                        let Some(value) = parse_value(&sample.value) else {
                            debug!(
                                pod = %pod.identity(),
                                container = %container.name,
                                column,
                                value = %sample.value,
                                "Skipping non-numeric recommendation"
                            );
                            continue;
                        };
                        points.push(
                            Point::new(MEASUREMENT, sample.timestamp)
                                .tag(TAG_NAMESPACE, pod.namespace.as_str())
                                .tag(TAG_POD_NAME, pod.pod_name.as_str())
                                .tag(TAG_NAME, container.name.as_str())
                                .field(column, FieldValue::Integer(value)),
                        );
                    }
                }
            }
        }

        let count = points.len();
        match self.store.write_points(RECOMMENDATION_DATABASE, &points).await {
            Ok(()) => {
                self.logger
                    .log_points_written(operation, RECOMMENDATION_DATABASE, count);
                Ok(count)
            }
            Err(e) => {
                let err = DatahubError::from_upstream(RECOMMENDATION_DATABASE, operation, e);
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }
}

/// Fold recommendation rows into pods and containers
///
/// Pods and containers keep the order in which they first appear.
fn group_rows(rows: &[Row]) -> Vec<PodRecommendation> {
    let mut pods: Vec<PodRecommendation> = Vec::new();
    let mut pod_slots: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    let mut container_slots: BTreeMap<(usize, &str), usize> = BTreeMap::new();

    for row in rows {
        let Some(timestamp) = row.time() else {
            debug!(?row, "Skipping recommendation row without time");
            continue;
        };
        let namespace = row.get(TAG_NAMESPACE).unwrap_or_default();
        let pod_name = row.get(TAG_POD_NAME).unwrap_or_default();
        let name = row.get(TAG_NAME).unwrap_or_default();

        let pod_slot = *pod_slots.entry((namespace, pod_name)).or_insert_with(|| {
            pods.push(PodRecommendation::new(namespace, pod_name));
            pods.len() - 1
        });
        let pod = &mut pods[pod_slot];

        let container_slot = *container_slots.entry((pod_slot, name)).or_insert_with(|| {
            pod.container_recommendations
                .push(ContainerRecommendation::new(name));
            pod.container_recommendations.len() - 1
        });
        let container = &mut pod.container_recommendations[container_slot];

        for (column, series, metric_type) in COLUMNS {
            if let Some(value) = row.get(column) {
                series_mut(container, series)
                    .append(metric_type, vec![Sample::new(timestamp, value)]);
            }
        }
    }

    pods
}
