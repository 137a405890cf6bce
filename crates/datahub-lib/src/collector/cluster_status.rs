use super::influxql::SelectStatement;
use crate::cluster::{NamespacedName, Node, NodeUpdate, Pod, PodUpdate};
use crate::error::{DatahubError, Result};
use crate::observability::StructuredLogger;
use crate::query::Order;
use crate::recommendation::{ContainerResources, ResourceList};
use crate::reduce::parse_value;
use crate::source::{FieldValue, Point, Row, TimeSeriesStore, CLUSTER_STATUS_DATABASE};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const CONTAINER_MEASUREMENT: &str = "container";
const NODE_MEASUREMENT: &str = "node";

const TAG_NAMESPACE: &str = "namespace";
const TAG_POD_NAME: &str = "pod_name";
const TAG_SCALER_NAMESPACE: &str = "scaler_namespace";
const TAG_SCALER_NAME: &str = "scaler_name";
const TAG_NODE_NAME: &str = "node_name";
const TAG_NAME: &str = "name";

const FIELD_RESOURCE_REQUEST_CPU: &str = "resource_request_cpu";
const FIELD_RESOURCE_REQUEST_MEMORY: &str = "resource_request_memory";
const FIELD_RESOURCE_LIMIT_CPU: &str = "resource_limit_cpu";
const FIELD_RESOURCE_LIMIT_MEMORY: &str = "resource_limit_memory";
const FIELD_IS_PREDICTED: &str = "is_predicted";
const FIELD_IS_DELETED: &str = "is_deleted";
const FIELD_POLICY: &str = "policy";
const FIELD_POD_CREATE_TIME: &str = "pod_create_time";
const FIELD_GROUP: &str = "group";
const FIELD_IN_CLUSTER: &str = "in_cluster";

#[derive(Debug, Clone, Copy)]
enum Kind {
    Boolean,
    Integer,
    Text,
}

const CONTAINER_TAGS: [&str; 6] = [
    TAG_NAMESPACE,
    TAG_POD_NAME,
    TAG_SCALER_NAMESPACE,
    TAG_SCALER_NAME,
    TAG_NODE_NAME,
    TAG_NAME,
];

const CONTAINER_FIELDS: [(&str, Kind); 8] = [
    (FIELD_RESOURCE_REQUEST_CPU, Kind::Integer),
    (FIELD_RESOURCE_REQUEST_MEMORY, Kind::Integer),
    (FIELD_RESOURCE_LIMIT_CPU, Kind::Integer),
    (FIELD_RESOURCE_LIMIT_MEMORY, Kind::Integer),
    (FIELD_IS_PREDICTED, Kind::Boolean),
    (FIELD_IS_DELETED, Kind::Boolean),
    (FIELD_POLICY, Kind::Text),
    (FIELD_POD_CREATE_TIME, Kind::Integer),
];

const NODE_TAGS: [&str; 1] = [TAG_NAME];

const NODE_FIELDS: [(&str, Kind); 3] = [
    (FIELD_GROUP, Kind::Text),
    (FIELD_IN_CLUSTER, Kind::Boolean),
    (FIELD_IS_PREDICTED, Kind::Boolean),
];

/// Status records are written at the epoch so a later write of the same
/// series replaces the earlier one
fn status_time() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Rebuild the stored point behind a row so selected fields can be rewritten
fn row_to_point(
    measurement: &str,
    row: &Row,
    tags: &[&str],
    fields: &[(&str, Kind)],
) -> Option<Point> {
    let Some(time) = row.time() else {
        debug!(?row, "Skipping status row without time");
        return None;
    };

    let mut point = Point::new(measurement, time);
    for tag in tags {
        if let Some(value) = row.get(tag) {
            point = point.tag(*tag, value);
        }
    }
    for (field, kind) in fields {
        let Some(raw) = row.get(field) else {
            continue;
        };
        let value = match kind {
            Kind::Boolean => raw.parse().ok().map(FieldValue::Boolean),
            Kind::Integer => parse_value(raw).map(FieldValue::Integer),
            Kind::Text => Some(FieldValue::String(raw.to_string())),
        };
        if let Some(value) = value {
            point = point.field(*field, value);
        }
    }
    Some(point)
}

fn row_bool(row: &Row, column: &str) -> bool {
    row.get(column) == Some("true")
}

/// Pods and nodes under management, kept in the cluster status database
#[derive(Clone)]
pub struct ClusterStatusDao {
    store: Arc<dyn TimeSeriesStore>,
    logger: StructuredLogger,
}

impl ClusterStatusDao {
    pub fn new(store: Arc<dyn TimeSeriesStore>, logger: StructuredLogger) -> Self {
        Self { store, logger }
    }

    /// Store one point per container of every pod; returns the point count
    pub async fn create_pods(&self, pods: &[Pod]) -> Result<usize> {
        let mut points = Vec::new();

        for pod in pods {
            for container in &pod.containers {
                let mut point = Point::new(CONTAINER_MEASUREMENT, status_time())
                    .tag(TAG_NAMESPACE, pod.namespace.as_str())
                    .tag(TAG_POD_NAME, pod.pod_name.as_str())
                    .tag(TAG_NODE_NAME, pod.node_name.as_str())
                    .tag(TAG_NAME, container.name.as_str())
                    .field(FIELD_IS_DELETED, FieldValue::Boolean(false))
                    .field(FIELD_IS_PREDICTED, FieldValue::Boolean(pod.is_predicted))
                    .field(FIELD_POLICY, FieldValue::String(pod.policy.clone()))
                    .field(
                        FIELD_POD_CREATE_TIME,
                        FieldValue::Integer(pod.start_time.map_or(0, |t| t.timestamp())),
                    );

                if pod.is_predicted {
                    if let Some(scaler) = &pod.scaler {
                        point = point
                            .tag(TAG_SCALER_NAMESPACE, scaler.namespace.as_str())
                            .tag(TAG_SCALER_NAME, scaler.name.as_str());
                    }
                }

                let resources = &container.resources;
                let quantities = [
                    (FIELD_RESOURCE_LIMIT_CPU, resources.limits.cpu),
                    (FIELD_RESOURCE_LIMIT_MEMORY, resources.limits.memory),
                    (FIELD_RESOURCE_REQUEST_CPU, resources.requests.cpu),
                    (FIELD_RESOURCE_REQUEST_MEMORY, resources.requests.memory),
                ];
                for (field, quantity) in quantities {
                    if let Some(quantity) = quantity {
                        point = point.field(field, FieldValue::Integer(quantity));
                    }
                }

                points.push(point);
            }
        }

        self.write("create_pods", points).await
    }

    /// Pods with the given prediction state that are not deleted,
    /// optionally narrowed to one scaler
    pub async fn list_pods(
        &self,
        scaler: Option<&NamespacedName>,
        is_predicted: bool,
    ) -> Result<Vec<Pod>> {
        let operation = "list_pods";
        let started = Instant::now();
        self.logger.log_query_started(operation, 1);

        let scaler_namespace = scaler.map(|s| s.namespace.as_str()).filter(|s| !s.is_empty());
        let scaler_name = scaler.map(|s| s.name.as_str()).filter(|s| !s.is_empty());
        let query = SelectStatement::from(CONTAINER_MEASUREMENT)
            .bool_eq(FIELD_IS_PREDICTED, is_predicted)
            .bool_eq(FIELD_IS_DELETED, false)
            .tag_eq_opt(TAG_SCALER_NAMESPACE, scaler_namespace)
            .tag_eq_opt(TAG_SCALER_NAME, scaler_name)
            .group_by(&format!(
                "\"{}\",\"{}\",\"{}\",\"{}\"",
                TAG_NAMESPACE, TAG_POD_NAME, TAG_SCALER_NAMESPACE, TAG_SCALER_NAME
            ))
            .build();

        let rows = self.query(operation, "*", &query).await?;
        let pods = group_pods(&rows);
        self.logger.log_query_completed(
            operation,
            pods.len(),
            rows.len(),
            started.elapsed().as_millis(),
        );
        Ok(pods)
    }

    /// Change the prediction state of every stored container of the given pods
    ///
    /// Returns the number of rewritten points.
    pub async fn update_pods(&self, updates: &[PodUpdate]) -> Result<usize> {
        for update in updates {
            update.validate()?;
        }

        let wanted: BTreeMap<(&str, &str), bool> = updates
            .iter()
            .filter_map(|u| {
                u.is_predicted
                    .map(|flag| ((u.namespace.as_str(), u.pod_name.as_str()), flag))
            })
            .collect();
        if wanted.is_empty() {
            return Ok(0);
        }

        let pairs: Vec<(&str, &str)> = wanted.keys().copied().collect();
        let rows = self.pod_rows("update_pods", &pairs).await?;

        let points: Vec<Point> = rows
            .iter()
            .filter_map(|row| {
                let key = (
                    row.get(TAG_NAMESPACE).unwrap_or_default(),
                    row.get(TAG_POD_NAME).unwrap_or_default(),
                );
                let flag = *wanted.get(&key)?;
                row_to_point(CONTAINER_MEASUREMENT, row, &CONTAINER_TAGS, &CONTAINER_FIELDS)
                    .map(|point| point.field(FIELD_IS_PREDICTED, FieldValue::Boolean(flag)))
            })
            .collect();

        self.write("update_pods", points).await
    }

    /// Flag every stored container of the given pods as deleted
    ///
    /// Returns the number of rewritten points.
    pub async fn delete_pods(&self, pods: &[NamespacedName]) -> Result<usize> {
        if pods.is_empty() {
            return Ok(0);
        }

        let pairs: Vec<(&str, &str)> = pods
            .iter()
            .map(|p| (p.namespace.as_str(), p.name.as_str()))
            .collect();
        let rows = self.pod_rows("delete_pods", &pairs).await?;

        let points: Vec<Point> = rows
            .iter()
            .filter_map(|row| {
                row_to_point(CONTAINER_MEASUREMENT, row, &CONTAINER_TAGS, &CONTAINER_FIELDS)
            })
            .map(|point| point.field(FIELD_IS_DELETED, FieldValue::Boolean(true)))
            .collect();

        self.write("delete_pods", points).await
    }

    /// Store nodes as in cluster; returns the point count
    pub async fn create_nodes(&self, nodes: &[Node]) -> Result<usize> {
        let points = nodes
            .iter()
            .map(|node| {
                Point::new(NODE_MEASUREMENT, status_time())
                    .tag(TAG_NAME, node.name.as_str())
                    .field(FIELD_IN_CLUSTER, FieldValue::Boolean(true))
                    .field(FIELD_IS_PREDICTED, FieldValue::Boolean(node.is_predicted))
            })
            .collect();

        self.write("create_nodes", points).await
    }

    /// Nodes in cluster, optionally narrowed to one prediction state
    pub async fn list_nodes(&self, is_predicted: Option<bool>) -> Result<Vec<Node>> {
        let operation = "list_nodes";
        let started = Instant::now();
        self.logger.log_query_started(operation, 1);

        let mut statement =
            SelectStatement::from(NODE_MEASUREMENT).bool_eq(FIELD_IN_CLUSTER, true);
        if let Some(flag) = is_predicted {
            statement = statement.bool_eq(FIELD_IS_PREDICTED, flag);
        }

        let rows = self.query(operation, "*", &statement.build()).await?;
        let nodes: Vec<Node> = rows
            .iter()
            .filter_map(|row| {
                let name = row.get(TAG_NAME)?;
                Some(Node::new(name, row_bool(row, FIELD_IS_PREDICTED)))
            })
            .collect();

        self.logger.log_query_completed(
            operation,
            nodes.len(),
            rows.len(),
            started.elapsed().as_millis(),
        );
        Ok(nodes)
    }

    /// Change the prediction state of stored nodes; returns the rewritten point count
    pub async fn update_nodes(&self, updates: &[NodeUpdate]) -> Result<usize> {
        let mut points = Vec::new();

        for update in updates {
            let Some(flag) = update.is_predicted else {
                continue;
            };
            for row in self.node_rows("update_nodes", &update.name).await? {
                if let Some(point) = row_to_point(NODE_MEASUREMENT, &row, &NODE_TAGS, &NODE_FIELDS) {
                    points.push(point.field(FIELD_IS_PREDICTED, FieldValue::Boolean(flag)));
                }
            }
        }

        self.write("update_nodes", points).await
    }

    /// Mark nodes as out of cluster; returns the rewritten point count
    pub async fn delete_nodes(&self, names: &[String]) -> Result<usize> {
        let mut points = Vec::new();

        for name in names {
            for row in self.node_rows("delete_nodes", name).await? {
                if let Some(point) = row_to_point(NODE_MEASUREMENT, &row, &NODE_TAGS, &NODE_FIELDS) {
                    points.push(point.field(FIELD_IN_CLUSTER, FieldValue::Boolean(false)));
                }
            }
        }

        self.write("delete_nodes", points).await
    }

    /// Stored container rows of the given pods
    async fn pod_rows(&self, operation: &str, pairs: &[(&str, &str)]) -> Result<Vec<Row>> {
        let query = SelectStatement::from(CONTAINER_MEASUREMENT)
            .any_tag_pair(TAG_NAMESPACE, TAG_POD_NAME, pairs)
            .build();
        self.query(operation, "pods", &query).await
    }

    /// The in-cluster row of one node
    async fn node_rows(&self, operation: &str, name: &str) -> Result<Vec<Row>> {
        let query = SelectStatement::from(NODE_MEASUREMENT)
            .tag_eq(TAG_NAME, name)
            .bool_eq(FIELD_IN_CLUSTER, true)
            .order(Order::Asc)
            .limit(1)
            .build();
        self.query(operation, name, &query).await
    }

    async fn query(&self, operation: &str, entity: &str, query: &str) -> Result<Vec<Row>> {
        match self.store.query(query, CLUSTER_STATUS_DATABASE).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                let err = DatahubError::from_upstream(entity, operation, e);
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }

    async fn write(&self, operation: &str, points: Vec<Point>) -> Result<usize> {
        let count = points.len();
        match self.store.write_points(CLUSTER_STATUS_DATABASE, &points).await {
            Ok(()) => {
                self.logger
                    .log_points_written(operation, CLUSTER_STATUS_DATABASE, count);
                Ok(count)
            }
            Err(e) => {
                let err = DatahubError::from_upstream(CLUSTER_STATUS_DATABASE, operation, e);
                self.logger.log_query_failed(operation, &err);
                Err(err)
            }
        }
    }
}

/// Fold container rows into pods keyed by pod and scaler
///
/// Pod-level fields come from the first row of each pod.
fn group_pods(rows: &[Row]) -> Vec<Pod> {
    let mut pods: Vec<Pod> = Vec::new();
    let mut slots: BTreeMap<(&str, &str, &str, &str), usize> = BTreeMap::new();

    for row in rows {
        let namespace = row.get(TAG_NAMESPACE).unwrap_or_default();
        let pod_name = row.get(TAG_POD_NAME).unwrap_or_default();
        let scaler_namespace = row.get(TAG_SCALER_NAMESPACE).unwrap_or_default();
        let scaler_name = row.get(TAG_SCALER_NAME).unwrap_or_default();

        let slot = *slots
            .entry((namespace, pod_name, scaler_namespace, scaler_name))
            .or_insert_with(|| {
                let scaler = NamespacedName::new(scaler_namespace, scaler_name);
                let start_time = row
                    .get(FIELD_POD_CREATE_TIME)
                    .and_then(parse_value)
                    .filter(|secs| *secs > 0)
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                pods.push(Pod {
                    namespace: namespace.to_string(),
                    pod_name: pod_name.to_string(),
                    node_name: row.get(TAG_NODE_NAME).unwrap_or_default().to_string(),
                    containers: Vec::new(),
                    is_predicted: row_bool(row, FIELD_IS_PREDICTED),
                    policy: row.get(FIELD_POLICY).unwrap_or_default().to_string(),
                    scaler: (!scaler.is_empty()).then_some(scaler),
                    start_time,
                });
                pods.len() - 1
            });

        let Some(name) = row.get(TAG_NAME) else {
            continue;
        };
        let pod = &mut pods[slot];
        if pod.containers.iter().any(|c| c.name == name) {
            continue;
        }
        let mut container = ContainerResources::new(name);
        container.resources.limits = ResourceList {
            cpu: row.get(FIELD_RESOURCE_LIMIT_CPU).and_then(parse_value),
            memory: row.get(FIELD_RESOURCE_LIMIT_MEMORY).and_then(parse_value),
        };
        container.resources.requests = ResourceList {
            cpu: row.get(FIELD_RESOURCE_REQUEST_CPU).and_then(parse_value),
            memory: row.get(FIELD_RESOURCE_REQUEST_MEMORY).and_then(parse_value),
        };
        pod.containers.push(container);
    }

    pods
}
