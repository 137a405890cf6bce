//! Collector scenarios against in-memory upstreams
//!
//! These tests run the DAOs end to end with mock backends so that fan-out,
//! error selection and folding can be checked without a live Prometheus or
//! InfluxDB.

#[cfg(test)]
mod mock_upstream_tests {
    use crate::aggregate::{ContainerPrediction, NodePrediction};
    use crate::cluster::{NamespacedName, Node, NodeUpdate, Pod, PodUpdate, SimulatedSchedulingScore};
    use crate::collector::{
        ClusterStatusDao, Collector, DaosBuilder, MetricsDao, PredictionDao, RecommendationDao,
        ScoreDao,
    };
    use crate::error::{DatahubError, DECREASE_RESOLUTION_MESSAGE};
    use crate::models::{MetricSet, MetricType, PodFilter, PodIdentity, Sample};
    use crate::observability::StructuredLogger;
    use crate::query::{Order, QueryCondition};
    use crate::recommendation::{
        apply_pod_recommendation, ContainerRecommendation, ContainerResources, PodRecommendation,
    };
    use crate::source::{
        async_trait, FieldValue, MetricsBackend, Point, RawSeries, Row, TimeSeriesStore,
        CLUSTER_STATUS_DATABASE, PREDICTION_DATABASE, RECOMMENDATION_DATABASE, SCORE_DATABASE,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn at(secs: i64, value: &str) -> Sample {
        Sample::new(Utc.timestamp_opt(secs, 0).unwrap(), value)
    }

    fn series(labels: &[(&str, &str)], samples: Vec<Sample>) -> RawSeries {
        RawSeries {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            samples,
        }
    }

    enum Reply {
        Series(Vec<RawSeries>),
        Fail(String),
        Stall,
    }

    /// Metrics backend answering by first matching expression substring
    #[derive(Default)]
    struct MockBackend {
        replies: Vec<(String, Reply)>,
        queries: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn on(mut self, pattern: &str, reply: Reply) -> Self {
            self.replies.push((pattern.to_string(), reply));
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricsBackend for MockBackend {
        async fn query_range(
            &self,
            expr: &str,
            _start: Option<DateTime<Utc>>,
            _end: Option<DateTime<Utc>>,
            _step: Option<Duration>,
        ) -> anyhow::Result<Vec<RawSeries>> {
            self.queries.lock().unwrap().push(expr.to_string());
            let reply = self
                .replies
                .iter()
                .find(|(pattern, _)| expr.contains(pattern.as_str()))
                .map(|(_, reply)| reply);

            match reply {
                Some(Reply::Series(series)) => Ok(series.clone()),
                Some(Reply::Fail(message)) => Err(anyhow::anyhow!(message.clone())),
                Some(Reply::Stall) => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Vec::new())
                }
                None => Ok(Vec::new()),
            }
        }
    }

    /// Time-series store answering by first matching query substring
    #[derive(Default)]
    struct MockStore {
        replies: Vec<(String, Result<Vec<Row>, String>)>,
        queries: Mutex<Vec<(String, String)>>,
        written: Mutex<Vec<(String, Vec<Point>)>>,
    }

    impl MockStore {
        fn on(mut self, pattern: &str, reply: Result<Vec<Row>, String>) -> Self {
            self.replies.push((pattern.to_string(), reply));
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries
                .lock()
                .unwrap()
                .iter()
                .map(|(query, _)| query.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TimeSeriesStore for MockStore {
        async fn query(&self, query: &str, database: &str) -> anyhow::Result<Vec<Row>> {
            self.queries
                .lock()
                .unwrap()
                .push((query.to_string(), database.to_string()));
            match self
                .replies
                .iter()
                .find(|(pattern, _)| query.contains(pattern.as_str()))
            {
                Some((_, Ok(rows))) => Ok(rows.clone()),
                Some((_, Err(message))) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(Vec::new()),
            }
        }

        async fn write_points(&self, database: &str, points: &[Point]) -> anyhow::Result<()> {
            self.written
                .lock()
                .unwrap()
                .push((database.to_string(), points.to_vec()));
            Ok(())
        }
    }

    fn metrics_dao(backend: Arc<MockBackend>, cancel_on_error: bool) -> MetricsDao {
        MetricsDao::new(
            backend,
            Collector::new(cancel_on_error),
            StructuredLogger::new("test"),
        )
    }

    fn prediction_dao(store: Arc<MockStore>) -> PredictionDao {
        PredictionDao::new(store, Collector::default(), StructuredLogger::new("test"))
    }

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_node_metrics_fold_cpu_and_memory() {
        let backend = Arc::new(
            MockBackend::default()
                .on(
                    r#"node:node_cpu_utilisation:avg1m{node = "node-1"}"#,
                    Reply::Series(vec![series(&[("node", "node-1")], vec![at(2, "0.4"), at(1, "0.2")])]),
                )
                .on(
                    r#"node:node_memory_bytes_total:sum{node = "node-1"}"#,
                    Reply::Series(vec![series(&[("node", "node-1")], vec![at(1, "2048")])]),
                )
                .on(
                    r#"node:node_cpu_utilisation:avg1m{node = "node-2"}"#,
                    Reply::Series(vec![series(&[("node", "node-2")], vec![at(1, "0.9")])]),
                ),
        );
        let dao = metrics_dao(Arc::clone(&backend), true);

        let result = dao
            .list_node_metrics(&nodes(&["node-1", "node-2"]), &QueryCondition::default())
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        let node_1 = result.get("node-1").unwrap();
        assert_eq!(
            node_1.metrics.get(MetricType::CpuUsageSecondsPercentage).unwrap(),
            &[at(1, "0.2"), at(2, "0.4")]
        );
        assert_eq!(
            node_1.metrics.get(MetricType::MemoryUsageBytes).unwrap(),
            &[at(1, "2048")]
        );
        assert!(!result.get("node-2").unwrap().metrics.contains(MetricType::MemoryUsageBytes));
        // Two sub-sources per node
        assert_eq!(backend.queries().len(), 4);
    }

    #[tokio::test]
    async fn test_decrease_resolution_error_short_circuits() {
        for cancel_on_error in [true, false] {
            let backend = Arc::new(
                MockBackend::default()
                    .on(
                        r#"{node = "node-2"}"#,
                        Reply::Fail(format!(
                            "bad_data: exceeded maximum resolution of 11,000 points per timeseries. {} (?step=XX)",
                            DECREASE_RESOLUTION_MESSAGE
                        )),
                    )
                    .on(
                        "node:node_cpu_utilisation:avg1m",
                        Reply::Series(vec![series(&[("node", "node-x")], vec![at(1, "0.5")])]),
                    ),
            );
            let dao = metrics_dao(backend, cancel_on_error);

            let err = dao
                .list_node_metrics(
                    &nodes(&["node-1", "node-2", "node-3"]),
                    &QueryCondition::default(),
                )
                .await
                .unwrap_err();

            assert!(
                err.is_query_condition_exceeds_maximum(),
                "unexpected error: {:?}",
                err
            );
        }
    }

    #[tokio::test]
    async fn test_other_failures_carry_entity_and_sub_source() {
        let backend = Arc::new(MockBackend::default().on(
            "node:node_memory_bytes_total:sum",
            Reply::Fail("connection refused".to_string()),
        ));
        let dao = metrics_dao(backend, true);

        let err = dao
            .list_node_metrics(&nodes(&["node-7"]), &QueryCondition::default())
            .await
            .unwrap_err();

        match err {
            DatahubError::Upstream {
                entity, sub_source, ..
            } => {
                assert_eq!(entity, "node-7");
                assert_eq!(sub_source, "node_memory");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_cancels_stalled_siblings() {
        let backend = Arc::new(
            MockBackend::default()
                .on(r#"{node = "slow"}"#, Reply::Stall)
                .on(r#"{node = "broken"}"#, Reply::Fail("boom".to_string())),
        );
        let dao = metrics_dao(backend, true);

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            dao.list_node_metrics(&nodes(&["slow", "broken"]), &QueryCondition::default()),
        )
        .await
        .expect("stalled worker was not cancelled");

        assert!(matches!(outcome, Err(DatahubError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_empty_node_list_queries_once_unfiltered() {
        let backend = Arc::new(MockBackend::default().on(
            "node:node_cpu_utilisation:avg1m",
            Reply::Series(vec![
                series(&[("node", "a")], vec![at(1, "0.1")]),
                series(&[("node", "b")], vec![at(1, "0.2")]),
            ]),
        ));
        let dao = metrics_dao(Arc::clone(&backend), true);

        let result = dao
            .list_node_metrics(&[], &QueryCondition::default())
            .await
            .unwrap();

        // A single wildcard worker runs each node sub-source once
        let queries = backend.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| !q.contains("node =")));
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_pod_metrics_group_containers_and_shape() {
        let backend = Arc::new(
            MockBackend::default()
                .on(
                    "container_cpu_usage_seconds_total",
                    Reply::Series(vec![
                        series(
                            &[("namespace", "web"), ("pod_name", "api-0"), ("container_name", "app")],
                            vec![at(1, "0.1"), at(3, "0.3"), at(2, "0.2")],
                        ),
                        series(
                            &[("namespace", "web"), ("pod_name", "api-0"), ("container_name", "proxy")],
                            vec![],
                        ),
                    ]),
                )
                .on(
                    "container_memory_usage_bytes",
                    Reply::Series(vec![series(
                        &[("namespace", "web"), ("pod_name", "api-0"), ("container_name", "app")],
                        vec![at(1, "100"), at(2, "200")],
                    )]),
                ),
        );
        let dao = metrics_dao(Arc::clone(&backend), true);

        let condition = QueryCondition::default().with_order(Order::Desc).with_limit(2);
        let filter = PodFilter::new(Some("web".to_string()), Some("api-0".to_string()));
        let pods = dao.list_pod_metrics(filter, &condition).await.unwrap();

        let pod = pods.get(&PodIdentity::new("web", "api-0")).unwrap();
        // Empty series produce no record
        assert_eq!(pod.containers.len(), 1);
        let app = pod.containers.by_name("app").unwrap();
        assert_eq!(
            app.metrics.get(MetricType::CpuUsageSecondsPercentage).unwrap(),
            &[at(3, "0.3"), at(2, "0.2")]
        );
        assert_eq!(
            app.metrics.get(MetricType::MemoryUsageBytes).unwrap(),
            &[at(2, "200"), at(1, "100")]
        );

        let queries = backend.queries();
        assert!(queries[0].contains("container_cpu_usage_seconds_total"));
        assert!(queries[1].contains("container_memory_usage_bytes"));
        assert!(queries.iter().all(|q| q.contains(r#"namespace = "web""#)));
    }

    #[tokio::test]
    async fn test_worker_panic_is_internal_error() {
        let collector = Collector::default();
        let result: Result<Vec<u32>, _> = collector
            .fan_out(
                vec![1u32, 2],
                |n, emitter| async move {
                    if n == 2 {
                        panic!("worker exploded");
                    }
                    emitter.emit(n)
                },
                |acc: &mut Vec<u32>, n| acc.push(n),
            )
            .await;

        assert!(matches!(result, Err(DatahubError::Internal(_))));
    }

    #[tokio::test]
    async fn test_fan_out_folds_every_record() {
        let collector = Collector::new(false);
        let total: u64 = collector
            .fan_out(
                (1u64..=50).collect(),
                |n, emitter| async move {
                    emitter.emit(n)?;
                    emitter.emit(n * 1000)
                },
                |acc: &mut u64, n| *acc += n,
            )
            .await
            .unwrap();

        assert_eq!(total, 1275 + 1275 * 1000);
    }

    fn prediction_row(name: &str, scheduled: &str, time: &str, value: &str) -> Row {
        Row::new()
            .with("time", time)
            .with("name", name)
            .with("is_scheduled", scheduled)
            .with("metric", "cpu_usage_seconds_percentage")
            .with("value", value)
    }

    #[tokio::test]
    async fn test_node_predictions_partition_by_schedule_flag() {
        let store = Arc::new(MockStore::default().on(
            "'cpu_usage_seconds_percentage'",
            Ok(vec![
                prediction_row("node-1", "true", "2024-01-01T00:00:00Z", "0.5"),
                prediction_row("node-1", "false", "2024-01-01T00:00:00Z", "0.7"),
                prediction_row("node-1", "true", "2024-01-01T00:05:00Z", "0.6"),
            ]),
        ));
        let dao = prediction_dao(Arc::clone(&store));

        let start = Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap();
        let condition = QueryCondition::default().with_range(Some(start), None);
        let predictions = dao
            .list_node_predictions(&nodes(&["node-1"]), None, &condition)
            .await
            .unwrap();

        let partition = predictions.get("node-1").unwrap();
        assert_eq!(
            partition
                .scheduled()
                .unwrap()
                .predictions
                .get(MetricType::CpuUsageSecondsPercentage)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            partition
                .unscheduled()
                .unwrap()
                .predictions
                .get(MetricType::CpuUsageSecondsPercentage)
                .unwrap()[0]
                .value,
            "0.7"
        );

        let queries = store.queries();
        assert_eq!(queries.len(), 2);
        assert!(queries[0].contains(r#""name" = 'node-1'"#));
        assert!(queries[0].contains("time > "));
        assert!(!queries[0].contains("is_scheduled"));
    }

    #[tokio::test]
    async fn test_node_prediction_schedule_filter_reaches_query() {
        let store = Arc::new(MockStore::default());
        let dao = prediction_dao(Arc::clone(&store));

        let predictions = dao
            .list_node_predictions(&[], Some(true), &QueryCondition::default())
            .await
            .unwrap();

        assert!(predictions.is_empty());
        for query in store.queries() {
            assert!(query.contains(r#""is_scheduled" = 'true'"#));
            assert!(!query.contains(r#""name" ="#));
            assert!(query.ends_with("GROUP BY * ORDER BY time DESC LIMIT 1"));
        }
    }

    #[tokio::test]
    async fn test_pod_predictions_store_failure_is_upstream() {
        let store = Arc::new(MockStore::default().on("memory_usage_bytes", Err("timeout".to_string())));
        let dao = prediction_dao(store);

        let err = dao
            .list_pod_predictions(PodFilter::default(), &QueryCondition::default())
            .await
            .unwrap_err();

        match err {
            DatahubError::Upstream { sub_source, .. } => {
                assert_eq!(sub_source, "container_memory_usage_bytes")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_predictions_write_one_point_per_sample() {
        let store = Arc::new(MockStore::default());
        let dao = prediction_dao(Arc::clone(&store));

        let mut metrics = MetricSet::with_series(MetricType::CpuUsageSecondsPercentage, vec![at(1, "0.1"), at(2, "0.2")]);
        metrics.append(MetricType::MemoryUsageBytes, vec![at(1, "512")]);
        let written = dao
            .create_container_predictions(&[ContainerPrediction::new("web", "api-0", "app", metrics)])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let written = dao
            .create_node_predictions(&[NodePrediction::new(
                "node-1",
                true,
                MetricSet::with_series(MetricType::MemoryUsageBytes, vec![at(5, "4096")]),
            )])
            .await
            .unwrap();
        assert_eq!(written, 1);

        let batches = store.written.lock().unwrap().clone();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, PREDICTION_DATABASE);

        let container_point = &batches[0].1[0];
        assert_eq!(container_point.measurement, "container");
        assert_eq!(container_point.tags["name"], "app");
        assert_eq!(container_point.tags["metric"], "cpu_usage_seconds_percentage");
        assert_eq!(container_point.fields["value"], FieldValue::String("0.1".to_string()));

        let node_point = &batches[1].1[0];
        assert_eq!(node_point.measurement, "node");
        assert_eq!(node_point.tags["is_scheduled"], "true");
    }

    fn recommendation_row(pod: &str, container: &str, time: &str, columns: &[(&str, &str)]) -> Row {
        let mut row = Row::new()
            .with("time", time)
            .with("namespace", "web")
            .with("pod_name", pod)
            .with("name", container);
        for (column, value) in columns {
            row.insert(*column, *value);
        }
        row
    }

    #[tokio::test]
    async fn test_recommendations_group_and_apply() {
        let store = Arc::new(MockStore::default().on(
            "FROM \"container\"",
            Ok(vec![
                recommendation_row(
                    "api-0",
                    "app",
                    "2024-01-01T00:00:00Z",
                    &[("resource_limit_cpu", "500"), ("resource_request_memory", "1048576")],
                ),
                recommendation_row("api-0", "app", "2024-01-01T01:00:00Z", &[("resource_limit_cpu", "800")]),
                recommendation_row("api-0", "sidecar", "2024-01-01T00:00:00Z", &[("resource_request_cpu", "50")]),
                recommendation_row("api-1", "app", "2024-01-01T00:00:00Z", &[("initial_resource_limit_cpu", "100")]),
            ]),
        ));
        let dao = RecommendationDao::new(Arc::clone(&store) as Arc<dyn TimeSeriesStore>, StructuredLogger::new("test"));

        let filter = PodFilter::new(Some("web".to_string()), None);
        let condition = QueryCondition::default().with_order(Order::Desc).with_limit(5);
        let pods = dao.list_pod_recommendations(&filter, &condition).await.unwrap();

        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].pod_name, "api-0");
        assert_eq!(pods[0].container_recommendations.len(), 2);
        assert!(!pods[1].container_recommendations[0]
            .initial_limit_recommendations
            .is_empty());

        let query = &store.queries()[0];
        assert!(query.contains(r#""namespace" = 'web'"#));
        assert!(query.contains(r#"GROUP BY "name","namespace","pod_name""#));
        assert!(query.ends_with("ORDER BY time DESC LIMIT 5"));

        let mut containers = vec![ContainerResources::new("app"), ContainerResources::new("sidecar")];
        assert_eq!(apply_pod_recommendation(&mut containers, &pods[0]), 2);
        assert_eq!(containers[0].resources.limits.cpu, Some(800));
        assert_eq!(containers[0].resources.requests.memory, Some(1048576));
        assert_eq!(containers[1].resources.requests.cpu, Some(50));
    }

    #[tokio::test]
    async fn test_create_recommendations_skip_non_numeric() {
        let store = Arc::new(MockStore::default());
        let dao = RecommendationDao::new(Arc::clone(&store) as Arc<dyn TimeSeriesStore>, StructuredLogger::new("test"));

        let mut app = ContainerRecommendation::new("app");
        app.limit_recommendations.append(
            MetricType::CpuUsageSecondsPercentage,
            vec![at(1, "250.9"), at(2, "n/a")],
        );
        let mut pod = PodRecommendation::new("web", "api-0");
        pod.container_recommendations.push(app);

        assert_eq!(dao.create_pod_recommendations(&[pod]).await.unwrap(), 1);

        let batches = store.written.lock().unwrap().clone();
        assert_eq!(batches[0].0, RECOMMENDATION_DATABASE);
        let point = &batches[0].1[0];
        assert_eq!(point.fields["resource_limit_cpu"], FieldValue::Integer(250));
        assert_eq!(point.tags.get("pod_name").map(String::as_str), Some("api-0"));
    }

    #[test]
    fn test_builder_requires_upstreams() {
        assert!(DaosBuilder::new().build().is_err());

        let daos = DaosBuilder::new()
            .backend(Arc::new(MockBackend::default()))
            .store(Arc::new(MockStore::default()))
            .build();
        assert!(daos.is_ok());
    }

    fn cluster_status_dao(store: Arc<MockStore>) -> ClusterStatusDao {
        ClusterStatusDao::new(store, StructuredLogger::new("test"))
    }

    fn status_row(namespace: &str, pod_name: &str, name: &str) -> Row {
        Row::new()
            .with("time", "1970-01-01T00:00:00Z")
            .with("namespace", namespace)
            .with("pod_name", pod_name)
            .with("name", name)
            .with("node_name", "node-1")
            .with("is_predicted", "true")
            .with("is_deleted", "false")
            .with("policy", "stable")
            .with("pod_create_time", "1700000000")
            .with("resource_limit_cpu", "500")
    }

    #[tokio::test]
    async fn test_create_pods_writes_one_point_per_container() {
        let store = Arc::new(MockStore::default());
        let dao = cluster_status_dao(Arc::clone(&store));

        let mut app = ContainerResources::new("app");
        app.resources.limits.cpu = Some(500);
        app.resources.requests.memory = Some(1024);
        let mut predicted = Pod::new("web", "api-0");
        predicted.node_name = "node-1".to_string();
        predicted.is_predicted = true;
        predicted.scaler = Some(NamespacedName::new("web", "api-scaler"));
        predicted.start_time = Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        predicted.containers = vec![app, ContainerResources::new("sidecar")];
        let mut plain = Pod::new("db", "pg-0");
        plain.scaler = Some(NamespacedName::new("db", "pg-scaler"));
        plain.containers = vec![ContainerResources::new("postgres")];

        assert_eq!(dao.create_pods(&[predicted, plain]).await.unwrap(), 3);

        let batches = store.written.lock().unwrap().clone();
        assert_eq!(batches[0].0, CLUSTER_STATUS_DATABASE);
        let points = &batches[0].1;
        let app = &points[0];
        assert_eq!(app.timestamp, DateTime::<Utc>::default());
        assert_eq!(app.tags["scaler_name"], "api-scaler");
        assert_eq!(app.fields["is_deleted"], FieldValue::Boolean(false));
        assert_eq!(app.fields["is_predicted"], FieldValue::Boolean(true));
        assert_eq!(app.fields["pod_create_time"], FieldValue::Integer(1_700_000_000));
        assert_eq!(app.fields["resource_limit_cpu"], FieldValue::Integer(500));
        assert_eq!(app.fields["resource_request_memory"], FieldValue::Integer(1024));
        assert!(!points[1].fields.contains_key("resource_limit_cpu"));
        // Scaler tags are only kept for predicted pods
        assert!(!points[2].tags.contains_key("scaler_name"));
    }

    #[tokio::test]
    async fn test_list_pods_groups_containers_per_pod() {
        let store = Arc::new(MockStore::default().on(
            r#"FROM "container""#,
            Ok(vec![
                status_row("web", "api-0", "app")
                    .with("scaler_namespace", "web")
                    .with("scaler_name", "api-scaler"),
                status_row("web", "api-0", "sidecar")
                    .with("scaler_namespace", "web")
                    .with("scaler_name", "api-scaler"),
                status_row("db", "pg-0", "postgres"),
            ]),
        ));
        let dao = cluster_status_dao(Arc::clone(&store));

        let scaler = NamespacedName::new("web", "");
        let pods = dao.list_pods(Some(&scaler), true).await.unwrap();

        assert_eq!(pods.len(), 2);
        assert_eq!(pods[0].pod_name, "api-0");
        assert_eq!(pods[0].node_name, "node-1");
        assert_eq!(pods[0].containers.len(), 2);
        assert_eq!(pods[0].containers[0].resources.limits.cpu, Some(500));
        assert_eq!(pods[0].scaler, Some(NamespacedName::new("web", "api-scaler")));
        assert_eq!(
            pods[0].start_time,
            Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        );
        assert!(pods[0].is_predicted);
        assert_eq!(pods[1].scaler, None);

        assert_eq!(
            store.queries()[0],
            r#"SELECT * FROM "container" WHERE "is_predicted" = true AND "is_deleted" = false AND "scaler_namespace" = 'web' GROUP BY "namespace","pod_name","scaler_namespace","scaler_name""#
        );
    }

    #[tokio::test]
    async fn test_update_pods_rewrites_matching_containers_only() {
        let store = Arc::new(MockStore::default().on(
            r#"FROM "container""#,
            Ok(vec![
                status_row("web", "api-0", "app"),
                status_row("web", "api-1", "app"),
            ]),
        ));
        let dao = cluster_status_dao(Arc::clone(&store));

        let updates = [
            PodUpdate {
                namespace: "web".to_string(),
                pod_name: "api-0".to_string(),
                is_predicted: Some(false),
            },
            PodUpdate {
                namespace: "web".to_string(),
                pod_name: "api-9".to_string(),
                is_predicted: None,
            },
        ];
        assert_eq!(dao.update_pods(&updates).await.unwrap(), 1);

        assert_eq!(
            store.queries()[0],
            r#"SELECT * FROM "container" WHERE (("namespace" = 'web' AND "pod_name" = 'api-0'))"#
        );

        let batches = store.written.lock().unwrap().clone();
        let point = &batches[0].1[0];
        assert_eq!(point.timestamp, DateTime::<Utc>::default());
        assert_eq!(point.tags["pod_name"], "api-0");
        assert_eq!(point.fields["is_predicted"], FieldValue::Boolean(false));
        assert_eq!(point.fields["is_deleted"], FieldValue::Boolean(false));
        assert_eq!(point.fields["policy"], FieldValue::String("stable".to_string()));
        assert_eq!(point.fields["resource_limit_cpu"], FieldValue::Integer(500));
    }

    #[tokio::test]
    async fn test_update_pods_requires_identity() {
        let store = Arc::new(MockStore::default());
        let dao = cluster_status_dao(Arc::clone(&store));

        let err = dao
            .update_pods(&[PodUpdate {
                namespace: String::new(),
                pod_name: "api-0".to_string(),
                is_predicted: Some(true),
            }])
            .await
            .unwrap_err();

        assert!(matches!(err, DatahubError::InvalidArgument(_)));
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn test_delete_pods_flags_every_container() {
        let store = Arc::new(MockStore::default().on(
            r#"FROM "container""#,
            Ok(vec![
                status_row("web", "api-0", "app"),
                status_row("web", "api-0", "sidecar"),
            ]),
        ));
        let dao = cluster_status_dao(Arc::clone(&store));

        let deleted = dao
            .delete_pods(&[NamespacedName::new("web", "api-0")])
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let batches = store.written.lock().unwrap().clone();
        for point in &batches[0].1 {
            assert_eq!(point.fields["is_deleted"], FieldValue::Boolean(true));
            assert_eq!(point.fields["is_predicted"], FieldValue::Boolean(true));
        }
    }

    #[tokio::test]
    async fn test_node_status_lifecycle() {
        let store = Arc::new(MockStore::default().on(
            r#"FROM "node""#,
            Ok(vec![Row::new()
                .with("time", "1970-01-01T00:00:00Z")
                .with("name", "node-1")
                .with("group", "gpu")
                .with("in_cluster", "true")
                .with("is_predicted", "false")]),
        ));
        let dao = cluster_status_dao(Arc::clone(&store));

        assert_eq!(dao.create_nodes(&[Node::new("node-1", false)]).await.unwrap(), 1);
        assert_eq!(
            dao.list_nodes(Some(false)).await.unwrap(),
            vec![Node::new("node-1", false)]
        );
        let update = NodeUpdate {
            name: "node-1".to_string(),
            is_predicted: Some(true),
        };
        assert_eq!(dao.update_nodes(&[update]).await.unwrap(), 1);
        assert_eq!(dao.delete_nodes(&["node-1".to_string()]).await.unwrap(), 1);

        let queries = store.queries();
        assert_eq!(
            queries[0],
            r#"SELECT * FROM "node" WHERE "in_cluster" = true AND "is_predicted" = false"#
        );
        assert_eq!(
            queries[1],
            r#"SELECT * FROM "node" WHERE "name" = 'node-1' AND "in_cluster" = true ORDER BY time ASC LIMIT 1"#
        );

        let batches = store.written.lock().unwrap().clone();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].1[0].fields["in_cluster"], FieldValue::Boolean(true));
        let updated = &batches[1].1[0];
        assert_eq!(updated.fields["is_predicted"], FieldValue::Boolean(true));
        assert_eq!(updated.fields["group"], FieldValue::String("gpu".to_string()));
        let removed = &batches[2].1[0];
        assert_eq!(removed.fields["in_cluster"], FieldValue::Boolean(false));
        assert_eq!(removed.fields["is_predicted"], FieldValue::Boolean(false));
    }

    #[tokio::test]
    async fn test_scheduling_scores_write_and_list() {
        let store = Arc::new(MockStore::default().on(
            "simulated_scheduling_score",
            Ok(vec![
                Row::new()
                    .with("time", "2024-01-01T00:00:00Z")
                    .with("score_before", "0.5")
                    .with("score_after", "0.75"),
                Row::new()
                    .with("time", "2024-01-01T00:01:00Z")
                    .with("score_before", "0.5"),
            ]),
        ));
        let dao = ScoreDao::new(
            Arc::clone(&store) as Arc<dyn TimeSeriesStore>,
            StructuredLogger::new("test"),
        );

        let score = SimulatedSchedulingScore {
            timestamp: Utc.timestamp_opt(60, 0).unwrap(),
            score_before: 1.5,
            score_after: 2.0,
        };
        assert_eq!(dao.create_simulated_scheduling_scores(&[score]).await.unwrap(), 1);

        let batches = store.written.lock().unwrap().clone();
        assert_eq!(batches[0].0, SCORE_DATABASE);
        assert_eq!(batches[0].1[0].fields["score_before"], FieldValue::Float(1.5));
        assert_eq!(batches[0].1[0].timestamp, Utc.timestamp_opt(60, 0).unwrap());

        let condition = QueryCondition::default()
            .with_range(Some(Utc.timestamp_opt(1, 0).unwrap()), None)
            .with_order(Order::Desc)
            .with_limit(10);
        let scores = dao.list_simulated_scheduling_scores(&condition).await.unwrap();

        // The row without an after score is skipped
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score_after, 0.75);
        assert_eq!(
            store.queries()[0],
            r#"SELECT * FROM "simulated_scheduling_score" WHERE time >= 1000000000 ORDER BY time DESC LIMIT 10"#
        );
    }
}
