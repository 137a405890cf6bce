//! Upstream query executors
//!
//! The engine talks to two kinds of upstream stores:
//! - a pull-based metrics backend answering range queries ([`MetricsBackend`])
//! - a time-series store holding predictions and recommendations
//!   ([`TimeSeriesStore`])
//!
//! Both are traits so the collector can run against mocks in tests.

mod descriptor;
mod influxdb;
mod prometheus;

pub use descriptor::{MetricSource, CONTAINER_DEFAULT_SELECTOR};
pub use influxdb::{
    InfluxDbClient, InfluxDbConfig, CLUSTER_STATUS_DATABASE, PREDICTION_DATABASE,
    RECOMMENDATION_DATABASE, SCORE_DATABASE,
};
pub use prometheus::{PrometheusClient, PrometheusConfig};

use crate::models::Sample;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

pub use async_trait::async_trait;

/// One labelled series returned by a range query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSeries {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}

impl RawSeries {
    pub fn label(&self, name: &str) -> &str {
        self.labels.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Pull-based metrics backend
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Run a range query; absent bounds and step fall back to client defaults
    async fn query_range(
        &self,
        expr: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        step: Option<Duration>,
    ) -> Result<Vec<RawSeries>>;
}

/// One result row: every column and tag, rendered as a string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    /// The `time` column parsed as RFC 3339
    pub fn time(&self) -> Option<DateTime<Utc>> {
        let raw = self.get("time")?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Time-series store holding predictions and recommendations
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn query(&self, query: &str, database: &str) -> Result<Vec<Row>>;

    async fn write_points(&self, database: &str, points: &[Point]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// One point in line protocol form
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Render as one line of line protocol with a nanosecond timestamp
    ///
    /// Tags with empty values are dropped, as line protocol cannot carry them.
    /// A timestamp outside the nanosecond range is an error.
    pub fn to_line_protocol(&self) -> Result<String> {
        let nanos = self.timestamp.timestamp_nanos_opt().ok_or_else(|| {
            anyhow::anyhow!(
                "timestamp {} of a '{}' point is outside the nanosecond range",
                self.timestamp,
                self.measurement
            )
        })?;
        let mut line = escape(&self.measurement, &[',', ' ']);

        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::String(s) => format!("\"{}\"", escape(s, &['"'])),
                    FieldValue::Integer(i) => format!("{}i", i),
                    FieldValue::Float(f) => f.to_string(),
                    FieldValue::Boolean(b) => b.to_string(),
                };
                format!("{}={}", escape(key, &[',', '=', ' ']), value)
            })
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));

        let _ = write!(line, " {}", nanos);

        Ok(line)
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Quote a string literal for an InfluxQL predicate
pub fn influxql_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\\', "\\\\").replace('\'', "\\'"))
}
