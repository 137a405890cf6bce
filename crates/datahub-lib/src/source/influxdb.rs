//! InfluxDB 1.x HTTP client

use super::{async_trait, Point, Row, TimeSeriesStore};
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Database holding container and node predictions
pub const PREDICTION_DATABASE: &str = "datahub_prediction";

/// Database holding container recommendations
pub const RECOMMENDATION_DATABASE: &str = "datahub_recommendation";

/// Database holding the pods and nodes under management
pub const CLUSTER_STATUS_DATABASE: &str = "datahub_cluster_status";

/// Database holding simulated scheduling scores
pub const SCORE_DATABASE: &str = "datahub_score";

/// InfluxDB connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxDbConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_credential")]
    pub username: String,

    #[serde(default = "default_credential")]
    pub password: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_address() -> String {
    "https://influxdb.datahub.svc.cluster.local:8086".to_string()
}

fn default_credential() -> String {
    "datahub".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            username: default_credential(),
            password: default_credential(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl InfluxDbConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.address).context("InfluxDB config validate failed")?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// [`TimeSeriesStore`] over the InfluxDB 1.x HTTP API
pub struct InfluxDbClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl InfluxDbClient {
    pub fn new(config: &InfluxDbConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.address).context("Invalid InfluxDB address")?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

/// Flatten series into rows; tags are copied onto every row and null
/// columns are left out
fn flatten(series: Vec<Series>) -> Vec<Row> {
    let mut rows = Vec::new();
    for series in series {
        for values in series.values {
            let mut row = Row::new();
            for (tag, value) in &series.tags {
                row.insert(tag.clone(), value.clone());
            }
            for (column, value) in series.columns.iter().zip(values) {
                let rendered = match value {
                    Value::Null => continue,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                row.insert(column.clone(), rendered);
            }
            rows.push(row);
        }
    }
    rows
}

#[async_trait]
impl TimeSeriesStore for InfluxDbClient {
    async fn query(&self, query: &str, database: &str) -> Result<Vec<Row>> {
        let url = self.base_url.join("query").context("Invalid path")?;
        debug!(database, query, "InfluxDB query");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", database), ("q", query)])
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;
        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => bail!("InfluxDB error ({}): {}", status, body),
            Err(e) => return Err(e).context("Failed to parse response"),
        };

        if let Some(error) = parsed.error {
            bail!("InfluxDB error ({}): {}", status, error);
        }

        let mut series = Vec::new();
        for result in parsed.results {
            if let Some(error) = result.error {
                bail!("InfluxDB statement error: {}", error);
            }
            series.extend(result.series);
        }

        Ok(flatten(series))
    }

    async fn write_points(&self, database: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let url = self.base_url.join("write").context("Invalid path")?;
        let body = points
            .iter()
            .map(Point::to_line_protocol)
            .collect::<Result<Vec<_>>>()?
            .join("\n");

        debug!(database, points = points.len(), "InfluxDB write");

        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("db", database), ("precision", "ns")])
            .body(body)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("InfluxDB write error ({}): {}", status, body);
        }

        Ok(())
    }
}
