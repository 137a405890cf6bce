//! Prometheus range query client

use super::{async_trait, MetricsBackend, RawSeries};
use crate::models::Sample;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Prometheus connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// Sent as `Authorization: Bearer <token>` when set
    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lookback used when a query has no start time
    #[serde(default = "default_range_secs")]
    pub default_range_secs: u64,

    /// Resolution used when a query has no step
    #[serde(default = "default_step_secs")]
    pub default_step_secs: u64,
}

fn default_url() -> String {
    "http://prometheus-k8s.monitoring.svc:9090".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_range_secs() -> u64 {
    3600
}

fn default_step_secs() -> u64 {
    30
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            bearer_token: None,
            timeout_secs: default_timeout_secs(),
            default_range_secs: default_range_secs(),
            default_step_secs: default_step_secs(),
        }
    }
}

impl PrometheusConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url).context("Prometheus config validate failed")?;
        if self.default_step_secs == 0 {
            bail!("Prometheus config validate failed: default_step_secs must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: Vec<MatrixSeries>,
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// [`MetricsBackend`] over the Prometheus HTTP API
pub struct PrometheusClient {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
    default_range: Duration,
    default_step: Duration,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&config.url).context("Invalid Prometheus URL")?;

        Ok(Self {
            client,
            base_url,
            bearer_token: config.bearer_token.clone(),
            default_range: Duration::from_secs(config.default_range_secs),
            default_step: Duration::from_secs(config.default_step_secs),
        })
    }

    /// Fill in absent bounds and step
    fn resolve_window(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        step: Option<Duration>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>, Duration)> {
        let end = end.unwrap_or_else(Utc::now);
        let start = match start {
            Some(start) => start,
            None => {
                let range = chrono::Duration::from_std(self.default_range)
                    .context("Default range out of bounds")?;
                end - range
            }
        };
        Ok((start, end, step.unwrap_or(self.default_step)))
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query_range(
        &self,
        expr: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        step: Option<Duration>,
    ) -> Result<Vec<RawSeries>> {
        let (start, end, step) = self.resolve_window(start, end, step)?;
        let url = self
            .base_url
            .join("api/v1/query_range")
            .context("Invalid path")?;

        debug!(query = expr, %start, %end, step_secs = step.as_secs_f64(), "Prometheus range query");

        let mut request = self.client.get(url).query(&[
            ("query", expr.to_string()),
            ("start", unix_seconds(start)),
            ("end", unix_seconds(end)),
            ("step", format!("{}", step.as_secs_f64())),
        ]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to send request")?;
        let status = response.status();
        let body = response.text().await.context("Failed to read response")?;

        // Error bodies carry the reason in the `error` field
        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => bail!("Prometheus error ({}): {}", status, body),
            Err(e) => return Err(e).context("Failed to parse response"),
        };

        if parsed.status != "success" {
            bail!(
                "Prometheus error ({}, {}): {}",
                status,
                parsed.error_type.as_deref().unwrap_or("unknown"),
                parsed.error.as_deref().unwrap_or_default()
            );
        }

        let data = parsed.data.context("Prometheus response has no data")?;
        if data.result_type != "matrix" {
            bail!("unexpected result type: {}", data.result_type);
        }

        data.result
            .into_iter()
            .map(|series| {
                let samples = series
                    .values
                    .into_iter()
                    .map(|(ts, value)| Ok(Sample::new(from_unix_seconds(ts)?, value)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(RawSeries {
                    labels: series.metric,
                    samples,
                })
            })
            .collect()
    }
}

fn unix_seconds(t: DateTime<Utc>) -> String {
    format!("{:.3}", t.timestamp_millis() as f64 / 1000.0)
}

fn from_unix_seconds(ts: f64) -> Result<DateTime<Utc>> {
    let millis = (ts * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .with_context(|| format!("invalid sample timestamp: {}", ts))
}
