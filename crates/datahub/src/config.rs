//! Service configuration

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use datahub_lib::source::{InfluxDbConfig, PrometheusConfig};
use datahub_lib::CollectorConfig;
use serde::Deserialize;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "DATAHUB_CONFIG";

const ENV_PREFIX: &str = "DATAHUB";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Datahub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatahubConfig {
    /// API server port for queries, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub prometheus: PrometheusConfig,

    #[serde(default)]
    pub influxdb: InfluxDbConfig,

    #[serde(default)]
    pub collector: CollectorConfig,
}

fn default_api_port() -> u16 {
    8080
}

impl DatahubConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// Environment variables use the `DATAHUB` prefix with `__` between
    /// nested keys, e.g. `DATAHUB__PROMETHEUS__URL`.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: DatahubConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            bail!("api_port must be non-zero");
        }
        self.prometheus.validate()?;
        self.influxdb.validate()?;
        Ok(())
    }
}
