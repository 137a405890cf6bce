//! Datahub CLI
//!
//! A command-line tool for querying observed metrics, predictions and
//! resource recommendations from the Datahub service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, metrics, predictions, recommendations, RangeArgs};

/// Datahub CLI
#[derive(Parser)]
#[command(name = "dhctl")]
#[command(author, version, about = "CLI for the Datahub query service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via DATAHUB_API_URL env var)
    #[arg(long, env = "DATAHUB_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Observed container and node metrics
    #[command(subcommand)]
    Metrics(MetricsCommands),

    /// Predicted container and node usage
    #[command(subcommand)]
    Predictions(PredictionsCommands),

    /// Resource recommendations
    #[command(subcommand)]
    Recommendations(RecommendationsCommands),

    /// Show service health
    Health,

    /// Manage local CLI configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum MetricsCommands {
    /// List container metrics per pod
    Pods {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by pod name
        #[arg(long, short)]
        pod: Option<String>,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// List node metrics
    Nodes {
        /// Node to query; repeat for several, omit for all
        #[arg(long = "node")]
        nodes: Vec<String>,

        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Subcommand)]
pub enum PredictionsCommands {
    /// List container predictions per pod
    Pods {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by pod name
        #[arg(long, short)]
        pod: Option<String>,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// List node predictions
    Nodes {
        /// Node to query; repeat for several, omit for all
        #[arg(long = "node")]
        nodes: Vec<String>,

        /// Only predictions made with (true) or without (false) scheduled pods
        #[arg(long)]
        scheduled: Option<bool>,

        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Subcommand)]
pub enum RecommendationsCommands {
    /// Get recommendations and the resources they resolve to
    Get {
        /// Filter by namespace
        #[arg(long, short)]
        namespace: Option<String>,

        /// Filter by pod name
        #[arg(long, short)]
        pod: Option<String>,

        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the stored configuration
    Show,

    /// Store defaults for later invocations
    Set {
        /// Default API endpoint URL
        #[arg(long)]
        api_url: Option<String>,

        /// Default namespace filter
        #[arg(long, short)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config(config_cmd) = cli.command {
        return match config_cmd {
            ConfigCommands::Show => commands::config::show_config(),
            ConfigCommands::Set { api_url, namespace } => {
                commands::config::set_config(api_url, namespace)
            }
        };
    }

    let settings = config::Config::load()?;

    // Initialize client
    let client = client::ApiClient::new(&settings.api_url(cli.api_url.as_deref()))?;

    // Execute command
    match cli.command {
        Commands::Metrics(metrics_cmd) => match metrics_cmd {
            MetricsCommands::Pods {
                namespace,
                pod,
                range,
            } => {
                let namespace = settings.namespace(namespace);
                metrics::list_pods(&client, namespace, pod, &range, cli.format).await?;
            }
            MetricsCommands::Nodes { nodes, range } => {
                metrics::list_nodes(&client, nodes, &range, cli.format).await?;
            }
        },
        Commands::Predictions(predictions_cmd) => match predictions_cmd {
            PredictionsCommands::Pods {
                namespace,
                pod,
                range,
            } => {
                let namespace = settings.namespace(namespace);
                predictions::list_pods(&client, namespace, pod, &range, cli.format).await?;
            }
            PredictionsCommands::Nodes {
                nodes,
                scheduled,
                range,
            } => {
                predictions::list_nodes(&client, nodes, scheduled, &range, cli.format).await?;
            }
        },
        Commands::Recommendations(RecommendationsCommands::Get {
            namespace,
            pod,
            range,
        }) => {
            let namespace = settings.namespace(namespace);
            recommendations::get_recommendations(&client, namespace, pod, &range, cli.format)
                .await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
        Commands::Config(_) => {}
    }

    Ok(())
}
