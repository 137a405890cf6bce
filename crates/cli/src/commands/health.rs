//! Service health command

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show overall and per-upstream health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            let overall = serde_json::to_value(health.status)?;
            println!(
                "Overall: {}\n",
                color_status(overall.as_str().unwrap_or_default())
            );

            let rows = health
                .components
                .iter()
                .map(|(name, component)| {
                    let status = serde_json::to_value(component.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    ComponentRow {
                        component: name.clone(),
                        status: color_status(&status),
                        message: component.message.clone().unwrap_or_default(),
                    }
                })
                .collect();
            print_rows::<ComponentRow>(rows, "No components registered");
        }
    }

    Ok(())
}
