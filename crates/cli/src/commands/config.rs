//! Local CLI configuration commands

use anyhow::Result;

use crate::config::Config;
use crate::output::{print_json, print_success};

/// Print the stored configuration and its location
pub fn show_config() -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load_from(&path)?;
    println!("# {}", path.display());
    print_json(&config)
}

/// Update the stored configuration; unset flags keep their value
pub fn set_config(api_url: Option<String>, namespace: Option<String>) -> Result<()> {
    let path = Config::config_path()?;
    let mut config = Config::load_from(&path)?;

    if let Some(api_url) = api_url {
        url::Url::parse(&api_url)?;
        config.api_url = Some(api_url);
    }
    if let Some(namespace) = namespace {
        config.default_namespace = Some(namespace);
    }

    config.save_to(&path)?;
    print_success(&format!("Configuration saved to {}", path.display()));
    Ok(())
}
