use std::{fs, path::Path};

use anyhow::{Result, anyhow};

pub mod cache;
pub mod cfg;
pub mod client;
pub mod contracts;
pub mod error;
#[cfg(any(test, feature = "fake_chain"))]
pub mod fake;
pub mod finalization;
pub mod message;
pub mod metrics;
pub mod signatures;
pub mod status;
pub mod tracker;

pub fn read_config(config_file: &Path) -> Result<cfg::Config> {
    if !config_file.exists() {
        return Err(anyhow!("config file {config_file:?} does not exist"));
    }
    let config_content = fs::read_to_string(config_file)?;

    Ok(toml::from_str(&config_content)?)
}
