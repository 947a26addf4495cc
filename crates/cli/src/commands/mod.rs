//! CLI Commands

pub mod config;
pub mod proxy;
pub mod routes;
pub mod serve;

use anyhow::Context;
use std::path::Path;
use studio_common::GatewayConfig;

/// Load the gateway config and layer `STUDIO_*` overrides on top
pub fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let mut config = GatewayConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_env()?;
    Ok(config)
}

/// Parse a `key=value` argument
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
