//! Proxy table commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use studio_common::{GatewayConfig, ProxyMode, ProxyRule};

use crate::output::{print_item, print_list, OutputFormat, TableDisplay};

#[derive(Subcommand, Debug)]
pub enum ProxyCommands {
    /// List proxy rules in match order
    List,

    /// Show which rule, if any, captures a path
    Match {
        /// Request path, e.g. /websockify
        path: String,
    },
}

/// Proxy rule display wrapper for serialization
#[derive(Serialize)]
pub struct ProxyRow {
    pub prefix: String,
    pub upstream: String,
    pub target: String,
    pub mode: ProxyMode,
    pub change_origin: bool,
}

impl From<&ProxyRule> for ProxyRow {
    fn from(rule: &ProxyRule) -> Self {
        Self {
            prefix: rule.prefix.clone(),
            upstream: rule.upstream_name.clone(),
            target: rule.upstream.to_string(),
            mode: rule.mode,
            change_origin: rule.change_origin,
        }
    }
}

impl TableDisplay for ProxyRow {
    fn headers() -> Vec<&'static str> {
        vec!["Prefix", "Upstream", "Target", "Mode", "Change Origin"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.prefix.clone(),
            self.upstream.clone(),
            self.target.clone(),
            self.mode.to_string(),
            if self.change_origin { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub fn execute(cmd: ProxyCommands, config: &GatewayConfig, format: OutputFormat) -> Result<()> {
    let table = config.proxy_table()?;
    match cmd {
        ProxyCommands::List => {
            let rows: Vec<ProxyRow> = table.rules().iter().map(ProxyRow::from).collect();
            print_list(&rows, format)
        }
        ProxyCommands::Match { path } => {
            let rule = table
                .match_path(&path)
                .ok_or_else(|| anyhow::anyhow!("'{}' is not proxied; the SPA serves it", path))?;
            print_item(&ProxyRow::from(rule), format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_follow_declaration_order() {
        let table = GatewayConfig::default().proxy_table().unwrap();
        let rows: Vec<ProxyRow> = table.rules().iter().map(ProxyRow::from).collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].prefix, "/api");
        assert_eq!(rows[0].target, "http://app:8000");
    }

    #[test]
    fn test_websockify_row() {
        let table = GatewayConfig::default().proxy_table().unwrap();
        let row = ProxyRow::from(table.match_path("/websockify").unwrap()).row();
        assert_eq!(row[1], "vnc");
        assert_eq!(row[2], "http://app:7900");
        assert_eq!(row[3], "websocket");
    }
}
