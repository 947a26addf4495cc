//! Route table commands: list, resolve, href

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use studio_common::{GatewayConfig, RouteEntry, RouteMatch, RouteScheme, RouteTable, View};

use crate::output::{print_item, print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct RoutesArgs {
    /// Route table to inspect; defaults to the configured scheme
    #[arg(long)]
    pub scheme: Option<RouteScheme>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Path to resolve, e.g. /runner/42
    pub path: String,

    /// Route table to resolve against; defaults to the configured scheme
    #[arg(long)]
    pub scheme: Option<RouteScheme>,
}

#[derive(Args, Debug)]
pub struct HrefArgs {
    /// Route name, e.g. Runner
    pub name: String,

    /// Route params as key=value
    #[arg(value_parser = super::parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Route table to build against; defaults to the configured scheme
    #[arg(long)]
    pub scheme: Option<RouteScheme>,
}

fn table(config: &GatewayConfig, scheme: Option<RouteScheme>) -> RouteTable {
    RouteTable::for_scheme(scheme.unwrap_or(config.router.scheme))
}

fn join_views(views: &[View]) -> String {
    if views.is_empty() {
        return "-".to_string();
    }
    views
        .iter()
        .map(View::as_str)
        .collect::<Vec<_>>()
        .join(" > ")
}

/// Route display wrapper for serialization
#[derive(Serialize)]
pub struct RouteRow {
    pub path: String,
    pub name: Option<String>,
    pub component: View,
    pub layouts: Vec<View>,
    pub props: bool,
}

impl From<RouteEntry> for RouteRow {
    fn from(entry: RouteEntry) -> Self {
        Self {
            path: entry.path,
            name: entry.name,
            component: entry.component,
            layouts: entry.layouts,
            props: entry.props,
        }
    }
}

impl TableDisplay for RouteRow {
    fn headers() -> Vec<&'static str> {
        vec!["Path", "Name", "Component", "Layouts", "Props"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.path.clone(),
            self.name.clone().unwrap_or_else(|| "-".to_string()),
            self.component.to_string(),
            join_views(&self.layouts),
            if self.props { "yes" } else { "no" }.to_string(),
        ]
    }
}

/// Resolution display wrapper
#[derive(Serialize)]
pub struct MatchRow {
    #[serde(flatten)]
    pub matched: RouteMatch,
}

fn format_map(map: &BTreeMap<String, String>) -> String {
    if map.is_empty() {
        return "-".to_string();
    }
    map.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

impl TableDisplay for MatchRow {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Pattern", "Component", "Layouts", "Params", "Props"]
    }

    fn row(&self) -> Vec<String> {
        let m = &self.matched;
        vec![
            m.name.clone().unwrap_or_else(|| "-".to_string()),
            m.path.clone(),
            m.component.to_string(),
            join_views(&m.layouts),
            format_map(&m.params),
            format_map(&m.props),
        ]
    }
}

pub fn list(args: RoutesArgs, config: &GatewayConfig, format: OutputFormat) -> Result<()> {
    let rows: Vec<RouteRow> = table(config, args.scheme)
        .entries()
        .into_iter()
        .map(RouteRow::from)
        .collect();
    print_list(&rows, format)
}

pub fn resolve(args: ResolveArgs, config: &GatewayConfig, format: OutputFormat) -> Result<()> {
    let scheme = args.scheme.unwrap_or(config.router.scheme);
    let matched = table(config, Some(scheme))
        .resolve(&args.path)
        .ok_or_else(|| anyhow::anyhow!("no {} route matches '{}'", scheme, args.path))?;
    print_item(&MatchRow { matched }, format)
}

pub fn href(args: HrefArgs, config: &GatewayConfig) -> Result<()> {
    let params: BTreeMap<String, String> = args.params.into_iter().collect();
    let path = table(config, args.scheme).href(&args.name, &params)?;
    println!("{}", path);
    Ok(())
}
