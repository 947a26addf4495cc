//! Studio Common Library
//!
//! Route table, proxy table and configuration shared by the Studio gateway
//! server and CLI.

pub mod config;
pub mod error;
pub mod proxy;
pub mod route;

// Re-export commonly used types
pub use config::{GatewayConfig, ProxyRuleConfig, RouterConfig, ServerConfig};
pub use error::{Error, Result};
pub use proxy::{ProxyMode, ProxyRule, ProxyTable, Upstream, UpstreamScheme};
pub use route::{RouteEntry, RouteMatch, RouteRecord, RouteScheme, RouteTable, View};

/// Studio version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default config file location, relative to the working directory
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("studio.toml")
}
