//! Gateway configuration

use crate::error::{Error, Result};
use crate::proxy::{ProxyMode, ProxyRule, ProxyTable, Upstream};
use crate::route::{RouteScheme, RouteTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "STUDIO_";

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and SPA serving
    pub server: ServerConfig,

    /// Route table selection
    pub router: RouterConfig,

    /// Named upstream targets, e.g. `app = "http://app:8000"`
    pub upstreams: BTreeMap<String, String>,

    /// Proxy rules in match order
    pub proxy: Vec<ProxyRuleConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut upstreams = BTreeMap::new();
        upstreams.insert("app".to_string(), "http://app:8000".to_string());
        upstreams.insert("vnc".to_string(), "http://app:7900".to_string());

        Self {
            server: ServerConfig::default(),
            router: RouterConfig::default(),
            upstreams,
            proxy: vec![
                ProxyRuleConfig::new("/api", "app", ProxyMode::Http),
                ProxyRuleConfig::new("/ws", "app", ProxyMode::WebSocket),
                ProxyRuleConfig::new("/websockify", "vnc", ProxyMode::WebSocket),
                ProxyRuleConfig::new("/vnc.html", "vnc", ProxyMode::Http),
                ProxyRuleConfig::new("/screenshots", "app", ProxyMode::Http),
                ProxyRuleConfig::new("/uploads", "app", ProxyMode::Http),
            ],
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Built SPA directory (index.html + assets/)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_dir: Option<PathBuf>,

    /// Answer cross-origin requests
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            dist_dir: None,
            cors: true,
        }
    }
}

/// Router configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub scheme: RouteScheme,
}

/// A proxy rule as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRuleConfig {
    pub prefix: String,

    /// Key into `upstreams`
    pub upstream: String,

    #[serde(default)]
    pub mode: ProxyMode,

    #[serde(default = "default_change_origin")]
    pub change_origin: bool,
}

fn default_change_origin() -> bool {
    true
}

impl ProxyRuleConfig {
    pub fn new(prefix: &str, upstream: &str, mode: ProxyMode) -> Self {
        Self {
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
            mode,
            change_origin: true,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `STUDIO_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `STUDIO_*` overrides from an explicit variable set
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key {
                "HOST" => self.server.host = value.to_string(),
                "PORT" => {
                    self.server.port = value.parse().map_err(|_| {
                        Error::InvalidConfig(format!("STUDIO_PORT '{}' is not a port", value))
                    })?
                }
                "ROUTER_SCHEME" => self.router.scheme = value.parse()?,
                "DIST_DIR" => self.server.dist_dir = Some(PathBuf::from(value)),
                _ => {
                    if let Some(name) = key.strip_prefix("UPSTREAM_") {
                        self.set_upstream(&name.to_ascii_lowercase(), value)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Point a named upstream at a new target
    pub fn set_upstream(&mut self, name: &str, target: &str) -> Result<()> {
        Upstream::parse(target)?;
        self.upstreams.insert(name.to_string(), target.to_string());
        Ok(())
    }

    /// Address string to bind
    pub fn listen_addr(&self) -> String {
        if self.server.host.contains(':') && !self.server.host.starts_with('[') {
            format!("[{}]:{}", self.server.host, self.server.port)
        } else {
            format!("{}:{}", self.server.host, self.server.port)
        }
    }

    /// Resolve proxy rules against the upstream map
    pub fn proxy_table(&self) -> Result<ProxyTable> {
        let mut rules = Vec::with_capacity(self.proxy.len());
        for rule in &self.proxy {
            let target = self
                .upstreams
                .get(&rule.upstream)
                .ok_or_else(|| Error::UnknownUpstream {
                    name: rule.upstream.clone(),
                    prefix: rule.prefix.clone(),
                })?;
            rules.push(ProxyRule {
                prefix: rule.prefix.clone(),
                upstream_name: rule.upstream.clone(),
                upstream: Upstream::parse(target)?,
                mode: rule.mode,
                change_origin: rule.change_origin,
            });
        }
        ProxyTable::new(rules)
    }

    /// The active route table
    pub fn route_table(&self) -> RouteTable {
        RouteTable::for_scheme(self.router.scheme)
    }

    /// Check everything that can fail before the listener starts
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::InvalidConfig("server.host is empty".to_string()));
        }
        for (name, target) in &self.upstreams {
            Upstream::parse(target).map_err(|e| {
                Error::InvalidConfig(format!("upstream '{}': {}", name, e))
            })?;
        }
        self.proxy_table()?;
        Ok(())
    }
}
