//! Proxy rule table
//!
//! Prefix rules that decide which requests the gateway forwards upstream
//! instead of answering itself. Rules are tried in declaration order and the
//! first match wins.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheme of an upstream target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamScheme {
    Http,
    Ws,
}

/// Upstream host:port a rule forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub scheme: UpstreamScheme,
    pub host: String,
    pub port: u16,
}

impl Upstream {
    /// Parse `http://host:port` or `ws://host:port`
    pub fn parse(target: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUpstream {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = target
            .trim()
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => UpstreamScheme::Http,
            "ws" => UpstreamScheme::Ws,
            "https" | "wss" => return Err(invalid("TLS upstreams are not supported")),
            _ => return Err(invalid("scheme must be http or ws")),
        };

        let authority = rest.trim_end_matches('/');
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }
        if authority.contains('/') {
            return Err(invalid("upstream must not carry a path"));
        }

        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid("bad port"));
        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            // Bracketed IPv6 literal; the brackets are not part of the host
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = match after {
                "" => 80,
                _ => parse_port(after.strip_prefix(':').ok_or_else(|| invalid("bad port"))?)?,
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => {
                    return Err(invalid("IPv6 hosts must be bracketed"))
                }
                Some((host, port)) => (host, parse_port(port)?),
                None => (authority, 80),
            }
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, the value written to `Host` on origin rewrite.
    /// IPv6 hosts are bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Base URL for plain HTTP requests, regardless of the declared scheme
    pub fn http_base(&self) -> String {
        format!("http://{}", self.authority())
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            UpstreamScheme::Http => "http",
            UpstreamScheme::Ws => "ws",
        };
        write!(f, "{}://{}", scheme, self.authority())
    }
}

impl FromStr for Upstream {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// How matching requests are forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Plain request/response forwarding; never upgrades
    #[default]
    Http,
    /// Upgrade requests are tunnelled to the upstream's own WebSocket endpoint
    WebSocket,
    /// The gateway terminates the WebSocket and bridges frames to raw TCP
    Tcp,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::Http => "http",
            ProxyMode::WebSocket => "websocket",
            ProxyMode::Tcp => "tcp",
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved proxy rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyRule {
    pub prefix: String,
    /// Name of the upstream in the config
    pub upstream_name: String,
    pub upstream: Upstream,
    pub mode: ProxyMode,
    pub change_origin: bool,
}

impl ProxyRule {
    /// Whether `path` falls under this rule's prefix.
    ///
    /// The prefix must end on a segment boundary, so `/ws` covers `/ws` and
    /// `/ws/control` but not `/websockify`.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => {
                self.prefix.ends_with('/')
                    || rest.is_empty()
                    || rest.starts_with('/')
                    || rest.starts_with('?')
                    || rest.starts_with('#')
            }
            None => false,
        }
    }
}

/// Ordered set of proxy rules
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProxyTable {
    rules: Vec<ProxyRule>,
}

impl ProxyTable {
    /// Build a table, rejecting malformed or duplicate prefixes
    pub fn new(rules: Vec<ProxyRule>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !rule.prefix.starts_with('/') {
                return Err(Error::InvalidConfig(format!(
                    "proxy prefix '{}' must start with '/'",
                    rule.prefix
                )));
            }
            if rule.prefix == "/" {
                return Err(Error::InvalidConfig(
                    "proxy prefix '/' would capture every route".to_string(),
                ));
            }
            if !seen.insert(rule.prefix.as_str()) {
                return Err(Error::DuplicatePrefix(rule.prefix.clone()));
            }
        }
        Ok(Self { rules })
    }

    /// First rule whose prefix covers `path`
    pub fn match_path(&self, path: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn rules(&self) -> &[ProxyRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
