//! Error types for the Studio gateway

use thiserror::Error;

/// Result type alias using Studio Error
pub type Result<T> = std::result::Result<T, Error>;

/// Studio error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    #[error("Duplicate route name: {0}")]
    DuplicateRouteName(String),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error("Route {route} requires param '{param}'")]
    MissingRouteParam { route: String, param: String },

    #[error("Unknown upstream '{name}' referenced by proxy rule {prefix}")]
    UnknownUpstream { name: String, prefix: String },

    #[error("Invalid upstream '{target}': {reason}")]
    InvalidUpstream { target: String, reason: String },

    #[error("Duplicate proxy prefix: {0}")]
    DuplicatePrefix(String),
}
