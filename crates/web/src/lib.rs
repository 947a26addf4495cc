//! Studio Web Gateway
//!
//! Serves the single-page-app shell for the active route table and forwards
//! API, WebSocket and static-asset prefixes to their upstream services.

pub mod proxy;
pub mod server;
pub mod static_files;
pub mod upgrade;
pub mod vnc_proxy;

pub use proxy::{HttpForwarder, ProxyError};
pub use server::{GatewayContext, GatewayServer};
pub use static_files::SpaAssets;
pub use vnc_proxy::TcpBridge;
