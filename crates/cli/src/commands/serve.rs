//! Start the dev gateway

use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use studio_common::{GatewayConfig, RouteScheme};
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Route table to serve (flat, nested)
    #[arg(long)]
    pub scheme: Option<RouteScheme>,

    /// Directory holding the built SPA (index.html and assets/)
    #[arg(long)]
    pub dist_dir: Option<PathBuf>,

    /// Point a named upstream elsewhere, e.g. --upstream vnc=http://127.0.0.1:5900
    #[arg(long = "upstream", value_parser = super::parse_key_val)]
    pub upstreams: Vec<(String, String)>,

    /// Disable permissive CORS headers
    #[arg(long)]
    pub no_cors: bool,
}

impl ServeArgs {
    /// Layer command-line flags over the loaded config
    pub fn apply(&self, config: &mut GatewayConfig) -> anyhow::Result<()> {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(scheme) = self.scheme {
            config.router.scheme = scheme;
        }
        if let Some(dir) = &self.dist_dir {
            config.server.dist_dir = Some(dir.clone());
        }
        if self.no_cors {
            config.server.cors = false;
        }
        for (name, target) in &self.upstreams {
            config.set_upstream(name, target)?;
        }
        config.validate()?;
        Ok(())
    }
}

pub async fn execute(args: ServeArgs, mut config: GatewayConfig) -> anyhow::Result<()> {
    args.apply(&mut config)?;

    println!(
        "{} Studio gateway on {} ({} routes)",
        "→".cyan(),
        format!("http://{}", config.listen_addr()).bold(),
        config.router.scheme.as_str().green()
    );
    for (name, target) in &config.upstreams {
        println!("  {} {}", format!("{:>8}", name).dimmed(), target);
    }
    info!("Starting gateway");

    studio_web::server::serve(config).await
}
