use std::path::PathBuf;

use tracing::info;

use studio_common::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // STUDIO_CONFIG points at a TOML file; STUDIO_* variables override it.
    let config_path = std::env::var("STUDIO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| studio_common::default_config_path());

    let mut config = GatewayConfig::load(&config_path)?;
    config.apply_env()?;

    info!(
        "Starting Studio gateway v{} (config: {})",
        studio_common::VERSION,
        config_path.display()
    );

    studio_web::server::serve(config).await
}
