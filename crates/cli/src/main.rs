//! Studio CLI - Main Entry Point

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use studio_cli::commands::{self, config, proxy, routes, serve};
use studio_cli::output::{self, print_error, print_info};

/// Automation Studio dev gateway
#[derive(Parser)]
#[command(name = "studio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Gateway config file
    #[arg(long, env = "STUDIO_CONFIG", default_value_os_t = studio_common::default_config_path(), global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway: SPA shell plus upstream proxy
    Serve(serve::ServeArgs),

    /// List the route table
    Routes(routes::RoutesArgs),

    /// Resolve a path to its route
    Resolve(routes::ResolveArgs),

    /// Build the path for a named route
    Href(routes::HrefArgs),

    /// Inspect proxy rules
    #[command(subcommand)]
    Proxy(proxy::ProxyCommands),

    /// Manage the config file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => {
            let config = commands::load_config(&cli.config)?;
            serve::execute(args, config).await?
        }
        Commands::Routes(args) => {
            routes::list(args, &commands::load_config(&cli.config)?, cli.format)?
        }
        Commands::Resolve(args) => {
            routes::resolve(args, &commands::load_config(&cli.config)?, cli.format)?
        }
        Commands::Href(args) => routes::href(args, &commands::load_config(&cli.config)?)?,
        Commands::Proxy(cmd) => {
            proxy::execute(cmd, &commands::load_config(&cli.config)?, cli.format)?
        }
        Commands::Config(cmd) => config::execute(cmd, &cli.config, cli.format)?,
        Commands::Version => {
            println!("Studio CLI v{}", studio_common::VERSION);
            print_info(&format!("config: {}", cli.config.display()));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
