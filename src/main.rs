use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rotor::config::Config;

#[derive(Parser)]
#[command(
    name = "rotor",
    version,
    about = "Domain rotation and content publishing engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML). Defaults plus ROTOR_* variables when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine and HTTP server until Ctrl+C
    Serve,

    /// Create the database schema
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    setup_tracing(&config.logging.level, &config.logging.format, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rotor starting");

    match cli.command {
        Commands::Serve => rotor::commands::serve(config).await?,
        Commands::Migrate => rotor::commands::migrate(&config)?,
    }

    Ok(())
}

fn setup_tracing(level: &str, format: &str, verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "rotor=debug,info".to_string()
    } else {
        format!("rotor={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
