//! YAML Exporter
//!
//! Loads every `.yml`/`.yaml` file of a configuration directory as a
//! collector and serves the combined metrics on `GET /metrics`.
//!
//! ```text
//! yaml-exporter 9100 /etc/yaml-exporter
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use yaml_exporter::config;
use yaml_exporter::error::Result;
use yaml_exporter::{HelpName, MetricsServer, Registry, TextEncoder};

// =============================================================================
// CLI Arguments
// =============================================================================

/// YAML Exporter - Prometheus text exposition for YAML-defined collectors
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to serve /metrics on
    port: u16,

    /// Directory holding the collector configuration files
    config_dir: PathBuf,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    bind_address: IpAddr,

    /// Prefix every HELP line's metric name with a random per-family token
    #[arg(long, env = "DISCRIMINATE_HELP")]
    discriminate_help: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    if let Err(e) = run(args).await {
        error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting YAML Exporter");
    info!("  Configuration directory: {}", args.config_dir.display());
    info!("  Discriminated HELP names: {}", args.discriminate_help);

    let registry = Arc::new(Registry::new());
    for collector in config::load_collectors(&args.config_dir)? {
        registry.register(Arc::new(collector));
    }

    let help_name = if args.discriminate_help {
        HelpName::Discriminated
    } else {
        HelpName::Plain
    };
    let encoder = TextEncoder::with_help_name(help_name);

    let addr = SocketAddr::new(args.bind_address, args.port);
    let server = MetricsServer::bind(addr, registry, encoder).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Exporter shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["yaml-exporter", "9100", "/etc/exporter"]).unwrap();
        assert_eq!(args.port, 9100);
        assert_eq!(args.config_dir, PathBuf::from("/etc/exporter"));
        assert!(!args.discriminate_help);
    }

    #[test]
    fn test_args_reject_bad_port() {
        assert!(Args::try_parse_from(["yaml-exporter", "http", "/etc/exporter"]).is_err());
        assert!(Args::try_parse_from(["yaml-exporter", "70000", "/etc/exporter"]).is_err());
        assert!(Args::try_parse_from(["yaml-exporter", "9100"]).is_err());
    }
}
