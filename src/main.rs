//! Service Conventions - CLI Entry Point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::{HeaderName, HeaderValue};
use service_conventions::metrics::ConventionMetrics;
use service_conventions::{
    ConnectionFactory, ConnectionParams, ConventionsConfig, SunsetRoutes,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "service-conventions",
    about = "Convention layer for service-to-service HTTP calls",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "service-conventions.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print default configuration and exit
    PrintConfig,

    /// Validate configuration and exit
    Validate,

    /// Issue a GET through a conventional connection
    Get {
        /// Base URL of the service
        host: String,

        /// Path to request
        #[arg(default_value = "/")]
        path: String,

        /// Total request timeout in seconds
        #[arg(short, long)]
        timeout: Option<f64>,

        /// Connection timeout in seconds (default 2)
        #[arg(long)]
        open_timeout: Option<f64>,

        /// Calling application name
        #[arg(long)]
        app: Option<String>,

        /// Calling environment
        #[arg(long)]
        env: Option<String>,

        /// Extra header, as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(HeaderName, HeaderValue)>,

        /// Print metrics after the request
        #[arg(long)]
        metrics: bool,
    },
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {:?}", raw))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| e.to_string())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|e| e.to_string())?;
    Ok((name, value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Command::PrintConfig = args.command {
        let default_config = include_str!("../config/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        ConventionsConfig::from_file(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else if matches!(args.command, Command::Validate) {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        ConventionsConfig::default()
    };

    match args.command {
        Command::PrintConfig => Ok(()),
        Command::Validate => {
            // Route compilation catches what serde alone cannot
            let routes = SunsetRoutes::new(config.sunset_routes.clone())?;
            println!(
                "Configuration is valid ({} sunset route(s))",
                routes.len()
            );
            Ok(())
        }
        Command::Get {
            host,
            path,
            timeout,
            open_timeout,
            app,
            env,
            headers,
            metrics,
        } => {
            let collector = Arc::new(ConventionMetrics::new(&config.metrics.prefix));
            let mut factory = ConnectionFactory::new(config.connection);
            if config.metrics.enabled {
                factory = factory.with_metrics(collector.clone());
            }

            let mut params = ConnectionParams::new(host).customize(move |b| {
                for (name, value) in headers {
                    b.header(name, value);
                }
            });
            params.app_name = app;
            params.environment = env;
            params.timeout = timeout;
            params.open_timeout = open_timeout;

            let mut warnings = factory.take_warnings();
            let connection = factory.create(params)?;
            let response = connection.get(&path).await?;

            if let Some(rx) = warnings.as_mut() {
                while let Ok(warning) = rx.try_recv() {
                    eprintln!("deprecated: {}", warning);
                }
            }

            println!("{} {}", response.status(), response.url());
            for (name, value) in response.headers() {
                println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
            }

            if metrics {
                print!("{}", collector.encode());
            }
            Ok(())
        }
    }
}
