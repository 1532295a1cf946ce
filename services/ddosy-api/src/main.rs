//! ddosy load-testing server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ddosy_api::{run_server, ConfigOverrides, Server, ServerConfig};

/// ddosy load-testing server
#[derive(Parser, Debug)]
#[command(name = "ddosy")]
#[command(about = "Schedules and runs HTTP load tests")]
struct Args {
    /// Optional YAML config file; flags and env vars override its values
    #[arg(short, long, env = "DDOSY_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen port
    #[arg(short, long, env = "DDOSY_PORT")]
    port: Option<u16>,

    /// Maximum number of runs waiting behind the active one
    #[arg(long, env = "DDOSY_MAX_QUEUE")]
    max_queue: Option<usize>,

    /// Maximum outstanding outbound requests
    #[arg(long, env = "DDOSY_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Timeout for each outbound request, e.g. "10s"
    #[arg(long, env = "DDOSY_REQUEST_TIMEOUT", value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            max_queue: self.max_queue,
            max_in_flight: self.max_in_flight,
            request_timeout: self.request_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .init();

    info!("Starting ddosy");

    let config = ServerConfig::load(args.config.as_deref(), args.overrides())?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let server = Arc::new(Server::new(config)?.with_metrics(prometheus));

    run_server(server, async {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
    })
    .await
}
