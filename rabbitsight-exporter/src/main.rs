//! Prometheus exporter for RabbitMQ.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use rabbitsight_common::init_tracing;
use rabbitsight_exporter::config::ConfigOverrides;
use rabbitsight_exporter::{Exporter, ExporterConfig, HttpServer, ManagementClient, QueueCollector};

/// Prometheus exporter for RabbitMQ.
#[derive(Parser, Debug)]
#[command(name = "rabbitsight-exporter")]
#[command(about = "Export RabbitMQ queue statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Management API URL (overrides config).
    #[arg(long, env = "RABBIT_URL")]
    rabbit_url: Option<String>,

    /// Management API user (overrides config).
    #[arg(long, env = "RABBIT_USER")]
    rabbit_user: Option<String>,

    /// Management API password (overrides config).
    #[arg(long, env = "RABBIT_PASSWORD", hide_env_values = true)]
    rabbit_password: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Request a URL and exit 0 on HTTP 200, 1 otherwise.
    #[arg(long, value_name = "URL")]
    check_url: Option<String>,
}

/// Exit code of `--check-url`.
async fn check_url(url: &str) -> i32 {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => 0,
        Ok(response) => {
            eprintln!("{} returned {}", url, response.status());
            1
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(url) = &args.check_url {
        std::process::exit(check_url(url).await);
    }

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    // CLI and environment overrides
    config.apply_overrides(ConfigOverrides {
        listen: args.listen,
        rabbit_url: args.rabbit_url,
        rabbit_user: args.rabbit_user,
        rabbit_password: args.rabbit_password,
        log_level: args.log_level,
    });
    config.validate()?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        rabbit_url = %config.rabbit.url,
        rabbit_user = %config.rabbit.username,
        connection = ?config.rabbit.connection,
        include_vhost = %config.queues.include_vhost,
        skip_vhost = ?config.queues.skip_vhost,
        include_queues = %config.queues.include_queues,
        skip_queues = ?config.queues.skip_queues,
        max_queues = config.queues.max_queues,
        exclude_metrics = ?config.queues.exclude_metrics,
        "Starting RabbitMQ exporter"
    );

    let client = ManagementClient::new(&config.rabbit)?;
    let queues = QueueCollector::new(&config.queues, config.rabbit.connection)?;
    let exporter = Arc::new(Exporter::new(client, queues, config.prometheus.prefix.clone()));

    // Parse listen address
    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = HttpServer::new(exporter, listen_addr, config.prometheus.path.clone());
    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        result = wait_for_signal() => result?,
        _ = &mut http_task => {
            anyhow::bail!("HTTP server exited unexpectedly");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for the server to drain
    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}
