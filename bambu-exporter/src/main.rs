//! Prometheus exporter for Bambu Lab printers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bambu_exporter::camera::CameraServer;
use bambu_exporter::config::ExporterConfig;
use bambu_exporter::http::HttpServer;
use bambu_exporter::poller::PrinterPoller;
use bambu_exporter::registry::MetricRegistry;
use bambu_mqtt::{BambuClient, PrinterAddress};

/// Prometheus exporter for Bambu Lab printers.
#[derive(Parser, Debug)]
#[command(name = "bambu-exporter")]
#[command(about = "Export Bambu Lab printer telemetry as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (YAML format).
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = ExporterConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let level = args
        .log_level
        .unwrap_or_else(|| config.exporter.log_level.as_directive().to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Bambu Lab Prometheus exporter");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = Arc::new(MetricRegistry::new());
    let interval = Duration::from_secs(config.exporter.update_interval);

    // Connect printers and start one poller per enabled entry
    let mut tasks = Vec::new();
    let mut clients: Vec<(String, BambuClient)> = Vec::new();

    for printer in config.enabled_printers() {
        info!(printer = %printer.name, ip = %printer.ip, "connecting to printer");

        let address = PrinterAddress {
            // Validated during config load.
            ip: printer
                .ip
                .parse()
                .with_context(|| format!("invalid printer ip {}", printer.ip))?,
            serial: printer.serial.clone(),
            access_code: printer.access_code.clone(),
        };
        let client = BambuClient::connect(address);
        clients.push((printer.name.clone(), client.clone()));

        let poller = PrinterPoller::new(printer.name.clone(), client, registry.clone(), interval);
        tasks.push(tokio::spawn(poller.run(shutdown_rx.clone())));
    }

    if clients.is_empty() {
        warn!("no enabled printers in configuration");
    }

    // Start HTTP servers
    let bind_addr: std::net::IpAddr = config
        .exporter
        .bind_address
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;
    let metrics_addr = SocketAddr::new(bind_addr, config.exporter.port);
    let camera_addr = SocketAddr::new(bind_addr, config.exporter.port + 1);

    let metrics_server = HttpServer::new(registry.clone(), metrics_addr);
    let metrics_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = metrics_server.run(metrics_shutdown).await {
            error!("Metrics server error: {}", e);
        }
    }));

    let camera_server = CameraServer::new(clients.clone(), camera_addr);
    let camera_shutdown = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = camera_server.run(camera_shutdown).await {
            error!("Camera relay error: {}", e);
        }
    }));

    info!(
        printers = clients.len(),
        interval_secs = config.exporter.update_interval,
        "exporter running"
    );

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).unwrap();
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown and give in-flight work a bounded grace period
    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    for (name, client) in &clients {
        info!(printer = %name, "disconnecting");
        client.disconnect().await;
    }

    let stats = registry.stats();
    info!(
        polls = stats.polls,
        poll_errors = stats.poll_errors,
        series = registry.series_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}
