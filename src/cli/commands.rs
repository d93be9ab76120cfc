use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::browser::{BrowserGateway, CdpGateway};
use crate::cli::config::ServiceConfig;
use crate::dispatch::pool::WorkerPool;
use crate::frontend::{StatusResponse, SubmissionFrontend, SubmitAck, SubmitRequest};
use crate::dispatch::task::CaptureOptions;
use crate::server;

/// Run the capture service until interrupted
pub async fn serve(
    config_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    bind: Option<String>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ServiceConfig::load_from_file(&path)?,
        None => ServiceConfig::load_default()?,
    };

    // Command line overrides
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }

    config.validate()?;
    config.ensure_output_dir()?;

    info!(
        "Connecting to {} browser endpoint(s), writing artifacts to {}",
        config.browsers.len(),
        config.output_dir.display()
    );

    let gateway: Arc<dyn BrowserGateway> = Arc::new(CdpGateway::new());
    let pool = Arc::new(WorkerPool::new(&config, gateway).await?);
    pool.start().await;

    let frontend = Arc::new(SubmissionFrontend::new(pool.clone()));
    server::serve(&config.server.bind_address, frontend, shutdown_signal()).await?;

    // The HTTP server has drained; let in-flight captures finish
    pool.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

/// Submit one capture request to a running service
pub async fn submit(
    url: String,
    labels: Vec<String>,
    correlation_id: Option<String>,
    png: bool,
    jpeg: bool,
    html: bool,
    server: String,
) -> Result<()> {
    // PNG is the default artifact when the caller names none
    let capture_options = if png || jpeg || html {
        CaptureOptions { png, jpeg, html }
    } else {
        CaptureOptions { png: true, jpeg: false, html: false }
    };

    let request = SubmitRequest { url, labels, correlation_id, capture_options };

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/capture", server))
        .json(&request)
        .send()
        .await
        .context(format!("Failed to reach capture service at {}", server))?;

    if response.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        anyhow::bail!("Service rejected the submission: no healthy workers available");
    }

    let ack: SubmitAck = response
        .json()
        .await
        .context("Failed to parse submission acknowledgement")?;

    if ack.accepted {
        println!("Accepted: task {}", ack.task_id);
        if let Some(correlation_id) = ack.correlation_id {
            println!("Correlation id: {}", correlation_id);
        }
    } else {
        anyhow::bail!(
            "Submission rejected: {}",
            ack.error.unwrap_or_else(|| "unknown reason".to_string())
        );
    }

    Ok(())
}

/// Query and print queue/worker telemetry from a running service
pub async fn status(server: String) -> Result<()> {
    let response = reqwest::get(format!("{}/api/v1/status", server))
        .await
        .context(format!("Failed to reach capture service at {}", server))?;

    let status: StatusResponse = response
        .json()
        .await
        .context("Failed to parse status response")?;

    println!("Running: {}", status.is_running);
    println!(
        "Queue: {} pending / {} processing / {} completed",
        status.pending, status.processing, status.completed
    );
    println!(
        "Workers: {}/{} healthy",
        status.healthy_workers, status.total_workers
    );
    for worker in &status.workers {
        println!(
            "  {} [{}] {:?}: {} processed, {} errors",
            worker.id,
            worker.browser_endpoint,
            worker.status,
            worker.processed_count,
            worker.error_count
        );
        if let Some(last) = worker.error_history.first() {
            println!("    last error: {}", last.error_details.message());
        }
    }

    Ok(())
}

/// Show the effective configuration, optionally creating the default file
pub async fn show_config(init: bool) -> Result<()> {
    if init {
        let path = ServiceConfig::default_path();
        if path.exists() {
            println!("Configuration already exists: {}", path.display());
        } else {
            ServiceConfig::default().save_to_file(&path)?;
            println!("Created default configuration: {}", path.display());
        }
        return Ok(());
    }

    let config = ServiceConfig::load_default()?;
    println!("Current configuration:");
    println!("{:#?}", config);

    Ok(())
}
