mod metrics;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pbi_export_core::{
    create_token_provider, load_config, validate_config, Config, ExportApi, ExportOrchestrator,
    ExportRequest, PollSettings, PowerBiClient, SanitizedConfig,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Export failed: {:#}", e);
        println!("Export failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("pbi-export {}", VERSION);

    // Determine config path
    let config_path = std::env::var("PBIEXPORT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Invalid configuration")?;

    let sanitized = SanitizedConfig::from(&config);
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Configuration loaded successfully (hash {})", &config_hash[..16]);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown signal received, cancelling export");
        signal_cancel.cancel();
    });

    let result = export(&config, &cancel).await;

    if let Some(path) = &config.metrics.textfile_path {
        if let Err(e) = metrics::write_textfile(path).await {
            warn!("Failed to write metrics textfile: {:#}", e);
        }
    }

    result
}

async fn export(config: &Config, cancel: &CancellationToken) -> Result<()> {
    let format = config
        .export
        .export_format()
        .context("Invalid export format")?;

    info!(
        "Exporting report {} from group {} to {} format",
        config.powerbi.report_id, config.powerbi.group_id, format
    );

    let tokens =
        create_token_provider(&config.powerbi, None).context("Failed to create token provider")?;
    let api: Arc<dyn ExportApi> = Arc::new(
        PowerBiClient::new(&config.powerbi).context("Failed to create Power BI client")?,
    );
    let orchestrator =
        ExportOrchestrator::new(tokens, api, PollSettings::from_config(&config.export))
            .with_retry(config.retry.clone());

    let mut request = ExportRequest::new(format);
    if let Some(report_configuration) = &config.export.report_configuration {
        request = request.with_report_configuration(report_configuration.clone());
    }

    let artifact = orchestrator.run(&request, cancel).await?;
    let size = artifact.len();
    let path = output::save_artifact(&config.export.output_directory, format, artifact).await?;

    println!("Export completed successfully!");
    println!("File saved as: {}", path.display());
    println!("File size: {} bytes", output::with_thousands(size));

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
