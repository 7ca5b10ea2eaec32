use anyhow::Context;
use clap::Parser;
use mining_analysis::pipeline::{AnalysisScheduler, AnalysisService};
use mining_analysis::{api, config, logging};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Document analysis service for Québec mining project files.
#[derive(Parser, Debug)]
#[command(name = "mining-analysis", version, about)]
struct Cli {
    /// Listen port; overrides `PORT`/`SERVER_PORT`.
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();
    tracing::debug!(
        bucket = %config.storage_bucket,
        firestore_project = %config.firestore_project_id,
        has_service_account = config.service_account.is_some(),
        geocoding = config.geocoding_api_key.is_some(),
        remote_ner = config.ner_service_url.is_some(),
        max_concurrency = config.max_concurrency,
        "Loaded configuration"
    );

    let service = AnalysisService::from_config(config).context("Failed to build analysis service")?;
    let scheduler = AnalysisScheduler::new(Arc::new(service), config.max_concurrency);
    let app = api::create_router(Arc::new(scheduler));

    let port = cli.port.unwrap_or(config.server_port);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!(
        port,
        max_concurrency = config.max_concurrency,
        "Listening on http://0.0.0.0:{port}"
    );
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
