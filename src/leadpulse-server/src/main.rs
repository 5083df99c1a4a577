//! LeadPulse — revenue & funnel analytics backend for the training-course
//! lead funnel.
//!
//! Main entry point that selects the storage tier, wires the engine, and
//! starts the server.

use clap::Parser;
use leadpulse_analytics::AnalyticsEngine;
use leadpulse_api::ApiServer;
use leadpulse_core::config::AppConfig;
use leadpulse_event_store::EventStore;
use leadpulse_ledger::{FixtureSource, HttpLedgerSource, LedgerReader, LedgerSource};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "leadpulse-server")]
#[command(about = "Revenue & funnel analytics backend")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LEADPULSE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "LEADPULSE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Ledger collaborator endpoint (overrides config)
    #[arg(long, env = "LEADPULSE__LEDGER__ENDPOINT")]
    ledger_endpoint: Option<String>,

    /// ClickHouse URL for the durable event tier (overrides config)
    #[arg(long, env = "LEADPULSE__EVENT_STORE__CLICKHOUSE_URL")]
    clickhouse_url: Option<String>,

    /// Data directory for the embedded event tier (overrides config)
    #[arg(long, env = "LEADPULSE__EVENT_STORE__DATA_DIR")]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadpulse=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("LeadPulse starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(endpoint) = cli.ledger_endpoint {
        config.ledger.endpoint = Some(endpoint);
    }
    if let Some(url) = cli.clickhouse_url {
        config.event_store.clickhouse_url = Some(url);
    }
    if let Some(dir) = cli.data_dir {
        config.event_store.data_dir = dir;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        "Configuration loaded"
    );

    // Select and open the event storage tier
    let store = EventStore::open(&config.event_store).await.map_err(|e| {
        error!(error = %e, "Failed to open event store");
        anyhow::anyhow!(e)
    })?;

    // Wire the ledger collaborator
    let source: Arc<dyn LedgerSource> = match &config.ledger.endpoint {
        Some(endpoint) => Arc::new(HttpLedgerSource::new(
            endpoint.clone(),
            config.ledger.timeout_secs,
        )?),
        None => {
            warn!("No ledger endpoint configured; summaries will cover an empty ledger");
            Arc::new(FixtureSource::empty())
        }
    };
    let reader = LedgerReader::new(source, &config.ledger);

    // Assemble the engine
    let engine = Arc::new(AnalyticsEngine::new(reader, store, &config.cache));

    // Start API server
    let api_server = ApiServer::new(config.clone(), engine.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Spawn cache maintenance task
    let engine_for_maintenance = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            engine_for_maintenance.run_maintenance();
        }
    });

    info!("LeadPulse is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
