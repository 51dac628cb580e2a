//! Storygate - sync gateway for serialized stories

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storygate::{
    config::Args,
    credentials::CredentialPool,
    db::CacheDb,
    ledger::JsonRpcLedger,
    pinning::{HttpStoreTransport, PinningClient},
    scheduler::RequestScheduler,
    server::{self, AppState},
    sync::{SyncEngine, SyncEngineConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("storygate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let ledger_endpoints = args.ledger_endpoint_list();

    info!("======================================");
    info!("  Storygate - story sync gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Database: {}", args.database_path);
    info!("Pinning API: {}", args.pinning_api_url);
    info!("Content gateway: {}", args.pinning_gateway_url);
    info!("Credentials: {}", args.credential_list().len());
    info!("Ledger endpoints: {}", ledger_endpoints.len());
    for (i, url) in ledger_endpoints.iter().enumerate() {
        info!("  rpc-{}: {}", i, url);
    }
    info!("======================================");

    let db = CacheDb::open(&args.database_path).await?;

    // Store client stack: credential pool -> paced scheduler -> transport
    let pool = Arc::new(CredentialPool::new(
        args.credential_list(),
        args.credential_min_spacing(),
    )?);
    let scheduler = Arc::new(RequestScheduler::new(args.store_min_interval()));
    let transport = Arc::new(HttpStoreTransport::new(
        args.pinning_api_url.clone(),
        args.pinning_gateway_url.clone(),
        args.store_fetch_timeout(),
    )?);
    let store = Arc::new(PinningClient::new(pool, scheduler, transport));

    let rpc_client = reqwest::Client::builder().build()?;
    let ledger = Arc::new(JsonRpcLedger::new(
        rpc_client,
        ledger_endpoints,
        args.ledger_probe_timeout(),
        args.request_timeout(),
    ));

    let engine = SyncEngine::new(
        SyncEngineConfig {
            max_concurrent_syncs: args.max_concurrent_syncs,
            ..Default::default()
        },
        db.clone(),
        ledger,
        Arc::clone(&store),
    );

    let state = Arc::new(AppState {
        args,
        db,
        store,
        engine,
        started_at: std::time::Instant::now(),
    });

    server::run(state).await?;
    Ok(())
}
