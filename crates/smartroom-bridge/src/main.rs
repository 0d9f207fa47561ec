//! Smartroom Bridge - MQTT telemetry bridge and HTTP API.
//!
//! Run with: `cargo run -p smartroom-bridge`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use smartroom_bridge::{
    AppState, BusPublisher, Config, FlushOutcome, Ingestor, MqttBus, OfflineBus, api, ws,
};
use smartroom_store::Store;

/// Smartroom Bridge - MQTT telemetry bridge and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "smartroom-bridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Do not connect to the broker (API only mode; commands fail).
    #[arg(long)]
    no_bus: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smartroom_bridge=info".parse()?)
                .add_directive("smartroom_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args and environment
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.apply_env_overrides();
    config.validate()?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    // Connect the bus
    let (mqtt, inbound) = if args.no_bus {
        info!("Message bus disabled, commands will be rejected");
        (None, None)
    } else {
        let (mqtt, inbound) = MqttBus::connect(&config.mqtt)?;
        (Some(mqtt), Some(inbound))
    };
    let bus: Arc<dyn BusPublisher> = match &mqtt {
        Some(mqtt) => mqtt.clone(),
        None => Arc::new(OfflineBus),
    };

    // Create application state
    let state = AppState::new(store, config.clone(), bus);
    state.seed_actuator_states().await?;

    let ingestor = inbound.map(|inbound| Ingestor::from_state(&state).spawn(inbound));

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    // Run the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");

    if let Some(mqtt) = mqtt {
        mqtt.disconnect().await;
    }
    if let Some(ingestor) = ingestor {
        ingestor.abort();
    }

    match state.aggregator.flush_now().await {
        FlushOutcome::Stored(sample) => info!("Flushed pending sample {}", sample.id),
        FlushOutcome::Failed(e) => warn!("Failed to flush pending sample: {}", e),
        _ => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
