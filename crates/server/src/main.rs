use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transmute_core::{
    create_event_system, create_usage_gate, default_enrichers, load_config, validate_config,
    ConversionEvent, Converter, EventStore, FallbackConverter, Orchestrator,
    RemoteConverter, SqliteEventStore,
};
use transmute_server::api::create_router;
use transmute_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("TRANSMUTE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Usage method: {:?}", config.usage.method);
    info!("Scratch directory: {:?}", config.conversion.scratch_dir);

    // Short config hash for the service_started event
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Event log is optional; without it conversions still run
    let (event_store, events, writer_handle) = if config.events.enabled {
        let store: Arc<dyn EventStore> = Arc::new(
            SqliteEventStore::new(&config.events.database_path)
                .context("Failed to create event store")?,
        );
        info!("Event store initialized at {:?}", config.events.database_path);

        let (handle, writer) = create_event_system(Arc::clone(&store), config.events.buffer_size);
        let writer_handle = tokio::spawn(writer.run());
        (Some(store), Some(handle), Some(writer_handle))
    } else {
        info!("Event persistence disabled");
        (None, None, None)
    };

    if let Some(ref handle) = events {
        handle
            .emit(ConversionEvent::ServiceStarted {
                version: VERSION.to_string(),
                config_hash: config_hash_short.to_string(),
            })
            .await;
    }

    let gate = create_usage_gate(&config.usage);
    info!("Using usage gate: {}", gate.method_name());

    let mut orchestrator = Orchestrator::new(config.conversion.clone(), gate)
        .with_default_adapters(config.ffmpeg.clone())
        .with_enrichers(default_enrichers(&config));
    if let Some(ref handle) = events {
        orchestrator = orchestrator.with_events(handle.clone());
    }

    let unavailable = orchestrator
        .validate_adapters()
        .await
        .into_iter()
        .filter(|(_, outcome)| outcome.is_err())
        .count();
    if unavailable > 0 {
        warn!(
            "{} adapter(s) unavailable; their conversions will fail with backend_unavailable",
            unavailable
        );
    }

    let converter: Arc<dyn Converter> = match &config.remote {
        Some(remote_config) => {
            let remote = RemoteConverter::new(remote_config);
            info!(
                "Remote converter at {}, local pipeline as fallback",
                remote.endpoint()
            );
            let mut fallback = FallbackConverter::new(remote, orchestrator);
            if let Some(ref handle) = events {
                fallback = fallback.with_events(handle.clone());
            }
            Arc::new(fallback)
        }
        None => {
            info!("No remote converter configured, converting locally");
            Arc::new(orchestrator)
        }
    };

    let state = Arc::new(AppState::new(config.clone(), converter, event_store));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some(handle) = events {
        handle
            .emit(ConversionEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            })
            .await;
        // The router and every converter clone were dropped with the server,
        // so this is the last sender and the writer drains and exits.
        drop(handle);
    }

    if let Some(writer_handle) = writer_handle {
        let _ = writer_handle.await;
        info!("Event writer stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
