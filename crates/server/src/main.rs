use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use reflex_core::IpAllowlist;
use reflex_engine::EngineBuilder;
use reflex_executor::HttpWebhookSender;
use reflex_server::actions::BuiltinActionRegistry;
use reflex_server::api::{AppState, router};
use reflex_server::{ReflexConfig, ServerError};
use reflex_state_memory::MemoryStore;

/// Reflex automation rule engine HTTP server.
#[derive(Parser, Debug)]
#[command(name = "reflex-server", about = "Standalone HTTP server for Reflex")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "reflex.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config: ReflexConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        ReflexConfig::default()
    };

    reflex_server::telemetry::init();

    if !Path::new(&cli.config).exists() {
        info!(path = %cli.config, "config file not found, using defaults");
    }

    let store = Arc::new(MemoryStore::new());
    let sender = HttpWebhookSender::new(OUTBOUND_TIMEOUT)
        .map_err(|e| ServerError::Config(e.to_string()))?;

    let mut builder = EngineBuilder::new(
        store.clone(),
        store.clone(),
        Arc::new(BuiltinActionRegistry),
        Arc::new(sender),
    )
    .queue_capacity(config.engine.queue_capacity)
    .max_concurrent_runs(config.engine.max_concurrent_runs)
    .dispatch_interval(Duration::from_secs(config.engine.dispatch_interval_seconds));
    if let Some(secret) = config.engine.signing_secret.clone() {
        builder = builder.default_signing_secret(secret);
    }
    let (engine, runtime) = builder.build();

    let shutdown = CancellationToken::new();
    let runtime_handle = tokio::spawn(runtime.run(shutdown.clone()));

    let trusted_proxies = IpAllowlist::parse(&config.server.trusted_proxies)
        .map_err(|e| ServerError::Config(format!("invalid trusted_proxies entry: {e}")))?;

    let state = AppState {
        engine: Arc::new(engine),
        rules: store,
        trusted_proxies,
    };
    let app = router(state);

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid bind address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "reflex server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the worker and dispatcher, waiting up to the configured timeout
    // for in-flight runs.
    shutdown.cancel();
    let timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    if tokio::time::timeout(timeout, runtime_handle).await.is_err() {
        info!("shutdown timeout elapsed with runs still in flight");
    }
    info!("reflex server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
