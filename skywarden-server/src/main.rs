// Skywarden - Multi-kit drone surveillance analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Skywarden Server
//!
//! Bootstraps the whole stack: store connection and schema, the YAML kit
//! list, both ingestion pipelines, the health supervisor, and the read API.
//!
//! ## Usage
//!
//! ```bash
//! # Run with a kit list
//! skywarden-server --config kits.yaml
//!
//! # Custom bind address
//! skywarden-server --bind 0.0.0.0:9000
//! ```
//!
//! Exit codes: 0 clean exit, 1 configuration error, 2 store unreachable at
//! startup, 130 signalled shutdown.

mod config;
mod csv_export;
mod error;
mod handlers;
mod params;
mod routes;
mod state;

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use skywarden::retry::RetrySchedule;
use skywarden_ingest::{
    registry, supervisor, Collector, CollectorConfig, MqttIngest, Registry,
};
use skywarden_store::{Repository, Writer};

use crate::config::ServerConfig;
use crate::state::AppState;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_STORE: i32 = 2;
const EXIT_SIGNALLED: i32 = 130;

/// Skywarden analytics server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kit list file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP bind address
    #[arg(short, long, default_value = "0.0.0.0:8089")]
    bind: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);
    let code = run(args).await;
    std::process::exit(code);
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> i32 {
    info!("Skywarden Server v{}", skywarden::VERSION);

    // Configuration: fail before touching anything else.
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration error");
            return EXIT_CONFIG;
        }
    };
    let kit_entries = match &args.config {
        Some(path) => match registry::load_kit_file(path) {
            Ok(entries) => {
                info!(path, kits = entries.len(), "kit list loaded");
                entries
            }
            Err(err) => {
                tracing::error!(error = %err, "kit list error");
                return EXIT_CONFIG;
            }
        },
        None => Vec::new(),
    };

    // Store: connect and apply schema, or refuse to start.
    let pool = match skywarden_store::connect(&config.database_url, 10).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "store unreachable at startup");
            return EXIT_STORE;
        }
    };
    if let Err(err) = skywarden_store::schema::apply(&pool).await {
        tracing::error!(error = %err, "schema apply failed");
        return EXIT_STORE;
    }
    info!("store connected, schema applied");

    let writer = Writer::new(pool.clone());
    let repo = Repository::new(pool.clone());
    let registry = Arc::new(Registry::new(repo.clone()));

    match registry.apply_kit_file(&writer, &kit_entries).await {
        Ok(added) if added > 0 => info!(added, "kits registered from config"),
        Ok(_) => {}
        Err(err) => {
            tracing::error!(error = %err, "kit list apply failed");
            return EXIT_STORE;
        }
    }

    // Ingestion plumbing.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (writer_tx, writer_handle) =
        skywarden_ingest::spawn_writer(writer.clone(), config.batch_queue);
    let stats = Arc::new(skywarden_ingest::IngestStats::new());

    let poll_client = match reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "http client build failed");
            return EXIT_CONFIG;
        }
    };

    let collector = Collector::new(
        poll_client.clone(),
        repo.clone(),
        writer_tx.clone(),
        Arc::clone(&stats),
        CollectorConfig {
            poll: config.poll,
            thresholds: config.thresholds,
            retry: RetrySchedule::with_max_retries(config.max_retries),
            ..CollectorConfig::default()
        },
        shutdown_rx.clone(),
    );
    let collector_handle = tokio::spawn(collector.run());

    let mqtt_handle = if config.mqtt_enabled {
        let mqtt = MqttIngest::new(
            config.mqtt.clone(),
            writer_tx.clone(),
            Arc::clone(&stats),
            shutdown_rx.clone(),
        );
        info!(host = %config.mqtt.host, port = config.mqtt.port, "bus subscriber enabled");
        Some(tokio::spawn(mqtt.run()))
    } else {
        info!("no broker configured, bus subscriber disabled");
        None
    };

    let supervisor_handle = tokio::spawn(supervisor::run(
        Arc::clone(&registry),
        writer.clone(),
        config.thresholds,
        Duration::from_secs(30),
        shutdown_rx.clone(),
    ));

    // The channel clone held for ingestion is dropped here so the writer
    // drains once the ingest tasks stop.
    drop(writer_tx);

    // Read API.
    let state = Arc::new(AppState {
        pool,
        repo,
        writer,
        registry,
        probe_client: poll_client,
        thresholds: config.thresholds,
        pathloss: config.pathloss,
        stats,
        started_at: Instant::now(),
    });
    let app = routes::router(state);

    let listener = match TcpListener::bind(&args.bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(bind = %args.bind, error = %err, "bind failed");
            return EXIT_CONFIG;
        }
    };
    info!(bind = %args.bind, "serving read API");

    let signalled = Arc::new(AtomicBool::new(false));
    let signalled_flag = Arc::clone(&signalled);
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signalled_flag.store(true, Ordering::SeqCst);
        })
        .await;

    // Stop ticks, drain in-flight writes, close up.
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = collector_handle.await;
    if let Some(handle) = mqtt_handle {
        let _ = handle.await;
    }
    let _ = supervisor_handle.await;
    if tokio::time::timeout(Duration::from_secs(10), writer_handle)
        .await
        .is_err()
    {
        tracing::warn!("writer did not drain within 10s");
    }

    if let Err(err) = serve_result {
        tracing::error!(error = %err, "server error");
        return EXIT_CONFIG;
    }
    if signalled.load(Ordering::SeqCst) {
        info!("shutdown complete");
        return EXIT_SIGNALLED;
    }
    EXIT_OK
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
