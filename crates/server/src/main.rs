use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge_core::{
    create_progress_system, load_config, validate_config, Config, HttpStageClient, JobStore,
    OutcomeStore, ProgressEvent, ProgressStore, RefinementEngine, SchedulerStores,
    SqliteJobStore, SqliteOutcomeStore, SqliteProgressStore, SqliteTaskStore, StageSet,
    TaskScheduler, TaskStore,
};
use forge_server::api::create_router;
use forge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("FORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration before logging so the output format is known
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!("Loaded configuration from {:?}", config_path);

    validate_config(&config).context("Configuration validation failed")?;

    info!("Database path: {:?}", config.database.path);
    info!(
        "Scheduler: {} concurrent task(s), {} iteration(s) per task",
        config.scheduler.max_concurrent, config.engine.max_iterations
    );

    // Compute config hash for the progress log
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite stores
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    let task_store: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to create task store")?,
    );
    let outcome_store: Arc<dyn OutcomeStore> = Arc::new(
        SqliteOutcomeStore::new(&config.database.path)
            .context("Failed to create outcome store")?,
    );
    let progress_store: Arc<dyn ProgressStore> = Arc::new(
        SqliteProgressStore::new(&config.database.path)
            .context("Failed to create progress store")?,
    );
    info!("Stores initialized");

    // Create progress system
    let (progress_handle, progress_writer) =
        create_progress_system(Arc::clone(&progress_store), config.progress.buffer_size);
    let writer_handle = tokio::spawn(progress_writer.run());

    progress_handle
        .emit(ProgressEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Stage collaborators
    let stage_client =
        HttpStageClient::new(&config.stages).context("Failed to create stage client")?;
    info!("Stage service at {}", config.stages.base_url);

    let engine = Arc::new(RefinementEngine::new(
        StageSet::uniform(Arc::new(stage_client)),
        config.engine.clone(),
    ));

    let scheduler = Arc::new(TaskScheduler::new(
        SchedulerStores {
            jobs: Arc::clone(&job_store),
            tasks: Arc::clone(&task_store),
            outcomes: Arc::clone(&outcome_store),
        },
        engine,
        &config.scheduler,
        Some(progress_handle.clone()),
    ));
    info!("Task scheduler started");

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&scheduler),
        job_store,
        task_store,
        outcome_store,
        progress_store,
    ));

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Cancel remaining runs and wait for their outcomes
    info!("Stopping scheduler...");
    scheduler.shutdown().await;
    info!("Scheduler stopped");

    progress_handle
        .emit(ProgressEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every handle is gone; the scheduler holds clones.
    drop(scheduler);
    drop(progress_handle);

    let _ = writer_handle.await;
    info!("Progress writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
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
