use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use scholarly::api::{self, app_state::AppState};
use scholarly::cache::create_cache;
use scholarly::config::config::AppConfig;
use scholarly::config::loader::ConfigLoader;
use scholarly::jobs::{Beat, WorkerPool, create_broker, default_entries};
use scholarly::observability::init_tracing;
use scholarly::security::create_rate_limiter;
use scholarly::storage::create_document_store;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "scholarly")]
#[command(about = "AI research assistant backend")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true, env = "SCHOLARLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Run background workers
    Worker {
        /// Number of concurrent workers
        #[arg(long)]
        concurrency: Option<usize>,
        /// Comma separated queue names, in priority order
        #[arg(long, value_delimiter = ',')]
        queues: Option<Vec<String>>,
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Run the periodic task scheduler
    Beat {
        #[arg(long)]
        log_level: Option<String>,
    },
}

impl Command {
    fn log_level(&self) -> Option<&str> {
        match self {
            Command::Serve { log_level }
            | Command::Worker { log_level, .. }
            | Command::Beat { log_level } => log_level.as_deref(),
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")?;
    ConfigLoader::validate(&config).context("Invalid configuration")?;
    Ok(config)
}

/// 连接存储、队列与缓存并组装应用状态
async fn bootstrap(config: AppConfig) -> anyhow::Result<AppState> {
    let store = create_document_store(&config.database).await?;
    info!("Document store initialized: {}", store.backend());

    let broker = create_broker(&config.broker).await?;
    info!("Job broker initialized: {}", broker.backend());

    let cache = create_cache(&config.broker).await?;
    let rate_limiter = create_rate_limiter(&config.security, &config.broker).await?;

    Ok(AppState::build(config, store, broker, cache, rate_limiter)?)
}

/// 收到 Ctrl-C 或 SIGTERM 后广播停机信号
fn spawn_signal_listener() -> broadcast::Sender<()> {
    let (shutdown_tx, _) = broadcast::channel(4);
    let tx = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = tx.send(());
    });
    shutdown_tx
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn worker_pool(state: &AppState) -> WorkerPool {
    WorkerPool::new(
        state.config.worker.clone(),
        state.broker.clone(),
        state.dispatcher.tracker().clone(),
        Arc::new(state.task_handler()),
        state.metrics.clone(),
    )
}

fn beat(state: &AppState) -> Beat {
    Beat::new(
        default_entries(),
        state.dispatcher.clone(),
        state.config.scheduler.clone(),
        Utc::now(),
    )
}

async fn run_server(state: AppState, shutdown_tx: broadcast::Sender<()>) -> anyhow::Result<()> {
    let mut embedded = None;
    if state.config.worker.embedded {
        let mut pool = worker_pool(&state);
        pool.start().await?;
        info!("Embedded worker pool started");
        embedded = Some(pool);
    }
    let beat_handle = (state.config.worker.embedded && state.config.scheduler.enabled)
        .then(|| tokio::spawn(beat(&state).run(shutdown_tx.subscribe())));

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    if let Some(mut pool) = embedded {
        pool.shutdown().await?;
    }
    if let Some(handle) = beat_handle {
        let _ = handle.await;
    }
    Ok(())
}

async fn run_worker(state: AppState, shutdown_tx: broadcast::Sender<()>) -> anyhow::Result<()> {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let mut pool = worker_pool(&state);
    pool.start().await?;
    info!(
        concurrency = state.config.worker.concurrency,
        queues = ?state.config.worker.queues,
        "Worker started"
    );

    let _ = shutdown_rx.recv().await;
    pool.shutdown().await?;
    let stats = pool.stats();
    info!(
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "Worker stopped"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve { log_level: None });

    let mut config = load_config(cli.config.as_ref())?;
    if let Command::Worker {
        concurrency,
        queues,
        ..
    } = &command
    {
        if let Some(concurrency) = concurrency {
            config.worker.concurrency = *concurrency;
        }
        if let Some(queues) = queues {
            config.worker.queues = queues.clone();
        }
    }

    let _guard = init_tracing(&config.logging, command.log_level());
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting Scholarly"
    );

    let state = bootstrap(config).await?;
    let shutdown_tx = spawn_signal_listener();

    match command {
        Command::Serve { .. } => run_server(state, shutdown_tx).await?,
        Command::Worker { .. } => run_worker(state, shutdown_tx).await?,
        Command::Beat { .. } => {
            info!("Beat scheduler starting");
            beat(&state).run(shutdown_tx.subscribe()).await;
        }
    }

    info!("Shutdown complete");
    Ok(())
}
