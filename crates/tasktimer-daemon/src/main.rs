//! TaskTimer Daemon
//!
//! Owns the live timer set, persists it, reconciles it with the remote
//! authority and serves it over a Unix socket.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tasktimer_core::SystemClock;
use tasktimer_core::models::Config;
use tasktimer_core::storage::{FileStorage, init_data_dir};
use tasktimer_daemon::{ApiHandler, ConfigManager, IpcServer, PersistenceLayer, TimerStore};
use tasktimer_remote::{HttpAuthority, RemoteAuth, RemoteAuthority};

#[derive(Parser, Debug)]
#[command(name = "tasktimerd")]
#[command(about = "TaskTimer daemon - deadline-bounded task timers", long_about = None)]
struct Args {
    /// Socket path for IPC (overrides the config file)
    #[arg(short, long)]
    socket: Option<String>,

    /// Log level (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Directory holding config.json
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Remote authority base URL; enables sync
    #[arg(long)]
    remote_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = Arc::new(match args.config_dir {
        Some(ref dir) => ConfigManager::with_dir(dir.clone())?,
        None => ConfigManager::new()?,
    });
    let config = config_manager.get().await;

    run_daemon(args, config, config_manager).await
}

fn data_dir(config: &Config) -> Result<PathBuf> {
    match config.storage.data_dir {
        Some(ref dir) => {
            fs::create_dir_all(dir)?;
            Ok(dir.clone())
        }
        None => Ok(init_data_dir()?),
    }
}

fn remote_authority(
    config: &Config,
    remote_url: Option<String>,
) -> Result<Option<Arc<dyn RemoteAuthority>>> {
    let url = match remote_url {
        Some(url) => url,
        None if config.sync.enabled => match config.sync.remote_url {
            Some(ref url) => url.clone(),
            None => return Ok(None),
        },
        None => return Ok(None),
    };

    let mut authority = HttpAuthority::new(&url)
        .with_context(|| format!("Invalid remote URL {}", url))?
        .with_auth(RemoteAuth::from_token(config.sync.api_token.clone()));
    if let Some(timeout) = config.sync.request_timeout() {
        authority = authority.with_timeout(timeout)?;
    }

    tracing::info!("Syncing timers with {}", url);
    Ok(Some(Arc::new(authority)))
}

async fn run_daemon(args: Args, config: Config, config_manager: Arc<ConfigManager>) -> Result<()> {
    let data_dir = data_dir(&config)?;
    let log_file_path = data_dir.join("daemon.log");

    // Create log file with append mode
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    // Initialize logging - write to both file and stdout
    use tracing_subscriber::fmt::writer::MakeWriterExt;
    let stdout_writer = std::io::stdout.with_max_level(tracing::Level::INFO);
    let file_writer = log_file.with_max_level(tracing::Level::DEBUG);
    let log_level = args.log_level.unwrap_or(config.daemon.log_level.clone());

    tracing_subscriber::fmt()
        .with_writer(stdout_writer.and(file_writer))
        .with_env_filter(&log_level)
        .with_ansi(false) // No color codes in log file
        .init();

    let socket_path = args.socket.unwrap_or(config.daemon.socket_path.clone());
    tracing::info!("TaskTimer daemon starting...");
    tracing::info!("Socket path: {}", socket_path);
    tracing::info!("Data directory: {}", data_dir.display());

    let persistence = PersistenceLayer::new(
        Arc::new(FileStorage::new(data_dir.clone())),
        config.storage.key.clone(),
    );
    let mut store = TimerStore::new(config.engine.clone(), persistence, Arc::new(SystemClock));
    if let Some(remote) = remote_authority(&config, args.remote_url)? {
        store = store.with_remote(remote);
    }
    let store = Arc::new(store);
    tracing::info!("Timer store initialized with {} timers", store.timer_count().await);

    let scheduler = store.spawn_scheduler();

    let api_handler = Arc::new(ApiHandler::new(store.clone(), config_manager));
    let ipc_server = Arc::new(IpcServer::new(socket_path.clone(), api_handler));

    // Start IPC server in background
    let server_handle = {
        let server = ipc_server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!("IPC server error: {}", e);
            }
        })
    };

    tracing::info!("Daemon ready and listening");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    server_handle.abort();
    store.destroy();
    scheduler.await?;
    store.save_to_storage().await;

    if let Err(e) = fs::remove_file(&socket_path) {
        tracing::debug!("Socket {} not removed: {}", socket_path, e);
    }

    Ok(())
}
