//! relaykv Server Binary
//!
//! Starts the HTTP server and, on a slave, the replication loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relaykv::network::Server;
use relaykv::replication::SlaveSync;
use relaykv::{Config, DiskStore, LogDb, MasterAddr, SyncStrategy};
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

/// relaykv Server
#[derive(Parser, Debug)]
#[command(name = "relaykv-server")]
#[command(about = "HTTP key-value store with binlog replication")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "./relaykv_data")]
    data_dir: PathBuf,

    /// Binlog directory (omit to run without a binlog)
    #[arg(short, long)]
    binlog_dir: Option<PathBuf>,

    /// Node id stamped into binlog records (required with --binlog-dir)
    #[arg(short, long, default_value = "0")]
    node_id: i32,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Replicate from this master (host:port)
    #[arg(short, long)]
    master: Option<MasterAddr>,

    /// Rotate binlog files after this many MB
    #[arg(long, default_value = "64")]
    binlog_mb: u64,

    /// Max pairs per range-get response
    #[arg(long, default_value = "100000")]
    batch_count: usize,

    /// Max KB per replication response
    #[arg(long, default_value = "3072")]
    batch_kb: usize,

    /// fsync the store journal every N writes (1 = every write)
    #[arg(long, default_value = "100")]
    sync_every: usize,

    /// Seconds between heartbeats to parked binlog pulls
    #[arg(long, default_value = "10")]
    heartbeat_secs: u64,

    /// Seconds to wait before reconnecting to the master
    #[arg(long, default_value = "3")]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relaykv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("relaykv Server v{}", relaykv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let sync_strategy = match args.sync_every {
        0 | 1 => SyncStrategy::EveryWrite,
        count => SyncStrategy::EveryNEntries { count },
    };
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .sync_strategy(sync_strategy)
        .node_id(args.node_id)
        .listen_addr(&args.listen)
        .binlog_size(args.binlog_mb * 1024 * 1024)
        .batch_count(args.batch_count.max(1))
        .batch_size(args.batch_kb * 1024)
        .heartbeat_interval(Duration::from_secs(args.heartbeat_secs.max(1)))
        .reconnect_delay(Duration::from_secs(args.reconnect_secs));
    if let Some(dir) = &args.binlog_dir {
        builder = builder.binlog_dir(dir);
    }
    if let Some(master) = args.master.clone() {
        builder = builder.master(master);
    }
    let config = builder.build();

    // Open store, then the log database on top of it
    let store = match DiskStore::open(&config) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };
    let db = match LogDb::open(config, store) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("Failed to open log database: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(Arc::clone(&db)).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let slave = match db.slave_status() {
        Some(_) => match SlaveSync::new(Arc::clone(&db)) {
            Ok(sync) => Some(tokio::spawn(sync.run(shutdown_rx.clone()))),
            Err(e) => {
                tracing::error!("Failed to start replication: {}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let server = tokio::spawn(server.run(shutdown_rx));

    // Ctrl+C starts the shutdown
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("Received Ctrl+C, initiating shutdown...");
    let _ = shutdown_tx.send(true);

    match server.await {
        Ok(Err(e)) => tracing::error!("Server error: {}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
        Ok(Ok(())) => {}
    }
    if let Some(slave) = slave {
        let _ = slave.await;
    }

    if let Err(e) = db.close() {
        tracing::error!("Failed to close log database: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
