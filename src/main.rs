//! Smart Storage Agent
//!
//! Node-local storage placement agent. Reads the StorageCluster intent,
//! probes the node's block devices and publishes the resulting placement
//! plan over HTTP.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smart_storage_agent::agent::{router, serve};
use smart_storage_agent::domain::ports::{IntentSourceRef, KeyValueStoreRef};
use smart_storage_agent::{
    Agent, AgentConfig, AgentMetrics, ApiServerConfig, ConfigMapStore, Error, FileIntentSource,
    FileStore, HardwareScanner, IdentityLedger, KubeIntentSource, MemoryStore, ProbeConfig,
    Result, ScannerConfig, SystemExecutor,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Ledger backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LedgerBackend {
    Configmap,
    File,
    Memory,
}

/// Smart Storage Agent - node-local storage placement
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name of the node this agent runs on
    #[arg(long, env = "NODE_NAME")]
    node_name: String,

    /// Read the StorageCluster from a YAML file instead of the API
    #[arg(long, env = "INTENT_FILE")]
    intent_file: Option<PathBuf>,

    /// StorageCluster name
    #[arg(long, env = "CLUSTER_NAME", default_value = "rook-ceph")]
    cluster_name: String,

    /// Namespace of the StorageCluster and ledger ConfigMaps
    #[arg(long, env = "POD_NAMESPACE", default_value = "rook-ceph")]
    namespace: String,

    /// Where identity assignments are persisted
    #[arg(long, env = "LEDGER", value_enum, default_value = "configmap")]
    ledger: LedgerBackend,

    /// Directory of the file ledger
    #[arg(long, env = "LEDGER_DIR", default_value = "/var/lib/rook/ledger")]
    ledger_dir: PathBuf,

    /// Path to sysfs
    #[arg(long, env = "SYSFS_PATH", default_value = "/sys")]
    sysfs_path: PathBuf,

    /// Seconds between placement passes
    #[arg(long, env = "INTERVAL_SECS", default_value = "60")]
    interval_secs: u64,

    /// HTTP API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run in standalone mode (no Kubernetes)
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Smart Storage Agent");
    info!("  Version: {}", smart_storage_agent::VERSION);
    info!("  Node: {}", args.node_name);
    info!("  API: {}", args.api_addr);
    info!("  Ledger: {:?}", args.ledger);
    info!("  Standalone mode: {}", args.standalone);

    let api_addr: SocketAddr = args
        .api_addr
        .parse()
        .map_err(|e| Error::Configuration(format!("Invalid API address: {}", e)))?;

    let client = if args.standalone {
        None
    } else {
        Some(kube::Client::try_default().await?)
    };

    let ledger = IdentityLedger::new(build_store(&args, client.clone()).await?);
    let intent = build_intent_source(&args, client)?;
    info!("  Intent: {}", intent.describe());

    let scanner = HardwareScanner::new(ScannerConfig {
        sysfs_path: args.sysfs_path.clone(),
        ..Default::default()
    });

    let config = AgentConfig {
        node_name: args.node_name.clone(),
        interval: Duration::from_secs(args.interval_secs),
        probe: ProbeConfig {
            debug: args.log_level.eq_ignore_ascii_case("debug")
                || args.log_level.eq_ignore_ascii_case("trace"),
            ..Default::default()
        },
        ..Default::default()
    };

    let agent = Agent::new(
        config,
        intent,
        ledger,
        Arc::new(SystemExecutor::new()),
        Arc::new(scanner),
        Arc::new(AgentMetrics::new()?),
    );

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    let app = router(agent.state(), agent.metrics());
    let api_cancel = cancel.clone();
    let api = tokio::spawn(async move {
        serve(ApiServerConfig { addr: api_addr }, app, api_cancel).await
    });

    agent.run(cancel.clone()).await?;

    match api.await {
        Ok(Err(e)) => error!("API server error: {}", e),
        Err(e) => error!("API server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Agent shutdown complete");
    Ok(())
}

// =============================================================================
// Wiring
// =============================================================================

async fn build_store(args: &Args, client: Option<kube::Client>) -> Result<KeyValueStoreRef> {
    match args.ledger {
        LedgerBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        LedgerBackend::File => Ok(Arc::new(FileStore::with_path(&args.ledger_dir).await?)),
        LedgerBackend::Configmap => {
            let client = client.ok_or_else(|| {
                Error::Configuration("configmap ledger requires Kubernetes; use --ledger file".into())
            })?;
            Ok(Arc::new(ConfigMapStore::new(client, args.namespace.clone())))
        }
    }
}

fn build_intent_source(args: &Args, client: Option<kube::Client>) -> Result<IntentSourceRef> {
    if let Some(path) = &args.intent_file {
        return Ok(Arc::new(FileIntentSource::new(path)));
    }
    let client = client.ok_or_else(|| {
        Error::Configuration("standalone mode requires --intent-file".into())
    })?;
    Ok(Arc::new(KubeIntentSource::new(
        client,
        args.namespace.clone(),
        args.cluster_name.clone(),
    )))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,kube=info,tower=warn,tower_http=info,axum=info",
            level
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
