use anyhow::{Context, Result};
use clap::Parser;
use lodestone_server::cluster::{
    AdminConsole, ClusterNode, FailoverController, FailureDetector, HeartbeatMonitor, NodeRole,
};
use lodestone_server::replication::{MutationLog, ReplicationCoordinator};
use lodestone_server::server::{PeerService, run_client_listener, run_peer_listener};
use lodestone_server::transport::TcpTransport;
use lodestone_server::{KVStore, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lodestone-server")]
#[command(about = "Replicated key-value store node", long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured node id
    #[arg(long)]
    node_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(env_filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let node_id = args.node_id.unwrap_or_else(|| config.node_id());
    info!(
        "Starting Lodestone Server v{} as node {} ({})",
        env!("CARGO_PKG_VERSION"),
        node_id,
        config.replication.role.as_str()
    );

    // Core components, wired explicitly; there are no process-wide
    // registries anywhere in the node.
    let store = Arc::new(KVStore::new(config.kv_store.clone()));
    let log = Arc::new(MutationLog::new());
    let transport = Arc::new(TcpTransport::new());

    let coordinator = Arc::new(ReplicationCoordinator::new(
        node_id.clone(),
        config.replication.clone(),
        Arc::clone(&store),
        Arc::clone(&log),
        Arc::clone(&transport),
    )?);

    let monitor = Arc::new(HeartbeatMonitor::new(
        node_id.clone(),
        config.heartbeat.clone(),
        Arc::clone(&transport),
    ));
    let failover = Arc::new(FailoverController::new(
        node_id.clone(),
        config.failover.monitor_interval_ms,
    ));
    let detector = Arc::new(FailureDetector::new(
        Arc::clone(&monitor),
        config.failover.failure_scan_interval_ms,
    ));

    // Seed membership from the bootstrap list
    for entry in &config.cluster {
        failover.add_node(ClusterNode::new(
            &entry.id,
            &entry.host,
            entry.port,
            entry.role,
            entry.priority,
        ));

        if entry.id != node_id {
            monitor.add_node(&entry.id, &entry.host, entry.port);

            if config.replication.is_master() && entry.role == NodeRole::Slave {
                coordinator.add_replica(&entry.id, &entry.host, entry.port)?;
            }
        }
    }

    // The failure detector is the only bridge from health records to the
    // membership table.
    {
        let failover = Arc::clone(&failover);
        detector.set_failure_callback(Arc::new(move |dead_node| {
            failover.set_alive(dead_node, false);
        }));
    }

    let console = Arc::new(AdminConsole::new(
        Arc::clone(&failover),
        Arc::clone(&coordinator),
        Arc::clone(&monitor),
    ));

    coordinator.start();
    monitor.start();
    detector.start();
    failover.start_monitoring();

    let running = Arc::new(AtomicBool::new(true));

    let peer_addr: SocketAddr = config
        .peer_addr()
        .parse()
        .with_context(|| format!("invalid peer address {}", config.peer_addr()))?;
    let client_addr: SocketAddr = config
        .client_addr()
        .parse()
        .with_context(|| format!("invalid client address {}", config.client_addr()))?;

    let peer_service = Arc::new(PeerService::new(node_id.clone(), Arc::clone(&coordinator)));
    let peer_task = tokio::spawn(run_peer_listener(
        peer_addr,
        peer_service,
        Arc::clone(&running),
    ));
    let client_task = tokio::spawn(run_client_listener(
        client_addr,
        Arc::clone(&store),
        Arc::clone(&coordinator),
        console,
        Arc::clone(&running),
    ));

    // Listeners only return early when binding fails, which is fatal.
    tokio::select! {
        result = peer_task => result??,
        result = client_task => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    running.store(false, Ordering::SeqCst);
    coordinator.stop().await;
    detector.stop().await;
    monitor.stop().await;
    failover.stop_monitoring().await;

    info!("Node {} stopped", node_id);
    Ok(())
}
