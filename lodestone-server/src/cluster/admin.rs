use super::failover::FailoverController;
use super::heartbeat::HeartbeatMonitor;
use super::types::ClusterError;
use crate::replication::{ReplicationCoordinator, ReplicationError};
use crate::transport::Transport;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors surfaced by admin command handlers; rendered as `ERROR: <message>`
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

/// Handler for one admin command, taking the whitespace-tokenized arguments
pub type CommandHandler = Box<dyn Fn(&[String]) -> Result<String, AdminError> + Send + Sync>;

/// Control-plane command dispatcher over the failover controller and the
/// replication coordinator. Every failure comes back as an `ERROR: ...`
/// string; nothing here panics the node.
pub struct AdminConsole<T: Transport> {
    commands: HashMap<String, CommandHandler>,
    #[allow(dead_code)]
    coordinator: Arc<ReplicationCoordinator<T>>,
}

impl<T: Transport> AdminConsole<T> {
    pub fn new(
        failover: Arc<FailoverController>,
        coordinator: Arc<ReplicationCoordinator<T>>,
        monitor: Arc<HeartbeatMonitor<T>>,
    ) -> Self {
        let mut console = Self {
            commands: HashMap::new(),
            coordinator: Arc::clone(&coordinator),
        };

        {
            let failover = Arc::clone(&failover);
            let coordinator = Arc::clone(&coordinator);
            let monitor = Arc::clone(&monitor);
            console.register("status", move |_args| {
                Ok(render_status(&failover, &coordinator, &monitor))
            });
        }

        {
            let failover = Arc::clone(&failover);
            console.register("nodes", move |_args| Ok(render_nodes(&failover)));
        }

        {
            let failover = Arc::clone(&failover);
            console.register("promote", move |args| {
                let slave_id = args.first().ok_or(AdminError::Usage("promote <slave_id>"))?;
                info!("Admin command: promoting slave {} to master", slave_id);
                failover.promote_slave_to_master(slave_id)?;
                Ok(format!("Promoted {} to master", slave_id))
            });
        }

        {
            let failover = Arc::clone(&failover);
            console.register("demote", move |args| {
                let master_id = args.first().ok_or(AdminError::Usage("demote <master_id>"))?;
                info!("Admin command: demoting master {} to slave", master_id);
                failover.demote_master_to_slave(master_id)?;
                Ok(format!("Demoted {} to slave", master_id))
            });
        }

        {
            let failover = Arc::clone(&failover);
            console.register("failover", move |_args| {
                info!("Admin command: initiating failover");
                if failover.initiate_election()? {
                    Ok(format!(
                        "Failover completed: {} is now master",
                        failover.local_node_id()
                    ))
                } else {
                    Ok("Election failed: insufficient votes".to_string())
                }
            });
        }

        console.register("ping", |_args| Ok("PONG".to_string()));
        console.register("help", |_args| Ok(render_help()));

        console
    }

    /// Register a command handler; later registrations replace earlier ones
    pub fn register(
        &mut self,
        name: &str,
        handler: impl Fn(&[String]) -> Result<String, AdminError> + Send + Sync + 'static,
    ) {
        debug!("Registered admin command: {}", name);
        self.commands.insert(name.to_string(), Box::new(handler));
    }

    /// Tokenize a command line, dispatch it, and render the outcome
    pub fn handle_command(&self, command_line: &str) -> String {
        let mut tokens = command_line.split_whitespace();

        let Some(name) = tokens.next() else {
            return "ERROR: Empty command".to_string();
        };
        let args: Vec<String> = tokens.map(|t| t.to_string()).collect();

        match self.commands.get(name) {
            Some(handler) => match handler(&args) {
                Ok(reply) => reply,
                Err(e) => format!("ERROR: {}", e),
            },
            None => format!("ERROR: Unknown command: {}", name),
        }
    }
}

fn render_status<T: Transport>(
    failover: &FailoverController,
    coordinator: &ReplicationCoordinator<T>,
    monitor: &HeartbeatMonitor<T>,
) -> String {
    let report = coordinator.status();
    let cluster = failover.summary();
    let beats = monitor.summary();

    let mut out = String::from("Node Status:\n");
    let _ = writeln!(out, "  Node ID: {}", report.node_id);
    let _ = writeln!(out, "  Role: {}", report.role);
    let _ = writeln!(out, "  Running: {}", report.running);
    let _ = writeln!(out, "  Last log ID: {}", report.last_log_id);

    match &report.master {
        Some((host, port)) => {
            let _ = writeln!(out, "  Master: {}:{}", host, port);
            let _ = writeln!(out, "  Last applied log ID: {}", report.last_applied_log_id);
            let _ = writeln!(out, "  Unsynced: {}", report.unsynced);
        }
        None => {
            let _ = writeln!(out, "  Replica count: {}", report.replicas.len());
            for cursor in &report.replicas {
                let _ = writeln!(
                    out,
                    "  - {} [{}:{}] alive={} next_log={} needs_resync={}",
                    cursor.replica_id,
                    cursor.host,
                    cursor.port,
                    cursor.alive,
                    cursor.next_log_id,
                    cursor.needs_resync
                );
            }
        }
    }

    let _ = writeln!(
        out,
        "Cluster: {} nodes ({} master, {} slaves, {} alive, {} dead)",
        cluster.total_nodes,
        cluster.masters,
        cluster.slaves,
        cluster.alive_nodes,
        cluster.dead_nodes
    );
    let _ = write!(
        out,
        "Heartbeat: {} monitored ({} alive, {} dead)",
        beats.total_nodes, beats.alive_nodes, beats.dead_nodes
    );

    out
}

fn render_nodes(failover: &FailoverController) -> String {
    let nodes = failover.nodes_snapshot();
    if nodes.is_empty() {
        return "Node List: (empty)".to_string();
    }

    let mut out = String::from("Node List:\n");
    for (i, node) in nodes.iter().enumerate() {
        let _ = writeln!(
            out,
            "  [{}] {} ({}:{}) [{}] [{}] priority={}",
            i + 1,
            node.id,
            node.host,
            node.port,
            node.role.as_str().to_uppercase(),
            if node.alive { "ALIVE" } else { "DEAD" },
            node.priority
        );
    }
    out.pop();
    out
}

fn render_help() -> String {
    concat!(
        "Available Admin Commands:\n",
        "  status                   - Show node and cluster status\n",
        "  nodes                    - List all cluster nodes\n",
        "  promote <slave_id>       - Promote a slave to master\n",
        "  demote <master_id>       - Demote a master to slave\n",
        "  failover                 - Initiate failover election\n",
        "  ping                     - Test connectivity\n",
        "  help                     - Show this help message"
    )
    .to_string()
}
