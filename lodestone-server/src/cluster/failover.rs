use super::types::{ClusterError, ClusterNode, ClusterResult, ClusterSummary, NodeRole};
use parking_lot::{Mutex, RwLock};
use std::cmp::Reverse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Priority granted to a freshly promoted master
const PROMOTED_PRIORITY: i32 = 100;

/// Priority restored to a cleanly demoted master
const DEMOTED_PRIORITY: i32 = 50;

/// Priority assigned to a master demoted because it died
const FAILED_PRIORITY: i32 = 10;

/// Authoritative membership table and failover executor.
///
/// The table is independent from the heartbeat monitor's health records;
/// `alive` flags arrive through `set_alive`, normally wired to the failure
/// detector's callback. Nodes are kept in insertion order so that selection
/// ties resolve deterministically.
pub struct FailoverController {
    node_id: String,
    nodes: Arc<RwLock<Vec<ClusterNode>>>,
    monitor_interval_ms: u64,
    monitoring: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FailoverController {
    pub fn new(node_id: impl Into<String>, monitor_interval_ms: u64) -> Self {
        let node_id = node_id.into();
        info!("FailoverController initialized for node: {}", node_id);

        Self {
            node_id,
            nodes: Arc::new(RwLock::new(Vec::new())),
            monitor_interval_ms,
            monitoring: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Add a node to the table; a duplicate id is a no-op with a warning
    pub fn add_node(&self, node: ClusterNode) {
        let mut nodes = self.nodes.write();

        if nodes.iter().any(|n| n.id == node.id) {
            warn!("Node {} already exists in cluster", node.id);
            return;
        }

        info!(
            "Added node {} to cluster: {}:{} [{}]",
            node.id,
            node.host,
            node.port,
            node.role.as_str()
        );
        nodes.push(node);
    }

    /// Remove a node; an absent id is a no-op with a warning
    pub fn remove_node(&self, node_id: &str) {
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|n| n.id != node_id);

        if nodes.len() < before {
            info!("Removed node {} from cluster", node_id);
        } else {
            warn!("Node {} not found in cluster", node_id);
        }
    }

    /// Externally feed a node's liveness (failure detector bridge)
    pub fn set_alive(&self, node_id: &str, alive: bool) {
        let mut nodes = self.nodes.write();
        match nodes.iter_mut().find(|n| n.id == node_id) {
            Some(node) => {
                node.alive = alive;
                info!("Set node {} alive status to {}", node_id, alive);
            }
            None => warn!("Node {} not found in cluster", node_id),
        }
    }

    /// Promote a slave, demoting any current master first.
    ///
    /// After a successful call exactly one node holds the master role.
    pub fn promote_slave_to_master(&self, slave_id: &str) -> ClusterResult<()> {
        let mut nodes = self.nodes.write();
        Self::promote_locked(&mut nodes, slave_id)
    }

    fn promote_locked(nodes: &mut [ClusterNode], slave_id: &str) -> ClusterResult<()> {
        let target = nodes
            .iter()
            .position(|n| n.id == slave_id)
            .ok_or_else(|| ClusterError::NodeNotFound(slave_id.to_string()))?;

        if nodes[target].role != NodeRole::Slave {
            return Err(ClusterError::NotSlave {
                id: slave_id.to_string(),
                role: nodes[target].role.as_str().to_string(),
            });
        }

        if let Some(old_master) = nodes.iter_mut().find(|n| n.role == NodeRole::Master) {
            old_master.role = NodeRole::Slave;
            info!("Demoted old master {} to slave", old_master.id);
        }

        nodes[target].role = NodeRole::Master;
        nodes[target].priority = PROMOTED_PRIORITY;
        info!("Promoted slave {} to master", slave_id);
        Ok(())
    }

    /// Demote the master and immediately elect a successor if one exists
    pub fn demote_master_to_slave(&self, master_id: &str) -> ClusterResult<()> {
        let mut nodes = self.nodes.write();

        let target = nodes
            .iter()
            .position(|n| n.id == master_id)
            .ok_or_else(|| ClusterError::NodeNotFound(master_id.to_string()))?;

        if nodes[target].role != NodeRole::Master {
            return Err(ClusterError::NotMaster {
                id: master_id.to_string(),
                role: nodes[target].role.as_str().to_string(),
            });
        }

        nodes[target].role = NodeRole::Slave;
        nodes[target].priority = DEMOTED_PRIORITY;
        info!("Demoted master {} to slave", master_id);

        match Self::select_locked(&nodes) {
            Some(successor) => {
                let id = successor.id.clone();
                if let Some(node) = nodes.iter_mut().find(|n| n.id == id) {
                    node.role = NodeRole::Master;
                    node.priority = PROMOTED_PRIORITY;
                }
                info!("Elected new master: {}", id);
            }
            None => warn!("No successor available after demoting {}", master_id),
        }

        Ok(())
    }

    /// Highest-priority alive slave; ties resolve to the earliest-added node
    pub fn select_new_master(&self) -> Option<ClusterNode> {
        Self::select_locked(&self.nodes.read())
    }

    fn select_locked(nodes: &[ClusterNode]) -> Option<ClusterNode> {
        nodes
            .iter()
            .filter(|n| n.role == NodeRole::Slave && n.alive)
            .min_by_key(|n| Reverse(n.priority))
            .cloned()
    }

    /// One master-failure check: if the current master is marked dead,
    /// promote the best slave and park the dead master at low priority.
    /// The dead node stays in the table.
    pub fn detect_master_failure_once(&self) {
        detect_master_failure(&self.nodes);
    }

    /// Simplified local election: the local node assumes every alive peer
    /// votes for it and wins on a majority of the alive count. No messages
    /// are exchanged; this is not safe under partition and only models a
    /// self-promotion trigger.
    pub fn initiate_election(&self) -> ClusterResult<bool> {
        info!("Initiating election for new master...");
        let mut nodes = self.nodes.write();

        let own_idx = nodes
            .iter()
            .position(|n| n.id == self.node_id && n.alive)
            .ok_or_else(|| ClusterError::NotEligible(self.node_id.clone()))?;

        nodes[own_idx].role = NodeRole::Candidate;
        info!("Node {} is requesting votes...", self.node_id);

        let total_alive = nodes.iter().filter(|n| n.alive).count();
        let votes = 1 + nodes
            .iter()
            .filter(|n| n.id != self.node_id && n.alive)
            .count();

        if votes > total_alive / 2 {
            nodes[own_idx].role = NodeRole::Master;
            nodes[own_idx].priority = PROMOTED_PRIORITY;

            for node in nodes.iter_mut().filter(|n| n.id != self.node_id) {
                node.role = NodeRole::Slave;
            }

            info!(
                "Election successful: node {} is now master with {}/{} votes",
                self.node_id, votes, total_alive
            );
            Ok(true)
        } else {
            nodes[own_idx].role = NodeRole::Slave;
            info!("Election failed: only {}/{} votes", votes, total_alive);
            Ok(false)
        }
    }

    /// Id of the current master, if any
    pub fn master_id(&self) -> Option<String> {
        self.nodes
            .read()
            .iter()
            .find(|n| n.role == NodeRole::Master)
            .map(|n| n.id.clone())
    }

    /// Ids of all slaves
    pub fn slave_ids(&self) -> Vec<String> {
        self.nodes
            .read()
            .iter()
            .filter(|n| n.role == NodeRole::Slave)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Full copy of the membership table, in insertion order
    pub fn nodes_snapshot(&self) -> Vec<ClusterNode> {
        self.nodes.read().clone()
    }

    /// Aggregate counts over the table
    pub fn summary(&self) -> ClusterSummary {
        let nodes = self.nodes.read();
        ClusterSummary {
            total_nodes: nodes.len(),
            masters: nodes.iter().filter(|n| n.role == NodeRole::Master).count(),
            slaves: nodes.iter().filter(|n| n.role == NodeRole::Slave).count(),
            alive_nodes: nodes.iter().filter(|n| n.alive).count(),
            dead_nodes: nodes.iter().filter(|n| !n.alive).count(),
        }
    }

    pub fn local_node_id(&self) -> &str {
        &self.node_id
    }

    /// Start the master-failure monitor loop
    pub fn start_monitoring(&self) {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            warn!("FailoverController already monitoring");
            return;
        }

        let nodes = Arc::clone(&self.nodes);
        let monitoring = Arc::clone(&self.monitoring);
        let interval = Duration::from_millis(self.monitor_interval_ms);

        self.tasks.lock().push(tokio::spawn(async move {
            info!("Cluster monitor loop started");
            while monitoring.load(Ordering::SeqCst) {
                tokio::time::sleep(interval).await;
                detect_master_failure(&nodes);
            }
            info!("Cluster monitor loop stopped");
        }));

        info!("FailoverController started monitoring");
    }

    /// Stop and join the monitor loop
    pub async fn stop_monitoring(&self) {
        if !self.monitoring.swap(false, Ordering::SeqCst) {
            return;
        }

        let tasks = {
            let mut guard = self.tasks.lock();
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            let _ = task.await;
        }
        info!("FailoverController stopped monitoring");
    }
}

fn detect_master_failure(nodes: &RwLock<Vec<ClusterNode>>) {
    let mut nodes = nodes.write();

    let Some(master_idx) = nodes.iter().position(|n| n.role == NodeRole::Master) else {
        warn!("No master found in cluster");
        return;
    };

    if nodes[master_idx].alive {
        return;
    }

    let master_id = nodes[master_idx].id.clone();
    warn!("Master {} is dead, initiating failover...", master_id);

    match FailoverController::select_locked(&nodes) {
        Some(successor) => {
            let successor_id = successor.id.clone();
            if let Some(node) = nodes.iter_mut().find(|n| n.id == successor_id) {
                node.role = NodeRole::Master;
                node.priority = PROMOTED_PRIORITY;
            }

            nodes[master_idx].role = NodeRole::Slave;
            nodes[master_idx].priority = FAILED_PRIORITY;

            info!("Failover completed: {} is new master", successor_id);
        }
        None => error!("No suitable slave found for failover"),
    }
}
