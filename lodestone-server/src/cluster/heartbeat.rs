use crate::protocol::PeerMessage;
use crate::transport::{self, Transport};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consecutive missed probes tolerated before a node is considered dead
const MAX_MISSED_BEATS: u32 = 3;

/// Heartbeat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Sender loop period in milliseconds; the checker runs at half this
    pub interval_ms: u64,
    /// Silence beyond this marks a node dead
    pub timeout_ms: u64,
    /// Per-probe network timeout in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timeout_ms: 3000,
            probe_timeout_ms: 1000,
        }
    }
}

/// Health record for one monitored node, owned exclusively by the monitor
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub alive: bool,
    pub last_heartbeat_ms: u64,
    pub missed_beats: u32,
}

/// Aggregate liveness counts
#[derive(Debug, Clone, Default, Serialize)]
pub struct HeartbeatSummary {
    pub total_nodes: usize,
    pub alive_nodes: usize,
    pub dead_nodes: usize,
}

/// Per-peer liveness prober.
///
/// Two loops share the health table: the sender probes every node each
/// `interval_ms`, the checker re-evaluates `alive` flags each
/// `interval_ms / 2`. There is no hysteresis; a node may flap between
/// alive and dead as probes succeed and fail.
pub struct HeartbeatMonitor<T: Transport> {
    node_id: String,
    config: HeartbeatConfig,
    transport: Arc<T>,
    nodes: Arc<RwLock<HashMap<String, NodeHealth>>>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> HeartbeatMonitor<T> {
    pub fn new(node_id: impl Into<String>, config: HeartbeatConfig, transport: Arc<T>) -> Self {
        let node_id = node_id.into();
        info!("HeartbeatMonitor initialized for node {}", node_id);

        Self {
            node_id,
            config,
            transport,
            nodes: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start monitoring a node; a duplicate id is a no-op with a warning
    pub fn add_node(&self, node_id: impl Into<String>, host: impl Into<String>, port: u16) {
        let node_id = node_id.into();
        let host = host.into();
        let mut nodes = self.nodes.write();

        if nodes.contains_key(&node_id) {
            warn!("Node {} already monitored", node_id);
            return;
        }

        info!("Added node {} at {}:{} to heartbeat monitor", node_id, host, port);
        nodes.insert(
            node_id.clone(),
            NodeHealth {
                id: node_id,
                host,
                port,
                alive: true,
                last_heartbeat_ms: 0,
                missed_beats: 0,
            },
        );
    }

    /// Stop monitoring a node
    pub fn remove_node(&self, node_id: &str) {
        let mut nodes = self.nodes.write();
        if nodes.remove(node_id).is_some() {
            info!("Removed node {} from heartbeat monitor", node_id);
        } else {
            warn!("Node {} not monitored", node_id);
        }
    }

    /// Start the sender and checker loops
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("HeartbeatMonitor already running");
            return;
        }

        let mut tasks = self.tasks.lock();

        {
            let transport = Arc::clone(&self.transport);
            let nodes = Arc::clone(&self.nodes);
            let running = Arc::clone(&self.running);
            let node_id = self.node_id.clone();
            let interval = Duration::from_millis(self.config.interval_ms);
            let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);

            tasks.push(tokio::spawn(async move {
                info!("Heartbeat sender loop started");
                while running.load(Ordering::SeqCst) {
                    tokio::time::sleep(interval).await;
                    send_beats(transport.as_ref(), &node_id, &nodes, probe_timeout).await;
                }
                info!("Heartbeat sender loop stopped");
            }));
        }

        {
            let nodes = Arc::clone(&self.nodes);
            let running = Arc::clone(&self.running);
            let check_interval = Duration::from_millis(self.config.interval_ms / 2);
            let timeout_ms = self.config.timeout_ms;

            tasks.push(tokio::spawn(async move {
                info!("Heartbeat checker loop started");
                while running.load(Ordering::SeqCst) {
                    tokio::time::sleep(check_interval).await;
                    check_health(&nodes, timeout_ms);
                }
                info!("Heartbeat checker loop stopped");
            }));
        }

        info!("HeartbeatMonitor started");
    }

    /// Stop and join both loops
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let tasks = {
            let mut guard = self.tasks.lock();
            std::mem::take(&mut *guard)
        };
        for task in tasks {
            let _ = task.await;
        }
        info!("HeartbeatMonitor stopped");
    }

    /// One sender pass outside the loop
    pub(crate) async fn send_beats_once(&self) {
        send_beats(
            self.transport.as_ref(),
            &self.node_id,
            &self.nodes,
            Duration::from_millis(self.config.probe_timeout_ms),
        )
        .await;
    }

    /// One checker pass outside the loop
    pub fn check_health_once(&self) {
        check_health(&self.nodes, self.config.timeout_ms);
    }

    /// Ids of nodes currently considered dead
    pub fn dead_nodes(&self) -> Vec<String> {
        self.nodes
            .read()
            .values()
            .filter(|n| !n.alive)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Snapshot of every health record
    pub fn health_snapshot(&self) -> Vec<NodeHealth> {
        self.nodes.read().values().cloned().collect()
    }

    /// Aggregate counts
    pub fn summary(&self) -> HeartbeatSummary {
        let nodes = self.nodes.read();
        let alive = nodes.values().filter(|n| n.alive).count();
        HeartbeatSummary {
            total_nodes: nodes.len(),
            alive_nodes: alive,
            dead_nodes: nodes.len() - alive,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_health(&self, node_id: &str, alive: bool, last_heartbeat_ms: u64, missed: u32) {
        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.get_mut(node_id) {
            node.alive = alive;
            node.last_heartbeat_ms = last_heartbeat_ms;
            node.missed_beats = missed;
        }
    }
}

/// Probe every monitored node once and record the outcome.
///
/// Network I/O runs without the table lock; results are merged afterwards.
async fn send_beats<T: Transport>(
    transport: &T,
    own_id: &str,
    nodes: &RwLock<HashMap<String, NodeHealth>>,
    probe_timeout: Duration,
) {
    let targets: Vec<(String, String, u16)> = nodes
        .read()
        .values()
        .map(|n| (n.id.clone(), n.host.clone(), n.port))
        .collect();

    for (node_id, host, port) in targets {
        let request = PeerMessage::Probe {
            from: own_id.to_string(),
        };

        let acked = match transport::exchange(transport, &host, port, &request, probe_timeout).await
        {
            Ok(PeerMessage::ProbeAck { .. }) => true,
            Ok(reply) => {
                debug!("Node {} sent unexpected probe reply: {:?}", node_id, reply);
                false
            }
            Err(e) => {
                debug!("Probe to node {} failed: {}", node_id, e);
                false
            }
        };

        let mut guard = nodes.write();
        if let Some(node) = guard.get_mut(&node_id) {
            if acked {
                node.alive = true;
                node.missed_beats = 0;
                node.last_heartbeat_ms = now_ms();
            } else {
                node.missed_beats += 1;
            }
        }
    }
}

/// Re-evaluate alive flags from elapsed time and missed-beat counts
fn check_health(nodes: &RwLock<HashMap<String, NodeHealth>>, timeout_ms: u64) {
    let now = now_ms();
    let mut guard = nodes.write();

    for node in guard.values_mut() {
        if node.last_heartbeat_ms > 0 {
            let elapsed = now.saturating_sub(node.last_heartbeat_ms);

            if elapsed > timeout_ms && node.alive {
                node.alive = false;
                warn!(
                    "Node {} marked as dead (last heartbeat: {}ms ago)",
                    node.id, elapsed
                );
            } else if elapsed <= timeout_ms && !node.alive {
                node.alive = true;
                info!("Node {} is alive again", node.id);
            }
        }

        if node.missed_beats > MAX_MISSED_BEATS && node.alive {
            node.alive = false;
            warn!(
                "Node {} marked as dead (missed {} beats)",
                node.id, node.missed_beats
            );
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn monitor() -> HeartbeatMonitor<MemoryTransport> {
        HeartbeatMonitor::new(
            "node-1",
            HeartbeatConfig::default(),
            Arc::new(MemoryTransport::new()),
        )
    }

    #[test]
    fn test_add_remove_node() {
        let monitor = monitor();

        monitor.add_node("node-2", "10.0.0.2", 7700);
        monitor.add_node("node-2", "10.0.0.2", 7700); // duplicate is a no-op
        assert_eq!(monitor.summary().total_nodes, 1);

        monitor.remove_node("node-2");
        assert_eq!(monitor.summary().total_nodes, 0);
    }

    #[test]
    fn test_missed_beats_force_dead_regardless_of_elapsed_time() {
        let monitor = monitor();
        monitor.add_node("node-2", "10.0.0.2", 7700);

        // Recent heartbeat but four misses: the miss counter wins.
        monitor.force_health("node-2", true, now_ms(), 4);
        monitor.check_health_once();

        assert_eq!(monitor.dead_nodes(), vec!["node-2".to_string()]);
    }

    #[test]
    fn test_three_missed_beats_not_yet_dead() {
        let monitor = monitor();
        monitor.add_node("node-2", "10.0.0.2", 7700);

        monitor.force_health("node-2", true, now_ms(), 3);
        monitor.check_health_once();

        assert!(monitor.dead_nodes().is_empty());
    }

    #[test]
    fn test_timeout_marks_dead_and_recovery_revives() {
        let monitor = monitor();
        monitor.add_node("node-2", "10.0.0.2", 7700);

        // stale heartbeat
        monitor.force_health("node-2", true, now_ms() - 10_000, 0);
        monitor.check_health_once();
        assert_eq!(monitor.dead_nodes(), vec!["node-2".to_string()]);

        // fresh heartbeat flips it back; flapping is intentional
        monitor.force_health("node-2", false, now_ms(), 0);
        monitor.check_health_once();
        assert!(monitor.dead_nodes().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_increments_missed_beats() {
        let monitor = monitor();
        // unregistered endpoint: every probe fails
        monitor.add_node("node-2", "10.0.0.2", 7700);

        monitor.send_beats_once().await;
        monitor.send_beats_once().await;

        let health = monitor.health_snapshot();
        assert_eq!(health[0].missed_beats, 2);
    }
}
