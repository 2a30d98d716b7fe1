use super::config::ReplicationConfig;
use super::log::MutationLog;
use super::types::{
    LogEntry, MutationKind, ReplicaCursor, ReplicationError, ReplicationReport, ReplicationResult,
};
use crate::cluster::NodeRole;
use crate::core::{KVStore, StoreError};
use crate::protocol::PeerMessage;
use crate::transport::{self, Transport};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Role-scoped replication driver.
///
/// A master coordinator ships log entries to its slave cursors from a
/// background loop; a slave coordinator pulls entries from its master and
/// applies them through the mutation log. The role is fixed at construction.
pub struct ReplicationCoordinator<T: Transport> {
    node_id: String,
    config: ReplicationConfig,
    store: Arc<KVStore>,
    log: Arc<MutationLog>,
    transport: Arc<T>,

    /// Per-slave shipping cursors (master mode), in registration order
    cursors: Arc<RwLock<Vec<ReplicaCursor>>>,

    /// Master address (slave mode); swapped by failover reconfiguration
    master_addr: Arc<RwLock<Option<(String, u16)>>>,

    /// Highest log id applied to the local store (slave mode)
    last_applied: Arc<AtomicU64>,

    /// Set when incremental sync gave up and a full resync is needed
    unsynced: Arc<AtomicBool>,

    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> ReplicationCoordinator<T> {
    pub fn new(
        node_id: impl Into<String>,
        config: ReplicationConfig,
        store: Arc<KVStore>,
        log: Arc<MutationLog>,
        transport: Arc<T>,
    ) -> ReplicationResult<Self> {
        config.validate().map_err(ReplicationError::InvalidRole)?;

        let node_id = node_id.into();
        info!(
            "ReplicationCoordinator initialized for node {} with role {}",
            node_id,
            config.role.as_str()
        );

        let master_addr = match (&config.master_host, config.master_port) {
            (Some(host), Some(port)) => Some((host.clone(), port)),
            _ => None,
        };

        Ok(Self {
            node_id,
            config,
            store,
            log,
            transport,
            cursors: Arc::new(RwLock::new(Vec::new())),
            master_addr: Arc::new(RwLock::new(master_addr)),
            last_applied: Arc::new(AtomicU64::new(0)),
            unsynced: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn role(&self) -> NodeRole {
        self.config.role
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn log(&self) -> &Arc<MutationLog> {
        &self.log
    }

    /// Register a slave cursor. New replicas start at log id 1; if the
    /// retention floor has already moved past that, the shipping loop flags
    /// them for a full resync on its first pass.
    pub fn add_replica(
        &self,
        replica_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> ReplicationResult<()> {
        if !self.config.is_master() {
            return Err(ReplicationError::NotMaster);
        }

        let replica_id = replica_id.into();
        let host = host.into();
        let mut cursors = self.cursors.write();

        if cursors.iter().any(|c| c.replica_id == replica_id) {
            warn!("Replica {} already registered", replica_id);
            return Ok(());
        }

        info!("Registered replica {} at {}:{}", replica_id, host, port);
        cursors.push(ReplicaCursor {
            replica_id,
            host,
            port,
            alive: true,
            next_log_id: 1,
            needs_resync: false,
        });
        Ok(())
    }

    /// Remove a slave cursor; absent ids are a no-op with a warning
    pub fn remove_replica(&self, replica_id: &str) {
        let mut cursors = self.cursors.write();
        let before = cursors.len();
        cursors.retain(|c| c.replica_id != replica_id);

        if cursors.len() < before {
            info!("Removed replica {}", replica_id);
        } else {
            warn!("Replica {} not found", replica_id);
        }
    }

    /// Externally toggle a replica's liveness (e.g. a reconnection policy)
    pub fn mark_replica_alive(&self, replica_id: &str, alive: bool) {
        let mut cursors = self.cursors.write();
        match cursors.iter_mut().find(|c| c.replica_id == replica_id) {
            Some(cursor) => {
                cursor.alive = alive;
                info!("Set replica {} alive status to {}", replica_id, alive);
            }
            None => warn!("Replica {} not found", replica_id),
        }
    }

    /// Re-arm a cursor after an external full-state transfer completed
    pub fn rearm_replica(&self, replica_id: &str, next_log_id: u64) {
        let mut cursors = self.cursors.write();
        match cursors.iter_mut().find(|c| c.replica_id == replica_id) {
            Some(cursor) => {
                cursor.next_log_id = next_log_id.max(1);
                cursor.needs_resync = false;
                cursor.alive = true;
                info!(
                    "Re-armed replica {} at log id {}",
                    replica_id,
                    cursor.next_log_id
                );
            }
            None => warn!("Replica {} not found", replica_id),
        }
    }

    /// Apply a client write locally and record it in the mutation log.
    ///
    /// The store write precedes the log append, so a crash between the two
    /// leaves the write applied locally but never replicated.
    pub fn handle_write(&self, key: &str, value: &str, is_delete: bool) -> ReplicationResult<u64> {
        if !self.config.is_master() {
            return Err(ReplicationError::NotMaster);
        }

        let log_id = if is_delete {
            if !self.store.delete(key) {
                return Err(ReplicationError::Store(StoreError::KeyNotFound(
                    key.to_string(),
                )));
            }
            self.log.append(MutationKind::Delete, key, "")
        } else {
            self.store.put(key, value)?;
            self.log.append(MutationKind::Put, key, value)
        };

        debug!(
            "Logged {} operation: {} (log_id: {})",
            if is_delete { "DELETE" } else { "PUT" },
            key,
            log_id
        );
        Ok(log_id)
    }

    /// Answer a slave's pull request (master mode)
    pub fn serve_entries(
        &self,
        start_id: u64,
        max_count: usize,
    ) -> ReplicationResult<Vec<LogEntry>> {
        if !self.config.is_master() {
            return Err(ReplicationError::NotMaster);
        }

        let floor = self.log.first_log_id();
        if floor > 0 && start_id < floor {
            return Err(ReplicationError::ResyncRequired {
                requested: start_id,
                floor,
            });
        }

        Ok(self.log.entries_from(start_id, max_count))
    }

    /// Accept entries pushed by the master (slave mode): mirror them into
    /// the local log, then replay everything past the last applied id
    pub fn ingest_entries(&self, entries: Vec<LogEntry>) -> ReplicationResult<u64> {
        if !self.config.is_slave() {
            return Err(ReplicationError::NotSlave);
        }
        if entries.is_empty() {
            return Ok(0);
        }

        for entry in entries {
            self.log.append_replicated(entry)?;
        }

        let start_id = self.last_applied.load(Ordering::SeqCst) + 1;
        let applied = self.log.apply_to(&self.store, start_id)?;
        self.last_applied
            .store(self.log.last_log_id(), Ordering::SeqCst);
        Ok(applied)
    }

    pub fn last_applied_log_id(&self) -> u64 {
        self.last_applied.load(Ordering::SeqCst)
    }

    pub fn is_unsynced(&self) -> bool {
        self.unsynced.load(Ordering::SeqCst)
    }

    /// Point a slave coordinator at a (new) master
    pub fn set_master(&self, host: impl Into<String>, port: u16) {
        let host = host.into();
        info!("Set master to {}:{}", host, port);
        *self.master_addr.write() = Some((host, port));
    }

    /// Mark an external full-state transfer as complete (slave mode)
    pub fn complete_resync(&self, last_applied: u64) {
        self.last_applied.store(last_applied, Ordering::SeqCst);
        self.unsynced.store(false, Ordering::SeqCst);
        info!("Full resync complete at log id {}", last_applied);
    }

    /// Entries each replica still lags behind the head; dead replicas
    /// report `u64::MAX`
    pub fn replication_lag(&self) -> HashMap<String, u64> {
        let last = self.log.last_log_id();
        self.cursors
            .read()
            .iter()
            .map(|c| {
                let lag = if !c.alive {
                    u64::MAX
                } else if c.next_log_id <= last {
                    last - c.next_log_id + 1
                } else {
                    0
                };
                (c.replica_id.clone(), lag)
            })
            .collect()
    }

    /// Diagnostic snapshot; not used for control decisions
    pub fn status(&self) -> ReplicationReport {
        ReplicationReport {
            node_id: self.node_id.clone(),
            role: self.config.role.as_str().to_string(),
            running: self.running.load(Ordering::SeqCst),
            last_log_id: self.log.last_log_id(),
            last_applied_log_id: self.last_applied.load(Ordering::SeqCst),
            unsynced: self.unsynced.load(Ordering::SeqCst),
            master: self.master_addr.read().clone(),
            replicas: self.cursors.read().clone(),
        }
    }

    /// Start the role-specific background loop
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("ReplicationCoordinator already running");
            return;
        }

        let mut tasks = self.tasks.lock();
        match self.config.role {
            NodeRole::Master => {
                let transport = Arc::clone(&self.transport);
                let log = Arc::clone(&self.log);
                let cursors = Arc::clone(&self.cursors);
                let config = self.config.clone();
                let running = Arc::clone(&self.running);

                tasks.push(tokio::spawn(async move {
                    info!("Master shipping loop starting");
                    let mut tick =
                        tokio::time::interval(Duration::from_millis(config.ship_interval_ms));
                    while running.load(Ordering::SeqCst) {
                        tick.tick().await;
                        ship_tick(transport.as_ref(), &log, &cursors, &config).await;
                    }
                    info!("Master shipping loop exiting");
                }));
            }
            NodeRole::Slave => {
                let transport = Arc::clone(&self.transport);
                let store = Arc::clone(&self.store);
                let log = Arc::clone(&self.log);
                let master_addr = Arc::clone(&self.master_addr);
                let last_applied = Arc::clone(&self.last_applied);
                let unsynced = Arc::clone(&self.unsynced);
                let config = self.config.clone();
                let running = Arc::clone(&self.running);

                tasks.push(tokio::spawn(async move {
                    info!("Slave sync loop starting");
                    tokio::time::sleep(Duration::from_millis(config.sync_startup_delay_ms)).await;

                    let mut failures: u32 = 0;
                    while running.load(Ordering::SeqCst) {
                        let delay = match sync_tick(
                            transport.as_ref(),
                            &store,
                            &log,
                            &master_addr,
                            &last_applied,
                            &config,
                        )
                        .await
                        {
                            Ok(applied) => {
                                if applied > 0 {
                                    debug!("Applied {} replicated entries", applied);
                                }
                                failures = 0;
                                unsynced.store(false, Ordering::SeqCst);
                                Duration::from_millis(config.sync_interval_ms)
                            }
                            Err(ReplicationError::ResyncRequired { requested, floor }) => {
                                warn!(
                                    "Master no longer retains entries from {} (floor {}); awaiting full resync",
                                    requested, floor
                                );
                                unsynced.store(true, Ordering::SeqCst);
                                failures = 0;
                                Duration::from_millis(config.sync_backoff_max_ms)
                            }
                            Err(e) => {
                                failures = failures.saturating_add(1);
                                warn!(
                                    "Sync attempt failed ({}/{}): {}",
                                    failures.min(config.sync_max_retries),
                                    config.sync_max_retries,
                                    e
                                );
                                if failures == config.sync_max_retries {
                                    unsynced.store(true, Ordering::SeqCst);
                                    error!(
                                        "Incremental sync failed {} times in a row; marking unsynced",
                                        failures
                                    );
                                }
                                backoff_for(failures, &config)
                            }
                        };

                        tokio::time::sleep(delay).await;
                    }
                    info!("Slave sync loop exiting");
                }));
            }
            NodeRole::Candidate => unreachable!("validated at construction"),
        }
    }

    /// One shipping pass outside the background loop
    pub(crate) async fn ship_once(&self) {
        ship_tick(
            self.transport.as_ref(),
            &self.log,
            &self.cursors,
            &self.config,
        )
        .await;
    }

    /// One sync pass outside the background loop
    pub(crate) async fn sync_once(&self) -> ReplicationResult<u64> {
        sync_tick(
            self.transport.as_ref(),
            &self.store,
            &self.log,
            &self.master_addr,
            &self.last_applied,
            &self.config,
        )
        .await
    }

    /// Stop the background loop and join it; latency is bounded by the
    /// in-flight network timeout
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
        info!("ReplicationCoordinator stopped");
    }
}

/// One pass of the master shipping loop: every alive, in-retention cursor
/// behind the head gets one contiguous batch, in ascending id order.
pub(crate) async fn ship_tick<T: Transport>(
    transport: &T,
    log: &MutationLog,
    cursors: &RwLock<Vec<ReplicaCursor>>,
    config: &ReplicationConfig,
) {
    let last = log.last_log_id();
    if last == 0 {
        return;
    }
    let floor = log.first_log_id();

    // Snapshot targets; network I/O happens without the lock held.
    let targets: Vec<(String, String, u16, u64)> = cursors
        .read()
        .iter()
        .filter(|c| c.alive && !c.needs_resync && c.next_log_id <= last)
        .map(|c| (c.replica_id.clone(), c.host.clone(), c.port, c.next_log_id))
        .collect();

    for (replica_id, host, port, next) in targets {
        if next < floor {
            warn!(
                "Replica {} cursor {} fell below retention floor {}; full resync required",
                replica_id, next, floor
            );
            update_cursor(cursors, &replica_id, |c| c.needs_resync = true);
            continue;
        }

        let entries = log.entries_from(next, config.ship_batch);
        let Some(last_entry) = entries.last() else {
            continue;
        };
        let last_sent = last_entry.log_id;

        let request = PeerMessage::ShipEntries { entries };
        let timeout = Duration::from_millis(config.ship_timeout_ms);

        match transport::exchange(transport, &host, port, &request, timeout).await {
            Ok(PeerMessage::Ack) => {
                debug!(
                    "Shipped logs {}-{} to replica {}",
                    next, last_sent, replica_id
                );
                update_cursor(cursors, &replica_id, |c| c.next_log_id = last_sent + 1);
            }
            Ok(reply) => {
                warn!(
                    "Unexpected reply from replica {}: {:?}; marking dead",
                    replica_id, reply
                );
                update_cursor(cursors, &replica_id, |c| c.alive = false);
            }
            Err(e) => {
                warn!(
                    "Failed to ship logs to replica {}: {}; marking dead",
                    replica_id, e
                );
                update_cursor(cursors, &replica_id, |c| c.alive = false);
            }
        }
    }
}

/// One pass of the slave sync loop: fetch entries past the last applied id
/// and replay them locally
pub(crate) async fn sync_tick<T: Transport>(
    transport: &T,
    store: &KVStore,
    log: &MutationLog,
    master_addr: &RwLock<Option<(String, u16)>>,
    last_applied: &AtomicU64,
    config: &ReplicationConfig,
) -> ReplicationResult<u64> {
    let Some((host, port)) = master_addr.read().clone() else {
        return Err(ReplicationError::ConnectionFailed(
            "no master configured".to_string(),
        ));
    };

    let start_id = last_applied.load(Ordering::SeqCst) + 1;
    let request = PeerMessage::FetchEntries {
        start_id,
        max_count: config.sync_batch,
    };
    let timeout = Duration::from_millis(config.sync_timeout_ms);

    let reply = transport::exchange(transport, &host, port, &request, timeout)
        .await
        .map_err(|e| ReplicationError::ConnectionFailed(e.to_string()))?;

    match reply {
        PeerMessage::Entries { entries } => {
            if entries.is_empty() {
                return Ok(0);
            }
            for entry in entries {
                log.append_replicated(entry)?;
            }
            let applied = log.apply_to(store, start_id)?;
            last_applied.store(log.last_log_id(), Ordering::SeqCst);
            Ok(applied)
        }
        PeerMessage::ResyncRequired { floor } => Err(ReplicationError::ResyncRequired {
            requested: start_id,
            floor,
        }),
        PeerMessage::Error { code, message } => {
            Err(ReplicationError::Rejected(format!("{:?}: {}", code, message)))
        }
        other => Err(ReplicationError::Rejected(format!(
            "unexpected reply: {:?}",
            other
        ))),
    }
}

fn update_cursor(
    cursors: &RwLock<Vec<ReplicaCursor>>,
    replica_id: &str,
    update: impl FnOnce(&mut ReplicaCursor),
) {
    let mut guard = cursors.write();
    if let Some(cursor) = guard.iter_mut().find(|c| c.replica_id == replica_id) {
        update(cursor);
    }
}

fn backoff_for(failures: u32, config: &ReplicationConfig) -> Duration {
    let exp = failures.saturating_sub(1).min(6);
    let ms = config
        .sync_backoff_base_ms
        .saturating_mul(1u64 << exp)
        .min(config.sync_backoff_max_ms);
    Duration::from_millis(ms)
}
