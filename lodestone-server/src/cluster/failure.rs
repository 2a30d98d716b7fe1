use super::heartbeat::HeartbeatMonitor;
use crate::transport::Transport;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked once per node when it transitions to dead
pub type FailureCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Edge-triggered wrapper over the heartbeat monitor.
///
/// A background scan diffs the current dead set against the set of nodes
/// already notified, firing the callback exactly once per alive-to-dead
/// transition. A recovered node stays in the notified set; it is not
/// re-notified on a later failure unless `acknowledge` re-arms it.
pub struct FailureDetector<T: Transport> {
    monitor: Arc<HeartbeatMonitor<T>>,
    callback: Arc<RwLock<Option<FailureCallback>>>,
    notified: Arc<RwLock<HashSet<String>>>,
    scan_interval_ms: u64,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Transport> FailureDetector<T> {
    pub fn new(monitor: Arc<HeartbeatMonitor<T>>, scan_interval_ms: u64) -> Self {
        info!("FailureDetector initialized");
        Self {
            monitor,
            callback: Arc::new(RwLock::new(None)),
            notified: Arc::new(RwLock::new(HashSet::new())),
            scan_interval_ms,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register the callback fired on each new failure
    pub fn set_failure_callback(&self, callback: FailureCallback) {
        *self.callback.write() = Some(callback);
        debug!("Failure callback set");
    }

    /// Start the scan loop
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("FailureDetector already running");
            return;
        }

        let monitor = Arc::clone(&self.monitor);
        let callback = Arc::clone(&self.callback);
        let notified = Arc::clone(&self.notified);
        let running = Arc::clone(&self.running);
        let interval = Duration::from_millis(self.scan_interval_ms);

        self.tasks.lock().push(tokio::spawn(async move {
            info!("Failure detection loop started");
            while running.load(Ordering::SeqCst) {
                tokio::time::sleep(interval).await;
                scan(monitor.as_ref(), &callback, &notified);
            }
            info!("Failure detection loop stopped");
        }));

        info!("FailureDetector started");
    }

    /// Stop and join the scan loop
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
        info!("FailureDetector stopped");
    }

    /// One scan pass outside the loop
    pub fn scan_once(&self) {
        scan(self.monitor.as_ref(), &self.callback, &self.notified);
    }

    /// Forget a past notification so a future failure fires again
    pub fn acknowledge(&self, node_id: &str) {
        if self.notified.write().remove(node_id) {
            info!("Cleared failure notification for node {}", node_id);
        }
    }

    /// Current dead set, straight from the heartbeat monitor
    pub fn failed_nodes(&self) -> Vec<String> {
        self.monitor.dead_nodes()
    }
}

fn scan<T: Transport>(
    monitor: &HeartbeatMonitor<T>,
    callback: &RwLock<Option<FailureCallback>>,
    notified: &RwLock<HashSet<String>>,
) {
    let dead = monitor.dead_nodes();

    for node_id in dead {
        let newly_dead = notified.write().insert(node_id.clone());
        if !newly_dead {
            continue;
        }

        warn!("Detected node failure: {}", node_id);
        let callback = callback.read().clone();
        if let Some(callback) = callback {
            callback(&node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::heartbeat::HeartbeatConfig;
    use crate::transport::MemoryTransport;
    use std::sync::atomic::AtomicUsize;

    fn detector_with_monitor() -> (FailureDetector<MemoryTransport>, Arc<HeartbeatMonitor<MemoryTransport>>)
    {
        let monitor = Arc::new(HeartbeatMonitor::new(
            "node-1",
            HeartbeatConfig::default(),
            Arc::new(MemoryTransport::new()),
        ));
        (FailureDetector::new(Arc::clone(&monitor), 2000), monitor)
    }

    #[test]
    fn test_notifies_exactly_once_per_failure() {
        let (detector, monitor) = detector_with_monitor();
        monitor.add_node("node-2", "10.0.0.2", 7700);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        detector.set_failure_callback(Arc::new(move |node_id| {
            assert_eq!(node_id, "node-2");
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.force_health("node-2", false, 1, 5);

        // repeated scans over a persistently dead node fire once
        detector.scan_once();
        detector.scan_once();
        detector.scan_once();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recovered_node_not_renotified_without_acknowledge() {
        let (detector, monitor) = detector_with_monitor();
        monitor.add_node("node-2", "10.0.0.2", 7700);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        detector.set_failure_callback(Arc::new(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.force_health("node-2", false, 1, 5);
        detector.scan_once();

        // recovery, then a second failure: stays silent
        monitor.force_health("node-2", true, 1, 0);
        detector.scan_once();
        monitor.force_health("node-2", false, 1, 5);
        detector.scan_once();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // acknowledging re-arms the notification
        detector.acknowledge("node-2");
        detector.scan_once();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scan_without_callback_does_not_panic() {
        let (detector, monitor) = detector_with_monitor();
        monitor.add_node("node-2", "10.0.0.2", 7700);
        monitor.force_health("node-2", false, 1, 5);

        detector.scan_once();
        assert_eq!(detector.failed_nodes(), vec!["node-2".to_string()]);
    }
}
