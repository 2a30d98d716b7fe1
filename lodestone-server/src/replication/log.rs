use super::types::{LogEntry, MutationKind, ReplicationError, ReplicationResult};
use crate::core::KVStore;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Entry count above which the oldest entries are discarded
const RETENTION_LIMIT: usize = 10_000;

/// How many entries one trim pass removes
const TRIM_BATCH: usize = 1_000;

/// Append-only, monotonically-id'd mutation log.
///
/// Entries are contiguous: after trimming, `log_id` values still run without
/// gaps from the retention floor to the head. A replica whose cursor falls
/// below the floor cannot be served incrementally and must be driven through
/// a full resync by the caller.
pub struct MutationLog {
    inner: RwLock<LogInner>,
}

struct LogInner {
    entries: VecDeque<LogEntry>,
    next_log_id: u64,
}

impl MutationLog {
    pub fn new() -> Self {
        debug!("MutationLog initialized");
        Self {
            inner: RwLock::new(LogInner {
                entries: VecDeque::with_capacity(1_000),
                next_log_id: 1,
            }),
        }
    }

    /// Append a mutation, returning its assigned log id
    pub fn append(&self, kind: MutationKind, key: &str, value: &str) -> u64 {
        let mut inner = self.inner.write();

        let log_id = inner.next_log_id;
        inner.next_log_id += 1;

        inner.entries.push_back(LogEntry {
            log_id,
            term: 1,
            kind,
            key: key.to_string(),
            value: value.to_string(),
            timestamp: now_ms(),
        });

        if inner.entries.len() > RETENTION_LIMIT {
            inner.entries.drain(..TRIM_BATCH);
            info!("Mutation log trimmed to {} entries", inner.entries.len());
        }

        log_id
    }

    /// Mirror an entry shipped from another log, preserving its id.
    ///
    /// Entries at or below the current head are duplicates and are skipped
    /// (returns `Ok(false)`); an id that would leave a hole is rejected.
    pub fn append_replicated(&self, entry: LogEntry) -> ReplicationResult<bool> {
        let mut inner = self.inner.write();

        let last = inner.entries.back().map(|e| e.log_id).unwrap_or(0);
        if entry.log_id <= last {
            debug!("Log {} already present, skipping", entry.log_id);
            return Ok(false);
        }
        if last != 0 && entry.log_id != last + 1 {
            return Err(ReplicationError::SequenceGap {
                expected: last + 1,
                actual: entry.log_id,
            });
        }

        inner.next_log_id = entry.log_id + 1;
        inner.entries.push_back(entry);

        if inner.entries.len() > RETENTION_LIMIT {
            inner.entries.drain(..TRIM_BATCH);
            info!("Mutation log trimmed to {} entries", inner.entries.len());
        }

        Ok(true)
    }

    /// Contiguous slice of up to `max_count` entries with `log_id >= start_id`
    pub fn entries_from(&self, start_id: u64, max_count: usize) -> Vec<LogEntry> {
        let inner = self.inner.read();

        let Some(front) = inner.entries.front() else {
            return Vec::new();
        };

        let skip = start_id.saturating_sub(front.log_id) as usize;
        inner
            .entries
            .iter()
            .skip(skip)
            .take(max_count)
            .cloned()
            .collect()
    }

    /// Id of the newest entry, 0 if empty
    pub fn last_log_id(&self) -> u64 {
        self.inner
            .read()
            .entries
            .back()
            .map(|e| e.log_id)
            .unwrap_or(0)
    }

    /// Id of the oldest retained entry (the retention floor), 0 if empty
    pub fn first_log_id(&self) -> u64 {
        self.inner
            .read()
            .entries
            .front()
            .map(|e| e.log_id)
            .unwrap_or(0)
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether the log holds no entries
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Replay entries with `log_id >= start_id` against the store.
    ///
    /// Aborts on the first failed apply; entries applied before the failure
    /// remain applied, so a retry from the same `start_id` is idempotent.
    /// Deleting an already-absent key counts as applied.
    pub fn apply_to(&self, store: &KVStore, start_id: u64) -> ReplicationResult<u64> {
        let batch = {
            let inner = self.inner.read();
            let Some(front) = inner.entries.front() else {
                return Ok(0);
            };
            let skip = start_id.saturating_sub(front.log_id) as usize;
            inner
                .entries
                .iter()
                .skip(skip)
                .cloned()
                .collect::<Vec<_>>()
        };

        let mut applied = 0u64;
        for entry in batch {
            match entry.kind {
                MutationKind::Put => {
                    if let Err(e) = store.put(&entry.key, &entry.value) {
                        warn!("Failed to apply PUT log {}: {}", entry.log_id, e);
                        return Err(ReplicationError::ApplyFailed {
                            log_id: entry.log_id,
                            key: entry.key,
                        });
                    }
                    debug!("Applied PUT log {}: {}", entry.log_id, entry.key);
                }
                MutationKind::Delete => {
                    // A missing key means the delete already took effect.
                    store.delete(&entry.key);
                    debug!("Applied DELETE log {}: {}", entry.log_id, entry.key);
                }
            }
            applied += 1;
        }

        if applied > 0 {
            debug!("Applied {} logs to store starting from id {}", applied, start_id);
        }
        Ok(applied)
    }
}

impl Default for MutationLog {
    fn default() -> Self {
        Self::new()
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
    use crate::core::KVConfig;

    #[test]
    fn test_append_ids_strictly_increasing_from_one() {
        let log = MutationLog::new();

        for expected in 1..=20u64 {
            let id = log.append(MutationKind::Put, "k", "v");
            assert_eq!(id, expected);
        }
        assert_eq!(log.last_log_id(), 20);
        assert_eq!(log.first_log_id(), 1);
    }

    #[test]
    fn test_entries_from_bounds() {
        let log = MutationLog::new();
        for i in 0..50 {
            log.append(MutationKind::Put, &format!("k{}", i), "v");
        }

        let slice = log.entries_from(30, 10);
        assert_eq!(slice.len(), 10);
        assert_eq!(slice[0].log_id, 30);
        assert_eq!(slice[9].log_id, 39);
        assert!(slice.windows(2).all(|w| w[0].log_id < w[1].log_id));

        // start past the head yields nothing
        assert!(log.entries_from(51, 10).is_empty());
        // fewer entries than requested
        assert_eq!(log.entries_from(48, 10).len(), 3);
    }

    #[test]
    fn test_retention_trims_oldest_thousand() {
        let log = MutationLog::new();
        for _ in 0..10_001 {
            log.append(MutationKind::Put, "k", "v");
        }

        assert_eq!(log.len(), 9_001);
        assert_eq!(log.first_log_id(), 1_001);
        assert_eq!(log.last_log_id(), 10_001);

        // entries below the floor are gone
        assert_eq!(log.entries_from(1, 5)[0].log_id, 1_001);
    }

    #[test]
    fn test_apply_to_replays_from_start_id() {
        let log = MutationLog::new();
        let store = KVStore::new(KVConfig::default());

        log.append(MutationKind::Put, "a", "1");
        log.append(MutationKind::Put, "b", "2");
        log.append(MutationKind::Delete, "a", "");
        log.append(MutationKind::Put, "c", "3");

        let applied = log.apply_to(&store, 1).unwrap();
        assert_eq!(applied, 4);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some("2".to_string()));
        assert_eq!(store.get("c"), Some("3".to_string()));

        // replay from the same start id is idempotent
        let reapplied = log.apply_to(&store, 1).unwrap();
        assert_eq!(reapplied, 4);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some("2".to_string()));

        // partial replay only touches the tail
        let tail = log.apply_to(&store, 4).unwrap();
        assert_eq!(tail, 1);
    }

    #[test]
    fn test_append_replicated_dedups_and_rejects_gaps() {
        let log = MutationLog::new();

        let entry = |id: u64| LogEntry {
            log_id: id,
            term: 1,
            kind: MutationKind::Put,
            key: format!("k{}", id),
            value: "v".to_string(),
            timestamp: 0,
        };

        assert!(log.append_replicated(entry(1)).unwrap());
        assert!(log.append_replicated(entry(2)).unwrap());
        // duplicate is skipped, not an error
        assert!(!log.append_replicated(entry(2)).unwrap());
        // a hole is rejected
        assert!(matches!(
            log.append_replicated(entry(5)),
            Err(ReplicationError::SequenceGap {
                expected: 3,
                actual: 5
            })
        ));
        assert_eq!(log.last_log_id(), 2);
    }

    #[test]
    fn test_append_replicated_into_empty_log_accepts_any_start() {
        let log = MutationLog::new();
        let entry = LogEntry {
            log_id: 500,
            term: 1,
            kind: MutationKind::Put,
            key: "k".to_string(),
            value: "v".to_string(),
            timestamp: 0,
        };

        assert!(log.append_replicated(entry).unwrap());
        assert_eq!(log.first_log_id(), 500);
        assert_eq!(log.last_log_id(), 500);
        // the next native append continues the sequence
        assert_eq!(log.append(MutationKind::Put, "k2", "v"), 501);
    }
}
