use super::*;
use crate::cluster::NodeRole;
use crate::core::{KVConfig, KVStore};
use crate::server::PeerService;
use crate::transport::MemoryTransport;
use std::sync::Arc;

struct TestNode {
    coordinator: Arc<ReplicationCoordinator<MemoryTransport>>,
    store: Arc<KVStore>,
}

fn master_node(transport: &Arc<MemoryTransport>) -> TestNode {
    let store = Arc::new(KVStore::new(KVConfig::default()));
    let log = Arc::new(MutationLog::new());
    let coordinator = Arc::new(
        ReplicationCoordinator::new(
            "master-1",
            ReplicationConfig::default(),
            Arc::clone(&store),
            log,
            Arc::clone(transport),
        )
        .unwrap(),
    );

    let service = Arc::new(PeerService::new("master-1", Arc::clone(&coordinator)));
    transport.register("10.0.0.1", 7700, service.frame_handler());

    TestNode { coordinator, store }
}

fn slave_node(id: &str, host: &str, transport: &Arc<MemoryTransport>) -> TestNode {
    let store = Arc::new(KVStore::new(KVConfig::default()));
    let log = Arc::new(MutationLog::new());

    let mut config = ReplicationConfig::default();
    config.role = NodeRole::Slave;
    config.master_host = Some("10.0.0.1".to_string());
    config.master_port = Some(7700);

    let coordinator = Arc::new(
        ReplicationCoordinator::new(id, config, Arc::clone(&store), log, Arc::clone(transport))
            .unwrap(),
    );

    let service = Arc::new(PeerService::new(id, Arc::clone(&coordinator)));
    transport.register(host, 7700, service.frame_handler());

    TestNode { coordinator, store }
}

#[tokio::test]
async fn test_master_ships_entries_to_slave() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);

    master.coordinator.add_replica("slave-1", "10.0.0.2", 7700).unwrap();
    master.coordinator.handle_write("k1", "v1", false).unwrap();
    master.coordinator.handle_write("k2", "v2", false).unwrap();

    master.coordinator.ship_once().await;

    assert_eq!(slave.store.get("k1"), Some("v1".to_string()));
    assert_eq!(slave.store.get("k2"), Some("v2".to_string()));
    assert_eq!(slave.coordinator.last_applied_log_id(), 2);

    // cursor advanced past the shipped batch
    let report = master.coordinator.status();
    assert_eq!(report.replicas[0].next_log_id, 3);
}

#[tokio::test]
async fn test_shipping_batches_are_bounded_and_contiguous() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);

    master.coordinator.add_replica("slave-1", "10.0.0.2", 7700).unwrap();
    for i in 0..25 {
        master
            .coordinator
            .handle_write(&format!("k{}", i), "v", false)
            .unwrap();
    }

    // batch limit is 10: three passes drain 25 entries
    master.coordinator.ship_once().await;
    assert_eq!(slave.coordinator.last_applied_log_id(), 10);
    master.coordinator.ship_once().await;
    assert_eq!(slave.coordinator.last_applied_log_id(), 20);
    master.coordinator.ship_once().await;
    assert_eq!(slave.coordinator.last_applied_log_id(), 25);
}

#[tokio::test]
async fn test_ship_failure_marks_replica_dead_immediately() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);

    // registered cursor, but no endpoint: every ship fails
    master.coordinator.add_replica("slave-9", "10.0.0.9", 7700).unwrap();
    master.coordinator.handle_write("k", "v", false).unwrap();

    master.coordinator.ship_once().await;

    let report = master.coordinator.status();
    assert!(!report.replicas[0].alive);
    assert_eq!(report.replicas[0].next_log_id, 1);

    // dead replicas report maximal lag
    let lag = master.coordinator.replication_lag();
    assert_eq!(lag["slave-9"], u64::MAX);

    // externally marking it alive makes it eligible again
    master.coordinator.mark_replica_alive("slave-9", true);
    let slave = slave_node("slave-9", "10.0.0.9", &transport);
    master.coordinator.ship_once().await;
    assert_eq!(slave.coordinator.last_applied_log_id(), 1);
}

#[tokio::test]
async fn test_slave_pull_sync_applies_entries() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);

    master.coordinator.handle_write("user:1", "alice", false).unwrap();
    master.coordinator.handle_write("user:2", "bob", false).unwrap();
    master.coordinator.handle_write("user:1", "", true).unwrap();

    let applied = slave.coordinator.sync_once().await.unwrap();
    assert_eq!(applied, 3);
    assert_eq!(slave.store.get("user:1"), None);
    assert_eq!(slave.store.get("user:2"), Some("bob".to_string()));

    // an idle second pass applies nothing
    assert_eq!(slave.coordinator.sync_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_slave_sync_fails_against_unreachable_master() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);
    master.coordinator.handle_write("k", "v", false).unwrap();

    transport.set_unreachable("10.0.0.1", 7700);
    assert!(matches!(
        slave.coordinator.sync_once().await,
        Err(ReplicationError::ConnectionFailed(_))
    ));

    transport.set_reachable("10.0.0.1", 7700);
    assert_eq!(slave.coordinator.sync_once().await.unwrap(), 1);
}

#[tokio::test]
async fn test_trimmed_master_demands_full_resync_from_lagging_slave() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);

    // overflow retention so the floor moves past id 1
    for i in 0..10_001 {
        master
            .coordinator
            .handle_write(&format!("k{}", i), "v", false)
            .unwrap();
    }

    let err = slave.coordinator.sync_once().await.unwrap_err();
    assert!(matches!(
        err,
        ReplicationError::ResyncRequired {
            requested: 1,
            floor: 1001
        }
    ));
}

#[tokio::test]
async fn test_ship_flags_cursor_below_retention_floor() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);

    master.coordinator.add_replica("slave-1", "10.0.0.2", 7700).unwrap();
    for i in 0..10_001 {
        master
            .coordinator
            .handle_write(&format!("k{}", i), "v", false)
            .unwrap();
    }

    master.coordinator.ship_once().await;

    let report = master.coordinator.status();
    assert!(report.replicas[0].needs_resync);

    // re-arming after an external full transfer resumes shipping
    let slave = slave_node("slave-1", "10.0.0.2", &transport);
    slave.coordinator.complete_resync(10_000);
    master.coordinator.rearm_replica("slave-1", 10_001);
    master.coordinator.ship_once().await;
    assert_eq!(slave.coordinator.last_applied_log_id(), 10_001);
}

#[tokio::test]
async fn test_role_checks_reject_wrong_side_operations() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);

    assert!(matches!(
        slave.coordinator.handle_write("k", "v", false),
        Err(ReplicationError::NotMaster)
    ));
    assert!(matches!(
        slave.coordinator.add_replica("x", "10.0.0.3", 7700),
        Err(ReplicationError::NotMaster)
    ));
    assert!(matches!(
        master.coordinator.ingest_entries(vec![]),
        Err(ReplicationError::NotSlave)
    ));
    assert!(matches!(
        master.coordinator.serve_entries(1, 10),
        Ok(entries) if entries.is_empty()
    ));
}

#[tokio::test]
async fn test_delete_of_missing_key_is_rejected_on_master() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);

    assert!(master.coordinator.handle_write("ghost", "", true).is_err());
    // nothing was logged for the failed write
    assert_eq!(master.coordinator.status().last_log_id, 0);
}

#[tokio::test]
async fn test_replication_lag_accounting() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let _slave = slave_node("slave-1", "10.0.0.2", &transport);

    master.coordinator.add_replica("slave-1", "10.0.0.2", 7700).unwrap();
    for i in 0..5 {
        master
            .coordinator
            .handle_write(&format!("k{}", i), "v", false)
            .unwrap();
    }

    // nothing shipped yet: 5 entries behind
    assert_eq!(master.coordinator.replication_lag()["slave-1"], 5);

    master.coordinator.ship_once().await;
    assert_eq!(master.coordinator.replication_lag()["slave-1"], 0);
}

#[tokio::test]
async fn test_background_loops_converge_end_to_end() {
    let transport = Arc::new(MemoryTransport::new());
    let master = master_node(&transport);
    let slave = slave_node("slave-1", "10.0.0.2", &transport);

    master.coordinator.handle_write("k", "v", false).unwrap();

    slave.coordinator.start();
    master.coordinator.start();

    // the slave's startup delay is 1s; wait out a couple of sync periods
    tokio::time::sleep(std::time::Duration::from_millis(1700)).await;

    assert_eq!(slave.store.get("k"), Some("v".to_string()));

    slave.coordinator.stop().await;
    master.coordinator.stop().await;
    assert!(!master.coordinator.status().running);
}
