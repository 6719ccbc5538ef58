use std::sync::Arc;
use std::time::Duration;

use sum_agent::transport::LoggingTransport;
use sum_core::Manager;
use sum_types::{MasterInfo, StatusUpdate};
use tempfile::TempDir;
use uuid::Uuid;

/// Exercises the same path the demo binary runs (minus the ctrl-c wait):
/// spawn the manager against the logging transport, checkpoint an update to
/// disk, and acknowledge it.
#[tokio::test]
async fn demo_update_round_trips_through_the_manager() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo-framework").join("demo-task.log");

    let manager = Manager::spawn(Arc::new(LoggingTransport), Duration::from_secs(30));
    manager.initialize("127.0.0.1:0").await;
    manager
        .new_master_detected(MasterInfo::new("demo-master", "127.0.0.1:5050"))
        .await;

    let update =
        StatusUpdate::new("demo-framework", "demo-task", Uuid::new_v4(), b"TASK_RUNNING".to_vec());
    let uuid = update.uuid;

    manager.update(update, true, Some(path.clone())).await.unwrap();
    manager.acknowledgement("demo-framework", "demo-task", uuid).await.unwrap();

    assert!(path.exists(), "checkpoint log should have been created");
    manager.shutdown().await;
}
