//! Ambient stack (config, logging, wiring) for running the status update
//! manager as a standalone process, per §10 of the design: the library
//! crates (`sum-types`, `sum-store`, `sum-core`) never install a tracing
//! subscriber or read the environment themselves -- only this binary does.

pub mod config;
pub mod error;
pub mod transport;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

pub use config::Config;
pub use error::{Error, Result};
use sum_core::Manager;
use sum_types::{MasterInfo, StatusUpdate};
use transport::LoggingTransport;

/// Installs a global `tracing` subscriber driven by `RUST_LOG` (defaulting to
/// `info`), the way the rest of this codebase's binaries do it. Must be
/// called at most once per process, before anything logs.
pub fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds and runs the manager to completion (i.e. until ctrl-c), wiring it
/// to a [`LoggingTransport`] in place of a real master connection. Emits one
/// sample update against a synthetic framework/task so the checkpoint log
/// and acknowledgement path are visible end to end; this is a demonstration
/// harness, not a production entry point (§10.7).
pub async fn run(config: Config) -> Result<()> {
    tracing::info!(
        checkpoint_dir = %config.checkpoint_dir.display(),
        retransmit_interval_ms = config.retransmit_interval_ms,
        bind_addr = %config.bind_addr,
        "starting status update manager agent"
    );

    let manager = Manager::spawn(Arc::new(LoggingTransport), config.retransmit_interval());
    manager.initialize(config.bind_addr.clone()).await;
    manager
        .new_master_detected(MasterInfo::new("demo-master", "127.0.0.1:5050"))
        .await;

    let demo_framework = "demo-framework";
    let demo_task = "demo-task";
    let path = config.checkpoint_dir.join(demo_framework).join(format!("{demo_task}.log"));

    let update = StatusUpdate::new(demo_framework, demo_task, Uuid::new_v4(), b"TASK_RUNNING".to_vec());
    let uuid = update.uuid;
    manager.update(update, true, Some(path)).await?;
    manager.acknowledgement(demo_framework, demo_task, uuid).await?;

    tracing::info!("demo update acknowledged; waiting for ctrl-c");
    let _ = tokio::signal::ctrl_c().await;
    manager.shutdown().await;
    Ok(())
}
