use sum_core::MasterTransport;
use sum_types::{MasterInfo, StatusUpdate};

/// A stand-in for the real master-facing transport (§1: out of scope, an
/// interface only). Logs every send instead of putting bytes on a wire, so
/// the manager's retransmission and ordering behaviour can be observed
/// without a running master.
#[derive(Debug, Default)]
pub struct LoggingTransport;

impl MasterTransport for LoggingTransport {
    fn send(&self, master: &MasterInfo, update: &StatusUpdate) {
        tracing::info!(
            master = %master.id,
            address = %master.address,
            framework_id = %update.framework_id,
            task_id = %update.task_id,
            uuid = %update.uuid,
            "sending status update to master"
        );
    }
}
