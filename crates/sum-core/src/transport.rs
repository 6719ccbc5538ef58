use sum_types::{MasterInfo, StatusUpdate};

/// The master-facing outbound half of the agent's transport layer.
///
/// `send` is fire-and-forget: the manager is the layer responsible for
/// reliability, through retransmission, not this trait. Implementations are
/// expected to be cheap to call from the manager's serial executor and should
/// not block it; do real I/O on a background task and return immediately.
pub trait MasterTransport: Send + Sync + 'static {
    fn send(&self, master: &MasterInfo, update: &StatusUpdate);
}

/// A transport that discards everything it is asked to send.
///
/// Useful for tests and for running the manager before a real transport is
/// wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl MasterTransport for NullTransport {
    fn send(&self, _master: &MasterInfo, _update: &StatusUpdate) {}
}
