//! Per-task update streams and the manager that routes updates and
//! acknowledgements between executors and the cluster master.
//!
//! [`UpdateStream`] owns the durable, per-task state machine; [`Manager`]
//! indexes streams by `(framework_id, task_id)`, drives retransmission, and
//! tracks the current master endpoint from within a dedicated serial
//! executor task. See [`transport::MasterTransport`] for the one external
//! seam this crate defines.

mod error;
mod manager;
mod stream;
mod transport;

pub use error::{Error, Result};
pub use manager::{Manager, DEFAULT_RETRANSMIT_INTERVAL};
pub use stream::UpdateStream;
pub use transport::{MasterTransport, NullTransport};
