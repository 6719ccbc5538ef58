use std::sync::Arc;
use uuid::Uuid;

use sum_types::{FrameworkId, TaskId};

/// Errors returned by [`crate::UpdateStream`] and [`crate::Manager`].
///
/// `UnknownStream`, `AckMismatch` and `CheckpointRequiresPath` are protocol
/// violations: they are reported to the caller and leave the rest of the
/// manager untouched. `StreamFatal` is sticky: once a stream observes one, the
/// same error is returned to every subsequent operation on that stream, per
/// the "once set, all further operations on the stream fail" invariant.
///
/// Mismatches between an acknowledgement's uuid and the update it was paired
/// with are not represented here at all -- those are defects, not runtime
/// conditions, and abort the process (see [`crate::UpdateStream::acknowledgement`]).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("no update stream for task `{task_id}` in framework `{framework_id}`")]
    UnknownStream { framework_id: FrameworkId, task_id: TaskId },

    #[error("acknowledgement for {given} does not match the head of pending ({expected:?})")]
    AckMismatch { given: Uuid, expected: Option<Uuid> },

    #[error("checkpointing was requested without a log path")]
    CheckpointRequiresPath,

    #[error("stream is unusable after a fatal storage error: {0}")]
    StreamFatal(Arc<str>),

    #[error("the manager's serial executor is no longer running")]
    ManagerShutDown,
}

impl Error {
    /// `true` for errors that are isolated to the operation/stream that
    /// produced them and leave the rest of the manager usable; `false` for
    /// the sticky, terminal `StreamFatal` condition.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::StreamFatal(_))
    }

    pub(crate) fn fatal(cause: impl std::fmt::Display) -> Self {
        Error::StreamFatal(Arc::from(cause.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
