//! Value types shared between the status update store, core and agent crates.
//!
//! `StatusUpdate` is kept deliberately opaque: the core only ever needs to look at
//! `framework_id`, `task_id` and `uuid` to route and deduplicate it. The `data` payload
//! is whatever the executor transport decided to put there.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a scheduler connected to the master; owns zero or more tasks.
pub type FrameworkId = String;

/// Identifies a single task within a framework.
pub type TaskId = String;

/// Key used by the manager to look up a task's update stream.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub framework_id: FrameworkId,
    pub task_id: TaskId,
}

impl StreamKey {
    pub fn new(framework_id: impl Into<FrameworkId>, task_id: impl Into<TaskId>) -> Self {
        Self { framework_id: framework_id.into(), task_id: task_id.into() }
    }
}

/// An opaque, immutable status update about a task, identified by `uuid`.
///
/// Equality and deduplication are defined purely in terms of `uuid`: two updates
/// with the same uuid are the same update, even if `data` were to differ (which
/// should never happen in practice since the executor only ever sends a given
/// uuid once).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusUpdate {
    pub framework_id: FrameworkId,
    pub task_id: TaskId,
    pub uuid: Uuid,
    /// Opaque payload; the core never interprets its contents.
    pub data: Vec<u8>,
}

impl StatusUpdate {
    pub fn new(
        framework_id: impl Into<FrameworkId>,
        task_id: impl Into<TaskId>,
        uuid: Uuid,
        data: Vec<u8>,
    ) -> Self {
        Self { framework_id: framework_id.into(), task_id: task_id.into(), uuid, data }
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.framework_id.clone(), self.task_id.clone())
    }
}

/// The endpoint of the current cluster master, as reported by the leader detector.
///
/// Opaque to the core beyond equality: it is only ever compared and handed to the
/// master transport's `send`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasterInfo {
    pub id: String,
    pub address: String,
}

impl MasterInfo {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self { id: id.into(), address: address.into() }
    }
}
