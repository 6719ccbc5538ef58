use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use uuid::Uuid;

use sum_store::StreamLog;
use sum_types::{StatusUpdate, StreamKey};

use crate::error::{Error, Result};

/// The durable, per-task state machine described in §3-§4.1 of the status
/// update manager design: every update moves `absent -> received ->
/// acknowledged` and never back.
///
/// All mutation happens through `&mut self`; the [`crate::Manager`] is the
/// only thing that is expected to hold one, from within its serial executor.
pub struct UpdateStream {
    key: StreamKey,
    log: Option<StreamLog>,
    received: HashSet<Uuid>,
    acknowledged: HashSet<Uuid>,
    pending: VecDeque<StatusUpdate>,
    error: Option<Error>,
}

impl UpdateStream {
    /// Creates the stream, replaying `path`'s log (if given) to recover
    /// `received`/`acknowledged`/`pending`. A purely in-memory stream is
    /// created when `path` is `None`.
    pub fn new(key: StreamKey, path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => {
                let (log, recovered) =
                    StreamLog::open(&path).map_err(|e| Error::fatal(e))?;
                Ok(Self {
                    key,
                    log: Some(log),
                    received: recovered.received,
                    acknowledged: recovered.acknowledged,
                    pending: recovered.pending,
                    error: None,
                })
            }
            None => Ok(Self {
                key,
                log: None,
                received: HashSet::new(),
                acknowledged: HashSet::new(),
                pending: VecDeque::new(),
                error: None,
            }),
        }
    }

    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// The update at the head of `pending`, if any, without mutating it.
    pub fn next(&self) -> Option<&StatusUpdate> {
        self.pending.front()
    }

    pub fn is_pending_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The sticky terminal error, if this stream has entered the `error`
    /// state.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Applies an incoming `StatusUpdate`.
    ///
    /// Returns `Ok(true)` if `u` is now the head of `pending` (i.e. the
    /// manager should send it and arm a retransmit timer), `Ok(false)` if it
    /// was appended behind an existing head or was a no-op duplicate.
    pub fn update(&mut self, u: StatusUpdate) -> Result<bool> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        if self.acknowledged.contains(&u.uuid) {
            tracing::warn!(
                uuid = %u.uuid,
                task_id = %self.key.task_id,
                framework_id = %self.key.framework_id,
                "update already acknowledged; the executor likely re-sent after an ACK was lost, ignoring"
            );
            return Ok(false);
        }
        if self.received.contains(&u.uuid) {
            tracing::warn!(
                uuid = %u.uuid,
                task_id = %self.key.task_id,
                framework_id = %self.key.framework_id,
                "duplicate update; the executor likely re-sent after a crash between write and ack, ignoring"
            );
            return Ok(false);
        }

        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.append_update(&u) {
                return Err(self.poison(e));
            }
        }

        let was_empty = self.pending.is_empty();
        self.received.insert(u.uuid);
        self.pending.push_back(u);
        Ok(was_empty)
    }

    /// Records an acknowledgement for the current head of `pending`.
    ///
    /// `uuid` must match the uuid of `pending.front()`; callers (the
    /// [`crate::Manager`]) are expected to have already checked this via
    /// [`UpdateStream::next`] before calling. A mismatch here is a
    /// programming error, not a runtime condition, and aborts the process --
    /// see §4.1/§7 of the design.
    ///
    /// Returns the new head of `pending`, if any, so the manager knows what
    /// to send next.
    pub fn acknowledgement(&mut self, uuid: Uuid) -> Result<Option<StatusUpdate>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let head_uuid = self.pending.front().map(|u| u.uuid);
        assert_eq!(
            head_uuid,
            Some(uuid),
            "acknowledgement {uuid} does not match the head of pending ({head_uuid:?}) for task `{}`; \
             this is a caller defect, not a runtime condition",
            self.key.task_id,
        );

        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.append_ack(uuid) {
                return Err(self.poison(e));
            }
        }

        self.acknowledged.insert(uuid);
        self.pending.pop_front();
        Ok(self.pending.front().cloned())
    }

    fn poison(&mut self, cause: sum_store::Error) -> Error {
        let err = Error::fatal(cause);
        tracing::error!(
            task_id = %self.key.task_id,
            framework_id = %self.key.framework_id,
            path = ?self.log.as_ref().map(|log| log.path()),
            error = %err,
            "stream entering terminal error state after a fatal storage error"
        );
        self.error = Some(err.clone());
        // Invariant 5: once `error?` is set, `fd?` is closed.
        self.log = None;
        err
    }
}
