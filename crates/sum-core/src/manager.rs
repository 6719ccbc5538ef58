use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use uuid::Uuid;

use sum_types::{FrameworkId, MasterInfo, StatusUpdate, StreamKey, TaskId};

use crate::error::{Error, Result};
use crate::stream::UpdateStream;
use crate::transport::MasterTransport;

/// How often a stream with a non-empty `pending` resends its head update
/// while waiting for an acknowledgement, absent any policy override.
pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(1);

enum Command {
    Initialize {
        endpoint: String,
    },
    Update {
        update: StatusUpdate,
        checkpoint: bool,
        path: Option<PathBuf>,
        reply: oneshot::Sender<Result<()>>,
    },
    Acknowledgement {
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: Uuid,
        reply: oneshot::Sender<Result<()>>,
    },
    NewMaster {
        master: MasterInfo,
    },
    Cleanup {
        framework_id: FrameworkId,
    },
    RetransmitTimeout {
        key: StreamKey,
        generation: u64,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A stream plus the bookkeeping needed to cancel its retransmit timer.
///
/// `generation` guards against a timer that fires the instant before it is
/// aborted: the actor bumps it on every re-arm, and a `RetransmitTimeout`
/// carrying a stale generation is dropped rather than acted on.
struct StreamEntry {
    stream: UpdateStream,
    timer: Option<AbortHandle>,
    generation: u64,
}

impl StreamEntry {
    fn cancel_timer(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
        self.generation += 1;
    }
}

/// Routes updates and acknowledgements to per-task [`UpdateStream`]s, tracks
/// the current master endpoint, and drives retransmission.
///
/// Cloning a `Manager` is cheap: it just clones the command sender, so every
/// clone talks to the same serial executor task.
#[derive(Clone)]
pub struct Manager {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Manager {
    /// Spawns the manager's serial executor and returns a handle to it.
    /// `transport` is used for every outbound send to the master; `retransmit_interval`
    /// is the fixed policy interval for unacknowledged heads (see the design notes on
    /// why a fixed interval was kept rather than backoff).
    pub fn spawn(transport: Arc<dyn MasterTransport>, retransmit_interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let actor = Actor {
            streams: HashMap::new(),
            master: None,
            transport,
            retransmit_interval,
            cmd_tx: cmd_tx.clone(),
        };
        tokio::spawn(actor.run(cmd_rx));
        Self { cmd_tx }
    }

    /// Records the local endpoint transports should use when announcing where
    /// outbound sends originate from. Informational only; the core never
    /// interprets it.
    pub async fn initialize(&self, endpoint: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Initialize { endpoint: endpoint.into() });
    }

    /// Submits an incoming `StatusUpdate`. If `checkpoint` is true, `path`
    /// must be `Some`; a stream is created on first use for `(framework_id,
    /// task_id)` if one doesn't already exist.
    pub async fn update(
        &self,
        update: StatusUpdate,
        checkpoint: bool,
        path: Option<PathBuf>,
    ) -> Result<()> {
        if checkpoint && path.is_none() {
            return Err(Error::CheckpointRequiresPath);
        }
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Update { update, checkpoint, path, reply })
            .map_err(|_| Error::ManagerShutDown)?;
        rx.await.map_err(|_| Error::ManagerShutDown)?
    }

    /// Submits an acknowledgement from the master for `uuid`, which must match
    /// the current head of the stream's `pending` queue.
    pub async fn acknowledgement(
        &self,
        framework_id: impl Into<FrameworkId>,
        task_id: impl Into<TaskId>,
        uuid: Uuid,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Acknowledgement {
                framework_id: framework_id.into(),
                task_id: task_id.into(),
                uuid,
                reply,
            })
            .map_err(|_| Error::ManagerShutDown)?;
        rx.await.map_err(|_| Error::ManagerShutDown)?
    }

    /// Notifies the manager of a newly-elected master. Every stream with a
    /// non-empty `pending` immediately resends its head to the new master.
    pub async fn new_master_detected(&self, master: MasterInfo) {
        let _ = self.cmd_tx.send(Command::NewMaster { master });
    }

    /// Destroys every stream belonging to `framework_id`, cancelling their
    /// timers and closing their logs. Always succeeds.
    pub async fn cleanup(&self, framework_id: impl Into<FrameworkId>) {
        let _ = self.cmd_tx.send(Command::Cleanup { framework_id: framework_id.into() });
    }

    /// Stops the serial executor. Outstanding streams are dropped in place;
    /// their file handles close as part of that.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

struct Actor {
    streams: HashMap<StreamKey, StreamEntry>,
    master: Option<MasterInfo>,
    transport: Arc<dyn MasterTransport>,
    retransmit_interval: Duration,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl Actor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Initialize { endpoint } => {
                    tracing::info!(%endpoint, "manager initialized with local endpoint");
                }
                Command::Update { update, checkpoint, path, reply } => {
                    let result = self.handle_update(update, checkpoint, path);
                    let _ = reply.send(result);
                }
                Command::Acknowledgement { framework_id, task_id, uuid, reply } => {
                    let result = self.handle_acknowledgement(framework_id, task_id, uuid);
                    let _ = reply.send(result);
                }
                Command::NewMaster { master } => {
                    self.handle_new_master(master);
                }
                Command::Cleanup { framework_id } => {
                    self.handle_cleanup(&framework_id);
                }
                Command::RetransmitTimeout { key, generation } => {
                    self.handle_retransmit_timeout(key, generation);
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    fn handle_update(
        &mut self,
        update: StatusUpdate,
        checkpoint: bool,
        path: Option<PathBuf>,
    ) -> Result<()> {
        let key = update.stream_key();
        if !self.streams.contains_key(&key) {
            let log_path = if checkpoint { path } else { None };
            let stream = UpdateStream::new(key.clone(), log_path)?;
            self.streams.insert(key.clone(), StreamEntry { stream, timer: None, generation: 0 });
        }

        let entry = self.streams.get_mut(&key).expect("just inserted or already present");
        let became_head = entry.stream.update(update.clone())?;

        if became_head {
            self.send_to_master(&update);
            self.arm_timer(&key);
        }
        Ok(())
    }

    fn handle_acknowledgement(
        &mut self,
        framework_id: FrameworkId,
        task_id: TaskId,
        uuid: Uuid,
    ) -> Result<()> {
        let key = StreamKey::new(framework_id.clone(), task_id.clone());
        let entry = self
            .streams
            .get_mut(&key)
            .ok_or(Error::UnknownStream { framework_id, task_id })?;

        let expected = entry.stream.next().map(|u| u.uuid);
        if expected != Some(uuid) {
            return Err(Error::AckMismatch { given: uuid, expected });
        }

        entry.cancel_timer();
        let next = entry.stream.acknowledgement(uuid)?;

        if let Some(next_update) = next {
            self.send_to_master(&next_update);
            self.arm_timer(&key);
        }
        Ok(())
    }

    fn handle_new_master(&mut self, master: MasterInfo) {
        self.master = Some(master);
        let keys: Vec<StreamKey> = self
            .streams
            .iter()
            .filter(|(_, entry)| !entry.stream.is_pending_empty())
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            if let Some(head) = self.streams.get(&key).and_then(|e| e.stream.next().cloned()) {
                self.send_to_master(&head);
            }
            self.arm_timer(&key);
        }
    }

    fn handle_cleanup(&mut self, framework_id: &FrameworkId) {
        let keys: Vec<StreamKey> = self
            .streams
            .keys()
            .filter(|key| &key.framework_id == framework_id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(mut entry) = self.streams.remove(&key) {
                entry.cancel_timer();
            }
        }
    }

    fn handle_retransmit_timeout(&mut self, key: StreamKey, generation: u64) {
        let Some(entry) = self.streams.get(&key) else { return };
        if entry.generation != generation || entry.stream.error().is_some() {
            return;
        }
        let Some(head) = entry.stream.next().cloned() else { return };

        tracing::debug!(
            task_id = %key.task_id,
            framework_id = %key.framework_id,
            uuid = %head.uuid,
            "retransmitting unacknowledged update"
        );
        self.send_to_master(&head);
        self.arm_timer(&key);
    }

    /// Sends `update` to the current master, if one is known. Silently
    /// dropped when no master has been detected yet; the retransmit timer
    /// (armed regardless) will retry once one is.
    fn send_to_master(&self, update: &StatusUpdate) {
        if let Some(master) = &self.master {
            self.transport.send(master, update);
        }
    }

    /// Cancels any existing timer for `key` and arms a fresh one, bumping the
    /// generation so a previously-scheduled, not-yet-delivered timeout is
    /// ignored when it arrives.
    fn arm_timer(&mut self, key: &StreamKey) {
        let Some(entry) = self.streams.get_mut(key) else { return };
        entry.cancel_timer();
        let generation = entry.generation;

        let timeout_key = key.clone();
        let cmd_tx = self.cmd_tx.clone();
        let interval = self.retransmit_interval;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = cmd_tx.send(Command::RetransmitTimeout { key: timeout_key, generation });
        });

        entry.timer = Some(handle.abort_handle());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    /// Records every send the manager makes, in order, for assertions.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(MasterInfo, StatusUpdate)>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(MasterInfo, StatusUpdate)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MasterTransport for RecordingTransport {
        fn send(&self, master: &MasterInfo, update: &StatusUpdate) {
            self.sent.lock().unwrap().push((master.clone(), update.clone()));
        }
    }

    fn update(framework: &str, task: &str, uuid: Uuid) -> StatusUpdate {
        StatusUpdate::new(framework, task, uuid, vec![1, 2, 3])
    }

    fn master(id: &str) -> MasterInfo {
        MasterInfo::new(id, format!("{id}:5050"))
    }

    #[tokio::test]
    async fn s1_happy_path_sends_once_and_acknowledges() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport.clone(), Duration::from_secs(60));
        manager.new_master_detected(master("m1")).await;

        let id = Uuid::new_v4();
        manager.update(update("fw", "t1", id), false, None).await.unwrap();
        manager.acknowledgement("fw", "t1", id).await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.uuid, id);
    }

    #[tokio::test]
    async fn checkpoint_without_path_is_rejected() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport, Duration::from_secs(60));
        let err = manager
            .update(update("fw", "t1", Uuid::new_v4()), true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CheckpointRequiresPath));
    }

    #[tokio::test]
    async fn acknowledgement_for_unknown_stream_fails() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport, Duration::from_secs(60));
        let err = manager.acknowledgement("fw", "ghost-task", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownStream { .. }));
    }

    #[tokio::test]
    async fn acknowledgement_with_wrong_uuid_is_protocol_violation() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport, Duration::from_secs(60));
        manager.update(update("fw", "t1", Uuid::new_v4()), false, None).await.unwrap();

        let err = manager.acknowledgement("fw", "t1", Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::AckMismatch { .. }));
    }

    #[tokio::test]
    async fn s4_ordered_retransmit_on_master_failover() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport.clone(), Duration::from_secs(60));
        manager.new_master_detected(master("m1")).await;

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        manager.update(update("fw", "t1", a), false, None).await.unwrap();
        manager.update(update("fw", "t1", b), false, None).await.unwrap();

        // Only `a` should have gone out: `b` is behind it in `pending`.
        assert_eq!(transport.sent().iter().map(|(_, u)| u.uuid).collect::<Vec<_>>(), vec![a]);

        manager.new_master_detected(master("m2")).await;
        // `newMasterDetected` is fire-and-forget (§4.2); give the serial
        // executor a beat to actually process the re-send before asserting.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let sent = transport.sent();
        assert_eq!(sent.last().unwrap().0.id, "m2");
        assert_eq!(sent.last().unwrap().1.uuid, a);

        manager.acknowledgement("fw", "t1", a).await.unwrap();
        let sent = transport.sent();
        assert_eq!(sent.last().unwrap().1.uuid, b);
    }

    #[tokio::test]
    async fn s5_cleanup_cancels_retries() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport.clone(), Duration::from_millis(20));
        manager.new_master_detected(master("m1")).await;

        let id = Uuid::new_v4();
        manager.update(update("fw", "t1", id), false, None).await.unwrap();
        manager.cleanup("fw").await;
        // `cleanup` is fire-and-forget (§4.2); give the serial executor a
        // beat to actually drain it before the 20ms retransmit would fire.
        tokio::time::sleep(Duration::from_millis(5)).await;

        let count_after_cleanup = transport.sent().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.sent().len(), count_after_cleanup, "no retransmits after cleanup");

        // The stream is gone: acknowledging it now fails rather than hitting
        // a resurrected stream.
        let err = manager.acknowledgement("fw", "t1", id).await.unwrap_err();
        assert!(matches!(err, Error::UnknownStream { .. }));
    }

    #[tokio::test]
    async fn retransmits_unacknowledged_head_until_acked() {
        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport.clone(), Duration::from_millis(15));
        manager.new_master_detected(master("m1")).await;

        let id = Uuid::new_v4();
        manager.update(update("fw", "t1", id), false, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(transport.sent().len() >= 3, "expected multiple retransmissions while unacked");

        manager.acknowledgement("fw", "t1", id).await.unwrap();
        let count_after_ack = transport.sent().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(transport.sent().len(), count_after_ack, "no retransmits once acknowledged");
    }

    #[tokio::test]
    async fn checkpointing_persists_across_manager_restarts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fw").join("t1.log");

        let transport = Arc::new(RecordingTransport::default());
        let manager = Manager::spawn(transport, Duration::from_secs(60));
        let id = Uuid::new_v4();
        manager.update(update("fw", "t1", id), true, Some(path.clone())).await.unwrap();
        manager.shutdown().await;

        // A fresh manager recovers the pending update from the checkpoint
        // log and can still acknowledge it.
        let transport2 = Arc::new(RecordingTransport::default());
        let manager2 = Manager::spawn(transport2, Duration::from_secs(60));
        manager2.new_master_detected(master("m1")).await;
        manager2.update(update("fw", "t1", id), true, Some(path)).await.unwrap();
        manager2.acknowledgement("fw", "t1", id).await.unwrap();
    }
}
