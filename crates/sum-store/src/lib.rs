//! Durable, append-only log backing a single task's [`sum_types::StatusUpdate`] stream.
//!
//! A [`StreamLog`] owns exactly one file: a sequence of length-delimited
//! [`Record`]s. Every append is flushed to stable storage before the call
//! returns, so a process that crashes mid-write leaves behind either the
//! previous, fully-durable state or the new one -- never a file the rest of
//! this crate can't make sense of. [`StreamLog::open`] replays that file back
//! into a [`RecoveredState`], which is everything the status update manager
//! needs to resume a task's stream without reprocessing already-acknowledged
//! updates.

use std::collections::{HashSet, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sum_types::StatusUpdate;
use uuid::Uuid;

/// Permission bits applied to freshly-created logs: owner read/write, group
/// read, others read/write/execute. Unusual, but this matches the reference
/// agent's on-disk layout and nothing downstream depends on it being tighter.
#[cfg(unix)]
const LOG_FILE_MODE: u32 = 0o647;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] bincode::Error),
    #[error("corrupt log: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One entry in a stream's on-disk log.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum Record {
    Update(StatusUpdate),
    Ack(Uuid),
}

/// The state recovered by replaying a log from the start.
#[derive(Debug, Default)]
pub struct RecoveredState {
    pub received: HashSet<Uuid>,
    pub acknowledged: HashSet<Uuid>,
    pub pending: VecDeque<StatusUpdate>,
}

/// A single task's durable update log.
pub struct StreamLog {
    file: File,
    path: PathBuf,
}

impl StreamLog {
    /// Opens (creating if necessary) the log at `path`, replaying any existing
    /// content. The parent directory is created on demand.
    ///
    /// Returns the open log together with the state recovered from it, ready
    /// to be merged into an in-memory `UpdateStream`.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, RecoveredState)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut opts = OpenOptions::new();
        opts.create(true).read(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(LOG_FILE_MODE);
        }

        let mut file = opts.open(&path)?;
        let recovered = Self::replay(&mut file)?;

        Ok((Self { file, path }, recovered))
    }

    /// The path this log was opened at, for diagnostics (e.g. logging which
    /// file a stream poisoned itself over).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably appends an `UPDATE` record. Returns only once the bytes are on
    /// stable storage.
    pub fn append_update(&mut self, update: &StatusUpdate) -> Result<()> {
        self.append(&Record::Update(update.clone()))
    }

    /// Durably appends an `ACK` record. Returns only once the bytes are on
    /// stable storage.
    pub fn append_ack(&mut self, uuid: Uuid) -> Result<()> {
        self.append(&Record::Ack(uuid))
    }

    fn append(&mut self, record: &Record) -> Result<()> {
        let body = bincode::serialize(record)?;
        self.file.write_u32::<LittleEndian>(body.len() as u32)?;
        self.file.write_all(&body)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replays `file` from its current position (expected to be the start) to
    /// EOF, applying the same rules as live `update`/`acknowledgement` calls
    /// and rejecting the inconsistencies called out in the recovery
    /// semantics: an `ACK` with no matching prior `UPDATE`, or a duplicate
    /// `UPDATE`.
    ///
    /// A length prefix with no complete record behind it -- a write that was
    /// in flight when the process died -- is not corruption: the file is
    /// truncated back to the last complete record and replay stops there.
    fn replay(file: &mut File) -> Result<RecoveredState> {
        let mut state = RecoveredState::default();
        let mut offset: u64 = 0;

        loop {
            let len = match file.read_u32::<LittleEndian>() {
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            let mut body = vec![0u8; len as usize];
            match file.read_exact(&mut body) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    tracing::warn!(
                        "truncating partially-flushed record at offset {offset} in {:?}",
                        "log"
                    );
                    file.set_len(offset)?;
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let record: Record = bincode::deserialize(&body)
                .map_err(|e| Error::Corrupt(format!("undecodable record at offset {offset}: {e}")))?;

            match record {
                Record::Update(update) => {
                    if !state.received.insert(update.uuid) {
                        return Err(Error::Corrupt(format!(
                            "duplicate UPDATE for {}",
                            update.uuid
                        )));
                    }
                    state.pending.push_back(update);
                }
                Record::Ack(uuid) => {
                    if !state.received.contains(&uuid) || state.acknowledged.contains(&uuid) {
                        return Err(Error::Corrupt(format!(
                            "ACK for {uuid} with no outstanding matching UPDATE"
                        )));
                    }
                    match state.pending.front() {
                        Some(head) if head.uuid == uuid => {
                            state.pending.pop_front();
                        }
                        _ => {
                            return Err(Error::Corrupt(format!(
                                "ACK for {uuid} does not match the head of pending"
                            )));
                        }
                    }
                    state.acknowledged.insert(uuid);
                }
            }

            offset += 4 + len as u64;
        }

        Ok(state)
    }
}
