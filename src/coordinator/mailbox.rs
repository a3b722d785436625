//! Mailbox transports between the coordinator and its workers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::schema::{ActiveSearch, JobMessage, ResultsMessage};

use super::WorkerId;

/// Errors raised by a mailbox transport.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Mailbox I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed payload for worker {worker}: {source}")]
    Payload {
        worker: WorkerId,
        #[source]
        source: serde_json::Error,
    },
}

/// Coordinator side of the worker protocol.
///
/// Every read is destructive: presence markers and results are deleted
/// once consumed, so each is observed at most once.
pub trait Mailbox {
    /// Publish the active-search marker workers poll for.
    fn announce_start(&mut self, search: &ActiveSearch) -> Result<(), MailboxError>;

    /// Remove the active-search marker. Outstanding jobs are not recalled.
    fn announce_done(&mut self) -> Result<(), MailboxError>;

    /// Consume presence markers, returning the workers that announced
    /// themselves since the last call.
    fn discover(&mut self) -> Result<Vec<WorkerId>, MailboxError>;

    /// Place a job in a worker's inbox.
    fn send_job(&mut self, worker: WorkerId, job: &JobMessage) -> Result<(), MailboxError>;

    /// Take a worker's result if its job is done, `None` otherwise.
    ///
    /// A malformed result is still consumed before the error is returned.
    fn poll_result(&mut self, worker: WorkerId) -> Result<Option<ResultsMessage>, MailboxError>;
}

/// Filesystem mailbox.
///
/// Layout under the root directory:
///
/// ```text
/// active/search.txt            active-search marker (JSON)
/// active/worker-{id}.txt       worker presence marker
/// boxes/deck-{id:04}-inbox.json
/// boxes/deck-{id:04}-outbox.json
/// ```
///
/// Payloads are written to a `.tmp` sibling and renamed into place.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    root: PathBuf,
}

impl FileMailbox {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create the mailbox directories if missing.
    pub fn create<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let mailbox = Self::new(root);
        fs::create_dir_all(mailbox.active_dir())?;
        fs::create_dir_all(mailbox.boxes_dir())?;
        Ok(mailbox)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn active_dir(&self) -> PathBuf {
        self.root.join("active")
    }

    fn boxes_dir(&self) -> PathBuf {
        self.root.join("boxes")
    }

    fn search_marker_path(&self) -> PathBuf {
        self.active_dir().join("search.txt")
    }

    fn worker_marker_path(&self, worker: WorkerId) -> PathBuf {
        self.active_dir().join(format!("worker-{worker}.txt"))
    }

    pub fn inbox_path(&self, worker: WorkerId) -> PathBuf {
        self.boxes_dir().join(format!("deck-{worker:04}-inbox.json"))
    }

    pub fn outbox_path(&self, worker: WorkerId) -> PathBuf {
        self.boxes_dir().join(format!("deck-{worker:04}-outbox.json"))
    }

    /// Worker side: announce presence. Must be repeated to be seen again.
    pub fn hail(&self, worker: WorkerId) -> io::Result<()> {
        fs::create_dir_all(self.active_dir())?;
        fs::write(self.worker_marker_path(worker), worker.to_string())
    }

    /// Worker side: whether a coordinator is accepting workers.
    pub fn search_active(&self) -> bool {
        self.search_marker_path().exists()
    }

    /// Worker side: take the pending job, if any, consuming the inbox.
    pub fn receive_job(&self, worker: WorkerId) -> Result<Option<JobMessage>, MailboxError> {
        take_json(&self.inbox_path(worker), worker)
    }

    /// Worker side: publish a result.
    pub fn send_result(
        &self,
        worker: WorkerId,
        results: &ResultsMessage,
    ) -> Result<(), MailboxError> {
        Ok(write_json(&self.outbox_path(worker), results)?)
    }
}

impl Mailbox for FileMailbox {
    fn announce_start(&mut self, search: &ActiveSearch) -> Result<(), MailboxError> {
        fs::create_dir_all(self.active_dir())?;
        fs::create_dir_all(self.boxes_dir())?;
        Ok(write_json(&self.search_marker_path(), search)?)
    }

    fn announce_done(&mut self) -> Result<(), MailboxError> {
        match fs::remove_file(self.search_marker_path()) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn discover(&mut self) -> Result<Vec<WorkerId>, MailboxError> {
        let mut workers = Vec::new();

        for entry in fs::read_dir(self.active_dir())? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(label) = name
                .strip_prefix("worker-")
                .and_then(|rest| rest.strip_suffix(".txt"))
            else {
                continue;
            };

            match label.parse::<WorkerId>() {
                Ok(worker) => {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("Could not remove marker for worker {worker}: {e}");
                    }
                    workers.push(worker);
                }
                Err(_) => {
                    warn!("Removing unparseable worker marker {}", path.display());
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("Could not remove {}: {e}", path.display());
                    }
                }
            }
        }

        workers.sort_unstable();
        Ok(workers)
    }

    fn send_job(&mut self, worker: WorkerId, job: &JobMessage) -> Result<(), MailboxError> {
        Ok(write_json(&self.inbox_path(worker), job)?)
    }

    fn poll_result(&mut self, worker: WorkerId) -> Result<Option<ResultsMessage>, MailboxError> {
        let outbox = self.outbox_path(worker);
        if !outbox.exists() || self.inbox_path(worker).exists() {
            return Ok(None);
        }
        take_json(&outbox, worker)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Read and delete a JSON payload. The file is removed even when it fails
/// to parse.
fn take_json<T: DeserializeOwned>(path: &Path, worker: WorkerId) -> Result<Option<T>, MailboxError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    fs::remove_file(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| MailboxError::Payload { worker, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Deck, OverallStatistics};
    use tempfile::tempdir;

    fn job() -> JobMessage {
        JobMessage::new("Mage", &Deck::new(vec!["Fireball".into(), "Wisp".into()]))
    }

    #[test]
    fn test_discover_consumes_markers() {
        let dir = tempdir().unwrap();
        let mut mailbox = FileMailbox::create(dir.path()).unwrap();

        mailbox.hail(7).unwrap();
        mailbox.hail(2).unwrap();
        fs::write(dir.path().join("active/worker-abc.txt"), "").unwrap();
        fs::write(dir.path().join("active/notes.txt"), "").unwrap();

        assert_eq!(mailbox.discover().unwrap(), vec![2, 7]);
        assert!(mailbox.discover().unwrap().is_empty());
        assert!(!dir.path().join("active/worker-abc.txt").exists());
        assert!(dir.path().join("active/notes.txt").exists());
    }

    #[test]
    fn test_stuck_marker_does_not_hide_workers() {
        let dir = tempdir().unwrap();
        let mut mailbox = FileMailbox::create(dir.path()).unwrap();

        // A directory cannot be removed as a file
        fs::create_dir(dir.path().join("active/worker-stuck.txt")).unwrap();
        mailbox.hail(3).unwrap();
        mailbox.hail(1).unwrap();

        assert_eq!(mailbox.discover().unwrap(), vec![1, 3]);
        assert!(dir.path().join("active/worker-stuck.txt").exists());
        assert!(!mailbox.worker_marker_path(3).exists());
    }

    #[test]
    fn test_result_requires_consumed_inbox() {
        let dir = tempdir().unwrap();
        let mut mailbox = FileMailbox::create(dir.path()).unwrap();

        mailbox.send_job(3, &job()).unwrap();
        assert!(mailbox.inbox_path(3).ends_with("deck-0003-inbox.json"));
        assert!(mailbox.poll_result(3).unwrap().is_none());

        // Result written before the inbox is consumed is not yet done
        let results = ResultsMessage {
            overall_stats: OverallStatistics {
                win_count: 4.0,
                ..Default::default()
            },
            strategy_stats: Vec::new(),
        };
        mailbox.send_result(3, &results).unwrap();
        assert!(mailbox.poll_result(3).unwrap().is_none());

        let received = mailbox.receive_job(3).unwrap().unwrap();
        assert_eq!(received.deck.class_name, "mage");
        assert!(mailbox.receive_job(3).unwrap().is_none());

        let polled = mailbox.poll_result(3).unwrap().unwrap();
        assert_eq!(polled.overall_stats.win_count, 4.0);
        assert!(!mailbox.outbox_path(3).exists());
        assert!(mailbox.poll_result(3).unwrap().is_none());
    }

    #[test]
    fn test_malformed_result_is_consumed() {
        let dir = tempdir().unwrap();
        let mut mailbox = FileMailbox::create(dir.path()).unwrap();

        fs::write(mailbox.outbox_path(1), "{ not json").unwrap();
        assert!(matches!(
            mailbox.poll_result(1),
            Err(MailboxError::Payload { worker: 1, .. })
        ));
        assert!(!mailbox.outbox_path(1).exists());
    }

    #[test]
    fn test_active_search_marker() {
        let dir = tempdir().unwrap();
        let mut mailbox = FileMailbox::new(dir.path().join("mailbox"));

        assert!(!mailbox.search_active());
        mailbox
            .announce_start(&ActiveSearch {
                algorithm: "MAP-Elites".into(),
                config_path: "search.json".into(),
            })
            .unwrap();
        assert!(mailbox.search_active());

        mailbox.announce_done().unwrap();
        assert!(!mailbox.search_active());
        // Idempotent
        mailbox.announce_done().unwrap();
    }
}
