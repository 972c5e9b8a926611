//! Fake host and download manager

use audiobook_provisioner::error::Result;
use audiobook_provisioner::transport::{
    DownloadManager, DownloadRequest, DownloadState, DownloadStatus, RequestId,
};
use audiobook_provisioner::{LibraryHost, SyncBridge};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Host that acknowledges from another thread and records what it was asked
#[derive(Default)]
pub struct FakeHost {
    pub library_changes: Mutex<usize>,
    pub duration_requests: Mutex<Vec<PathBuf>>,
    pub current: Mutex<Option<PathBuf>>,
}

impl FakeHost {
    pub fn library_changes(&self) -> usize {
        *self.library_changes.lock().unwrap()
    }
}

impl LibraryHost for FakeHost {
    fn library_changed(&self, done: SyncBridge) {
        *self.library_changes.lock().unwrap() += 1;
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            done.resume();
        });
    }

    fn request_durations(&self, books: &[PathBuf], done: SyncBridge) {
        self.duration_requests
            .lock()
            .unwrap()
            .extend(books.iter().cloned());
        std::thread::spawn(move || done.resume());
    }

    fn current_book(&self) -> Option<PathBuf> {
        self.current.lock().unwrap().clone()
    }

    fn reset_position(&self, _book: &Path, _position: Duration) -> Result<()> {
        Ok(())
    }
}

/// How a [`FakeDownloadManager`] request behaves
#[derive(Clone)]
pub enum Behaviour {
    /// Writes `content` on enqueue and reports success on the first poll
    Deliver(Vec<u8>),
    /// Reports PAUSED with growing progress forever
    StallWithProgress,
    /// Stays PENDING forever
    NeverStart,
}

/// Download manager driven by a fixed behaviour
pub struct FakeDownloadManager {
    behaviour: Behaviour,
    requests: Mutex<HashMap<RequestId, (DownloadRequest, u64)>>,
    pub enqueued: Mutex<u32>,
    pub removed: Mutex<u32>,
}

impl FakeDownloadManager {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            requests: Mutex::new(HashMap::new()),
            enqueued: Mutex::new(0),
            removed: Mutex::new(0),
        }
    }
}

impl DownloadManager for FakeDownloadManager {
    fn enqueue(&self, request: &DownloadRequest) -> Result<RequestId> {
        let mut enqueued = self.enqueued.lock().unwrap();
        *enqueued += 1;
        let id = u64::from(*enqueued);
        if let Behaviour::Deliver(content) = &self.behaviour {
            std::fs::write(&request.destination, content)?;
        }
        self.requests
            .lock()
            .unwrap()
            .insert(id, (request.clone(), 0));
        Ok(id)
    }

    fn query(&self, id: RequestId) -> Result<DownloadStatus> {
        let mut requests = self.requests.lock().unwrap();
        let Some((_, polls)) = requests.get_mut(&id) else {
            return Ok(DownloadStatus::new(DownloadState::Failed));
        };
        *polls += 1;
        Ok(match &self.behaviour {
            Behaviour::Deliver(content) => {
                DownloadStatus::with_bytes(DownloadState::Successful, content.len() as u64)
            }
            Behaviour::StallWithProgress => {
                DownloadStatus::with_bytes(DownloadState::Paused, *polls * 100)
            }
            Behaviour::NeverStart => DownloadStatus::new(DownloadState::Pending),
        })
    }

    fn remove(&self, id: RequestId) -> Result<()> {
        *self.removed.lock().unwrap() += 1;
        self.requests.lock().unwrap().remove(&id);
        Ok(())
    }
}
