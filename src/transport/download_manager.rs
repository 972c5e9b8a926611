//! Downloads through the platform download manager
//!
//! The manager is an opaque service: requests are enqueued by URI and their status
//! polled by id. [`ManagedDownload`] polls on a fixed interval and maps each status
//! onto an action. Two budgets keep a stuck request from polling forever:
//!
//! - **cancel budget**: consecutive polls where the request has not started
//!   (`Pending`, or `Paused` without any bytes). Exhausting it removes the request.
//! - **retry budget**: polls where the request stalled (`Paused`) after making
//!   progress. Each one removes the request and enqueues it afresh; once exhausted
//!   the download fails.
//!
//! Both budgets reset when a `Running` poll shows more bytes than ever seen. The
//! counters live in a per-request [`DownloadAttempt`].

use crate::error::{DownloadError, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identifier the manager assigns to an enqueued request
pub type RequestId = u64;

/// A request handed to the download manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Remote location
    pub uri: String,
    /// File the manager writes to
    pub destination: PathBuf,
}

/// Status vocabulary of the download manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadState {
    /// Waiting to start
    Pending,
    /// Transferring
    Running,
    /// Suspended (network loss, waiting for retry)
    Paused,
    /// Terminal failure
    Failed,
    /// Terminal success
    Successful,
}

/// One status poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadStatus {
    /// Current state
    pub state: DownloadState,
    /// Bytes transferred so far
    pub bytes_so_far: u64,
    /// Total size, when the server announced it
    pub total_bytes: Option<u64>,
    /// Failure reason code (only meaningful for `Failed`)
    pub reason: i32,
}

impl DownloadStatus {
    /// Status with no progress
    pub fn new(state: DownloadState) -> Self {
        Self {
            state,
            bytes_so_far: 0,
            total_bytes: None,
            reason: 0,
        }
    }

    /// Status with `bytes` transferred
    pub fn with_bytes(state: DownloadState, bytes: u64) -> Self {
        Self {
            bytes_so_far: bytes,
            ..Self::new(state)
        }
    }
}

/// The platform download manager
pub trait DownloadManager: Send + Sync {
    /// Enqueue a request and return its id
    fn enqueue(&self, request: &DownloadRequest) -> Result<RequestId>;

    /// Current status of a request
    fn query(&self, id: RequestId) -> Result<DownloadStatus>;

    /// Cancel a request and delete its partial file
    fn remove(&self, id: RequestId) -> Result<()>;
}

/// What the poller does after a status poll
#[derive(Debug)]
pub enum PollAction {
    /// Keep polling
    Continue,
    /// Remove the stalled request and enqueue it again
    Retry,
    /// The file is complete
    Finished,
    /// Remove the request and give up
    GiveUp(DownloadError),
}

/// Budgets and progress of one logical download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadAttempt {
    /// The request being fulfilled
    pub request: DownloadRequest,
    /// Re-enqueues performed after stalls
    pub retries_done: u32,
    /// Consecutive polls without a start
    pub cancels_done: u32,
    /// Largest byte count seen for the current request
    pub max_bytes_seen: u64,
}

impl DownloadAttempt {
    /// Fresh attempt with both budgets unused
    pub fn new(request: DownloadRequest) -> Self {
        Self {
            request,
            retries_done: 0,
            cancels_done: 0,
            max_bytes_seen: 0,
        }
    }

    /// Fold one status poll into the budgets
    pub fn observe(
        &mut self,
        status: &DownloadStatus,
        retries_max: u32,
        cancels_max: u32,
    ) -> PollAction {
        match status.state {
            DownloadState::Successful => PollAction::Finished,
            DownloadState::Failed => PollAction::GiveUp(DownloadError::Failed {
                uri: self.request.uri.clone(),
                reason: status.reason,
            }),
            DownloadState::Running => {
                if status.bytes_so_far > self.max_bytes_seen {
                    self.max_bytes_seen = status.bytes_so_far;
                    self.retries_done = 0;
                    self.cancels_done = 0;
                }
                PollAction::Continue
            }
            DownloadState::Pending => self.not_started(cancels_max),
            DownloadState::Paused if status.bytes_so_far == 0 => self.not_started(cancels_max),
            DownloadState::Paused => {
                if self.retries_done >= retries_max {
                    return PollAction::GiveUp(DownloadError::RetriesExhausted {
                        uri: self.request.uri.clone(),
                        retries: self.retries_done,
                    });
                }
                self.retries_done += 1;
                // The fresh request starts from zero
                self.max_bytes_seen = 0;
                PollAction::Retry
            }
        }
    }

    fn not_started(&mut self, cancels_max: u32) -> PollAction {
        self.cancels_done += 1;
        if self.cancels_done >= cancels_max {
            PollAction::GiveUp(DownloadError::NeverStarted {
                uri: self.request.uri.clone(),
                polls: self.cancels_done,
            })
        } else {
            PollAction::Continue
        }
    }
}

/// Blocking poller driving one request through a [`DownloadManager`]
pub struct ManagedDownload<'a> {
    manager: &'a dyn DownloadManager,
    poll_interval: Duration,
    retries_max: u32,
    cancels_max: u32,
    cancel: CancellationToken,
}

impl<'a> ManagedDownload<'a> {
    /// Create a poller with the given interval and budgets
    pub fn new(
        manager: &'a dyn DownloadManager,
        poll_interval: Duration,
        retries_max: u32,
        cancels_max: u32,
    ) -> Self {
        Self {
            manager,
            poll_interval,
            retries_max,
            cancels_max,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort the download when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enqueue `request` and poll until it is terminal
    ///
    /// `progress` receives `(transferred, total)` on every running poll. Returns the
    /// downloaded file.
    pub fn run(
        &self,
        request: DownloadRequest,
        progress: &mut dyn FnMut(u64, Option<u64>),
    ) -> Result<PathBuf> {
        let mut id = self.manager.enqueue(&request)?;
        let mut attempt = DownloadAttempt::new(request);
        info!(uri = %attempt.request.uri, id, "download enqueued");

        loop {
            if self.cancel.is_cancelled() {
                self.remove_quietly(id);
                info!(uri = %attempt.request.uri, "download cancelled");
                return Err(DownloadError::Cancelled {
                    uri: attempt.request.uri.clone(),
                }
                .into());
            }

            std::thread::sleep(self.poll_interval);
            let status = self.manager.query(id)?;
            if status.state == DownloadState::Running {
                progress(status.bytes_so_far, status.total_bytes);
            }

            match attempt.observe(&status, self.retries_max, self.cancels_max) {
                PollAction::Continue => {}
                PollAction::Retry => {
                    warn!(
                        uri = %attempt.request.uri,
                        retry = attempt.retries_done,
                        "download stalled, re-enqueueing"
                    );
                    self.remove_quietly(id);
                    id = self.manager.enqueue(&attempt.request)?;
                }
                PollAction::Finished => {
                    info!(uri = %attempt.request.uri, "download complete");
                    return Ok(attempt.request.destination);
                }
                PollAction::GiveUp(e) => {
                    warn!(uri = %attempt.request.uri, error = %e, "download abandoned");
                    self.remove_quietly(id);
                    return Err(e.into());
                }
            }
        }
    }

    fn remove_quietly(&self, id: RequestId) {
        if let Err(e) = self.manager.remove(id) {
            debug!(id, error = %e, "failed to remove download request");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Manager replaying a scripted sequence of statuses (last one repeats)
    struct ScriptedManager {
        statuses: Mutex<VecDeque<DownloadStatus>>,
        enqueued: Mutex<u32>,
        removed: Mutex<u32>,
    }

    impl ScriptedManager {
        fn new(statuses: Vec<DownloadStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                enqueued: Mutex::new(0),
                removed: Mutex::new(0),
            }
        }
    }

    impl DownloadManager for ScriptedManager {
        fn enqueue(&self, _request: &DownloadRequest) -> Result<RequestId> {
            let mut enqueued = self.enqueued.lock();
            *enqueued += 1;
            Ok(u64::from(*enqueued))
        }

        fn query(&self, _id: RequestId) -> Result<DownloadStatus> {
            let mut statuses = self.statuses.lock();
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                Ok(*statuses.front().unwrap())
            }
        }

        fn remove(&self, _id: RequestId) -> Result<()> {
            *self.removed.lock() += 1;
            Ok(())
        }
    }

    fn request() -> DownloadRequest {
        DownloadRequest {
            uri: "http://example.com/book.zip".to_string(),
            destination: PathBuf::from("/staging/book.zip"),
        }
    }

    fn poller(manager: &ScriptedManager) -> ManagedDownload<'_> {
        ManagedDownload::new(manager, Duration::from_millis(1), 3, 10)
    }

    #[test]
    fn paused_with_progress_retries_exactly_retries_max_times() {
        let manager = ScriptedManager::new(vec![DownloadStatus::with_bytes(
            DownloadState::Paused,
            500,
        )]);

        let result = poller(&manager).run(request(), &mut |_, _| {});

        match result {
            Err(Error::Download(DownloadError::RetriesExhausted { retries, .. })) => {
                assert_eq!(retries, 3)
            }
            other => panic!("expected exhausted retries, got {other:?}"),
        }
        // Original request plus one per retry
        assert_eq!(*manager.enqueued.lock(), 4);
        assert_eq!(*manager.removed.lock(), 4);
    }

    #[test]
    fn pending_forever_uses_cancel_budget() {
        let manager = ScriptedManager::new(vec![DownloadStatus::new(DownloadState::Pending)]);

        let result = poller(&manager).run(request(), &mut |_, _| {});

        assert!(matches!(
            result,
            Err(Error::Download(DownloadError::NeverStarted { polls: 10, .. }))
        ));
        assert_eq!(*manager.enqueued.lock(), 1);
        assert_eq!(*manager.removed.lock(), 1);
    }

    #[test]
    fn running_progress_resets_budgets() {
        let mut attempt = DownloadAttempt::new(request());
        for _ in 0..9 {
            attempt.observe(&DownloadStatus::new(DownloadState::Pending), 3, 10);
        }
        assert_eq!(attempt.cancels_done, 9);

        attempt.observe(&DownloadStatus::with_bytes(DownloadState::Running, 10), 3, 10);
        assert_eq!(attempt.cancels_done, 0);

        // No new bytes: no reset
        attempt.observe(&DownloadStatus::new(DownloadState::Pending), 3, 10);
        attempt.observe(&DownloadStatus::with_bytes(DownloadState::Running, 10), 3, 10);
        assert_eq!(attempt.cancels_done, 1);
    }

    #[test]
    fn stalls_interleaved_with_progress_succeed() {
        let manager = ScriptedManager::new(vec![
            DownloadStatus::with_bytes(DownloadState::Running, 100),
            DownloadStatus::with_bytes(DownloadState::Paused, 100),
            DownloadStatus::with_bytes(DownloadState::Running, 50),
            DownloadStatus::with_bytes(DownloadState::Paused, 50),
            DownloadStatus::with_bytes(DownloadState::Running, 300),
            DownloadStatus::new(DownloadState::Successful),
        ]);
        let mut seen = Vec::new();

        let path = poller(&manager)
            .run(request(), &mut |done, _| seen.push(done))
            .unwrap();

        assert_eq!(path, PathBuf::from("/staging/book.zip"));
        assert_eq!(seen, vec![100, 50, 300]);
        assert_eq!(*manager.enqueued.lock(), 3);
    }

    #[test]
    fn failure_carries_reason_code() {
        let mut failed = DownloadStatus::new(DownloadState::Failed);
        failed.reason = 404;
        let manager = ScriptedManager::new(vec![failed]);

        let result = poller(&manager).run(request(), &mut |_, _| {});

        assert!(matches!(
            result,
            Err(Error::Download(DownloadError::Failed { reason: 404, .. }))
        ));
    }

    #[test]
    fn cancellation_removes_request() {
        let manager = ScriptedManager::new(vec![DownloadStatus::new(DownloadState::Running)]);
        let token = CancellationToken::new();
        token.cancel();

        let result = poller(&manager)
            .with_cancellation(token)
            .run(request(), &mut |_, _| {});

        assert!(matches!(
            result,
            Err(Error::Download(DownloadError::Cancelled { .. }))
        ));
        assert_eq!(*manager.removed.lock(), 1);
    }
}
