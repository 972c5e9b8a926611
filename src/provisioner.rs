//! The [`Provisioner`] facade used by host applications
//!
//! Holds the shared candidate list and the error log of the last batch for the
//! presentation layer, and serializes batches (scan, install, script run) so only
//! one mutates them at a time. Every method blocks; call them from worker threads
//! (or `spawn_blocking`), never from a UI or async executor thread.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::{LibraryHost, SETTING_AUTOMATION, SETTING_STAGING_DIR, SettingsStore};
use crate::installer::{InstallOutcome, InstallPolicy};
use crate::interpreter::{Interpreter, RunContext, Services, override_name};
use crate::library::{Library, LibraryEntry};
use crate::report::RunReport;
use crate::sync_bridge::SyncBridge;
use crate::transport::DownloadManager;
use crate::tree::sweep_stale_temps;
use crate::types::{Candidate, ErrorLog, Event, Severity};
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// State shown to the presentation layer between batches
#[derive(Debug, Default)]
struct SharedState {
    pending: Vec<Candidate>,
    log: ErrorLog,
}

/// Provisioning engine (cloneable, all fields are shared)
#[derive(Clone)]
pub struct Provisioner {
    services: Services,
    state: Arc<Mutex<SharedState>>,
    /// Held for the whole of a batch
    batch: Arc<Mutex<()>>,
    /// Cancels transfers of the running batch
    transfer_cancel: Arc<Mutex<CancellationToken>>,
}

impl Provisioner {
    /// Create an engine over `config`, talking to the host through `host` and `settings`
    ///
    /// Validates the configuration and creates the scan cache directory.
    pub fn new(
        config: Config,
        host: Arc<dyn LibraryHost>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.library.cache_dir).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "failed to create cache directory '{}': {e}",
                    config.library.cache_dir.display()
                ),
            ))
        })?;

        // Buffer generously; slow subscribers only lose progress events
        let (events, _rx) = broadcast::channel(1000);
        let cancel = CancellationToken::new();
        let services = Services {
            config: Arc::new(config),
            host,
            settings,
            downloads: None,
            events,
            bridge: SyncBridge::new(),
            cancel: cancel.clone(),
        };
        info!(
            volumes = services.config.library.volumes.len(),
            "provisioner created"
        );
        Ok(Self {
            services,
            state: Arc::new(Mutex::new(SharedState::default())),
            batch: Arc::new(Mutex::new(())),
            transfer_cancel: Arc::new(Mutex::new(cancel)),
        })
    }

    /// Use the platform download manager for `http:` and `https:` fetches
    pub fn with_download_manager(mut self, manager: Arc<dyn DownloadManager>) -> Self {
        self.services.downloads = Some(manager);
        self
    }

    /// Subscribe to presentation events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.services.events.subscribe()
    }

    /// Static configuration
    pub fn config(&self) -> &Config {
        &self.services.config
    }

    /// Runtime settings store
    pub fn settings(&self) -> &dyn SettingsStore {
        self.services.settings.as_ref()
    }

    /// Directory scanned for candidates
    pub fn staging_dir(&self) -> PathBuf {
        self.services.staging_dir()
    }

    /// Change (and persist) the staging directory
    pub fn set_staging_dir(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(Error::NotFound(format!(
                "staging directory {}",
                path.display()
            )));
        }
        self.services
            .settings
            .set_string(SETTING_STAGING_DIR, &path.to_string_lossy());
        Ok(())
    }

    /// Install policy currently in effect
    pub fn policy(&self) -> InstallPolicy {
        self.services.policy()
    }

    /// Whether the poll loop should keep running
    pub fn automation_enabled(&self) -> bool {
        self.services
            .settings
            .get_bool(SETTING_AUTOMATION)
            .unwrap_or(self.services.config.automation.enabled)
    }

    /// Turn remote automation on or off; the poll loop exits at its next wake-up
    pub fn set_automation_enabled(&self, enabled: bool) {
        self.services.settings.set_bool(SETTING_AUTOMATION, enabled);
    }

    /// Abort the downloads of the running batch
    pub fn cancel_transfers(&self) {
        self.transfer_cancel.lock().cancel();
    }

    /// Services for a new batch, with a fresh transfer cancellation token
    fn begin_batch(&self) -> Services {
        let token = CancellationToken::new();
        *self.transfer_cancel.lock() = token.clone();
        Services {
            cancel: token,
            ..self.services.clone()
        }
    }

    /// Run context seeded with the shared candidate list
    fn context(&self, services: &Services) -> RunContext {
        let mut ctx = RunContext::new(services);
        ctx.pending = self.state.lock().pending.clone();
        ctx
    }

    /// Publish the outcome of a batch
    fn finish_batch(&self, ctx: RunContext) {
        let mut state = self.state.lock();
        state.pending = ctx.pending;
        state.log = ctx.log;
    }

    /// Rescan the staging directory, replacing the candidate list
    ///
    /// Blocks until tag extraction finished. Returns the number of candidates.
    pub fn scan_candidates(&self) -> usize {
        let _batch = self.batch.lock();
        let candidates = self.services.scan(&self.services.staging_dir());
        let count = candidates.len();
        self.state.lock().pending = candidates;
        count
    }

    /// Snapshot of the candidate list
    pub fn candidates(&self) -> Vec<Candidate> {
        self.state.lock().pending.clone()
    }

    fn with_candidate<T>(
        &self,
        index: usize,
        f: impl FnOnce(&mut Candidate) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();
        let candidate = state
            .pending
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("candidate {index}")))?;
        f(candidate)
    }

    /// Select or unselect one candidate
    pub fn set_selected(&self, index: usize, selected: bool) -> Result<()> {
        self.with_candidate(index, |c| {
            c.selected = selected;
            Ok(())
        })
    }

    /// Select or unselect every candidate
    pub fn select_all(&self, selected: bool) {
        for candidate in &mut self.state.lock().pending {
            candidate.selected = selected;
        }
    }

    /// Install a candidate under a different name; the collision flag is recomputed
    pub fn override_name(&self, index: usize, name: &str) -> Result<()> {
        let volumes = &self.services.config.library.volumes;
        self.with_candidate(index, |c| override_name(c, name, volumes))
    }

    /// Install the selected candidates and wait for the library to catch up
    ///
    /// The error log is cleared first; read it afterwards with
    /// [`error_log`](Self::error_log).
    pub fn install_selected(&self) -> InstallOutcome {
        let _batch = self.batch.lock();
        let services = self.begin_batch();
        let mut ctx = self.context(&services);
        let outcome = ctx.install_selected(&services);
        self.finish_batch(ctx);
        outcome
    }

    /// Installed books, freshly read from the volumes
    pub fn inventory(&self) -> Vec<LibraryEntry> {
        let mut library = Library::new(self.services.config.library.volumes.clone());
        library
            .rebuild(self.services.host.current_book().as_deref())
            .to_vec()
    }

    /// Error log of the last batch
    pub fn error_log(&self) -> ErrorLog {
        self.state.lock().log.clone()
    }

    /// Run a remote script to completion and report on it
    ///
    /// `source` describes where the script came from. The report is addressed to the
    /// configured recipients and any registered by `mailto:`.
    pub fn run_script(&self, script: &str, source: &str) -> RunReport {
        let _batch = self.batch.lock();
        let started = Utc::now();
        let services = self.begin_batch();
        let mut ctx = self.context(&services);
        info!(source, "running script");

        Interpreter::new(&services).run(script, &mut ctx);

        services.emit(Event::ScriptFinished {
            severe: ctx.log.count(Severity::Severe),
            mild: ctx.log.count(Severity::Mild),
        });
        let mut report = RunReport::new(source, started, ctx.log.clone());
        report.add_recipients(&services.config.mail.report_recipients);
        report.add_recipients(&ctx.recipients);
        self.finish_batch(ctx);
        report
    }

    /// Remove temporary trees left by interrupted installs and downloads
    ///
    /// Returns how many were removed.
    pub fn sweep_temps(&self) -> usize {
        let _batch = self.batch.lock();
        let mut removed = sweep_stale_temps(&self.services.staging_dir());
        for volume in &self.services.config.library.volumes {
            removed += sweep_stale_temps(volume);
        }
        if removed > 0 {
            warn!(removed, "removed stale temporary trees");
        }
        removed
    }
}
