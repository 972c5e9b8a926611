//! Shared services and per-run state handed to every command handler

use crate::config::Config;
use crate::host::{LibraryHost, SETTING_RENAME, SETTING_RETAIN, SETTING_STAGING_DIR, SettingsStore};
use crate::installer::{InstallOutcome, InstallPolicy, Installer};
use crate::library::Library;
use crate::scanner::{Scanner, mark_collisions};
use crate::sync_bridge::SyncBridge;
use crate::transport::DownloadManager;
use crate::types::{Candidate, ErrorLog, Event};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collaborators a run works against
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct Services {
    /// Static configuration
    pub config: Arc<Config>,
    /// Player, library notifications and duration service
    pub host: Arc<dyn LibraryHost>,
    /// Runtime settings
    pub settings: Arc<dyn SettingsStore>,
    /// Platform download manager, when the host has one
    pub downloads: Option<Arc<dyn DownloadManager>>,
    /// Presentation events
    pub events: broadcast::Sender<Event>,
    /// Rendezvous for library notifications
    pub bridge: SyncBridge,
    /// Aborts in-flight transfers
    pub cancel: CancellationToken,
}

impl Services {
    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: Event) {
        self.events.send(event).ok();
    }

    /// Install policy: runtime settings override configured defaults
    pub fn policy(&self) -> InstallPolicy {
        let defaults = InstallPolicy::from_config(&self.config);
        InstallPolicy {
            retain: self
                .settings
                .get_bool(SETTING_RETAIN)
                .unwrap_or(defaults.retain),
            renumber: self
                .settings
                .get_bool(SETTING_RENAME)
                .unwrap_or(defaults.renumber),
        }
    }

    /// Staging directory: runtime setting, else the configured one
    pub fn staging_dir(&self) -> PathBuf {
        self.settings
            .get_string(SETTING_STAGING_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.library.staging_dir.clone())
    }

    /// Scan `staging`, wait for tag extraction and flag collisions
    pub fn scan(&self, staging: &Path) -> Vec<Candidate> {
        let scanner = Scanner::new(&self.config.library)
            .with_max_nested_depth(self.config.install.max_nested_depth);
        let mut candidates = scanner.scan(staging).wait();
        mark_collisions(&mut candidates, &self.config.library.volumes);
        self.emit(Event::ScanComplete {
            candidates: candidates.len(),
        });
        candidates
    }

    /// Run one host round trip through the bridge, logging a timeout as MILD
    fn round_trip(&self, what: &str, start: impl FnOnce(SyncBridge), log: &mut ErrorLog) {
        start(self.bridge.prepare());
        if !self.bridge.wait(self.config.automation.library_sync_timeout) {
            warn!(what, "host did not acknowledge in time");
            log.mild(format!("timed out waiting for {what}"));
        }
    }
}

/// State of one batch or script run
///
/// Every handler works on this value instead of shared fields, so two runs never
/// see each other's candidates, policy or log.
#[derive(Debug)]
pub struct RunContext {
    /// Directory scanned for candidates
    pub staging_dir: PathBuf,
    /// Candidates from the last scan that are not installed yet
    pub pending: Vec<Candidate>,
    /// Installed books
    pub library: Library,
    /// Retain and renumber toggles for this run
    pub policy: InstallPolicy,
    /// Entries reported for this run
    pub log: ErrorLog,
    /// Extra report recipients registered by `mailto:`
    pub recipients: Vec<String>,
    /// Set by `exit:`
    pub stopped: bool,
}

impl RunContext {
    /// Fresh run with settings snapshotted from `services`
    pub fn new(services: &Services) -> Self {
        let mut library = Library::new(services.config.library.volumes.clone());
        library.rebuild(services.host.current_book().as_deref());
        Self {
            staging_dir: services.staging_dir(),
            pending: Vec::new(),
            library,
            policy: services.policy(),
            log: ErrorLog::new(),
            recipients: Vec::new(),
            stopped: false,
        }
    }

    /// Replace the pending candidates with a fresh scan of the staging directory
    pub fn rescan(&mut self, services: &Services) {
        self.pending = services.scan(&self.staging_dir);
        debug!(candidates = self.pending.len(), staging = ?self.staging_dir, "rescanned");
    }

    /// Re-read the inventory
    pub fn refresh_library(&mut self, services: &Services) {
        self.library.rebuild(services.host.current_book().as_deref());
    }

    /// Install the selected candidates and bring the library up to date
    pub fn install_selected(&mut self, services: &Services) -> InstallOutcome {
        let outcome = Installer::new(&services.config)
            .with_events(&services.events)
            .install(&mut self.pending, self.policy, &mut self.log);
        if !outcome.installed.is_empty() {
            let new_books: Vec<PathBuf> =
                outcome.installed.iter().map(|(_, p)| p.clone()).collect();
            self.sync_library(services, &new_books);
        }
        outcome
    }

    /// Wait until the host has observed a library change
    ///
    /// Publishes the change, blocks for the acknowledgement, then for durations of
    /// `new_books`, and finally rebuilds the inventory and re-flags collisions so
    /// the next command sees the new state.
    pub fn sync_library(&mut self, services: &Services, new_books: &[PathBuf]) {
        let host = &services.host;
        services.round_trip(
            "the library refresh",
            |done| host.library_changed(done),
            &mut self.log,
        );
        services.emit(Event::LibraryChanged);

        if !new_books.is_empty() {
            services.round_trip(
                "playing times",
                |done| host.request_durations(new_books, done),
                &mut self.log,
            );
        }

        self.refresh_library(services);
        mark_collisions(&mut self.pending, self.library.volumes());
        info!(books = self.library.entries().len(), "library synchronized");
    }
}
