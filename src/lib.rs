//! # audiobook-provisioner
//!
//! Provisioning and remote automation engine for an audiobook player.
//!
//! Books arrive in a staging directory as loose audio files, directories or zip
//! archives. The engine finds them, reads their tags, and installs them into one
//! or more library volumes without ever exposing a half-written book. It can also
//! be driven unattended by a small line-oriented script delivered through a polled
//! control file or a shared mailbox.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No UI; the host supplies volumes, settings, library
//!   notifications and transports through traits
//! - **All-or-nothing installs** - Trees are built under a temporary name and renamed
//!   into place
//! - **One reporting path** - Interactive batches and scripts share the same
//!   INFO / MILD / SEVERE error log
//! - **Event-driven** - Presentation layers subscribe to [`Event`]s
//!
//! ## Quick Start
//!
//! ```no_run
//! use audiobook_provisioner::{Config, MemorySettings, NullHost, Provisioner};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.library.volumes = vec!["/sdcard/Audiobooks".into()];
//!     config.library.staging_dir = "/sdcard/Download".into();
//!
//!     let provisioner =
//!         Provisioner::new(config, Arc::new(NullHost), Arc::new(MemorySettings::new()))?;
//!
//!     provisioner.scan_candidates();
//!     provisioner.select_all(true);
//!     let outcome = provisioner.install_selected();
//!     println!("installed {} book(s)", outcome.installed.len());
//!
//!     let report = provisioner.run_script("books:books", "console");
//!     print!("{}", report.render());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Host collaborator interfaces
pub mod host;
/// Install executor
pub mod installer;
/// Remote command interpreter
pub mod interpreter;
/// Installed-book inventory
pub mod library;
/// Control file and mailbox polling
pub mod poll_loop;
/// Engine facade
pub mod provisioner;
/// Filename digit padding
pub mod renumber;
/// Run reports
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Staging directory scanner
pub mod scanner;
/// Callback-to-blocking bridge
pub mod sync_bridge;
/// Transport adapters
pub mod transport;
/// Directory tree primitives
pub mod tree;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{DownloadError, Error, InstallError, Result, ScriptError};
pub use host::{LibraryHost, MemorySettings, NullHost, SettingsStore};
pub use installer::{InstallOutcome, InstallPolicy, Installer};
pub use interpreter::{Command, Interpreter, RunContext, Services};
pub use library::{Library, LibraryEntry};
pub use poll_loop::PollLoop;
pub use provisioner::Provisioner;
pub use report::RunReport;
pub use scanner::Scanner;
pub use sync_bridge::SyncBridge;
pub use types::{Candidate, ErrorLog, Event, LogEntry, Severity, SourceKind};

/// Run the poll loop until a termination signal arrives, then stop it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use audiobook_provisioner::{Config, MemorySettings, NullHost, PollLoop, Provisioner, run_until_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::load("provisioner.json".as_ref())?;
///     let provisioner =
///         Provisioner::new(config, Arc::new(NullHost), Arc::new(MemorySettings::new()))?;
///     provisioner.set_automation_enabled(true);
///
///     run_until_shutdown(PollLoop::new(provisioner)).await;
///     Ok(())
/// }
/// ```
pub async fn run_until_shutdown(poll: PollLoop) {
    let stop = poll.cancellation_token();
    let mut handle = poll.spawn();
    let finished = tokio::select! {
        _ = wait_for_signal() => None,
        // Automation was disabled
        result = &mut handle => Some(result),
    };
    let result = match finished {
        Some(result) => result,
        None => {
            stop.cancel();
            handle.await
        }
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "poll loop task failed");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
