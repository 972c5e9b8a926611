//! Unattended automation: control file and mailbox polling
//!
//! Once per interval the loop checks the control file's modification time against
//! the last one it processed and, when there is no file work, the shared mailbox.
//! Every script it finds runs to completion on a blocking worker thread and always
//! produces a report: written to the result file and mailed to the requester and
//! the configured recipients.
//!
//! The loop stops when automation is disabled in the settings (checked at every
//! wake-up) or when its cancellation token fires.
//!
//! ```no_run
//! use audiobook_provisioner::{Config, MemorySettings, NullHost, PollLoop, Provisioner};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("provisioner.json".as_ref())?;
//! let provisioner = Provisioner::new(config, Arc::new(NullHost), Arc::new(MemorySettings::new()))?;
//! provisioner.set_automation_enabled(true);
//!
//! let poll = PollLoop::new(provisioner);
//! let stop = poll.cancellation_token();
//! let handle = poll.spawn();
//! // ... later
//! stop.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::host::SETTING_CONTROL_MTIME;
use crate::provisioner::Provisioner;
use crate::report::RunReport;
use crate::transport::{MailChannel, MailSender, Mailbox};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Periodic driver of remote scripts
#[derive(Clone)]
pub struct PollLoop {
    provisioner: Provisioner,
    mail: Option<MailChannel>,
    sender: Option<Arc<dyn MailSender>>,
    cancel: CancellationToken,
}

impl PollLoop {
    /// Poll the configured control file only
    pub fn new(provisioner: Provisioner) -> Self {
        Self {
            provisioner,
            mail: None,
            sender: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Also take requests from a shared mailbox
    pub fn with_mailbox(mut self, mailbox: Arc<dyn Mailbox>) -> Self {
        self.mail = Some(MailChannel::new(mailbox, &self.provisioner.config().mail));
        self
    }

    /// Mail run reports through `sender`
    pub fn with_sender(mut self, sender: Arc<dyn MailSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Token that stops the loop at its next wake-up
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the loop on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Poll until automation is disabled or the loop is cancelled
    pub async fn run(self) {
        let interval = self.provisioner.config().automation.poll_interval;
        info!(interval_secs = interval.as_secs(), "automation poll loop started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if !self.provisioner.automation_enabled() {
                info!("automation disabled, poll loop exiting");
                break;
            }

            let worker = self.clone();
            match tokio::task::spawn_blocking(move || worker.poll_once()).await {
                Ok(Ok(reports)) if !reports.is_empty() => {
                    info!(runs = reports.len(), "automation runs finished");
                }
                Ok(Ok(_)) => debug!("no automation work"),
                Ok(Err(e)) => warn!(error = %e, "automation poll failed"),
                Err(e) => error!(error = %e, "automation worker panicked"),
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("automation poll loop stopped");
    }

    /// Check for new work once and run it; blocks until every run finished
    ///
    /// Returns the reports of the runs performed (empty when there was no work).
    pub fn poll_once(&self) -> Result<Vec<RunReport>> {
        if let Some(report) = self.poll_control_file()? {
            return Ok(vec![report]);
        }
        self.poll_mailbox()
    }

    fn poll_control_file(&self) -> Result<Option<RunReport>> {
        let automation = &self.provisioner.config().automation;
        let Some(control) = automation.control_file.as_deref() else {
            return Ok(None);
        };
        let Some(modified) = modified_millis(control) else {
            debug!(?control, "no control file");
            return Ok(None);
        };

        let settings = self.provisioner.settings();
        let last = settings
            .get_string(SETTING_CONTROL_MTIME)
            .and_then(|s| s.parse::<u128>().ok());
        if last == Some(modified) {
            return Ok(None);
        }

        let script = std::fs::read_to_string(control)?;
        // Remember before running so a script is never run twice for one edit
        settings.set_string(SETTING_CONTROL_MTIME, &modified.to_string());
        info!(?control, "control file changed");

        let report = self
            .provisioner
            .run_script(&script, &format!("control file {}", control.display()));
        self.deliver(&report);
        Ok(Some(report))
    }

    fn poll_mailbox(&self) -> Result<Vec<RunReport>> {
        let Some(channel) = &self.mail else {
            return Ok(Vec::new());
        };
        let mut reports = Vec::new();
        for request in channel.fetch_requests(Utc::now())? {
            let mut report = self
                .provisioner
                .run_script(&request.script, &format!("mail from {}", request.from));
            report.add_recipients([request.from.as_str()]);
            if let Err(e) = channel.finalize(&request) {
                warn!(id = request.id, error = %e, "failed to update request mail");
            }
            self.deliver(&report);
            reports.push(report);
        }
        Ok(reports)
    }

    /// Write the result file and mail the report; failures are only logged
    fn deliver(&self, report: &RunReport) {
        let config = self.provisioner.config();
        if let Some(path) = config.automation.result_path()
            && let Err(e) = report.write_to(&path)
        {
            warn!(?path, error = %e, "failed to write result file");
        }
        if let Some(sender) = &self.sender {
            report.send(sender.as_ref(), &config.mail.report_subject);
        }
    }
}

/// Modification time in milliseconds since the epoch, `None` when missing
fn modified_millis(path: &Path) -> Option<u128> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    // Pre-epoch times only come from broken clocks
    Some(
        modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0),
    )
}
