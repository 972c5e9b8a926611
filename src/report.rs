//! Run reports for unattended script runs
//!
//! Every automated run produces a report, whatever its outcome. It is written to
//! the result file next to the control file and mailed to the requester plus any
//! configured or `mailto:` recipients.

use crate::error::Result;
use crate::transport::{MailSender, OutgoingMail};
use crate::types::{ErrorLog, Severity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of one script run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Where the script came from ("control file ..." or "mail from ...")
    pub source: String,
    /// When the run started
    pub started: DateTime<Utc>,
    /// When the run finished
    pub finished: DateTime<Utc>,
    /// Everything the run logged
    pub log: ErrorLog,
    /// Addresses the report is mailed to
    pub recipients: Vec<String>,
}

impl RunReport {
    /// Report for a run that started at `started` and has just finished
    pub fn new(source: impl Into<String>, started: DateTime<Utc>, log: ErrorLog) -> Self {
        Self {
            source: source.into(),
            started,
            finished: Utc::now(),
            log,
            recipients: Vec::new(),
        }
    }

    /// Add recipients, skipping duplicates and blanks
    pub fn add_recipients<I, S>(&mut self, recipients: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for address in recipients {
            let address = address.as_ref().trim();
            if !address.is_empty() && !self.recipients.iter().any(|r| r == address) {
                self.recipients.push(address.to_string());
            }
        }
    }

    /// One-line outcome
    pub fn summary(&self) -> String {
        let severe = self.log.count(Severity::Severe);
        let mild = self.log.count(Severity::Mild);
        match (severe, mild) {
            (0, 0) => "completed".to_string(),
            (0, mild) => format!("completed with {mild} warning(s)"),
            (severe, mild) => format!("{severe} error(s), {mild} warning(s)"),
        }
    }

    /// Plain-text rendering used for the result file and mail body
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Source:   {}", self.source);
        let _ = writeln!(out, "Started:  {}", self.started.to_rfc3339());
        let _ = writeln!(out, "Finished: {}", self.finished.to_rfc3339());
        let _ = writeln!(out, "Result:   {}", self.summary());
        out.push('\n');
        if self.log.is_empty() {
            out.push_str("(nothing to report)\n");
        }
        for entry in self.log.entries() {
            let _ = writeln!(out, "{entry}");
        }
        out
    }

    /// Replace `path` with the rendered report
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        info!(?path, "run report written");
        Ok(())
    }

    /// Outgoing mail carrying this report, if there is anybody to send it to
    pub fn mail(&self, subject: &str) -> Option<OutgoingMail> {
        if self.recipients.is_empty() {
            return None;
        }
        Some(OutgoingMail {
            to: self.recipients.clone(),
            subject: format!("{subject}: {}", self.summary()),
            body: self.render(),
        })
    }

    /// Mail the report; failures are logged, never raised
    ///
    /// Returns whether a mail was sent.
    pub fn send(&self, sender: &dyn MailSender, subject: &str) -> bool {
        let Some(mail) = self.mail(subject) else {
            return false;
        };
        match sender.send(&mail) {
            Ok(()) => {
                info!(recipients = mail.to.len(), "run report mailed");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to mail run report");
                false
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryOutbox;
    use tempfile::TempDir;

    fn report() -> RunReport {
        let mut log = ErrorLog::new();
        log.info("installed \"Matilda\"");
        log.mild("volume /mnt/sd is not writable");
        log.severe("a book named \"Alpha\" is already installed");
        RunReport::new("control file /sdcard/control.txt", Utc::now(), log)
    }

    #[test]
    fn render_lists_every_entry_with_severity() {
        let text = report().render();
        assert!(text.contains("Result:   1 error(s), 1 warning(s)"));
        assert!(text.contains("INFO: installed \"Matilda\""));
        assert!(text.contains("MILD: volume /mnt/sd is not writable"));
        assert!(text.contains("SEVERE: a book named \"Alpha\" is already installed"));
    }

    #[test]
    fn empty_run_still_reports() {
        let report = RunReport::new("mail from a@example.com", Utc::now(), ErrorLog::new());
        assert_eq!(report.summary(), "completed");
        assert!(report.render().contains("(nothing to report)"));
    }

    #[test]
    fn write_replaces_the_result_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/control-result.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old run").unwrap();

        report().write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old run"));
        assert!(text.contains("Source:   control file /sdcard/control.txt"));
    }

    #[test]
    fn mail_goes_to_deduplicated_recipients() {
        let mut report = report();
        assert!(report.mail("Audiobooks").is_none());
        report.add_recipients(["a@example.com", " a@example.com ", "", "b@example.com"]);

        let outbox = MemoryOutbox::new();
        assert!(report.send(&outbox, "Audiobooks"));

        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(sent[0].subject, "Audiobooks: 1 error(s), 1 warning(s)");
    }
}
