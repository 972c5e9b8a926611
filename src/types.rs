//! Core types for audiobook-provisioner

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How serious an error-log entry is
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Normal outcome worth reporting ("book installed")
    Info,
    /// Recoverable anomaly ("volume not writable, trying next")
    Mild,
    /// Operation failed; the candidate or command was aborted
    Severe,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Mild => write!(f, "MILD"),
            Severity::Severe => write!(f, "SEVERE"),
        }
    }
}

/// One entry of a batch's error log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity of the entry
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Error log accumulated over one operation batch
///
/// Cleared at the start of each batch. Interactive callers show it when it holds
/// MILD or SEVERE entries; automation always writes it to the run report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    entries: Vec<LogEntry>,
}

impl ErrorLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) {
        self.entries.push(LogEntry {
            severity,
            message: message.into(),
        });
    }

    /// Append an INFO entry
    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Severity::Info, message);
    }

    /// Append a MILD entry
    pub fn mild(&mut self, message: impl Into<String>) {
        self.push(Severity::Mild, message);
    }

    /// Append a SEVERE entry
    pub fn severe(&mut self, message: impl Into<String>) {
        self.push(Severity::Severe, message);
    }

    /// Convert an error into an entry at its own severity
    pub fn record(&mut self, error: &Error) {
        self.push(error.severity(), error.to_string());
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Append all entries of another log
    pub fn extend(&mut self, other: ErrorLog) {
        self.entries.extend(other.entries);
    }

    /// All entries in insertion order
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries at exactly this severity
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }

    /// Whether anything worse than INFO was recorded
    pub fn has_problems(&self) -> bool {
        self.entries.iter().any(|e| e.severity > Severity::Info)
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shape of a candidate's source in the staging directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A directory tree holding audio files
    Directory,
    /// A single loose audio file
    File,
    /// A zip archive holding audio files
    Zip,
}

/// A prospective book discovered in the staging directory but not yet installed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Directory, file or archive in the staging area
    pub source: PathBuf,
    /// Shape of the source
    pub kind: SourceKind,
    /// Directory name the book will get inside a library volume
    pub library_name: String,
    /// First audio file found under the source (for zips, the member name)
    pub audio_file: PathBuf,
    /// Title from tags, or derived from the raw name when tags are missing
    pub book_title: String,
    /// Author from tags
    pub author: Option<String>,
    /// Title shown to the user
    pub display_title: String,
    /// Selected for install or delete
    pub selected: bool,
    /// Library name is already used by an installed book
    pub collides: bool,
}

impl Candidate {
    /// Build a candidate whose titles are derived from the raw name until
    /// metadata extraction fills them in
    pub fn new(source: PathBuf, kind: SourceKind, audio_file: PathBuf) -> Self {
        let library_name = library_name_for(&source, kind);
        let book_title = title_from_name(&library_name);
        Self {
            source,
            kind,
            library_name,
            audio_file,
            display_title: book_title.clone(),
            book_title,
            author: None,
            selected: false,
            collides: false,
        }
    }

    /// Apply extracted tags and recompute the display title
    pub fn apply_metadata(&mut self, title: Option<String>, author: Option<String>) {
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            self.book_title = title.trim().to_string();
        }
        self.author = author
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self.display_title = match &self.author {
            Some(author) => format!("{} - {}", self.book_title, author),
            None => self.book_title.clone(),
        };
    }

    /// Whether a partial title matches this candidate
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.display_title.to_lowercase().contains(&pattern)
            || self.library_name.to_lowercase().contains(&pattern)
            || self
                .source
                .to_string_lossy()
                .to_lowercase()
                .contains(&pattern)
    }
}

/// Library directory name proposed for a staged source
fn library_name_for(source: &Path, kind: SourceKind) -> String {
    let name = match kind {
        SourceKind::Directory => source.file_name(),
        SourceKind::File | SourceKind::Zip => source.file_stem(),
    };
    name.map(|n| n.to_string_lossy().trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "book".to_string())
}

/// Turn a raw file or directory name into a readable title
pub fn title_from_name(name: &str) -> String {
    name.replace(['_', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Events published to presentation-layer subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A staging scan finished and metadata extraction was joined
    ScanComplete {
        /// Number of candidates found
        candidates: usize,
    },

    /// Placement of a candidate started
    InstallStarted {
        /// Library name of the candidate
        name: String,
    },

    /// A candidate was installed
    Installed {
        /// Library name of the book
        name: String,
        /// Final location of the book
        path: PathBuf,
    },

    /// Transfer progress of a running download
    DownloadProgress {
        /// Bytes transferred so far
        transferred: u64,
        /// Total bytes, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },

    /// An operation failed
    Failure {
        /// Error message
        message: String,
    },

    /// Books were added, removed or renamed
    LibraryChanged,

    /// A remote script finished
    ScriptFinished {
        /// SEVERE entries in the run log
        severe: usize,
        /// MILD entries in the run log
        mild: usize,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_names_from_source_shape() {
        let dir = Candidate::new(
            PathBuf::from("/staging/The_Hobbit"),
            SourceKind::Directory,
            PathBuf::from("/staging/The_Hobbit/01.mp3"),
        );
        assert_eq!(dir.library_name, "The_Hobbit");
        assert_eq!(dir.book_title, "The Hobbit");

        let zip = Candidate::new(
            PathBuf::from("/staging/Matilda.zip"),
            SourceKind::Zip,
            PathBuf::from("Matilda/01.mp3"),
        );
        assert_eq!(zip.library_name, "Matilda");
    }

    #[test]
    fn metadata_sets_display_title() {
        let mut c = Candidate::new(
            PathBuf::from("/staging/x.mp3"),
            SourceKind::File,
            PathBuf::from("/staging/x.mp3"),
        );
        c.apply_metadata(Some("Matilda".into()), Some("Roald Dahl".into()));
        assert_eq!(c.display_title, "Matilda - Roald Dahl");

        c.apply_metadata(Some("  ".into()), None);
        assert_eq!(c.book_title, "Matilda");
        assert_eq!(c.display_title, "Matilda");
    }

    #[test]
    fn candidate_matching_is_case_insensitive() {
        let c = Candidate::new(
            PathBuf::from("/staging/Bear Stories"),
            SourceKind::Directory,
            PathBuf::from("/staging/Bear Stories/1.mp3"),
        );
        assert!(c.matches("bear"));
        assert!(c.matches("STORIES"));
        assert!(!c.matches("wolf"));
    }

    #[test]
    fn error_log_counts_by_severity() {
        let mut log = ErrorLog::new();
        log.info("installed");
        assert!(!log.has_problems());
        log.mild("volume skipped");
        log.severe("copy failed");
        assert!(log.has_problems());
        assert_eq!(log.count(Severity::Severe), 1);
        assert_eq!(log.entries()[2].to_string(), "SEVERE: copy failed");
        log.clear();
        assert!(log.is_empty());
    }
}
