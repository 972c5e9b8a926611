//! Configuration types for audiobook-provisioner

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Library layout (volumes, staging area, audio detection)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library volumes in the order they are filled (discovered by the host)
    #[serde(default)]
    pub volumes: Vec<PathBuf>,

    /// Staging directory scanned for candidates (default: "./staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Private cache for zip members extracted during scanning (default: "./cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// File extensions treated as audio (without dots, compared case-insensitively)
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: Vec<String>,

    /// Volumes with less free space than this percentage are skipped (default: 10)
    #[serde(default = "default_min_free_space_percent")]
    pub min_free_space_percent: u8,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            staging_dir: default_staging_dir(),
            cache_dir: default_cache_dir(),
            audio_extensions: default_audio_extensions(),
            min_free_space_percent: default_min_free_space_percent(),
        }
    }
}

/// Install policy defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Keep staged sources after installing (disables the rename pass)
    #[serde(default)]
    pub retain_source_files: bool,

    /// Zero-pad numbers in file names of newly installed books (default: true)
    #[serde(default = "default_true")]
    pub rename_files: bool,

    /// Maximum depth for expanding zips found inside installed books (default: 5)
    #[serde(default = "default_max_nested_depth")]
    pub max_nested_depth: u32,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            retain_source_files: false,
            rename_files: true,
            max_nested_depth: default_max_nested_depth(),
        }
    }
}

/// Retry configuration for transient network failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Download transport settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Interval between download-manager status polls (default: 1 second)
    #[serde(default = "default_download_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Re-enqueues allowed for a request that stalls after making progress (default: 3)
    #[serde(default = "default_retries_max")]
    pub retries_max: u32,

    /// Consecutive polls without a start before the request is cancelled (default: 10)
    #[serde(default = "default_cancels_max")]
    pub cancels_max: u32,

    /// Prefer the platform download manager over a raw HTTP transfer (default: true)
    #[serde(default = "default_true")]
    pub use_download_manager: bool,

    /// Retry policy for raw HTTP transfers
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_download_poll_interval(),
            retries_max: default_retries_max(),
            cancels_max: default_cancels_max(),
            use_download_manager: true,
            retry: RetryConfig::default(),
        }
    }
}

/// Remote control through the polled control file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Whether the poll loop runs at all (overridden by the settings store at runtime)
    #[serde(default)]
    pub enabled: bool,

    /// Control file polled for modification-time changes
    #[serde(default)]
    pub control_file: Option<PathBuf>,

    /// Where run results are written (default: `<control stem>-result.txt` next to the control file)
    #[serde(default)]
    pub result_file: Option<PathBuf>,

    /// Interval between poll wake-ups (default: 60 seconds)
    #[serde(default = "default_automation_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Longest wait for the host's library-changed acknowledgement (default: 30 seconds)
    #[serde(default = "default_library_sync_timeout", with = "duration_serde")]
    pub library_sync_timeout: Duration,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            control_file: None,
            result_file: None,
            poll_interval: default_automation_poll_interval(),
            library_sync_timeout: default_library_sync_timeout(),
        }
    }
}

impl AutomationConfig {
    /// Result file location, derived from the control file when not configured
    pub fn result_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.result_file {
            return Some(path.clone());
        }
        let control = self.control_file.as_ref()?;
        let stem = control
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "control".to_string());
        Some(control.with_file_name(format!("{stem}-result.txt")))
    }
}

/// Mailbox-driven automation and report delivery
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailConfig {
    /// Tag identifying this device in request subjects
    #[serde(default = "default_device_tag")]
    pub device_tag: String,

    /// Subject marker that identifies automation requests
    #[serde(default = "default_subject_marker")]
    pub subject_marker: String,

    /// Only requests newer than this are considered (default: 7 days)
    #[serde(default = "default_recency_window", with = "duration_serde")]
    pub recency_window: Duration,

    /// Addresses that receive every run report
    #[serde(default)]
    pub report_recipients: Vec<String>,

    /// Subject line of report mails
    #[serde(default = "default_report_subject")]
    pub report_subject: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            device_tag: default_device_tag(),
            subject_marker: default_subject_marker(),
            recency_window: default_recency_window(),
            report_recipients: Vec::new(),
            report_subject: default_report_subject(),
        }
    }
}

/// Main configuration for the provisioner
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Volumes, staging and audio detection
    #[serde(default)]
    pub library: LibraryConfig,

    /// Install policy defaults
    #[serde(default)]
    pub install: InstallConfig,

    /// Download transports
    #[serde(default)]
    pub download: DownloadConfig,

    /// Control-file automation
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Mailbox automation and reports
    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    /// Load a JSON configuration file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.library.volumes.is_empty() {
            return Err(Error::config(
                "volumes",
                "at least one library volume is required",
            ));
        }
        if self.library.min_free_space_percent >= 100 {
            return Err(Error::config(
                "min_free_space_percent",
                "free-space floor must be below 100 percent",
            ));
        }
        if self.automation.poll_interval.is_zero() {
            return Err(Error::config(
                "automation.poll_interval",
                "poll interval must be greater than zero",
            ));
        }
        if self.mail.device_tag.trim().is_empty() {
            return Err(Error::config("mail.device_tag", "device tag is empty"));
        }
        Ok(())
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./staging")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_audio_extensions() -> Vec<String> {
    ["mp3", "m4a", "m4b", "aac", "ogg", "opus", "flac", "wav", "wma"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_min_free_space_percent() -> u8 {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_nested_depth() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_download_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_retries_max() -> u32 {
    3
}

fn default_cancels_max() -> u32 {
    10
}

fn default_automation_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_library_sync_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_device_tag() -> String {
    "device".to_string()
}

fn default_subject_marker() -> String {
    "AUDIOBOOKS".to_string()
}

fn default_recency_window() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_report_subject() -> String {
    "Audiobook automation report".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.library.min_free_space_percent, 10);
        assert_eq!(config.download.retries_max, 3);
        assert!(config.install.rename_files);
        assert!(!config.install.retain_source_files);
        let audio = &config.library.audio_extensions;
        assert!(crate::utils::has_extension(Path::new("a/b/Track 01.MP3"), audio));
        assert!(!crate::utils::has_extension(Path::new("cover.jpg"), audio));
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.automation.poll_interval, Duration::from_secs(60));
        assert_eq!(config.mail.subject_marker, "AUDIOBOOKS");
    }

    #[test]
    fn durations_are_seconds_in_json() {
        let config: Config =
            serde_json::from_str(r#"{"automation": {"poll_interval": 5}}"#).unwrap();
        assert_eq!(config.automation.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn validate_requires_volumes() {
        let config = Config::default();
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("volumes")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn load_reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"library": {"volumes": ["/books"], "min_free_space_percent": 5}}"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.library.volumes, vec![PathBuf::from("/books")]);
        assert_eq!(config.library.min_free_space_percent, 5);
    }

    #[test]
    fn result_path_defaults_next_to_control_file() {
        let automation = AutomationConfig {
            control_file: Some(PathBuf::from("/sdcard/remote/control.txt")),
            ..Default::default()
        };
        assert_eq!(
            automation.result_path(),
            Some(PathBuf::from("/sdcard/remote/control-result.txt"))
        );
    }
}
