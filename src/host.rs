//! Interfaces to the host application
//!
//! The engine never talks to the playback engine, the settings screen or the
//! platform directly. The host implements these traits and hands them to the
//! [`Provisioner`](crate::Provisioner).

use crate::error::Result;
use crate::sync_bridge::SyncBridge;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings key: keep staged sources after installing
pub const SETTING_RETAIN: &str = "retain_source_files";
/// Settings key: pad numbers in installed file names
pub const SETTING_RENAME: &str = "rename_files";
/// Settings key: whether remote automation is enabled
pub const SETTING_AUTOMATION: &str = "remote_automation";
/// Settings key: staging directory chosen at runtime
pub const SETTING_STAGING_DIR: &str = "staging_dir";
/// Settings key: modification time (Unix seconds) of the last control file run
pub const SETTING_CONTROL_MTIME: &str = "control_file_mtime";

/// Library services owned by the host
///
/// Methods taking a [`SyncBridge`] start asynchronous work and must call
/// [`SyncBridge::resume`] once it has completed (possibly from another thread, or
/// before returning).
pub trait LibraryHost: Send + Sync {
    /// Publish a library-changed notification and resume `done` once observers
    /// (inventory screens, the player) have refreshed
    fn library_changed(&self, done: SyncBridge);

    /// Start computing playing time for `books`, resuming `done` when finished
    fn request_durations(&self, books: &[PathBuf], done: SyncBridge);

    /// Directory of the book currently selected in the player, if any
    fn current_book(&self) -> Option<PathBuf>;

    /// Move the saved playback position of `book` to `position`
    fn reset_position(&self, book: &Path, position: Duration) -> Result<()>;
}

/// Host without a player: completes every notification immediately
#[derive(Clone, Debug, Default)]
pub struct NullHost;

impl LibraryHost for NullHost {
    fn library_changed(&self, done: SyncBridge) {
        done.resume();
    }

    fn request_durations(&self, _books: &[PathBuf], done: SyncBridge) {
        done.resume();
    }

    fn current_book(&self) -> Option<PathBuf> {
        None
    }

    fn reset_position(&self, _book: &Path, _position: Duration) -> Result<()> {
        Ok(())
    }
}

/// Key-value settings store
pub trait SettingsStore: Send + Sync {
    /// Read a boolean setting
    fn get_bool(&self, key: &str) -> Option<bool>;
    /// Write a boolean setting
    fn set_bool(&self, key: &str, value: bool);
    /// Read a string setting
    fn get_string(&self, key: &str) -> Option<String>;
    /// Write a string setting
    fn set_string(&self, key: &str, value: &str);
}

#[derive(Clone, Debug, PartialEq)]
enum SettingValue {
    Bool(bool),
    Text(String),
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, SettingValue>>,
}

impl MemorySettings {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.read().get(key) {
            Some(SettingValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    fn set_bool(&self, key: &str, value: bool) {
        self.values
            .write()
            .insert(key.to_string(), SettingValue::Bool(value));
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.values.read().get(key) {
            Some(SettingValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn set_string(&self, key: &str, value: &str) {
        self.values
            .write()
            .insert(key.to_string(), SettingValue::Text(value.to_string()));
    }
}
