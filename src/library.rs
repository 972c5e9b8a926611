//! Inventory of installed books
//!
//! Each volume is a flat set of book directories. The inventory is rebuilt wholesale
//! from disk whenever it is needed rather than maintained incrementally, so it can
//! never drift from the filesystem.

use crate::error::{Error, InstallError, Result, ScriptError};
use crate::tree::{delete_tree, is_temp_name, rename_no_replace};
use crate::types::title_from_name;
use crate::utils::{is_ignored_name, is_writable_dir};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Snapshot of one installed book
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Directory holding the book
    pub book_dir: PathBuf,
    /// Title derived from the directory name
    pub title: String,
    /// Selected for a bulk operation
    pub selected: bool,
    /// The volume holding the book is not writable
    pub unwritable: bool,
    /// This is the book currently loaded in the player
    pub current: bool,
}

impl LibraryEntry {
    /// Directory name of the book
    pub fn name(&self) -> String {
        self.book_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Whether a partial title matches (case-insensitive, title or path)
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.title.to_lowercase().contains(&pattern)
            || self
                .book_dir
                .to_string_lossy()
                .to_lowercase()
                .contains(&pattern)
    }
}

/// Installed books across all library volumes
#[derive(Clone, Debug, Default)]
pub struct Library {
    volumes: Vec<PathBuf>,
    entries: Vec<LibraryEntry>,
}

impl Library {
    /// Create an empty inventory over `volumes`; call [`Library::rebuild`] to fill it
    pub fn new(volumes: Vec<PathBuf>) -> Self {
        Self {
            volumes,
            entries: Vec::new(),
        }
    }

    /// Configured volumes in fill order
    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// Re-read every volume, dropping all selections
    ///
    /// Books are listed volume by volume, sorted by name. Hidden directories and
    /// unfinished install trees are not books.
    pub fn rebuild(&mut self, current: Option<&Path>) -> &[LibraryEntry] {
        let mut entries = Vec::new();
        for volume in &self.volumes {
            let unwritable = !is_writable_dir(volume);
            let Ok(dir) = fs::read_dir(volume) else {
                debug!(?volume, "volume not readable, skipping");
                continue;
            };
            let mut books: Vec<PathBuf> = dir
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .filter(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    !is_ignored_name(&name) && !is_temp_name(&name)
                })
                .map(|e| e.path())
                .collect();
            books.sort();

            entries.extend(books.into_iter().map(|book_dir| {
                let title = book_dir
                    .file_name()
                    .map(|n| title_from_name(&n.to_string_lossy()))
                    .unwrap_or_default();
                LibraryEntry {
                    current: current == Some(book_dir.as_path()),
                    book_dir,
                    title,
                    selected: false,
                    unwritable,
                }
            }));
        }
        debug!(books = entries.len(), "library inventory rebuilt");
        self.entries = entries;
        &self.entries
    }

    /// Entries from the last rebuild
    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// Entries from the last rebuild, for selection changes
    pub fn entries_mut(&mut self) -> &mut [LibraryEntry] {
        &mut self.entries
    }

    /// Whether any volume already holds a book directory called `name`
    pub fn contains_name(&self, name: &str) -> bool {
        self.volumes.iter().any(|v| v.join(name).exists())
    }

    /// Delete a book's directory tree
    pub fn delete_book(&self, entry: &LibraryEntry) -> Result<()> {
        if entry.unwritable {
            return Err(InstallError::DeleteFailed {
                path: entry.book_dir.clone(),
                reason: "volume is not writable".to_string(),
            }
            .into());
        }
        delete_tree(&entry.book_dir)?;
        info!(book = ?entry.book_dir, "deleted book");
        Ok(())
    }

    /// Rename a book's directory within its volume
    ///
    /// Returns the new location. Names containing path separators are rejected and
    /// an existing book is never replaced.
    pub fn rename_book(&self, entry: &LibraryEntry, new_name: &str) -> Result<PathBuf> {
        let new_name = valid_book_name(new_name)?;
        if entry.unwritable {
            return Err(InstallError::MoveFailed {
                source_path: entry.book_dir.clone(),
                dest_path: entry.book_dir.with_file_name(new_name),
                reason: "volume is not writable".to_string(),
            }
            .into());
        }
        if self.contains_name(new_name) {
            warn!(name = new_name, "rename target already used");
            return Err(InstallError::NameCollision {
                name: new_name.to_string(),
            }
            .into());
        }
        let dest = entry.book_dir.with_file_name(new_name);
        rename_no_replace(&entry.book_dir, &dest)?;
        info!(from = ?entry.book_dir, to = ?dest, "renamed book");
        Ok(dest)
    }
}

/// Check that `name` can be used as a single directory name
pub fn valid_book_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\']);
    if bad {
        return Err(Error::Script(ScriptError::InvalidOperand {
            what: "book name".to_string(),
            value: name.to_string(),
        }));
    }
    Ok(trimmed)
}
