//! Install executor
//!
//! Places selected candidates into library volumes in two passes:
//!
//! 1. **Rename pass** (skipped when sources are retained): directory and loose-file
//!    candidates that share a filesystem with a writable volume are renamed into it.
//!    No free space is needed, so this always runs first.
//! 2. **Copy pass**: the remaining candidates go to volumes in order, skipping
//!    volumes that are missing, unwritable or below the free-space floor. Zips are
//!    extracted, directories copied, files copied into a new book directory, each
//!    built under a temporary sibling and renamed into place. When no volume is left
//!    the rest of the batch is abandoned and the outcome is flagged
//!    `filesystems_full`.
//!
//! Each failure becomes one SEVERE entry in the error log and aborts only its own
//! candidate, which stays pending and is unselected.

mod volumes;

pub use volumes::{VolumeCursor, VolumeStatus, same_filesystem_volume, volume_status};

use crate::config::Config;
use crate::error::{Error, InstallError, Result};
use crate::extraction::{ZipExtractor, expand_nested_zips};
use crate::renumber::normalize_tree;
use crate::scanner::mark_collisions;
use crate::tree::{
    build_atomically, copy_file, copy_tree, delete_tree, discard, rename_no_replace,
    temp_sibling,
};
use crate::types::{Candidate, ErrorLog, Event, SourceKind};
use crate::utils::same_filesystem;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Per-run install policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstallPolicy {
    /// Keep staged sources (copy instead of move)
    pub retain: bool,
    /// Zero-pad numbers in installed file names
    pub renumber: bool,
}

impl InstallPolicy {
    /// Policy from the configured defaults
    pub fn from_config(config: &Config) -> Self {
        Self {
            retain: config.install.retain_source_files,
            renumber: config.install.rename_files,
        }
    }
}

/// What a batch achieved
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallOutcome {
    /// Library names and final locations of installed books
    pub installed: Vec<(String, PathBuf)>,
    /// Every volume was exhausted before the batch finished
    pub filesystems_full: bool,
}

/// Places candidates into library volumes
pub struct Installer<'a> {
    config: &'a Config,
    events: Option<&'a broadcast::Sender<Event>>,
}

impl<'a> Installer<'a> {
    /// Create an executor over the configured volumes
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            events: None,
        }
    }

    /// Publish progress events on `events`
    pub fn with_events(mut self, events: &'a broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = self.events {
            // No subscribers is fine
            tx.send(event).ok();
        }
    }

    /// Install every selected candidate, removing installed ones from `pending`
    pub fn install(
        &self,
        pending: &mut Vec<Candidate>,
        policy: InstallPolicy,
        log: &mut ErrorLog,
    ) -> InstallOutcome {
        let mut outcome = InstallOutcome::default();

        // Books may have been installed or renamed since the scan
        mark_collisions(pending, &self.config.library.volumes);
        for candidate in pending.iter_mut().filter(|c| c.selected && c.collides) {
            let err = Error::from(InstallError::NameCollision {
                name: candidate.library_name.clone(),
            });
            warn!(name = %candidate.library_name, "refusing to install colliding candidate");
            self.fail(candidate, &err, log);
        }

        if !policy.retain {
            self.rename_pass(pending, policy, log, &mut outcome);
        }
        self.copy_pass(pending, policy, log, &mut outcome);

        info!(
            installed = outcome.installed.len(),
            filesystems_full = outcome.filesystems_full,
            "install batch finished"
        );
        outcome
    }

    fn rename_pass(
        &self,
        pending: &mut Vec<Candidate>,
        policy: InstallPolicy,
        log: &mut ErrorLog,
        outcome: &mut InstallOutcome,
    ) {
        let volumes = &self.config.library.volumes;
        let mut index = 0;
        while index < pending.len() {
            let candidate = &mut pending[index];
            let eligible = candidate.selected
                && !candidate.collides
                && matches!(candidate.kind, SourceKind::Directory | SourceKind::File);
            let volume = if eligible {
                same_filesystem_volume(volumes, &candidate.source)
            } else {
                None
            };
            let Some(volume) = volume else {
                index += 1;
                continue;
            };

            let dest = volume.join(&candidate.library_name);
            self.emit(Event::InstallStarted {
                name: candidate.library_name.clone(),
            });
            match move_into_place(candidate, &dest) {
                Ok(()) => {
                    self.post_process_moved(&dest, policy, log);
                    let candidate = pending.remove(index);
                    self.succeed(candidate, dest, log, outcome);
                }
                Err(e) => {
                    self.fail(candidate, &e, log);
                    index += 1;
                }
            }
        }
    }

    fn copy_pass(
        &self,
        pending: &mut Vec<Candidate>,
        policy: InstallPolicy,
        log: &mut ErrorLog,
        outcome: &mut InstallOutcome,
    ) {
        let mut cursor = VolumeCursor::new(
            &self.config.library.volumes,
            self.config.library.min_free_space_percent,
        );
        let mut index = 0;
        while index < pending.len() {
            if !(pending[index].selected && !pending[index].collides) {
                index += 1;
                continue;
            }

            let Some(volume) = cursor.current(log) else {
                let err = Error::from(InstallError::FilesystemsFull);
                error!("no library volume left, abandoning batch");
                log.record(&err);
                self.emit(Event::Failure {
                    message: err.to_string(),
                });
                outcome.filesystems_full = true;
                return;
            };

            let candidate = &mut pending[index];
            let dest = volume.join(&candidate.library_name);
            self.emit(Event::InstallStarted {
                name: candidate.library_name.clone(),
            });

            match self.place(candidate, volume, &dest, policy, log) {
                Ok(()) => {
                    let candidate = pending.remove(index);
                    if !policy.retain
                        && let Err(e) = delete_tree(&candidate.source)
                    {
                        warn!(source = ?candidate.source, error = %e, "failed to remove source");
                        log.mild(format!(
                            "installed {} but could not remove its source: {}",
                            candidate.library_name, e
                        ));
                    }
                    self.succeed(candidate, dest, log, outcome);
                }
                Err(e) => {
                    self.fail(candidate, &e, log);
                    index += 1;
                }
            }
        }
    }

    /// Put one candidate at `dest` on `volume`
    fn place(
        &self,
        candidate: &Candidate,
        volume: &Path,
        dest: &Path,
        policy: InstallPolicy,
        log: &mut ErrorLog,
    ) -> Result<()> {
        if dest.exists() {
            return Err(InstallError::DestinationExists {
                path: dest.to_path_buf(),
            }
            .into());
        }

        let source = &candidate.source;
        let cheap_rename = !policy.retain
            && candidate.kind != SourceKind::Zip
            && same_filesystem(source, volume);
        if cheap_rename {
            debug!(?source, ?dest, "late same-filesystem rename");
            move_into_place(candidate, dest)?;
            self.post_process_moved(dest, policy, log);
            return Ok(());
        }

        let max_depth = self.config.install.max_nested_depth;
        let audio = &self.config.library.audio_extensions;
        build_atomically(dest, |temp| {
            match candidate.kind {
                SourceKind::Zip => {
                    ZipExtractor::extract_all(source, temp)?;
                }
                SourceKind::Directory => {
                    copy_tree(source, temp)?;
                }
                SourceKind::File => {
                    copy_file(source, &temp.join(file_name_of(source)?))?;
                }
            }
            expand_nested_zips(temp, max_depth)?;
            if policy.renumber {
                normalize_tree(temp, audio)?;
            }
            Ok(())
        })
    }

    /// Nested-zip expansion and renumbering after a rename; failures are MILD since
    /// the book is already in place
    fn post_process_moved(&self, dest: &Path, policy: InstallPolicy, log: &mut ErrorLog) {
        if let Err(e) = expand_nested_zips(dest, self.config.install.max_nested_depth) {
            warn!(?dest, error = %e, "nested archive expansion failed");
            log.mild(format!("could not expand archives in {}: {}", dest.display(), e));
        }
        if policy.renumber
            && let Err(e) = normalize_tree(dest, &self.config.library.audio_extensions)
        {
            warn!(?dest, error = %e, "renumbering failed");
            log.mild(format!("could not renumber files in {}: {}", dest.display(), e));
        }
    }

    fn succeed(
        &self,
        candidate: Candidate,
        dest: PathBuf,
        log: &mut ErrorLog,
        outcome: &mut InstallOutcome,
    ) {
        info!(name = %candidate.library_name, ?dest, "installed book");
        log.info(format!(
            "installed \"{}\" as {}",
            candidate.display_title,
            dest.display()
        ));
        self.emit(Event::Installed {
            name: candidate.library_name.clone(),
            path: dest.clone(),
        });
        outcome.installed.push((candidate.library_name, dest));
    }

    fn fail(&self, candidate: &mut Candidate, err: &Error, log: &mut ErrorLog) {
        error!(name = %candidate.library_name, error = %err, "install failed");
        candidate.selected = false;
        log.record(err);
        self.emit(Event::Failure {
            message: err.to_string(),
        });
    }
}

fn file_name_of(path: &Path) -> Result<PathBuf> {
    path.file_name().map(PathBuf::from).ok_or_else(|| {
        InstallError::MoveFailed {
            source_path: path.to_path_buf(),
            dest_path: PathBuf::new(),
            reason: "source has no file name".to_string(),
        }
        .into()
    })
}

/// Rename a directory or loose-file candidate to `dest`
///
/// A loose file is moved into a new book directory, which only appears once the
/// file is inside it.
fn move_into_place(candidate: &Candidate, dest: &Path) -> Result<()> {
    match candidate.kind {
        SourceKind::Directory => rename_no_replace(&candidate.source, dest),
        SourceKind::File => move_file_into_new_dir(&candidate.source, dest),
        SourceKind::Zip => Err(Error::Other(format!(
            "{} is an archive and must be extracted",
            candidate.source.display()
        ))),
    }
}

fn move_file_into_new_dir(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(InstallError::DestinationExists {
            path: dest.to_path_buf(),
        }
        .into());
    }
    let temp = temp_sibling(dest);
    delete_tree(&temp)?;
    fs::create_dir_all(&temp).map_err(|e| InstallError::CreateDirFailed {
        path: temp.clone(),
        reason: e.to_string(),
    })?;

    let inside = temp.join(file_name_of(source)?);
    if let Err(e) = rename_no_replace(source, &inside) {
        discard(&temp);
        return Err(e);
    }
    if let Err(e) = rename_no_replace(&temp, dest) {
        // Put the file back before discarding the temp directory
        if let Err(back) = fs::rename(&inside, source) {
            error!(?inside, ?source, error = %back, "could not restore source file");
            return Err(e);
        }
        discard(&temp);
        return Err(e);
    }
    Ok(())
}
