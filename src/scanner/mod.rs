//! Candidate scanner
//!
//! Walks the staging directory and yields one [`Candidate`] per top-level entry that
//! holds audio: a loose audio file, a directory with audio somewhere below it, or a
//! zip archive with an audio member. The first audio file in a stable traversal
//! order (names sorted, zip members in archive order) is the one probed for tags.
//! A zip whose audio sits only inside inner zips is searched through those, up to
//! the nested depth limit, with each inner archive pulled into the candidate's
//! cache slot.
//!
//! Tag extraction runs on one worker thread per candidate. [`Scanner::scan`] returns
//! a [`PendingScan`]; titles are only trustworthy after [`PendingScan::wait`].

mod metadata;

pub use metadata::{BookMetadata, read_metadata};

use crate::config::{InstallConfig, LibraryConfig};
use crate::extraction::ZipExtractor;
use crate::tree::{delete_tree, is_temp_name};
use crate::types::{Candidate, SourceKind};
use crate::utils::{has_extension, is_ignored_name, is_zip};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Where the audio file probed for a candidate lives
#[derive(Clone, Debug, PartialEq, Eq)]
enum AudioSource {
    /// A file on disk
    Plain(PathBuf),
    /// A member of a zip archive
    InZip {
        archive: PathBuf,
        index: usize,
        member: PathBuf,
    },
}

impl AudioSource {
    fn display_path(&self) -> PathBuf {
        match self {
            AudioSource::Plain(path) => path.clone(),
            AudioSource::InZip { member, .. } => member.clone(),
        }
    }
}

/// Discovers candidates in a staging directory
#[derive(Clone, Debug)]
pub struct Scanner {
    audio_extensions: Vec<String>,
    cache_dir: PathBuf,
    max_nested_depth: u32,
}

impl Scanner {
    /// Create a scanner using the audio extensions and cache of `config`
    pub fn new(config: &LibraryConfig) -> Self {
        Self {
            audio_extensions: config.audio_extensions.clone(),
            cache_dir: config.cache_dir.clone(),
            max_nested_depth: InstallConfig::default().max_nested_depth,
        }
    }

    /// Look this many zips deep for audio inside a staged archive
    pub fn with_max_nested_depth(mut self, depth: u32) -> Self {
        self.max_nested_depth = depth;
        self
    }

    /// Scan `staging` and start tag extraction for every candidate found
    ///
    /// An unreadable staging directory yields an empty scan.
    pub fn scan(&self, staging: &Path) -> PendingScan {
        let entries = match sorted_entries(staging) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?staging, error = %e, "staging directory unreadable");
                return PendingScan::default();
            }
        };

        let mut pending = PendingScan::default();
        for entry in entries {
            let slot = self.cache_slot(&entry);
            let Some((kind, audio)) = self.probe(&entry, &slot) else {
                debug!(?entry, "no audio found, skipping");
                discard_slot(&slot);
                continue;
            };
            let candidate = Candidate::new(entry, kind, audio.display_path());
            let index = pending.candidates.len();
            match self.spawn_metadata(&candidate, audio, slot.clone()) {
                Ok(handle) => pending.tasks.push((index, handle)),
                Err(e) => {
                    warn!(source = ?candidate.source, error = %e, "failed to start metadata thread");
                    discard_slot(&slot);
                }
            }
            pending.candidates.push(candidate);
        }

        info!(?staging, candidates = pending.candidates.len(), "staging scan complete");
        pending
    }

    /// Cache directory for one staging entry, named after its full file name
    ///
    /// `Matilda.zip` and `Matilda/` share a library name but get separate slots.
    fn cache_slot(&self, entry: &Path) -> PathBuf {
        let name = entry
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "entry".into());
        self.cache_dir.join(name)
    }

    /// Classify a top-level staging entry and locate its first audio file
    fn probe(&self, entry: &Path, slot: &Path) -> Option<(SourceKind, AudioSource)> {
        if entry.is_dir() {
            return self
                .first_audio_in_dir(entry, slot)
                .map(|audio| (SourceKind::Directory, audio));
        }
        if !entry.is_file() {
            return None;
        }
        if self.is_audio(entry) {
            return Some((SourceKind::File, AudioSource::Plain(entry.to_path_buf())));
        }
        if is_zip(entry) {
            return self
                .first_audio_in_zip(entry, slot, 0)
                .map(|audio| (SourceKind::Zip, audio));
        }
        None
    }

    fn is_audio(&self, path: &Path) -> bool {
        has_extension(path, &self.audio_extensions)
    }

    fn first_audio_in_dir(&self, dir: &Path, slot: &Path) -> Option<AudioSource> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored_name(&e.file_name().to_string_lossy()));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if self.is_audio(path) {
                return Some(AudioSource::Plain(path.to_path_buf()));
            }
            // Zips inside a directory are expanded after install; probe them now
            if is_zip(path)
                && let Some(audio) = self.first_audio_in_zip(path, slot, 0)
            {
                return Some(audio);
            }
        }
        None
    }

    /// First audio member of `archive`, else of the first inner zip holding one
    ///
    /// Inner zips at `depth` are extracted to `slot/nested-<depth>` so the member
    /// found deeper down can be read back from the cache.
    fn first_audio_in_zip(&self, archive: &Path, slot: &Path, depth: u32) -> Option<AudioSource> {
        match ZipExtractor::find_first_entry(archive, |name| self.is_audio(name)) {
            Ok(Some((index, member))) => {
                return Some(AudioSource::InZip {
                    archive: archive.to_path_buf(),
                    index,
                    member,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(?archive, error = %e, "unreadable archive in staging");
                return None;
            }
        }
        if depth >= self.max_nested_depth {
            debug!(?archive, depth, "nested depth limit reached");
            return None;
        }

        let inner_zips = match ZipExtractor::find_entries(archive, is_zip) {
            Ok(found) => found,
            Err(e) => {
                warn!(?archive, error = %e, "unreadable archive in staging");
                return None;
            }
        };
        let level = slot.join(format!("nested-{depth}"));
        for (index, member) in inner_zips {
            let Some(file_name) = member.file_name() else {
                continue;
            };
            let inner = level.join(file_name);
            if let Err(e) = ZipExtractor::extract_entry(archive, index, &inner) {
                warn!(?archive, ?member, error = %e, "failed to extract inner archive");
                continue;
            }
            if let Some(audio) = self.first_audio_in_zip(&inner, slot, depth + 1) {
                return Some(audio);
            }
        }
        None
    }

    fn spawn_metadata(
        &self,
        candidate: &Candidate,
        audio: AudioSource,
        cache_slot: PathBuf,
    ) -> std::io::Result<JoinHandle<BookMetadata>> {
        std::thread::Builder::new()
            .name(format!("metadata-{}", candidate.library_name))
            .spawn(move || {
                let meta = extract_metadata(audio, &cache_slot);
                discard_slot(&cache_slot);
                meta
            })
    }
}

fn discard_slot(slot: &Path) {
    if let Err(e) = delete_tree(slot) {
        warn!(?slot, error = %e, "failed to remove scan cache");
    }
}

/// Read tags from `audio`, pulling zip members into `cache_slot` first
fn extract_metadata(audio: AudioSource, cache_slot: &Path) -> BookMetadata {
    match audio {
        AudioSource::Plain(path) => read_metadata(&path),
        AudioSource::InZip {
            archive,
            index,
            member,
        } => {
            let file_name = member
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("probe"));
            let cached = cache_slot.join(file_name);
            match ZipExtractor::extract_entry(&archive, index, &cached) {
                Ok(()) => read_metadata(&cached),
                Err(e) => {
                    warn!(?archive, ?member, error = %e, "failed to extract member for tags");
                    BookMetadata::default()
                }
            }
        }
    }
}

/// Sorted top-level staging entries, without hidden names and install temp trees
fn sorted_entries(staging: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(staging)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            !is_ignored_name(&name) && !is_temp_name(&name)
        })
        .map(|e| e.path())
        .collect();
    entries.sort();
    Ok(entries)
}

/// Candidates whose tag extraction may still be running
#[derive(Debug, Default)]
pub struct PendingScan {
    candidates: Vec<Candidate>,
    tasks: Vec<(usize, JoinHandle<BookMetadata>)>,
}

impl PendingScan {
    /// Number of candidates found
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether no candidate was found
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Join every extraction thread and return the candidates with their titles
    pub fn wait(self) -> Vec<Candidate> {
        let mut candidates = self.candidates;
        for (index, handle) in self.tasks {
            match handle.join() {
                Ok(meta) => {
                    if let Some(candidate) = candidates.get_mut(index) {
                        candidate.apply_metadata(meta.title, meta.author);
                    }
                }
                Err(_) => warn!(index, "metadata thread panicked"),
            }
        }
        candidates
    }
}

/// Flag candidates whose library name is already a directory on any volume
///
/// Returns how many collide.
pub fn mark_collisions(candidates: &mut [Candidate], volumes: &[PathBuf]) -> usize {
    let mut colliding = 0;
    for candidate in candidates.iter_mut() {
        candidate.collides = volumes
            .iter()
            .any(|volume| volume.join(&candidate.library_name).exists());
        if candidate.collides {
            debug!(name = %candidate.library_name, "candidate collides with installed book");
            colliding += 1;
        }
    }
    colliding
}
