//! Shared test helpers: archives, staging trees and a test configuration.

use crate::config::Config;
use crate::host::LibraryHost;
use crate::sync_bridge::SyncBridge;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Create a valid ZIP archive containing the given files
pub(crate) fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

/// Build a zip in a scratch directory and return its bytes
pub(crate) fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("inner.zip");
    create_zip_archive(&path, files);
    std::fs::read(path).unwrap()
}

/// Write a file, creating its parent directories
pub(crate) fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Staging, cache and two library volumes inside one temp dir
pub(crate) struct TestLayout {
    pub(crate) root: TempDir,
    pub(crate) staging: PathBuf,
    pub(crate) volumes: Vec<PathBuf>,
}

impl TestLayout {
    pub(crate) fn new() -> Self {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("staging");
        let volumes = vec![root.path().join("vol1"), root.path().join("vol2")];
        std::fs::create_dir_all(&staging).unwrap();
        for volume in &volumes {
            std::fs::create_dir_all(volume).unwrap();
        }
        Self {
            root,
            staging,
            volumes,
        }
    }

    /// Configuration pointing at this layout, with no free-space floor
    pub(crate) fn config(&self) -> Config {
        let mut config = Config::default();
        config.library.volumes = self.volumes.clone();
        config.library.staging_dir = self.staging.clone();
        config.library.cache_dir = self.root.path().join("cache");
        config.library.min_free_space_percent = 0;
        config.automation.library_sync_timeout = Duration::from_secs(2);
        config.download.poll_interval = Duration::from_millis(1);
        config
    }
}

/// Host that records notifications and resumes every bridge immediately
#[derive(Default)]
pub(crate) struct RecordingHost {
    pub(crate) library_changes: Mutex<usize>,
    pub(crate) duration_requests: Mutex<Vec<PathBuf>>,
    pub(crate) resets: Mutex<Vec<(PathBuf, Duration)>>,
    pub(crate) current: Mutex<Option<PathBuf>>,
}

impl LibraryHost for RecordingHost {
    fn library_changed(&self, done: SyncBridge) {
        *self.library_changes.lock() += 1;
        // Resume from another thread, as a real broadcast receiver would
        std::thread::spawn(move || done.resume());
    }

    fn request_durations(&self, books: &[PathBuf], done: SyncBridge) {
        self.duration_requests.lock().extend(books.iter().cloned());
        done.resume();
    }

    fn current_book(&self) -> Option<PathBuf> {
        self.current.lock().clone()
    }

    fn reset_position(&self, book: &Path, position: Duration) -> crate::error::Result<()> {
        self.resets.lock().push((book.to_path_buf(), position));
        Ok(())
    }
}

/// Bytes of a short MPEG audio stream preceded by an ID3v2.3 tag with `frames`
///
/// Frames are `(id, text)` pairs such as `("TALB", "Matilda")`.
pub fn mp3_with_tags(frames: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, text) in frames {
        // Encoding byte (ISO-8859-1) plus text
        let size = (text.len() + 1) as u32;
        body.extend_from_slice(id.as_bytes());
        body.extend_from_slice(&size.to_be_bytes());
        body.extend_from_slice(&[0, 0, 0]);
        body.extend_from_slice(text.as_bytes());
    }
    let len = body.len() as u32;
    let mut bytes = b"ID3\x03\x00\x00".to_vec();
    bytes.extend_from_slice(&[
        ((len >> 21) & 0x7f) as u8,
        ((len >> 14) & 0x7f) as u8,
        ((len >> 7) & 0x7f) as u8,
        (len & 0x7f) as u8,
    ]);
    bytes.extend(body);

    // Silent MPEG-1 Layer III frames, 128 kbit/s at 44.1 kHz
    let mut frame = vec![0u8; 417];
    frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
    bytes.extend(frame.repeat(8));
    bytes
}
