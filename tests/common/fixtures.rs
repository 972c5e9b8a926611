//! Staging trees, archives and provisioner construction

use audiobook_provisioner::{Config, LibraryHost, MemorySettings, Provisioner};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Staging directory and two library volumes inside one temp dir
pub struct Workspace {
    pub root: TempDir,
    pub staging: PathBuf,
    pub volumes: Vec<PathBuf>,
}

impl Workspace {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("staging");
        let volumes = vec![root.path().join("internal"), root.path().join("sdcard")];
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

    /// Configuration over this workspace with fast polling and no free-space floor
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.library.volumes = self.volumes.clone();
        config.library.staging_dir = self.staging.clone();
        config.library.cache_dir = self.root.path().join("cache");
        config.library.min_free_space_percent = 0;
        config.download.poll_interval = Duration::from_millis(1);
        config.download.retry.max_attempts = 0;
        config.automation.control_file = Some(self.root.path().join("control.txt"));
        config.automation.poll_interval = Duration::from_millis(20);
        config.automation.library_sync_timeout = Duration::from_secs(2);
        config
    }

    pub fn provisioner(&self, host: Arc<dyn LibraryHost>) -> Provisioner {
        self.provisioner_with(self.config(), host)
    }

    pub fn provisioner_with(&self, config: Config, host: Arc<dyn LibraryHost>) -> Provisioner {
        Provisioner::new(config, host, Arc::new(MemorySettings::new())).unwrap()
    }

    /// Path of a book directory on a volume
    pub fn book(&self, volume: usize, name: &str) -> PathBuf {
        self.volumes[volume].join(name)
    }

    /// Whether any temporary install tree is left anywhere in the workspace
    pub fn has_temp_trees(&self) -> bool {
        walkdir::WalkDir::new(self.root.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().ends_with(".installing"))
    }
}

/// Write a file, creating parent directories
pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Bytes of a stored zip archive holding `files`
pub fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Write a zip archive holding `files`
pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    write_file(path, &zip_bytes(files));
}

/// Numbered track names `prefix1.mp3 ..= prefixN.mp3`
pub fn tracks(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{prefix}{i}.mp3")).collect()
}
