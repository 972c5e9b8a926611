use crate::error::{Error, InstallError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    fn open(archive_path: &Path) -> Result<zip::ZipArchive<File>> {
        let file = File::open(archive_path).map_err(|e| InstallError::ExtractionFailed {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to open ZIP archive: {}", e),
        })?;
        zip::ZipArchive::new(file).map_err(|e| {
            InstallError::ExtractionFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP archive: {}", e),
            }
            .into()
        })
    }

    fn entry<'a>(
        archive: &'a mut zip::ZipArchive<File>,
        index: usize,
        archive_path: &Path,
    ) -> Result<zip::read::ZipFile<'a>> {
        archive.by_index(index).map_err(|e| {
            InstallError::ExtractionFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP entry {}: {}", index, e),
            }
            .into()
        })
    }

    /// Write a single ZIP entry below `dest_path`, creating directories as needed
    fn extract_zip_entry(
        mut file: zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(name = file.name(), "skipping entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path).map_err(|e| InstallError::CreateDirFailed {
                path: file_path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::CreateDirFailed {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let mut outfile = File::create(&file_path).map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to create output file {}: {}",
                file_path.display(),
                e
            )))
        })?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| InstallError::ExtractionFailed {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to extract {}: {}", file.name(), e),
        })?;

        Ok(Some(file_path))
    }

    /// Extract every entry of a ZIP archive into `dest_path`
    ///
    /// Returns the extracted files (directories are created but not listed).
    pub fn extract_all(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "extracting ZIP archive");

        std::fs::create_dir_all(dest_path).map_err(|e| InstallError::CreateDirFailed {
            path: dest_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut archive = Self::open(archive_path)?;
        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let file = Self::entry(&mut archive, i, archive_path)?;
            if let Some(file_path) = Self::extract_zip_entry(file, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );
        Ok(extracted_files)
    }

    /// Find the first file entry, in archive order, whose name satisfies `matches`
    ///
    /// Returns the entry index and its (enclosed) path inside the archive.
    pub fn find_first_entry<F>(archive_path: &Path, matches: F) -> Result<Option<(usize, PathBuf)>>
    where
        F: Fn(&Path) -> bool,
    {
        Ok(Self::find_entries(archive_path, matches)?.into_iter().next())
    }

    /// Every file entry, in archive order, whose name satisfies `matches`
    pub fn find_entries<F>(archive_path: &Path, matches: F) -> Result<Vec<(usize, PathBuf)>>
    where
        F: Fn(&Path) -> bool,
    {
        let mut archive = Self::open(archive_path)?;
        let mut found = Vec::new();
        for i in 0..archive.len() {
            let file = Self::entry(&mut archive, i, archive_path)?;
            if file.is_dir() {
                continue;
            }
            if let Some(name) = file.enclosed_name()
                && matches(name)
            {
                found.push((i, name.to_path_buf()));
            }
        }
        Ok(found)
    }

    /// Extract the entry at `index` to exactly `dest_file`
    pub fn extract_entry(archive_path: &Path, index: usize, dest_file: &Path) -> Result<()> {
        let mut archive = Self::open(archive_path)?;
        let mut file = Self::entry(&mut archive, index, archive_path)?;

        if let Some(parent) = dest_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::CreateDirFailed {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        let mut outfile = File::create(dest_file)?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| InstallError::ExtractionFailed {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to extract entry {}: {}", index, e),
        })?;
        debug!(?archive_path, index, ?dest_file, "extracted single ZIP entry");
        Ok(())
    }
}
