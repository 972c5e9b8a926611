//! Directory tree primitives: copy, delete, rename and atomic placement
//!
//! A book only becomes visible under its final name once its whole payload exists.
//! [`build_atomically`] builds the tree under a hidden temporary sibling and renames
//! it into place; on failure the sibling is removed and the destination never
//! appears. Temporary siblings left behind by a crash are recognisable by name and
//! removed by [`sweep_stale_temps`].

use crate::error::{Error, InstallError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Suffix of temporary siblings built next to a destination
const TEMP_SUFFIX: &str = ".installing";

/// Hidden temporary sibling used while building `dest`
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    dest.with_file_name(format!(".{name}{TEMP_SUFFIX}"))
}

/// Whether a directory name is one of our temporary siblings
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Build `dest` under a temporary sibling and rename it into place
///
/// `build` receives the (already created, empty) temporary directory. If it fails,
/// or the final rename fails, the temporary tree is deleted and the error returned.
/// An existing `dest` is never touched.
pub fn build_atomically<F>(dest: &Path, build: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if dest.exists() {
        return Err(InstallError::DestinationExists {
            path: dest.to_path_buf(),
        }
        .into());
    }

    let temp = temp_sibling(dest);
    if temp.exists() {
        debug!(?temp, "removing stale temporary tree");
        delete_tree(&temp)?;
    }
    fs::create_dir_all(&temp).map_err(|e| InstallError::CreateDirFailed {
        path: temp.clone(),
        reason: e.to_string(),
    })?;

    if let Err(e) = build(&temp) {
        discard(&temp);
        return Err(e);
    }

    // Re-check: another writer may have claimed the name while we were building
    if dest.exists() {
        discard(&temp);
        return Err(InstallError::DestinationExists {
            path: dest.to_path_buf(),
        }
        .into());
    }

    if let Err(e) = fs::rename(&temp, dest) {
        discard(&temp);
        return Err(InstallError::MoveFailed {
            source_path: temp,
            dest_path: dest.to_path_buf(),
            reason: e.to_string(),
        }
        .into());
    }

    debug!(?dest, "tree placed");
    Ok(())
}

/// Remove a temporary tree, logging rather than returning a failure
pub fn discard(temp: &Path) {
    if let Err(e) = delete_tree(temp) {
        warn!(?temp, error = %e, "failed to remove temporary tree");
    }
}

/// Rename `source` to `dest`, refusing to replace an existing destination
pub fn rename_no_replace(source: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(InstallError::DestinationExists {
            path: dest.to_path_buf(),
        }
        .into());
    }
    fs::rename(source, dest).map_err(|e| {
        InstallError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Recursively copy the contents of directory `source` into existing directory `dest`
///
/// Entries are visited in sorted order. Symbolic links are skipped. Returns the
/// number of bytes copied.
pub fn copy_tree(source: &Path, dest: &Path) -> Result<u64> {
    let mut copied = 0u64;
    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::Other(e.to_string()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| InstallError::CreateDirFailed {
                path: target.clone(),
                reason: e.to_string(),
            })?;
        } else if file_type.is_file() {
            copied += copy_file(entry.path(), &target)?;
        } else {
            debug!(path = ?entry.path(), "skipping non-regular entry");
        }
    }
    Ok(copied)
}

/// Copy one file, creating parent directories as needed
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| InstallError::CreateDirFailed {
            path: parent.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    fs::copy(source, dest).map_err(|e| {
        InstallError::MoveFailed {
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Delete a file or a whole directory tree; a missing path is not an error
pub fn delete_tree(path: &Path) -> Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| {
        InstallError::DeleteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Remove temporary siblings left in `dir` by an interrupted install
///
/// Returns how many were removed.
pub fn sweep_stale_temps(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_temp_name(&name) {
            match delete_tree(&entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = ?entry.path(), error = %e, "failed to sweep stale temp"),
            }
        }
    }
    removed
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("cd1")).unwrap();
        fs::write(root.join("cd1/01.mp3"), b"one").unwrap();
        fs::write(root.join("cover.jpg"), b"jpeg").unwrap();
    }

    #[test]
    fn temp_sibling_is_hidden_and_recognisable() {
        let temp = temp_sibling(Path::new("/books/Matilda"));
        assert_eq!(temp, PathBuf::from("/books/.Matilda.installing"));
        assert!(is_temp_name(".Matilda.installing"));
        assert!(!is_temp_name("Matilda"));
    }

    #[test]
    fn copy_tree_reproduces_structure() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        sample_tree(&src);
        fs::create_dir(&dst).unwrap();

        let bytes = copy_tree(&src, &dst).unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(fs::read(dst.join("cd1/01.mp3")).unwrap(), b"one");
        assert!(dst.join("cover.jpg").is_file());
    }

    #[test]
    fn build_atomically_places_tree() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("Book");
        let src = dir.path().join("src");
        sample_tree(&src);

        build_atomically(&dest, |temp| copy_tree(&src, temp).map(|_| ())).unwrap();

        assert!(dest.join("cd1/01.mp3").is_file());
        assert!(!temp_sibling(&dest).exists());
    }

    #[test]
    fn failure_midway_leaves_neither_destination_nor_temp() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("Book");

        let result = build_atomically(&dest, |temp| {
            fs::write(temp.join("01.mp3"), b"partial").unwrap();
            Err(Error::Other("injected failure".into()))
        });

        assert!(result.is_err());
        assert!(!dest.exists(), "destination must never appear");
        assert!(!temp_sibling(&dest).exists(), "temporary tree must be removed");
    }

    #[test]
    fn existing_destination_is_never_modified() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("Book");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("keep.mp3"), b"original").unwrap();

        let result = build_atomically(&dest, |temp| {
            fs::write(temp.join("keep.mp3"), b"replacement").unwrap();
            Ok(())
        });

        assert!(matches!(
            result,
            Err(Error::Install(InstallError::DestinationExists { .. }))
        ));
        assert_eq!(fs::read(dest.join("keep.mp3")).unwrap(), b"original");
    }

    #[test]
    fn stale_temp_is_replaced_and_swept() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("Book");
        let stale = temp_sibling(&dest);
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("junk"), b"x").unwrap();

        build_atomically(&dest, |temp| {
            assert!(!temp.join("junk").exists());
            Ok(())
        })
        .unwrap();

        fs::create_dir_all(dir.path().join(".Other.installing")).unwrap();
        assert_eq!(sweep_stale_temps(dir.path()), 1);
        assert!(dest.exists());
    }

    #[test]
    fn rename_refuses_to_replace() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();
        assert!(rename_no_replace(&a, &b).is_err());
        assert_eq!(fs::read(&b).unwrap(), b"b");

        let c = dir.path().join("c");
        rename_no_replace(&a, &c).unwrap();
        assert!(c.exists() && !a.exists());
    }

    #[test]
    fn delete_tree_handles_files_dirs_and_missing() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        sample_tree(&tree);
        delete_tree(&tree).unwrap();
        assert!(!tree.exists());
        delete_tree(&tree).unwrap();

        let file = dir.path().join("f");
        fs::write(&file, b"x").unwrap();
        delete_tree(&file).unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn discard_removes_tree_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let temp = temp_sibling(&dir.path().join("Book"));
        sample_tree(&temp);
        discard(&temp);
        assert!(!temp.exists());
        discard(&temp);
    }

    #[cfg(unix)]
    #[test]
    fn discard_survives_an_undeletable_tree() {
        use std::os::unix::fs::PermissionsExt;

        // Root bypasses permission bits
        if unsafe { libc::geteuid() } == 0 {
            return;
        }
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("locked");
        let temp = parent.join("tree");
        sample_tree(&temp);
        fs::set_permissions(&parent, fs::Permissions::from_mode(0o555)).unwrap();

        discard(&temp);
        let survived = temp.exists();

        fs::set_permissions(&parent, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(survived);
    }
}
