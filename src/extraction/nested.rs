use crate::error::Result;
use crate::tree::{build_atomically, delete_tree};
use crate::utils::is_zip;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::zip::ZipExtractor;

/// Zip files anywhere below `root`, in sorted traversal order
pub fn find_zips(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_zip(e.path()))
        .map(|e| e.into_path())
        .collect()
}

/// Directory a nested zip is expanded into: a sibling named after the archive stem
fn expansion_dir(zip_path: &Path) -> PathBuf {
    let stem = zip_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let candidate = zip_path.with_file_name(&stem);
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|i| zip_path.with_file_name(format!("{stem} ({i})")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Expand every zip found below `root`, repeating for zips that were themselves
/// inside zips, up to `max_depth` rounds
///
/// Each archive is expanded atomically into a sibling directory and then deleted.
/// The first failure aborts the expansion and is returned; archives expanded before
/// it stay expanded. Returns how many archives were expanded.
pub fn expand_nested_zips(root: &Path, max_depth: u32) -> Result<usize> {
    let mut expanded = 0;

    for depth in 0..max_depth {
        let zips = find_zips(root);
        if zips.is_empty() {
            break;
        }
        debug!(?root, depth, count = zips.len(), "expanding nested archives");

        for zip_path in zips {
            let dest = expansion_dir(&zip_path);
            build_atomically(&dest, |temp| {
                ZipExtractor::extract_all(&zip_path, temp).map(|_| ())
            })?;
            delete_tree(&zip_path)?;
            expanded += 1;
            info!(?zip_path, ?dest, "expanded nested archive");
        }
    }

    if !find_zips(root).is_empty() {
        warn!(?root, max_depth, "nested archives remain beyond maximum depth");
    }
    Ok(expanded)
}
