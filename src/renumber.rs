//! Digit padding for file names of newly installed books
//!
//! Players sort chapters lexicographically, so `track10.mp3` lands before
//! `track2.mp3`. When a directory holds at least ten sibling directories, or at
//! least ten audio files (the two groups are counted separately), numbers in their
//! names are zero-padded until lexicographic and numeric order agree:
//!
//! | siblings | width |
//! |----------|-------|
//! | >= 10    | 2     |
//! | >= 100   | 3     |
//! | >= 1000  | 4     |
//!
//! Padding is applied one digit at a time, and each step runs twice because one
//! regex pass cannot pad two numbers separated by a single character.
//! Normalizing an already normalized tree renames nothing.

use crate::error::{InstallError, Result};
use crate::utils::{has_extension, is_ignored_name};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Regexes matching a standalone number of exactly 1, 2 and 3 digits
fn digit_runs() -> Option<&'static [Regex; 3]> {
    static RUNS: OnceLock<Option<[Regex; 3]>> = OnceLock::new();
    RUNS.get_or_init(|| {
        let build = |n: usize| Regex::new(&format!("(^|[^0-9])([0-9]{{{n}}})([^0-9]|$)")).ok();
        Some([build(1)?, build(2)?, build(3)?])
    })
    .as_ref()
}

/// Width numbers must be padded to for a group of `count` siblings (0 = leave alone)
pub fn target_width(count: usize) -> usize {
    match count {
        c if c >= 1000 => 4,
        c if c >= 100 => 3,
        c if c >= 10 => 2,
        _ => 0,
    }
}

/// Zero-pad every standalone number in `name` to at least `width` digits
///
/// Numbers already wider than `width` are left alone.
pub fn pad_numbers(name: &str, width: usize) -> String {
    let mut padded = name.to_string();
    let Some(runs) = digit_runs() else {
        return padded;
    };
    for w in 2..=width.min(4) {
        let re = &runs[w - 2];
        for _ in 0..2 {
            padded = re.replace_all(&padded, "${1}0${2}${3}").into_owned();
        }
    }
    padded
}

/// Padded form of a directory name or audio file name (extension untouched)
fn padded_name(path: &Path, is_file: bool, width: usize) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let renamed = if is_file {
        match (path.file_stem().and_then(|s| s.to_str()), path.extension()) {
            (Some(stem), Some(ext)) => {
                format!("{}.{}", pad_numbers(stem, width), ext.to_string_lossy())
            }
            _ => pad_numbers(name, width),
        }
    } else {
        pad_numbers(name, width)
    };
    (renamed != name).then_some(renamed)
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| !is_ignored_name(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    children.sort();
    Ok(children)
}

fn pad_group(group: &[PathBuf], is_file: bool) -> Result<usize> {
    let width = target_width(group.len());
    if width == 0 {
        return Ok(0);
    }

    let mut renamed = 0;
    for path in group {
        let Some(new_name) = padded_name(path, is_file, width) else {
            continue;
        };
        let target = path.with_file_name(&new_name);
        if target.exists() {
            warn!(?path, ?target, "padded name already taken, leaving entry as is");
            continue;
        }
        fs::rename(path, &target).map_err(|e| InstallError::MoveFailed {
            source_path: path.clone(),
            dest_path: target.clone(),
            reason: e.to_string(),
        })?;
        debug!(?path, ?target, "padded numbers in name");
        renamed += 1;
    }
    Ok(renamed)
}

/// Pad numbers in names throughout the tree rooted at `root`
///
/// Returns how many entries were renamed.
pub fn normalize_tree(root: &Path, audio_extensions: &[String]) -> Result<usize> {
    let children = sorted_children(root)?;
    let dirs: Vec<PathBuf> = children.iter().filter(|p| p.is_dir()).cloned().collect();
    let audio: Vec<PathBuf> = children
        .iter()
        .filter(|p| p.is_file() && has_extension(p, audio_extensions))
        .cloned()
        .collect();

    let mut renamed = pad_group(&dirs, false)?;
    renamed += pad_group(&audio, true)?;

    for child in sorted_children(root)? {
        if child.is_dir() {
            renamed += normalize_tree(&child, audio_extensions)?;
        }
    }
    Ok(renamed)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn audio() -> Vec<String> {
        vec!["mp3".to_string()]
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn widths_follow_thresholds() {
        assert_eq!(target_width(9), 0);
        assert_eq!(target_width(10), 2);
        assert_eq!(target_width(99), 2);
        assert_eq!(target_width(100), 3);
        assert_eq!(target_width(1000), 4);
    }

    #[test]
    fn pads_single_and_adjacent_numbers() {
        assert_eq!(pad_numbers("track1", 2), "track01");
        assert_eq!(pad_numbers("1-2", 2), "01-02");
        assert_eq!(pad_numbers("Disc 1 Track 7", 3), "Disc 001 Track 007");
        assert_eq!(pad_numbers("track12", 2), "track12");
        assert_eq!(pad_numbers("track123", 2), "track123");
        assert_eq!(pad_numbers("no digits", 2), "no digits");
    }

    #[test]
    fn twelve_tracks_are_padded_and_renormalizing_is_a_noop() {
        let dir = TempDir::new().unwrap();
        for i in 1..=12 {
            fs::write(dir.path().join(format!("track{i}.mp3")), b"x").unwrap();
        }

        let renamed = normalize_tree(dir.path(), &audio()).unwrap();

        assert_eq!(renamed, 9);
        let expected: Vec<String> = (1..=12).map(|i| format!("track{i:02}.mp3")).collect();
        assert_eq!(names(dir.path()), expected);

        assert_eq!(normalize_tree(dir.path(), &audio()).unwrap(), 0);
        assert_eq!(names(dir.path()), expected);
    }

    #[test]
    fn small_groups_and_non_audio_are_untouched() {
        let dir = TempDir::new().unwrap();
        for i in 1..=9 {
            fs::write(dir.path().join(format!("track{i}.mp3")), b"x").unwrap();
        }
        for i in 1..=12 {
            fs::write(dir.path().join(format!("scan{i}.jpg")), b"x").unwrap();
        }

        assert_eq!(normalize_tree(dir.path(), &audio()).unwrap(), 0);
        assert!(dir.path().join("track1.mp3").exists());
        assert!(dir.path().join("scan1.jpg").exists());
    }

    #[test]
    fn directories_are_counted_separately_and_recursed() {
        let dir = TempDir::new().unwrap();
        for i in 1..=10 {
            fs::create_dir(dir.path().join(format!("CD {i}"))).unwrap();
        }
        // Only 3 audio files at the top level: below threshold
        for i in 1..=3 {
            fs::write(dir.path().join(format!("intro{i}.mp3")), b"x").unwrap();
        }
        let inner = dir.path().join("CD 1");
        for i in 1..=10 {
            fs::write(inner.join(format!("{i}.mp3")), b"x").unwrap();
        }

        normalize_tree(dir.path(), &audio()).unwrap();

        assert!(dir.path().join("CD 01").is_dir());
        assert!(dir.path().join("CD 10").is_dir());
        assert!(dir.path().join("intro1.mp3").exists());
        assert!(dir.path().join("CD 01/01.mp3").exists());
        assert!(dir.path().join("CD 01/10.mp3").exists());
    }
}
