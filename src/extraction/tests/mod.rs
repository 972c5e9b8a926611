use crate::error::{Error, InstallError};
use crate::extraction::*;
use crate::test_helpers::{create_zip_archive, zip_bytes};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_mp3(path: &Path) -> bool {
    path.extension().map(|e| e == "mp3").unwrap_or(false)
}

#[test]
fn extract_all_writes_every_file() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("book.zip");
    create_zip_archive(
        &archive,
        &[
            ("Book/01.mp3", b"one".as_slice()),
            ("Book/02.mp3", b"two".as_slice()),
            ("cover.jpg", b"img".as_slice()),
        ],
    );
    let dest = dir.path().join("out");

    let files = ZipExtractor::extract_all(&archive, &dest).unwrap();

    assert_eq!(files.len(), 3);
    assert_eq!(std::fs::read(dest.join("Book/02.mp3")).unwrap(), b"two".as_slice());
}

#[test]
fn extract_all_rejects_corrupt_archive() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("broken.zip");
    std::fs::write(&archive, b"this is not a zip file".as_slice()).unwrap();

    let result = ZipExtractor::extract_all(&archive, &dir.path().join("out"));

    match result {
        Err(Error::Install(InstallError::ExtractionFailed { archive: a, .. })) => {
            assert_eq!(a, archive)
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
}

#[test]
fn first_entry_follows_archive_order() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("book.zip");
    create_zip_archive(
        &archive,
        &[
            ("readme.txt", b"r".as_slice()),
            ("b/02.mp3", b"2".as_slice()),
            ("a/01.mp3", b"1".as_slice()),
        ],
    );

    let found = ZipExtractor::find_first_entry(&archive, is_mp3).unwrap();

    assert_eq!(found, Some((1, PathBuf::from("b/02.mp3"))));
}

#[test]
fn first_entry_none_without_match() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("pics.zip");
    create_zip_archive(&archive, &[("a.jpg", b"a".as_slice())]);
    assert_eq!(ZipExtractor::find_first_entry(&archive, is_mp3).unwrap(), None);
}

#[test]
fn extract_entry_writes_single_member() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("book.zip");
    create_zip_archive(
        &archive,
        &[("x.txt", b"x".as_slice()), ("01.mp3", b"audio".as_slice())],
    );
    let dest = dir.path().join("cache/book/01.mp3");

    ZipExtractor::extract_entry(&archive, 1, &dest).unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"audio".as_slice());
}

#[test]
fn nested_zips_expand_recursively() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("Book");
    std::fs::create_dir(&root).unwrap();

    let innermost = zip_bytes(&[("03.mp3", b"three".as_slice())]);
    let inner = zip_bytes(&[
        ("02.mp3", b"two".as_slice()),
        ("deeper.zip", innermost.as_slice()),
    ]);
    std::fs::write(root.join("part2.zip"), &inner).unwrap();
    std::fs::write(root.join("01.mp3"), b"one".as_slice()).unwrap();

    let expanded = expand_nested_zips(&root, 5).unwrap();

    assert_eq!(expanded, 2);
    assert!(root.join("part2/02.mp3").is_file());
    assert!(root.join("part2/deeper/03.mp3").is_file());
    assert!(find_zips(&root).is_empty());
}

#[test]
fn nested_expansion_respects_depth_limit() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("Book");
    std::fs::create_dir(&root).unwrap();
    let deeper = zip_bytes(&[("a.mp3", b"a".as_slice())]);
    let inner = zip_bytes(&[("deeper.zip", deeper.as_slice())]);
    std::fs::write(root.join("outer.zip"), &inner).unwrap();

    let expanded = expand_nested_zips(&root, 1).unwrap();

    assert_eq!(expanded, 1);
    assert_eq!(find_zips(&root), vec![root.join("outer/deeper.zip")]);
}

#[test]
fn failed_nested_expansion_leaves_no_partial_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("Book");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("bad.zip"), b"garbage".as_slice()).unwrap();

    assert!(expand_nested_zips(&root, 3).is_err());
    assert!(!root.join("bad").exists());
    assert!(!root.join(".bad.installing").exists());
    assert!(root.join("bad.zip").exists());
}
