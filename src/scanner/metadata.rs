use lofty::prelude::*;
use std::path::Path;
use tracing::{debug, warn};

/// Title and author read from an audio file's tags
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookMetadata {
    /// Album title (falls back to the track title)
    pub title: Option<String>,
    /// Lead performer (falls back to the album artist)
    pub author: Option<String>,
}

/// Read title and author from whatever tag format the file carries
///
/// Missing or unreadable tags yield empty metadata, so the caller keeps the title it
/// derived from the file name.
pub fn read_metadata(path: &Path) -> BookMetadata {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(file) => file,
        Err(e) => {
            warn!(?path, error = %e, "failed to read audio tags");
            return BookMetadata::default();
        }
    };

    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        debug!(?path, "no tags in audio file");
        return BookMetadata::default();
    };

    let title = non_blank(tag.album().as_deref()).or_else(|| non_blank(tag.title().as_deref()));
    let author = non_blank(tag.artist().as_deref())
        .or_else(|| non_blank(tag.get_string(&ItemKey::AlbumArtist)));
    debug!(?path, ?title, ?author, "read audio metadata");

    BookMetadata { title, author }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::mp3_with_tags;
    use tempfile::TempDir;

    fn tagged_mp3(dir: &TempDir, frames: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.path().join("01.mp3");
        std::fs::write(&path, mp3_with_tags(frames)).unwrap();
        path
    }

    #[test]
    fn album_and_artist_are_preferred() {
        let dir = TempDir::new().unwrap();
        let path = tagged_mp3(
            &dir,
            &[
                ("TIT2", "Chapter 1"),
                ("TALB", "Matilda"),
                ("TPE2", "Various"),
                ("TPE1", "Roald Dahl"),
            ],
        );

        let meta = read_metadata(&path);
        assert_eq!(meta.title.as_deref(), Some("Matilda"));
        assert_eq!(meta.author.as_deref(), Some("Roald Dahl"));
    }

    #[test]
    fn track_title_is_used_without_album() {
        let dir = TempDir::new().unwrap();
        let path = tagged_mp3(&dir, &[("TIT2", "The Gruffalo")]);

        let meta = read_metadata(&path);
        assert_eq!(meta.title.as_deref(), Some("The Gruffalo"));
        assert_eq!(meta.author, None);
    }

    #[test]
    fn untagged_or_missing_files_yield_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.mp3");
        std::fs::write(&path, b"no tag here").unwrap();

        assert_eq!(read_metadata(&path), BookMetadata::default());
        assert_eq!(
            read_metadata(&dir.path().join("missing.mp3")),
            BookMetadata::default()
        );
    }
}
