use lofty::file::TaggedFileExt;
use lofty::prelude::ItemKey;
use lofty::tag::Accessor;
use sonance_core::Track;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::codec::ContainerKind;

/// Descriptive tags read from an audio file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub release_year: Option<i32>,
}

impl TrackMetadata {
    /// Build a track, using `fallback_title` when no title tag was found.
    #[must_use]
    pub fn into_track(self, fallback_title: &str, length_secs: f64) -> Track {
        let mut track = Track::new(self.title.unwrap_or_else(|| fallback_title.to_string()), length_secs);
        track.artist = self.artist;
        track.album = self.album;
        track.isrc = self.isrc;
        track.release_year = self.release_year;
        track
    }
}

/// True when the extension names a container the codec layer reads.
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ContainerKind::from_extension)
        .is_some()
}

/// Every decodable audio file under `dir`, in path order.
pub fn discover_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    log::debug!("Found {} audio files under {}", files.len(), dir.display());
    files
}

/// Read tags from `path`. Unreadable or untagged files give empty metadata.
pub fn read_track_metadata(path: &Path) -> TrackMetadata {
    match extract_tags(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            log::warn!("Failed to read tags from {}: {}", path.display(), e);
            TrackMetadata::default()
        }
    }
}

fn extract_tags(path: &Path) -> Result<TrackMetadata, lofty::error::LoftyError> {
    let tagged_file = lofty::read_from_path(path)?;
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return Ok(TrackMetadata::default());
    };

    Ok(TrackMetadata {
        title: tag.title().map(|s| s.to_string()),
        artist: tag.artist().map(|s| s.to_string()),
        album: tag.album().map(|s| s.to_string()),
        isrc: tag.get_string(&ItemKey::Isrc).map(|s| s.to_string()),
        release_year: tag.year().map(|y| y as i32),
    })
}

/// The file stem, used as a title of last resort.
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("/music/test.wav")));
        assert!(is_audio_file(Path::new("/music/test.AIFF")));
        assert!(is_audio_file(Path::new("/music/test.mp3")));
        assert!(is_audio_file(Path::new("/music/test.ogg")));
        assert!(!is_audio_file(Path::new("/music/test.flac")));
        assert!(!is_audio_file(Path::new("/music/test.txt")));
        assert!(!is_audio_file(Path::new("/music/test")));
    }

    #[test]
    fn test_discover_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover_audio_files(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_discover_skips_non_audio_and_recurses() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        fs::write(temp_dir.path().join("readme.md"), "# README").unwrap();
        fs::write(temp_dir.path().join("z.wav"), b"RIFF").unwrap();
        fs::write(nested.join("x.aif"), b"FORM").unwrap();

        let found = discover_audio_files(temp_dir.path());
        assert_eq!(found, vec![nested.join("x.aif"), temp_dir.path().join("z.wav")]);
    }

    #[test]
    fn test_unreadable_file_gives_empty_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("garbage.mp3");
        fs::write(&path, b"not audio at all").unwrap();
        assert_eq!(read_track_metadata(&path), TrackMetadata::default());
    }

    #[test]
    fn test_into_track_falls_back_to_stem() {
        let path = Path::new("/music/Blue in Green.wav");
        let track = TrackMetadata::default().into_track(&title_from_path(path), 2.0);
        assert_eq!(track.title, "Blue in Green");

        let tagged = TrackMetadata {
            title: Some("So What".into()),
            release_year: Some(1959),
            ..TrackMetadata::default()
        }
        .into_track("ignored", 2.0);
        assert_eq!(tagged.title, "So What");
        assert_eq!(tagged.release_year, Some(1959));
    }
}
