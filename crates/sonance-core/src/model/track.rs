use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::TrackId;

/// An indexed recording.
///
/// Tracks are immutable once stored. Deleting one removes every
/// sub-fingerprint and hash row it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,

    pub artist: Option<String>,

    pub title: String,

    /// International Standard Recording Code.
    pub isrc: Option<String>,

    pub album: Option<String>,

    pub release_year: Option<i32>,

    /// Length of the decoded audio in seconds.
    pub length_secs: f64,

    pub created_at: DateTime<Utc>,
}

impl Track {
    #[must_use]
    pub fn new(title: impl Into<String>, length_secs: f64) -> Self {
        Self {
            id: TrackId::new(),
            artist: None,
            title: title.into(),
            isrc: None,
            album: None,
            release_year: None,
            length_secs,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    #[must_use]
    pub fn with_isrc(mut self, isrc: impl Into<String>) -> Self {
        self.isrc = Some(isrc.into());
        self
    }

    #[must_use]
    pub const fn with_release_year(mut self, year: i32) -> Self {
        self.release_year = Some(year);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_new() {
        let track = Track::new("Blue in Green", 337.5);
        assert_eq!(track.title, "Blue in Green");
        assert!((track.length_secs - 337.5).abs() < f64::EPSILON);
        assert!(track.artist.is_none());
        assert!(track.isrc.is_none());
    }

    #[test]
    fn test_track_builders() {
        let track = Track::new("So What", 562.0)
            .with_artist("Miles Davis")
            .with_album("Kind of Blue")
            .with_isrc("USSM15900113")
            .with_release_year(1959);

        assert_eq!(track.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(track.album.as_deref(), Some("Kind of Blue"));
        assert_eq!(track.isrc.as_deref(), Some("USSM15900113"));
        assert_eq!(track.release_year, Some(1959));
    }
}
