use serde::{Deserialize, Serialize};
use std::fmt;

/// One polled observation of the upstream's reported current/recent track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub name: String,
    pub artist_name: String,
    pub album_name: String,
    /// Ordered smallest first, largest last, as reported upstream.
    pub image_urls: Vec<String>,
    pub is_now_playing: bool,
    pub scrobbled_at_unix: Option<i64>,
}

impl TrackSnapshot {
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity::new(&self.name, &self.artist_name)
    }

    pub fn largest_image_url(&self) -> Option<&str> {
        self.image_urls.last().map(String::as_str)
    }
}

/// Composite key distinguishing one playable track from another.
/// Title + artist, exact case-sensitive match; two releases sharing both
/// collide and are treated as the same track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TrackIdentity(String);

impl TrackIdentity {
    pub fn new(name: &str, artist_name: &str) -> Self {
        Self(format!("{name}\u{2014}{artist_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the upstream is reached: straight to the provider (spends its quota)
/// or through a caching intermediary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    Direct,
    Mediated,
}

/// Interaction signals that count as "the user is around".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerMove,
    KeyPress,
    Scroll,
    VisibilityChange,
    External,
}

/// Read-only projection handed to consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NowPlayingFacet {
    pub track: Option<TrackSnapshot>,
    pub is_live: bool,
    pub is_paused: bool,
    pub progress_ms: u64,
    pub duration_ms: Option<u64>,
    pub percent: f64,
    pub is_position_estimated: bool,
}

#[cfg(test)]
mod tests {
    use super::{TrackIdentity, TrackSnapshot};

    fn snapshot(name: &str, artist: &str) -> TrackSnapshot {
        TrackSnapshot {
            name: name.to_string(),
            artist_name: artist.to_string(),
            album_name: "Album".to_string(),
            image_urls: vec!["small.png".to_string(), "large.png".to_string()],
            is_now_playing: true,
            scrobbled_at_unix: None,
        }
    }

    #[test]
    fn identity_is_title_plus_artist() {
        let a = snapshot("Song A", "Artist X").identity();
        let b = snapshot("Song A", "Artist X").identity();
        let c = snapshot("Song B", "Artist X").identity();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn identity_is_case_sensitive() {
        let a = TrackIdentity::new("Song", "Artist");
        let b = TrackIdentity::new("song", "Artist");
        assert_ne!(a, b);
    }

    #[test]
    fn largest_image_is_last() {
        assert_eq!(snapshot("S", "A").largest_image_url(), Some("large.png"));
    }
}
