use crate::UpstreamError;
use serde::Deserialize;
use trackwatch_core::TrackSnapshot;

#[derive(Debug, Deserialize)]
pub(crate) struct RecentTracksEnvelope {
    pub recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentTracks {
    #[serde(default)]
    pub track: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrack {
    pub name: String,
    pub artist: TextField,
    #[serde(default)]
    pub album: Option<TextField>,
    #[serde(default)]
    pub image: Vec<RawImage>,
    #[serde(rename = "@attr", default)]
    pub attr: Option<RawAttr>,
    #[serde(default)]
    pub date: Option<RawDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextField {
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawImage {
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAttr {
    #[serde(default)]
    pub nowplaying: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDate {
    pub uts: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackInfoEnvelope {
    pub track: TrackInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackInfo {
    #[serde(default)]
    pub duration: Option<String>,
}

impl RawTrack {
    pub(crate) fn into_snapshot(self) -> TrackSnapshot {
        let is_now_playing = self
            .attr
            .and_then(|a| a.nowplaying)
            .map(|v| v == "true")
            .unwrap_or(false);

        let scrobbled_at_unix = self.date.and_then(|d| d.uts.parse::<i64>().ok());

        TrackSnapshot {
            name: self.name,
            artist_name: self.artist.text,
            album_name: self.album.map(|a| a.text).unwrap_or_default(),
            image_urls: self
                .image
                .into_iter()
                .map(|i| i.text)
                .filter(|u| !u.is_empty())
                .collect(),
            is_now_playing,
            scrobbled_at_unix,
        }
    }
}

pub(crate) fn parse_recent_tracks(
    value: serde_json::Value,
) -> Result<Vec<TrackSnapshot>, UpstreamError> {
    let envelope: RecentTracksEnvelope = serde_json::from_value(value)
        .map_err(|err| UpstreamError::Malformed(err.to_string()))?;
    Ok(envelope
        .recenttracks
        .track
        .into_iter()
        .map(RawTrack::into_snapshot)
        .collect())
}

/// A catalog duration of zero means "unknown" upstream.
pub(crate) fn parse_track_duration(
    value: serde_json::Value,
) -> Result<Option<u64>, UpstreamError> {
    let envelope: TrackInfoEnvelope = serde_json::from_value(value)
        .map_err(|err| UpstreamError::Malformed(err.to_string()))?;
    Ok(envelope
        .track
        .duration
        .and_then(|d| d.parse::<u64>().ok())
        .filter(|&ms| ms > 0))
}

#[cfg(test)]
mod tests {
    use super::{parse_recent_tracks, parse_track_duration};
    use serde_json::json;

    #[test]
    fn parses_now_playing_entry() {
        let value = json!({
            "recenttracks": {
                "track": [{
                    "name": "Song A",
                    "artist": {"#text": "Artist X"},
                    "album": {"#text": "Album Y"},
                    "image": [
                        {"size": "small", "#text": "https://img/s.png"},
                        {"size": "extralarge", "#text": "https://img/xl.png"}
                    ],
                    "@attr": {"nowplaying": "true"}
                }]
            }
        });

        let tracks = parse_recent_tracks(value).unwrap();
        assert_eq!(tracks.len(), 1);
        let t = &tracks[0];
        assert!(t.is_now_playing);
        assert_eq!(t.scrobbled_at_unix, None);
        assert_eq!(t.largest_image_url(), Some("https://img/xl.png"));
    }

    #[test]
    fn parses_scrobbled_entry_with_timestamp() {
        let value = json!({
            "recenttracks": {
                "track": [{
                    "name": "Song B",
                    "artist": {"#text": "Artist X"},
                    "album": {"#text": ""},
                    "image": [{"size": "small", "#text": ""}],
                    "date": {"uts": "1726000000"}
                }]
            }
        });

        let tracks = parse_recent_tracks(value).unwrap();
        let t = &tracks[0];
        assert!(!t.is_now_playing);
        assert_eq!(t.scrobbled_at_unix, Some(1_726_000_000));
        assert!(t.image_urls.is_empty());
    }

    #[test]
    fn empty_track_list_is_ok() {
        let value = json!({"recenttracks": {"track": []}});
        assert!(parse_recent_tracks(value).unwrap().is_empty());
    }

    #[test]
    fn missing_envelope_is_malformed() {
        let value = json!({"something": "else"});
        assert!(parse_recent_tracks(value).is_err());
    }

    #[test]
    fn duration_zero_means_unknown() {
        let known = json!({"track": {"duration": "215000"}});
        let zero = json!({"track": {"duration": "0"}});
        let missing = json!({"track": {}});

        assert_eq!(parse_track_duration(known).unwrap(), Some(215_000));
        assert_eq!(parse_track_duration(zero).unwrap(), None);
        assert_eq!(parse_track_duration(missing).unwrap(), None);
    }
}
