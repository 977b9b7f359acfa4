use serde::{Deserialize, Serialize};

/// One entry of a streaming-history export, as found in the
/// `Streaming_History_Audio_*.json` files. Every field is optional here;
/// whether an entry is usable is decided by ingestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStreamRecord {
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub master_metadata_track_name: Option<String>,
    #[serde(default)]
    pub master_metadata_album_artist_name: Option<String>,
    #[serde(default)]
    pub master_metadata_album_album_name: Option<String>,
    #[serde(default)]
    pub ms_played: Option<i64>,
    #[serde(default)]
    pub spotify_track_uri: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// A playback record that passed validation and is ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub played_at: String,
    pub track_name: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub ms_played: i64,
    pub track_uri: Option<String>,
    pub platform: Option<String>,
}

impl StreamRecord {
    /// Convenience constructor used by tests and fixtures.
    pub fn new(track_name: &str, artist_name: &str, ms_played: i64) -> Self {
        Self {
            played_at: String::new(),
            track_name: track_name.to_string(),
            artist_name: Some(artist_name.to_string()),
            album_name: None,
            ms_played,
            track_uri: None,
            platform: None,
        }
    }
}
