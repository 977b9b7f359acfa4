use serde_json::Value;

use listenboard_types::history::{RawStreamRecord, StreamRecord};

/// Keep only entries with a non-empty track name and a positive play time.
/// Anything else (non-objects, wrongly typed fields, podcasts without a
/// track name, skips with zero duration) is dropped silently.
pub fn validate_records(raw: Vec<Value>) -> Vec<StreamRecord> {
    raw.into_iter().filter_map(validate_record).collect()
}

pub fn validate_record(value: Value) -> Option<StreamRecord> {
    let raw: RawStreamRecord = serde_json::from_value(value).ok()?;

    let track_name = raw.master_metadata_track_name.filter(|t| !t.is_empty())?;
    let ms_played = raw.ms_played.filter(|ms| *ms > 0)?;

    Some(StreamRecord {
        played_at: raw.ts.unwrap_or_default(),
        track_name,
        artist_name: raw.master_metadata_album_artist_name,
        album_name: raw.master_metadata_album_album_name,
        ms_played,
        track_uri: raw.spotify_track_uri,
        platform: raw.platform,
    })
}
