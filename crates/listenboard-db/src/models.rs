//! Database row types — these map directly to SQLite rows.
//! Distinct from listenboard-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    /// `None` for accounts created by ingestion that were never claimed.
    pub password_hash: Option<String>,
    pub spotify_id: Option<String>,
    pub avatar: String,
    pub created_at: String,
}

pub struct CommentRow {
    pub id: String,
    pub user_id: String,
    pub author_username: String,
    pub author_avatar: String,
    pub artist_name: String,
    pub content: String,
    pub likes: i64,
    pub liked_by_me: bool,
    pub created_at: String,
}

// -- Aggregates --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserSummary {
    pub total_ms: i64,
    pub total_songs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistTotal {
    pub artist: String,
    pub ms_played: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongTotal {
    pub track: String,
    pub artist: String,
    pub ms_played: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerTotal {
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub ms_played: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistSummary {
    /// Stored spelling of the artist, if anyone has listened to it.
    pub name: Option<String>,
    pub listeners: i64,
    pub total_ms: i64,
    pub plays: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerRank {
    pub rank: i64,
    pub ms_played: i64,
}
