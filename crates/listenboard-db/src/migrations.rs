use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash   TEXT,
                spotify_id      TEXT UNIQUE,
                avatar          TEXT NOT NULL DEFAULT 'default',
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE stream_events (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                played_at       TEXT NOT NULL,
                track_name      TEXT NOT NULL,
                artist_name     TEXT,
                album_name      TEXT,
                ms_played       INTEGER NOT NULL CHECK (ms_played >= 0),
                track_uri       TEXT,
                platform        TEXT
            );

            CREATE INDEX idx_stream_events_user
                ON stream_events(user_id, played_at);

            CREATE INDEX idx_stream_events_artist
                ON stream_events(artist_name COLLATE NOCASE, user_id);

            CREATE TABLE comments (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                artist_name     TEXT NOT NULL,
                content         TEXT NOT NULL,
                likes           INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_comments_artist
                ON comments(artist_name COLLATE NOCASE, created_at);

            CREATE TABLE comment_likes (
                comment_id      TEXT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (comment_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
