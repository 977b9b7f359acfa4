//! Read-only aggregation queries. All summing, grouping and ranking is done by
//! SQLite; ties on summed duration are broken by name, ascending.

use anyhow::Result;
use rusqlite::Connection;

use crate::Database;
use crate::models::{ArtistSummary, ArtistTotal, ListenerRank, ListenerTotal, SongTotal, UserSummary};
use crate::queries::OptionalExt;

/// Default size of every top-N list.
pub const TOP_N: u32 = 10;

impl Database {
    pub fn user_summary(&self, user_id: &str) -> Result<UserSummary> {
        self.with_conn(|conn| {
            let summary = conn.query_row(
                "SELECT COALESCE(SUM(ms_played), 0), COUNT(*) FROM stream_events WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(UserSummary {
                        total_ms: row.get(0)?,
                        total_songs: row.get(1)?,
                    })
                },
            )?;
            Ok(summary)
        })
    }

    pub fn top_artists(&self, user_id: &str, limit: u32) -> Result<Vec<ArtistTotal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT artist_name, SUM(ms_played) AS total
                 FROM stream_events
                 WHERE user_id = ?1 AND artist_name IS NOT NULL
                 GROUP BY artist_name
                 ORDER BY total DESC, artist_name ASC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(ArtistTotal {
                        artist: row.get(0)?,
                        ms_played: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn top_songs(&self, user_id: &str, limit: u32) -> Result<Vec<SongTotal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT track_name, COALESCE(artist_name, ''), SUM(ms_played) AS total
                 FROM stream_events
                 WHERE user_id = ?1
                 GROUP BY track_name, artist_name
                 ORDER BY total DESC, track_name ASC, artist_name ASC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(SongTotal {
                        track: row.get(0)?,
                        artist: row.get(1)?,
                        ms_played: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Top listeners of one artist (matched case-insensitively).
    pub fn artist_leaderboard(&self, artist_name: &str, limit: u32) -> Result<Vec<ListenerTotal>> {
        self.with_conn(|conn| {
            query_listeners(
                conn,
                "SELECT u.id, u.username, u.avatar, SUM(e.ms_played) AS total
                 FROM stream_events e
                 JOIN users u ON u.id = e.user_id
                 WHERE e.artist_name = ?1 COLLATE NOCASE
                 GROUP BY u.id
                 ORDER BY total DESC, u.username ASC
                 LIMIT ?2",
                rusqlite::params![artist_name, limit],
            )
        })
    }

    /// Users ranked by total listening time across all artists.
    pub fn global_leaderboard(&self, limit: u32) -> Result<Vec<ListenerTotal>> {
        self.with_conn(|conn| {
            query_listeners(
                conn,
                "SELECT u.id, u.username, u.avatar, SUM(e.ms_played) AS total
                 FROM stream_events e
                 JOIN users u ON u.id = e.user_id
                 GROUP BY u.id
                 ORDER BY total DESC, u.username ASC
                 LIMIT ?1",
                rusqlite::params![limit],
            )
        })
    }

    pub fn artist_summary(&self, artist_name: &str) -> Result<ArtistSummary> {
        self.with_conn(|conn| {
            let summary = conn.query_row(
                "SELECT MIN(artist_name), COUNT(DISTINCT user_id), COALESCE(SUM(ms_played), 0), COUNT(*)
                 FROM stream_events
                 WHERE artist_name = ?1 COLLATE NOCASE",
                [artist_name],
                |row| {
                    Ok(ArtistSummary {
                        name: row.get(0)?,
                        listeners: row.get(1)?,
                        total_ms: row.get(2)?,
                        plays: row.get(3)?,
                    })
                },
            )?;
            Ok(summary)
        })
    }

    /// 1-based rank of a user among an artist's listeners: one more than the
    /// number of listeners with strictly more time. `None` if they never
    /// listened to the artist.
    pub fn user_artist_rank(&self, artist_name: &str, user_id: &str) -> Result<Option<ListenerRank>> {
        self.with_conn(|conn| {
            conn.query_row(
                "WITH totals AS (
                     SELECT user_id, SUM(ms_played) AS total
                     FROM stream_events
                     WHERE artist_name = ?1 COLLATE NOCASE
                     GROUP BY user_id
                 )
                 SELECT (SELECT COUNT(*) FROM totals o WHERE o.total > t.total) + 1, t.total
                 FROM totals t
                 WHERE t.user_id = ?2",
                rusqlite::params![artist_name, user_id],
                |row| {
                    Ok(ListenerRank {
                        rank: row.get(0)?,
                        ms_played: row.get(1)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn query_listeners(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ListenerTotal>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(ListenerTotal {
                user_id: row.get(0)?,
                username: row.get(1)?,
                avatar: row.get(2)?,
                ms_played: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
