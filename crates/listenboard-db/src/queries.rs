use crate::Database;
use crate::models::{CommentRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, password_hash, spotify_id, avatar, created_at";

impl Database {
    // -- Users --

    /// Returns false if the name (compared case-insensitively) is already taken.
    pub fn create_user(&self, id: &str, username: &str, password_hash: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)
                 ON CONFLICT DO NOTHING",
                rusqlite::params![id, username, password_hash],
            )?;
            Ok(changed == 1)
        })
    }

    /// Case-insensitive lookup by display name.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            conn.query_row(&sql, [id], map_user).optional()
        })
    }

    /// Map a display name to a user id, creating a password-less user with
    /// the default avatar if none exists yet.
    pub fn resolve_user(&self, display_name: &str) -> Result<String> {
        self.with_conn_mut(|conn| {
            if let Some(user) = query_user_by_username(conn, display_name)? {
                return Ok(user.id);
            }

            // A concurrent creation of the same name is not an error.
            conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                rusqlite::params![Uuid::new_v4().to_string(), display_name],
            )?;

            query_user_by_username(conn, display_name)?
                .map(|user| user.id)
                .ok_or_else(|| anyhow!("User vanished after insert: {}", display_name))
        })
    }

    /// Attach a password to an account. Only succeeds for accounts that
    /// do not have one yet; returns whether the account was claimed.
    pub fn claim_user(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1 AND password_hash IS NULL",
                rusqlite::params![id, password_hash],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn set_avatar(&self, id: &str, avatar: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET avatar = ?2 WHERE id = ?1",
                rusqlite::params![id, avatar],
            )?;
            Ok(())
        })
    }

    /// Link an external account id. Returns false if another user holds it.
    pub fn set_spotify_id(&self, id: &str, spotify_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE spotify_id = ?1 AND id != ?2)",
                rusqlite::params![spotify_id, id],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(false);
            }

            conn.execute(
                "UPDATE users SET spotify_id = ?2 WHERE id = ?1",
                rusqlite::params![id, spotify_id],
            )?;
            Ok(true)
        })
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        id: &str,
        user_id: &str,
        artist_name: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, user_id, artist_name, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, user_id, artist_name, content],
            )?;
            Ok(())
        })
    }

    /// `viewer_id` decides `liked_by_me`; pass `None` for anonymous readers.
    pub fn get_comment(&self, id: &str, viewer_id: Option<&str>) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT c.id, c.user_id, u.username, u.avatar, c.artist_name, c.content, c.likes, c.created_at,
                        EXISTS(SELECT 1 FROM comment_likes l WHERE l.comment_id = c.id AND l.user_id = ?2)
                 FROM comments c
                 JOIN users u ON u.id = c.user_id
                 WHERE c.id = ?1",
                rusqlite::params![id, viewer_id],
                map_comment,
            )
            .optional()
        })
    }

    /// Newest-first comments on an artist page, ordered by (`created_at`, `id`).
    /// The cursor is the `created_at` and `id` of the last comment of the
    /// previous page; without `before_id` every comment of that instant is skipped.
    pub fn get_comments(
        &self,
        artist_name: &str,
        limit: u32,
        before: Option<&str>,
        before_id: Option<&str>,
        viewer_id: Option<&str>,
    ) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_id, u.username, u.avatar, c.artist_name, c.content, c.likes, c.created_at,
                        EXISTS(SELECT 1 FROM comment_likes l WHERE l.comment_id = c.id AND l.user_id = ?4)
                 FROM comments c
                 JOIN users u ON u.id = c.user_id
                 WHERE c.artist_name = ?1 COLLATE NOCASE
                   AND (?3 IS NULL
                        OR c.created_at < ?3
                        OR (c.created_at = ?3 AND ?5 IS NOT NULL AND c.id < ?5))
                 ORDER BY c.created_at DESC, c.id DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(
                    rusqlite::params![artist_name, limit, before, viewer_id, before_id],
                    map_comment,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Likes --

    /// Record a like and recompute the comment's like count from the join
    /// table. Liking twice is a no-op. Returns `None` if the comment does not exist.
    pub fn like_comment(&self, comment_id: &str, user_id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !comment_exists(&tx, comment_id)? {
                return Ok(None);
            }

            tx.execute(
                "INSERT OR IGNORE INTO comment_likes (comment_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![comment_id, user_id],
            )?;
            let likes = recount_likes(&tx, comment_id)?;

            tx.commit()?;
            Ok(Some(likes))
        })
    }

    /// Remove a like (if any) and recompute the count.
    pub fn unlike_comment(&self, comment_id: &str, user_id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            if !comment_exists(&tx, comment_id)? {
                return Ok(None);
            }

            tx.execute(
                "DELETE FROM comment_likes WHERE comment_id = ?1 AND user_id = ?2",
                rusqlite::params![comment_id, user_id],
            )?;
            let likes = recount_likes(&tx, comment_id)?;

            tx.commit()?;
            Ok(Some(likes))
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 COLLATE NOCASE");
    conn.query_row(&sql, [username], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        spotify_id: row.get(3)?,
        avatar: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_username: row.get(2)?,
        author_avatar: row.get(3)?,
        artist_name: row.get(4)?,
        content: row.get(5)?,
        likes: row.get(6)?,
        created_at: row.get(7)?,
        liked_by_me: row.get(8)?,
    })
}

fn comment_exists(conn: &Connection, comment_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1)",
        [comment_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn recount_likes(conn: &Connection, comment_id: &str) -> Result<i64> {
    conn.execute(
        "UPDATE comments
         SET likes = (SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1)
         WHERE id = ?1",
        [comment_id],
    )?;
    let likes = conn.query_row("SELECT likes FROM comments WHERE id = ?1", [comment_id], |row| {
        row.get(0)
    })?;
    Ok(likes)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
