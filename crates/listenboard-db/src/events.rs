use std::collections::HashSet;
use std::ops::Range;

use anyhow::Result;
use rusqlite::types::ToSql;
use tracing::debug;

use listenboard_types::history::StreamRecord;

use crate::Database;

/// Rows per bulk `INSERT` statement.
pub const BATCH_SIZE: usize = 500;

const EVENT_COLUMNS: &str =
    "user_id, played_at, track_name, artist_name, album_name, ms_played, track_uri, platform";
const PARAMS_PER_ROW: usize = 8;

/// What to do with a record that is already stored for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Insert unconditionally. Re-importing the same file duplicates rows.
    Append,
    /// Skip records whose (played_at, track_name, track_uri) already exist
    /// for the user, or that repeat earlier in the same input.
    IgnoreDuplicates,
}

/// Split `len` records into consecutive ranges of at most [`BATCH_SIZE`].
pub fn plan_batches(len: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(BATCH_SIZE)
        .map(|start| start..(start + BATCH_SIZE).min(len))
        .collect()
}

impl Database {
    /// Bulk-insert validated records for a user, one statement per batch.
    ///
    /// Batches are not wrapped in a common transaction: if batch `k` fails,
    /// batches before it stay persisted and the error is returned.
    /// Returns the number of rows inserted.
    pub fn insert_stream_events(
        &self,
        user_id: &str,
        records: &[StreamRecord],
        policy: ConflictPolicy,
    ) -> Result<usize> {
        let records: Vec<&StreamRecord> = match policy {
            ConflictPolicy::Append => records.iter().collect(),
            ConflictPolicy::IgnoreDuplicates => {
                let mut seen = HashSet::new();
                records
                    .iter()
                    .filter(|r| seen.insert((&r.played_at, &r.track_name, &r.track_uri)))
                    .collect()
            }
        };

        let batches = plan_batches(records.len());
        let mut inserted = 0;

        for (i, range) in batches.iter().enumerate() {
            let batch = &records[range.clone()];
            let sql = batch_insert_sql(batch.len(), policy);

            let mut params: Vec<&dyn ToSql> = Vec::with_capacity(batch.len() * PARAMS_PER_ROW);
            for record in batch {
                params.push(&user_id as &dyn ToSql);
                params.push(&record.played_at);
                params.push(&record.track_name);
                params.push(&record.artist_name);
                params.push(&record.album_name);
                params.push(&record.ms_played);
                params.push(&record.track_uri);
                params.push(&record.platform);
            }

            let changed = self.with_conn_mut(|conn| {
                let mut stmt = conn.prepare_cached(&sql)?;
                Ok(stmt.execute(params.as_slice())?)
            })?;
            inserted += changed;

            debug!(
                "Batch {}/{} for user {}: {} of {} rows inserted",
                i + 1,
                batches.len(),
                user_id,
                changed,
                batch.len()
            );
        }

        Ok(inserted)
    }

    pub fn count_stream_events(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM stream_events WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn has_stream_events(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM stream_events WHERE user_id = ?1)",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }
}

fn batch_insert_sql(rows: usize, policy: ConflictPolicy) -> String {
    let row = format!("({})", vec!["?"; PARAMS_PER_ROW].join(", "));
    let values = vec![row; rows].join(", ");

    match policy {
        ConflictPolicy::Append => {
            format!("INSERT INTO stream_events ({EVENT_COLUMNS}) VALUES {values}")
        }
        // SQLite names the columns of a bare VALUES list column1..columnN.
        ConflictPolicy::IgnoreDuplicates => format!(
            "INSERT INTO stream_events ({EVENT_COLUMNS})
             SELECT v.column1, v.column2, v.column3, v.column4, v.column5, v.column6, v.column7, v.column8
             FROM (VALUES {values}) AS v
             WHERE NOT EXISTS (
                 SELECT 1 FROM stream_events e
                 WHERE e.user_id = v.column1
                   AND e.played_at = v.column2
                   AND e.track_name = v.column3
                   AND e.track_uri IS v.column7
             )"
        ),
    }
}
