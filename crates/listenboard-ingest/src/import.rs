use bytes::Bytes;
use serde_json::Value;
use tracing::{info, warn};

use listenboard_db::{ConflictPolicy, Database};

use crate::error::{Error, FileError};
use crate::validate::validate_records;

/// Raw contents of one uploaded history file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub contents: Bytes,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub records_imported: usize,
    pub files_processed: usize,
    pub errors: Vec<FileError>,
}

impl ImportReport {
    /// True when at least one file made it through, or nothing failed.
    pub fn any_succeeded(&self) -> bool {
        self.files_processed > 0 || self.errors.is_empty()
    }
}

/// Parse, validate and insert one history file for a user.
/// Returns the number of rows inserted.
pub fn import_file(
    db: &Database,
    user_id: &str,
    contents: &[u8],
    policy: ConflictPolicy,
) -> Result<usize, Error> {
    let raw: Vec<Value> = serde_json::from_slice(contents)?;
    let total = raw.len();
    let records = validate_records(raw);

    let inserted = db
        .insert_stream_events(user_id, &records, policy)
        .map_err(Error::Storage)?;

    info!(
        "Imported {} of {} entries for user {} ({} valid)",
        inserted,
        total,
        user_id,
        records.len()
    );
    Ok(inserted)
}

/// Import uploaded files for `username`, creating the user if needed.
///
/// Files are processed one after another; a file that fails to parse or
/// insert is logged and reported, and the remaining files still run.
/// Only a failure to resolve the user aborts the whole import.
pub fn import_uploads(
    db: &Database,
    username: &str,
    files: Vec<UploadedFile>,
) -> Result<ImportReport, Error> {
    let user_id = db.resolve_user(username).map_err(Error::Storage)?;
    let mut report = ImportReport::default();

    for file in files {
        match import_file(db, &user_id, &file.contents, ConflictPolicy::Append) {
            Ok(count) => {
                report.records_imported += count;
                report.files_processed += 1;
            }
            Err(e) => {
                warn!("Import failed for file {}: {}", file.name, e);
                report.errors.push(FileError::new(file.name, &e));
            }
        }
    }

    info!(
        "Upload for {}: {} records from {} files ({} failed)",
        username,
        report.records_imported,
        report.files_processed,
        report.errors.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn file(name: &str, value: Value) -> UploadedFile {
        UploadedFile {
            name: name.to_string(),
            contents: Bytes::from(serde_json::to_vec(&value).unwrap()),
        }
    }

    fn entry(track: &str, ms: i64) -> Value {
        json!({
            "ts": "2024-02-01T10:00:00Z",
            "master_metadata_track_name": track,
            "master_metadata_album_artist_name": "Nova Band",
            "master_metadata_album_album_name": "First",
            "ms_played": ms,
            "spotify_track_uri": format!("spotify:track:{track}"),
            "platform": "ios"
        })
    }

    #[test]
    fn imports_only_valid_entries_for_new_user() {
        let db = Database::open_in_memory().unwrap();
        let upload = file(
            "Streaming_History_Audio_2024.json",
            json!([entry("one", 1000), entry("two", 2000), entry("zero", 0)]),
        );

        let report = import_uploads(&db, "Nova", vec![upload]).unwrap();
        assert_eq!(report.records_imported, 2);
        assert_eq!(report.files_processed, 1);
        assert!(report.errors.is_empty());

        let user = db.get_user_by_username("Nova").unwrap().unwrap();
        let summary = db.user_summary(&user.id).unwrap();
        assert_eq!(summary.total_songs, 2);
        assert_eq!(listenboard_types::ms_to_minutes(summary.total_ms), 0);
    }

    #[test]
    fn bad_file_does_not_stop_siblings() {
        let db = Database::open_in_memory().unwrap();
        let files = vec![
            UploadedFile {
                name: "broken.json".into(),
                contents: Bytes::from_static(b"{ not json"),
            },
            file("object.json", json!({ "ms_played": 5 })),
            file("good.json", json!([entry("a", 10), entry("b", 20), entry("c", 30)])),
        ];

        let report = import_uploads(&db, "mixed", files).unwrap();
        assert_eq!(report.records_imported, 3);
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].file, "broken.json");
        assert!(report.any_succeeded());
    }

    #[test]
    fn all_failed_is_reported() {
        let db = Database::open_in_memory().unwrap();
        let files = vec![UploadedFile {
            name: "empty.json".into(),
            contents: Bytes::new(),
        }];

        let report = import_uploads(&db, "unlucky", files).unwrap();
        assert_eq!(report.records_imported, 0);
        assert!(!report.any_succeeded());
    }

    #[test]
    fn upload_targets_existing_user_case_insensitively() {
        let db = Database::open_in_memory().unwrap();
        let id = db.resolve_user("Nova").unwrap();

        import_uploads(&db, "nova", vec![file("a.json", json!([entry("x", 100)]))]).unwrap();
        assert_eq!(db.count_stream_events(&id).unwrap(), 1);
    }

    #[test]
    fn repeated_upload_appends_again() {
        let db = Database::open_in_memory().unwrap();
        let upload = file("a.json", json!([entry("x", 100)]));

        import_uploads(&db, "twice", vec![upload.clone()]).unwrap();
        let report = import_uploads(&db, "twice", vec![upload]).unwrap();
        assert_eq!(report.records_imported, 1);

        let id = db.resolve_user("twice").unwrap();
        assert_eq!(db.count_stream_events(&id).unwrap(), 2);
    }

    #[test]
    fn storage_failure_mid_file_is_reported_and_next_file_imports() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn_mut(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON stream_events
                 WHEN NEW.track_name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom rejected'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let mut entries: Vec<Value> = (0..700).map(|i| entry(&format!("t{i}"), 1_000)).collect();
        entries[600] = entry("boom", 1_000);
        let files = vec![
            file("first.json", Value::Array(entries)),
            file("second.json", json!([entry("after", 2_000), entry("later", 3_000)])),
        ];

        let report = import_uploads(&db, "Nova", files).unwrap();
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.records_imported, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file, "first.json");
        assert!(report.errors[0].message.contains("storage error"));

        // The batch holding the bad row is lost; the one before it stays.
        let user = db.get_user_by_username("Nova").unwrap().unwrap();
        assert_eq!(db.count_stream_events(&user.id).unwrap(), 502);
    }
}
