use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use listenboard_db::{ConflictPolicy, Database};

use crate::error::{Error, FileError};
use crate::import::import_file;

const EXPORT_PREFIX: &str = "User_";
const EXPORT_MARKER: &str = "_Streaming_History_Audio";
const EXPORT_EXTENSION: &str = ".json";

#[derive(Debug, Default)]
pub struct SyncReport {
    pub users_synced: usize,
    pub users_skipped: usize,
    pub records_imported: usize,
    pub errors: Vec<FileError>,
}

/// Extract the display name from an export file name of the form
/// `User_<name>_Streaming_History_Audio<anything>.json`. Underscores in
/// `<name>` become spaces.
pub fn parse_export_filename(file_name: &str) -> Option<String> {
    let rest = file_name.strip_prefix(EXPORT_PREFIX)?;
    if !rest.ends_with(EXPORT_EXTENSION) {
        return None;
    }

    let end = rest.find(EXPORT_MARKER)?;
    let name = &rest[..end];
    if name.is_empty() {
        return None;
    }

    Some(name.replace('_', " "))
}

/// Import every history export found directly inside `dir`.
///
/// Files are grouped by the user named in the file name. A user who already
/// has at least one stored event is skipped entirely, which makes re-running
/// the sync a no-op for them. Per-file failures are logged and reported.
pub fn sync_directory(db: &Database, dir: &Path) -> Result<SyncReport, Error> {
    let exports = scan_exports(dir)?;
    let mut report = SyncReport::default();

    if exports.is_empty() {
        info!("No history exports found in {}", dir.display());
        return Ok(report);
    }

    for (display_name, paths) in exports {
        let user_id = match db.resolve_user(&display_name) {
            Ok(id) => id,
            Err(e) => {
                let e = Error::Storage(e);
                warn!("Could not resolve user {}: {}", display_name, e);
                report.errors.push(FileError::new(display_name, &e));
                continue;
            }
        };

        match db.has_stream_events(&user_id) {
            Ok(true) => {
                info!("Skipping {}: history already imported", display_name);
                report.users_skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                let e = Error::Storage(e);
                warn!("Could not check history for {}: {}", display_name, e);
                report.errors.push(FileError::new(display_name, &e));
                continue;
            }
        }

        let mut imported = 0;
        for path in &paths {
            let file_name = path.display().to_string();
            let result = std::fs::read(path)
                .map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })
                .and_then(|contents| {
                    import_file(db, &user_id, &contents, ConflictPolicy::IgnoreDuplicates)
                });

            match result {
                Ok(count) => imported += count,
                Err(e) => {
                    warn!("Sync failed for file {}: {}", file_name, e);
                    report.errors.push(FileError::new(file_name, &e));
                }
            }
        }

        info!(
            "Synced {}: {} records from {} files",
            display_name,
            imported,
            paths.len()
        );
        report.records_imported += imported;
        report.users_synced += 1;
    }

    Ok(report)
}

/// Matching export files in `dir`, grouped by display name, each group
/// sorted by file name.
fn scan_exports(dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, Error> {
    let io_err = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut exports: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(parse_export_filename) else {
            continue;
        };
        exports.entry(name).or_default().push(entry.path());
    }

    for paths in exports.values_mut() {
        paths.sort();
    }
    Ok(exports)
}
