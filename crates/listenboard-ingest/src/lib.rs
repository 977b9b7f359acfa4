//! Streaming-history ingestion: validation of raw export entries, the
//! upload import path and the startup bulk sync from export files on disk.

pub mod error;
pub mod import;
pub mod sync;
pub mod validate;

pub use error::{Error, FileError};
pub use import::{ImportReport, UploadedFile, import_file, import_uploads};
pub use sync::{SyncReport, parse_export_filename, sync_directory};
pub use validate::{validate_record, validate_records};
