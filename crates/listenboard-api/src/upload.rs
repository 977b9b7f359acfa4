use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use listenboard_ingest::{UploadedFile, import_uploads};
use listenboard_types::api::{FileErrorResponse, UploadResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::with_db;

/// 256 MB across all files of one upload.
pub const MAX_UPLOAD_SIZE: usize = 256 * 1024 * 1024;

/// POST /upload — multipart history upload.
///
/// Every field carrying a file name is treated as one history file; an
/// optional `username` text field selects the account to import into
/// (defaults to the caller). Importing into another user's account is only
/// allowed while that account is unclaimed.
pub async fn upload_history(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut target: Option<String> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Multipart error: {e}")))?
    {
        if let Some(file_name) = field.file_name().map(|s| s.to_string()) {
            let contents = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("Failed to read {file_name}: {e}")))?;
            files.push(UploadedFile {
                name: file_name,
                contents,
            });
        } else if field.name() == Some("username") {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("Multipart error: {e}")))?;
            let value = value.trim().to_string();
            if !value.is_empty() {
                target = Some(value);
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::Validation("No history files in upload".into()));
    }

    let username = target.unwrap_or_else(|| auth.username.clone());
    let caller_id = auth.user_id.to_string();

    let report = with_db(&state, move |db| {
        if let Some(existing) = db.get_user_by_username(&username)? {
            if existing.id != caller_id && existing.password_hash.is_some() {
                return Err(ApiError::Forbidden(format!(
                    "Cannot import into {}'s account",
                    existing.username
                )));
            }
        }
        Ok(import_uploads(db, &username, files)?)
    })
    .await?;

    info!(
        "{} uploaded {} records ({} files ok, {} failed)",
        auth.username,
        report.records_imported,
        report.files_processed,
        report.errors.len()
    );

    let success = report.any_succeeded();
    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };

    Ok((
        status,
        Json(UploadResponse {
            success,
            records_imported: report.records_imported,
            files_processed: report.files_processed,
            errors: report
                .errors
                .into_iter()
                .map(|e| FileErrorResponse {
                    file: e.file,
                    message: e.message,
                })
                .collect(),
        }),
    ))
}
