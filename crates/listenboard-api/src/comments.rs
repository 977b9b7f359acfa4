use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use listenboard_db::models::CommentRow;
use listenboard_types::api::{CommentResponse, CreateCommentRequest, LikeResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{AuthUser, MaybeAuthUser};
use crate::{parse_timestamp, with_db};

const MAX_COMMENT_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `createdAt` of the last comment of the previous page.
    pub before: Option<chrono::DateTime<chrono::Utc>>,
    /// Cursor tie-break: `id` of that same comment.
    pub before_id: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

fn to_response(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt comment id '{}': {}", row.id, e);
            Uuid::default()
        }),
        created_at: parse_timestamp(&row.created_at),
        artist: row.artist_name,
        author: row.author_username,
        avatar: row.author_avatar,
        content: row.content,
        likes: row.likes,
        liked_by_me: row.liked_by_me,
    }
}

/// GET /artists/{artist}/comments — newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(artist): Path<String>,
    query: Result<Query<CommentQuery>, QueryRejection>,
    MaybeAuthUser(auth): MaybeAuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let limit = query.limit.clamp(1, 200);
    // Stored timestamps always carry milliseconds; compare in that shape.
    let before = query
        .before
        .map(|at| at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
    let before_id = query.before_id.map(|id| id.to_string());
    let viewer = auth.map(|a| a.user_id.to_string());

    let rows = with_db(&state, move |db| {
        Ok(db.get_comments(
            &artist,
            limit,
            before.as_deref(),
            before_id.as_deref(),
            viewer.as_deref(),
        )?)
    })
    .await?;

    let comments: Vec<CommentResponse> = rows.into_iter().map(to_response).collect();
    Ok(Json(comments))
}

/// POST /artists/{artist}/comments
pub async fn post_comment(
    State(state): State<AppState>,
    Path(artist): Path<String>,
    auth: AuthUser,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() || content.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::Validation(format!(
            "Comment must be 1-{} characters",
            MAX_COMMENT_CHARS
        )));
    }
    let artist = artist.trim().to_string();
    if artist.is_empty() {
        return Err(ApiError::Validation("Artist name is required".into()));
    }

    let comment_id = Uuid::new_v4().to_string();
    let uid = auth.user_id.to_string();

    let row = with_db(&state, move |db| {
        db.insert_comment(&comment_id, &uid, &artist, &content)?;
        db.get_comment(&comment_id, Some(&uid))?
            .ok_or_else(|| ApiError::from(anyhow::anyhow!("Comment {} missing after insert", comment_id)))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(to_response(row))))
}

/// POST /comments/{comment_id}/like — liking twice keeps the count unchanged.
pub async fn like_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let cid = parse_comment_id(&comment_id)?;
    let uid = auth.user_id.to_string();

    let likes = with_db(&state, move |db| Ok(db.like_comment(&cid, &uid)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".into()))?;

    Ok(Json(LikeResponse { likes, liked: true }))
}

/// DELETE /comments/{comment_id}/like
pub async fn unlike_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let cid = parse_comment_id(&comment_id)?;
    let uid = auth.user_id.to_string();

    let likes = with_db(&state, move |db| Ok(db.unlike_comment(&cid, &uid)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".into()))?;

    Ok(Json(LikeResponse { likes, liked: false }))
}

/// Malformed ids name no comment, so they get the same 404 as unknown ones.
fn parse_comment_id(raw: &str) -> Result<String, ApiError> {
    raw.parse::<Uuid>()
        .map(|id| id.to_string())
        .map_err(|_| ApiError::NotFound("Comment not found".into()))
}
