use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use listenboard_db::models::ListenerTotal;
use listenboard_db::stats::TOP_N;
use listenboard_types::api::{
    ArtistPlaytime, ArtistRank, ArtistResponse, LeaderboardEntry, LinkSpotifyRequest,
    ProfileResponse, SongPlaytime, UpdateAvatarRequest,
};
use listenboard_types::ms_to_minutes;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{AuthUser, MaybeAuthUser};
use crate::with_db;

fn leaderboard_entries(rows: Vec<ListenerTotal>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| LeaderboardEntry {
            rank: i + 1,
            username: row.username,
            avatar: row.avatar,
            minutes: ms_to_minutes(row.ms_played),
            ms_played: row.ms_played,
        })
        .collect()
}

/// GET /users/{username}/profile
pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = with_db(&state, move |db| {
        let user = db
            .get_user_by_username(&username)?
            .ok_or_else(|| ApiError::NotFound(format!("No user named {}", username)))?;

        let summary = db.user_summary(&user.id)?;
        let top_artists = db.top_artists(&user.id, TOP_N)?;
        let top_songs = db.top_songs(&user.id, TOP_N)?;

        Ok(ProfileResponse {
            username: user.username,
            avatar: user.avatar,
            total_minutes: ms_to_minutes(summary.total_ms),
            total_songs: summary.total_songs,
            top_artists: top_artists
                .into_iter()
                .map(|a| ArtistPlaytime {
                    artist: a.artist,
                    minutes: ms_to_minutes(a.ms_played),
                    ms_played: a.ms_played,
                })
                .collect(),
            top_songs: top_songs
                .into_iter()
                .map(|s| SongPlaytime {
                    track: s.track,
                    artist: s.artist,
                    minutes: ms_to_minutes(s.ms_played),
                    ms_played: s.ms_played,
                })
                .collect(),
        })
    })
    .await?;

    Ok(Json(profile))
}

/// GET /leaderboard — users ranked by total listening time.
pub async fn global_leaderboard(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, |db| Ok(db.global_leaderboard(TOP_N)?)).await?;
    Ok(Json(leaderboard_entries(rows)))
}

/// GET /artists/{artist}/leaderboard
pub async fn artist_leaderboard(
    State(state): State<AppState>,
    Path(artist): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, move |db| Ok(db.artist_leaderboard(&artist, TOP_N)?)).await?;
    Ok(Json(leaderboard_entries(rows)))
}

/// GET /artists/{artist} — totals, top listeners and, for a signed-in
/// caller, their own position.
pub async fn get_artist(
    State(state): State<AppState>,
    Path(artist): Path<String>,
    MaybeAuthUser(auth): MaybeAuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = auth.map(|a| a.user_id.to_string());

    let response = with_db(&state, move |db| {
        let summary = db.artist_summary(&artist)?;
        let leaderboard = db.artist_leaderboard(&artist, TOP_N)?;
        let my_rank = match &viewer {
            Some(uid) => db.user_artist_rank(&artist, uid)?,
            None => None,
        };

        Ok(ArtistResponse {
            artist: summary.name.unwrap_or(artist),
            listeners: summary.listeners,
            total_minutes: ms_to_minutes(summary.total_ms),
            plays: summary.plays,
            leaderboard: leaderboard_entries(leaderboard),
            my_rank: my_rank.map(|r| ArtistRank {
                rank: r.rank,
                minutes: ms_to_minutes(r.ms_played),
                ms_played: r.ms_played,
            }),
        })
    })
    .await?;

    Ok(Json(response))
}

/// PUT /users/me/avatar
pub async fn update_avatar(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateAvatarRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let avatar = req.avatar.trim().to_string();
    let valid = (1..=32).contains(&avatar.len())
        && avatar
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::Validation(
            "Avatar must be 1-32 characters of letters, digits, '-' or '_'".into(),
        ));
    }

    let uid = auth.user_id.to_string();
    let stored = avatar.clone();
    with_db(&state, move |db| Ok(db.set_avatar(&uid, &stored)?)).await?;

    Ok(Json(serde_json::json!({ "avatar": avatar })))
}

/// PUT /users/me/spotify — link the caller to an external account id.
pub async fn link_spotify(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<LinkSpotifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let spotify_id = req.spotify_id.trim().to_string();
    if spotify_id.is_empty() || spotify_id.len() > 128 {
        return Err(ApiError::Validation("Spotify id must be 1-128 characters".into()));
    }

    let uid = auth.user_id.to_string();
    let sid = spotify_id.clone();
    let linked = with_db(&state, move |db| Ok(db.set_spotify_id(&uid, &sid)?)).await?;
    if !linked {
        return Err(ApiError::Conflict("Spotify account already linked to another user".into()));
    }

    Ok(Json(serde_json::json!({ "spotifyId": spotify_id })))
}
