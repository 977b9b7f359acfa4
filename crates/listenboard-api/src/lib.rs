pub mod auth;
pub mod comments;
pub mod error;
pub mod extract;
pub mod stats;
pub mod upload;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{get, post, put},
};
use tracing::warn;

use listenboard_db::Database;

use crate::auth::AppState;
use crate::error::ApiError;

/// All HTTP routes. Authentication is per handler via the `AuthUser`
/// extractor, so public and protected routes share one router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/leaderboard", get(stats::global_leaderboard))
        .route("/users/{username}/profile", get(stats::get_profile))
        .route("/users/me/avatar", put(stats::update_avatar))
        .route("/users/me/spotify", put(stats::link_spotify))
        .route("/artists/{artist}", get(stats::get_artist))
        .route("/artists/{artist}/leaderboard", get(stats::artist_leaderboard))
        .route(
            "/artists/{artist}/comments",
            get(comments::list_comments).post(comments::post_comment),
        )
        .route(
            "/comments/{comment_id}/like",
            post(comments::like_comment).delete(comments::unlike_comment),
        )
        .route(
            "/upload",
            post(upload::upload_history).layer(DefaultBodyLimit::max(upload::MAX_UPLOAD_SIZE)),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run blocking database work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db)).await?
}

/// SQLite stores `datetime('now')` as "YYYY-MM-DD HH:MM:SS" without a
/// timezone; comment timestamps are RFC 3339. Accept both.
pub(crate) fn parse_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            chrono::DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::AppStateInner;

    const BOUNDARY: &str = "listenboard-test-boundary";

    fn app() -> (Router, AppState) {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            cookie_secure: false,
        });
        (router(state.clone()), state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn upload_request(token: &str, username: Option<&str>, files: &[(&str, Value)]) -> Request<Body> {
        let mut body = String::new();
        if let Some(name) = username {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\n{name}\r\n"
            ));
        }
        for (file_name, contents) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{file_name}\"\r\nContent-Type: application/json\r\n\r\n{contents}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn register(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/auth/register",
                None,
                json!({ "username": username, "password": "hunter2hunter2" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    fn entry(track: &str, artist: &str, ms: i64) -> Value {
        json!({
            "ts": "2024-06-01T08:00:00Z",
            "master_metadata_track_name": track,
            "master_metadata_album_artist_name": artist,
            "master_metadata_album_album_name": "LP",
            "ms_played": ms,
            "spotify_track_uri": format!("spotify:track:{track}"),
            "platform": "linux"
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn upload_then_profile_for_new_user() {
        let (app, _) = app();
        let token = register(&app, "uploader").await;

        let file = json!([
            entry("one", "Nova Band", 1000),
            entry("two", "Nova Band", 2000),
            entry("skip", "Nova Band", 0)
        ]);
        let (status, body) = send(&app, upload_request(&token, Some("Nova"), &[("a.json", file)])).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["recordsImported"], 2);

        let (status, profile) = send(&app, get("/users/nova/profile", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "Nova");
        assert_eq!(profile["totalSongs"], 2);
        assert_eq!(profile["totalMinutes"], 0);
        assert_eq!(profile["topArtists"][0]["artist"], "Nova Band");
    }

    #[tokio::test]
    async fn partial_upload_still_succeeds() {
        let (app, _) = app();
        let token = register(&app, "partial").await;

        let files = [
            ("good.json", json!([entry("a", "X", 5000)])),
            ("bad.json", json!({ "not": "an array" })),
        ];
        let (status, body) = send(&app, upload_request(&token, None, &files)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["recordsImported"], 1);
        assert_eq!(body["errors"][0]["file"], "bad.json");

        let (status, body) = send(
            &app,
            upload_request(&token, None, &[("bad.json", json!("nope"))]),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn upload_requires_auth_and_files() {
        let (app, _) = app();
        let mut req = upload_request("garbage", None, &[("a.json", json!([]))]);
        req.headers_mut().remove(header::AUTHORIZATION);
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "TOKEN_MISSING");

        let token = register(&app, "empty").await;
        let (status, _) = send(&app, upload_request(&token, None, &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cannot_upload_into_claimed_account() {
        let (app, _) = app();
        register(&app, "owner").await;
        let token = register(&app, "intruder").await;

        let (status, _) = send(
            &app,
            upload_request(&token, Some("OWNER"), &[("a.json", json!([entry("a", "X", 1)]))]),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn register_claims_imported_account_once() {
        let (app, state) = app();
        state.db.resolve_user("Imported").unwrap();

        register(&app, "imported").await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/auth/register",
                None,
                json!({ "username": "IMPORTED", "password": "another-password" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn login_and_cookie_auth() {
        let (app, _) = app();
        register(&app, "cookie").await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/auth/login",
                None,
                json!({ "username": "cookie", "password": "wrong-password" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                None,
                json!({ "username": "Cookie", "password": "hunter2hunter2" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let set_cookie = res
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.starts_with("token="));
        assert!(set_cookie.contains("HttpOnly"));

        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let req = Request::builder()
            .uri("/auth/me")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let (status, me) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "cookie");
        assert_eq!(me["avatar"], "default");
    }

    #[tokio::test]
    async fn artist_page_ranks_listeners() {
        let (app, _) = app();
        let big = register(&app, "bigfan").await;
        let small = register(&app, "smallfan").await;

        send(&app, upload_request(&big, None, &[("a.json", json!([entry("t", "Low", 120_000)]))])).await;
        send(&app, upload_request(&small, None, &[("a.json", json!([entry("t", "Low", 60_000)]))])).await;

        let (status, board) = send(&app, get("/artists/low/leaderboard", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(board[0]["username"], "bigfan");
        assert_eq!(board[0]["rank"], 1);
        assert_eq!(board[0]["minutes"], 2);
        assert_eq!(board[1]["username"], "smallfan");

        let (_, page) = send(&app, get("/artists/LOW", Some(&small))).await;
        assert_eq!(page["artist"], "Low");
        assert_eq!(page["listeners"], 2);
        assert_eq!(page["totalMinutes"], 3);
        assert_eq!(page["myRank"]["rank"], 2);

        let (_, anonymous) = send(&app, get("/artists/Low", None)).await;
        assert!(anonymous["myRank"].is_null());

        let (_, global) = send(&app, get("/leaderboard", None)).await;
        assert_eq!(global.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn comments_and_idempotent_likes() {
        let (app, _) = app();
        let author = register(&app, "author").await;
        let fan = register(&app, "listener").await;

        let (status, comment) = send(
            &app,
            json_request(
                "POST",
                "/artists/Radiohead/comments",
                Some(&author),
                json!({ "content": "  OK Computer forever  " }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(comment["content"], "OK Computer forever");
        assert_eq!(comment["likes"], 0);
        let id = comment["id"].as_str().unwrap().to_string();

        let like_uri = format!("/comments/{id}/like");
        for _ in 0..2 {
            let (status, body) = send(&app, json_request("POST", &like_uri, Some(&fan), json!({}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["likes"], 1);
        }

        let (_, list) = send(&app, get("/artists/radiohead/comments", Some(&fan))).await;
        assert_eq!(list[0]["likes"], 1);
        assert_eq!(list[0]["likedByMe"], true);
        assert_eq!(list[0]["author"], "author");

        let (_, body) = send(&app, json_request("DELETE", &like_uri, Some(&fan), json!({}))).await;
        assert_eq!(body["likes"], 0);

        let missing = format!("/comments/{}/like", uuid::Uuid::new_v4());
        let (status, _) = send(&app, json_request("POST", &missing, Some(&fan), json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            json_request("POST", "/artists/Radiohead/comments", Some(&fan), json!({ "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn comment_pages_cover_comments_from_one_millisecond() {
        let (app, state) = app();
        let author = register(&app, "author").await;

        let mut posted = Vec::new();
        for i in 0..3 {
            let (_, comment) = send(
                &app,
                json_request("POST", "/artists/Air/comments", Some(&author), json!({ "content": format!("take {i}") })),
            )
            .await;
            posted.push(comment["id"].as_str().unwrap().to_string());
        }
        state
            .db
            .with_conn_mut(|conn| {
                conn.execute("UPDATE comments SET created_at = '2026-01-01T00:00:00.000Z'", [])?;
                Ok(())
            })
            .unwrap();

        let mut seen = Vec::new();
        let mut uri = "/artists/Air/comments?limit=2".to_string();
        loop {
            let (status, page) = send(&app, get(&uri, None)).await;
            assert_eq!(status, StatusCode::OK);
            let page = page.as_array().unwrap().clone();
            let Some(last) = page.last() else { break };
            uri = format!(
                "/artists/Air/comments?limit=2&before={}&beforeId={}",
                last["createdAt"].as_str().unwrap(),
                last["id"].as_str().unwrap()
            );
            seen.extend(page.iter().map(|c| c["id"].as_str().unwrap().to_string()));
        }

        assert_eq!(seen.len(), 3);
        posted.sort();
        posted.reverse();
        assert_eq!(seen, posted);
    }

    #[tokio::test]
    async fn malformed_comment_requests_get_json_errors() {
        let (app, _) = app();
        let fan = register(&app, "listener").await;

        let (status, body) =
            send(&app, json_request("POST", "/comments/not-a-uuid/like", Some(&fan), json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, body) =
            send(&app, json_request("DELETE", "/comments/not-a-uuid/like", Some(&fan), json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, body) = send(&app, get("/artists/Air/comments?limit=-1", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = send(&app, get("/artists/Air/comments?beforeId=nope", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn responses_use_camel_case_fields() {
        let (app, _) = app();
        let token = register(&app, "camel").await;

        let (_, upload) = send(
            &app,
            upload_request(&token, None, &[("a.json", json!([entry("t", "Low", 90_000)]))]),
        )
        .await;
        assert_eq!(upload["recordsImported"], 1);
        assert_eq!(upload["filesProcessed"], 1);
        assert!(upload.get("records_imported").is_none());

        let (_, profile) = send(&app, get("/users/camel/profile", None)).await;
        assert_eq!(profile["totalSongs"], 1);
        assert_eq!(profile["totalMinutes"], 2);
        assert_eq!(profile["topArtists"][0]["msPlayed"], 90_000);
        assert_eq!(profile["topSongs"][0]["track"], "t");

        let (_, board) = send(&app, get("/leaderboard", None)).await;
        assert_eq!(board[0]["msPlayed"], 90_000);

        let (_, me) = send(&app, get("/auth/me", Some(&token))).await;
        assert!(me["userId"].is_string());
        assert!(me.get("user_id").is_none());
    }

    #[tokio::test]
    async fn avatar_and_spotify_link() {
        let (app, _) = app();
        let a = register(&app, "alpha").await;
        let b = register(&app, "beta").await;

        let (status, _) = send(&app, json_request("PUT", "/users/me/avatar", Some(&a), json!({ "avatar": "cat-2" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, json_request("PUT", "/users/me/avatar", Some(&a), json!({ "avatar": "../x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, profile) = send(&app, get("/users/alpha/profile", None)).await;
        assert_eq!(profile["avatar"], "cat-2");

        let (status, _) = send(&app, json_request("PUT", "/users/me/spotify", Some(&a), json!({ "spotifyId": "sp-1" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, json_request("PUT", "/users/me/spotify", Some(&b), json!({ "spotifyId": "sp-1" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_profile_is_404() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/users/ghost/profile", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[test]
    fn parses_both_timestamp_formats() {
        let sqlite = parse_timestamp("2024-01-02 03:04:05");
        let rfc = parse_timestamp("2024-01-02T03:04:05.000Z");
        assert_eq!(sqlite, rfc);
        assert_eq!(parse_timestamp("garbage"), chrono::DateTime::<chrono::Utc>::default());
    }
}
