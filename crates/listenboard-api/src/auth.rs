use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use listenboard_db::Database;
use listenboard_types::api::{AuthResponse, Claims, LoginRequest, MeResponse, RegisterRequest};

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::{parse_timestamp, with_db};

/// Name of the cookie carrying the session JWT.
pub const TOKEN_COOKIE: &str = "token";

const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Mark the session cookie `Secure` (set when served over HTTPS).
    pub cookie_secure: bool,
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) {
        return Err(ApiError::Validation("Username must be 3-32 characters".into()));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::Validation("Password must be at least 8 characters".into()));
    }

    let password = req.password;
    let (user_id, username) = with_db(&state, move |db| {
        let password_hash = hash_password(&password)?;

        match db.get_user_by_username(&username)? {
            // Accounts created by an import have no password yet and can be claimed.
            Some(existing) if existing.password_hash.is_none() => {
                if !db.claim_user(&existing.id, &password_hash)? {
                    return Err(ApiError::Conflict("Username is taken".into()));
                }
                let id = existing.id.parse::<Uuid>().map_err(anyhow::Error::from)?;
                Ok((id, existing.username))
            }
            Some(_) => Err(ApiError::Conflict("Username is taken".into())),
            None => {
                // A concurrent registration of the same name loses here.
                let id = Uuid::new_v4();
                if !db.create_user(&id.to_string(), &username, Some(&password_hash))? {
                    return Err(ApiError::Conflict("Username is taken".into()));
                }
                Ok((id, username))
            }
        }
    })
    .await?;

    info!("Registered user {}", username);
    let token = create_token(&state.jwt_secret, user_id, &username)?;
    let jar = jar.add(session_cookie(&state, token.clone()));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            user_id,
            username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let password = req.password;

    let (user_id, username) = with_db(&state, move |db| {
        let user = db
            .get_user_by_username(&username)?
            .ok_or(ApiError::InvalidCredentials)?;
        let stored = user.password_hash.ok_or(ApiError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&stored).map_err(|e| anyhow::anyhow!("Corrupt password hash: {}", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::InvalidCredentials)?;

        let id = user.id.parse::<Uuid>().map_err(anyhow::Error::from)?;
        Ok((id, user.username))
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &username)?;
    let jar = jar.add(session_cookie(&state, token.clone()));

    Ok((
        jar,
        Json(AuthResponse {
            user_id,
            username,
            token,
        }),
    ))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(Cookie::build((TOKEN_COOKIE, "")).path("/")),
        StatusCode::NO_CONTENT,
    )
}

pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let uid = auth.user_id.to_string();
    let user = with_db(&state, move |db| Ok(db.get_user_by_id(&uid)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(MeResponse {
        user_id: auth.user_id,
        created_at: parse_timestamp(&user.created_at),
        username: user.username,
        avatar: user.avatar,
        spotify_id: user.spotify_id,
    }))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.cookie_secure)
        .build()
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
