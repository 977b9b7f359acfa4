use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub sync_dir: PathBuf,
    pub sync_on_start: bool,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("LISTENBOARD_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("LISTENBOARD_JWT_SECRET is unset or still a placeholder");
        }

        let port = match get("LISTENBOARD_PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid LISTENBOARD_PORT '{}'", v))?,
            None => 3000,
        };

        Ok(Self {
            host: get("LISTENBOARD_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("LISTENBOARD_DB_PATH")
                .unwrap_or_else(|| "listenboard.db".into())
                .into(),
            jwt_secret,
            sync_dir: get("LISTENBOARD_SYNC_DIR").unwrap_or_else(|| ".".into()).into(),
            sync_on_start: flag(get("LISTENBOARD_SYNC_ON_START"), true),
            cookie_secure: flag(get("LISTENBOARD_COOKIE_SECURE"), false),
        })
    }
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}
