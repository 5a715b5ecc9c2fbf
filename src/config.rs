//! Server configuration parsed from environment variables.
//!
//! `main` loads `.env` (if present) before calling [`AppConfig::from_env`].
//! Every knob except the database URL has a default.

use std::path::PathBuf;
use std::time::Duration;

use crate::services::mask::DEFAULT_ALPHA_THRESHOLD;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_AVATAR_DIR: &str = "./data/avatars";
pub const DEFAULT_AVATAR_MAX_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_STATIC_DIR: &str = "./static";
pub const DEFAULT_NOTE_MAX_CHARS: usize = 280;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Which claim store backs the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Postgres { database_url: String, max_connections: u32 },
    /// Process-local store. Claims vanish on restart.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub timeout: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_AVATAR_MAX_BYTES, timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS) }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub store: StoreKind,
    pub mask_path: Option<PathBuf>,
    pub mask_alpha_threshold: u8,
    pub avatar_dir: PathBuf,
    /// Prefix for avatar URLs handed back to clients. Empty means relative.
    pub public_base_url: String,
    pub static_dir: PathBuf,
    pub upload: UploadLimits,
    pub note_max_chars: usize,
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// - `CLAIM_STORE`: `postgres` (default) or `memory`
    /// - `DATABASE_URL`: required for `postgres`
    /// - `PORT`, `DB_MAX_CONNECTIONS`, `MASK_PATH`, `MASK_ALPHA_THRESHOLD`,
    ///   `AVATAR_DIR`, `AVATAR_MAX_BYTES`, `UPLOAD_TIMEOUT_MS`,
    ///   `PUBLIC_BASE_URL`, `STATIC_DIR`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or
    /// `CLAIM_STORE`/`PORT` hold an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = match std::env::var("CLAIM_STORE").ok().as_deref().map(str::trim) {
            None | Some("" | "postgres") => StoreKind::Postgres {
                database_url: std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
                max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            },
            Some("memory") => StoreKind::Memory,
            Some(other) => return Err(ConfigError::Invalid { key: "CLAIM_STORE", value: other.to_owned() }),
        };

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            store,
            mask_path: std::env::var("MASK_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            mask_alpha_threshold: env_parse("MASK_ALPHA_THRESHOLD", DEFAULT_ALPHA_THRESHOLD),
            avatar_dir: env_path("AVATAR_DIR", DEFAULT_AVATAR_DIR),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            static_dir: env_path("STATIC_DIR", DEFAULT_STATIC_DIR),
            upload: UploadLimits {
                max_bytes: env_parse("AVATAR_MAX_BYTES", DEFAULT_AVATAR_MAX_BYTES),
                timeout: Duration::from_millis(env_parse("UPLOAD_TIMEOUT_MS", DEFAULT_UPLOAD_TIMEOUT_MS)),
            },
            note_max_chars: DEFAULT_NOTE_MAX_CHARS,
        })
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map_or_else(|_| PathBuf::from(default), PathBuf::from)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
