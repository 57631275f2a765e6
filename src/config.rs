use std::env;
use std::net::SocketAddr;

use thiserror::Error;

use crate::models::OwnerId;
use crate::remote::{RemoteConfig, RemoteError};
use crate::session::AuthToken;

const DEFAULT_DATABASE_URL: &str = "sqlite://quicktodo.db";
const DEFAULT_PREFS_DATABASE_URL: &str = "sqlite://quicktodo_prefs.db";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    /// Separate file so the sync cursor never lives alongside task rows.
    pub prefs_database_url: String,
    pub bind_addr: SocketAddr,
    pub remote: RemoteConfig,
    /// Session restored at startup, when both id and token are present.
    pub session: Option<(OwnerId, AuthToken)>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let prefs_database_url = env::var("PREFS_DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_PREFS_DATABASE_URL.to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let remote = RemoteConfig::new_from_env()?;
        let session = session_from_env()?;

        Ok(Self {
            database_url,
            prefs_database_url,
            bind_addr,
            remote,
            session,
        })
    }
}

fn session_from_env() -> Result<Option<(OwnerId, AuthToken)>, ConfigError> {
    let owner = match env::var("QUICKTODO_USER_ID") {
        Ok(raw) => Some(raw.trim().parse::<i64>().map(OwnerId::new).map_err(|e| {
            ConfigError::Invalid {
                key: "QUICKTODO_USER_ID",
                reason: e.to_string(),
            }
        })?),
        Err(_) => None,
    };
    let token = env::var("QUICKTODO_TOKEN").ok().and_then(AuthToken::new);

    Ok(owner.zip(token))
}
