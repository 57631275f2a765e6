use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, warn};

use super::{RemoteEndpoint, RemoteError, dto};
use crate::models::{OwnerId, Task};
use crate::session::AuthToken;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub push_timeout: Duration,
    pub pull_timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            push_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            pull_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn new_from_env() -> Result<Self, RemoteError> {
        let base_url = env::var("SYNC_BASE_URL").map_err(|_| {
            RemoteError::InvalidConfiguration("SYNC_BASE_URL is not set".to_string())
        })?;

        Ok(Self {
            base_url,
            push_timeout: timeout_from_env("SYNC_PUSH_TIMEOUT_SECS")?,
            pull_timeout: timeout_from_env("SYNC_PULL_TIMEOUT_SECS")?,
        })
    }
}

fn timeout_from_env(key: &str) -> Result<Duration, RemoteError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| RemoteError::InvalidConfiguration(format!("{} must be whole seconds", key))),
        Err(_) => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
    }
}

/// Sync server client: `GET/POST /todos/sync` and `GET /utils/latestTime`.
pub struct HttpRemoteEndpoint {
    client: Client,
    base_url: String,
    config: RemoteConfig,
}

impl HttpRemoteEndpoint {
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).map_err(|e| {
            RemoteError::InvalidConfiguration(format!("invalid SYNC_BASE_URL {}: {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidConfiguration(format!(
                "SYNC_BASE_URL must be http(s), got {}",
                parsed.scheme()
            )));
        }

        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, RemoteError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| RemoteError::InvalidConfiguration(e.to_string()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Transport(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = dto::parse_error_message(status.as_u16(), &body);
        warn!("sync server answered {}: {}", status, message);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(RemoteError::Unauthorized(message))
        } else {
            Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn read_body(response: Response) -> Result<String, RemoteError> {
        response.text().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Transport(e)
            }
        })
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemoteEndpoint {
    async fn pull(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        since: DateTime<Utc>,
    ) -> Result<Vec<Task>, RemoteError> {
        let url = self.url(
            "/todos/sync",
            &[
                ("userId", owner.to_string()),
                ("lastSyncTime", since.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ],
        )?;

        let response = self
            .send(
                self.client
                    .get(url)
                    .bearer_auth(token.as_str())
                    .timeout(self.config.pull_timeout),
            )
            .await?;

        let body = Self::read_body(response).await?;
        let tasks: Vec<Task> = serde_json::from_str(&body)
            .map_err(|e| RemoteError::Decode(format!("pull response: {}", e)))?;
        debug!("pulled {} tasks for owner {}", tasks.len(), owner);
        Ok(tasks)
    }

    async fn push(
        &self,
        owner: OwnerId,
        token: &AuthToken,
        changes: &[Task],
    ) -> Result<(), RemoteError> {
        let url = self.url("/todos/sync", &[("userId", owner.to_string())])?;

        self.send(
            self.client
                .post(url)
                .bearer_auth(token.as_str())
                .timeout(self.config.push_timeout)
                .json(changes),
        )
        .await?;

        debug!("pushed {} tasks for owner {}", changes.len(), owner);
        Ok(())
    }

    async fn latest_time(
        &self,
        owner: OwnerId,
        token: &AuthToken,
    ) -> Result<DateTime<Utc>, RemoteError> {
        let url = self.url("/utils/latestTime", &[("userId", owner.to_string())])?;

        let response = self
            .send(
                self.client
                    .get(url)
                    .bearer_auth(token.as_str())
                    .timeout(self.config.pull_timeout),
            )
            .await?;

        let body = Self::read_body(response).await?;
        serde_json::from_str::<DateTime<Utc>>(&body)
            .map_err(|e| RemoteError::Decode(format!("latest time: {}", e)))
    }
}
