use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::OwnerId;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    /// Blank tokens count as no token.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() { None } else { Some(Self(token)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// Who is signed in. Credential management lives elsewhere.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_owner_id(&self) -> Option<OwnerId>;

    async fn auth_token(&self) -> Option<AuthToken>;
}

#[derive(Debug, Clone)]
struct SessionState {
    owner: OwnerId,
    token: AuthToken,
}

#[derive(Debug, Default)]
pub struct MemorySession {
    state: RwLock<Option<SessionState>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(owner: OwnerId, token: AuthToken) -> Self {
        Self {
            state: RwLock::new(Some(SessionState { owner, token })),
        }
    }

    pub async fn login(&self, owner: OwnerId, token: AuthToken) {
        *self.state.write().await = Some(SessionState { owner, token });
    }

    /// Returns the owner that was signed in, if any.
    pub async fn logout(&self) -> Option<OwnerId> {
        self.state.write().await.take().map(|s| s.owner)
    }
}

#[async_trait]
impl SessionProvider for MemorySession {
    async fn current_owner_id(&self) -> Option<OwnerId> {
        self.state.read().await.as_ref().map(|s| s.owner)
    }

    async fn auth_token(&self) -> Option<AuthToken> {
        self.state.read().await.as_ref().map(|s| s.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::new("secret-value").unwrap();
        assert!(!format!("{:?}", token).contains("secret"));
    }

    #[test]
    fn blank_token_is_none() {
        assert!(AuthToken::new("   ").is_none());
    }

    #[tokio::test]
    async fn login_then_logout() {
        let session = MemorySession::new();
        assert_eq!(session.current_owner_id().await, None);

        session
            .login(OwnerId::new(3), AuthToken::new("t").unwrap())
            .await;
        assert_eq!(session.current_owner_id().await, Some(OwnerId::new(3)));
        assert_eq!(session.auth_token().await.unwrap().as_str(), "t");

        assert_eq!(session.logout().await, Some(OwnerId::new(3)));
        assert!(session.auth_token().await.is_none());
    }
}
