use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::interface::{RefreshSessionRepository, Result};
use super::model::{RefreshSession, User};
use crate::services::{clock::Clock, tokens};

/// A freshly opened session together with the only copy of its token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: RefreshSession,
}

/// Long-lived, revocable refresh sessions keyed by token digest.
#[derive(Clone)]
pub struct RefreshSessionStore {
    repo: Arc<dyn RefreshSessionRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl RefreshSessionStore {
    pub fn new(repo: Arc<dyn RefreshSessionRepository>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { repo, clock, ttl }
    }

    /// Opens a session for `user`, provided the account is still active and
    /// its password hash is the one `user` was authenticated against.
    pub async fn open(&self, user: &User) -> Result<Option<IssuedSession>> {
        let issued = self.mint(&user.id);
        let stored = self
            .repo
            .create(&issued.session, &user.password_hash)
            .await?;
        Ok(stored.then_some(issued))
    }

    /// Retires `token` and opens its successor in one step. `None` if the
    /// token was already rotated, revoked or expired.
    pub async fn rotate(&self, token: &str, user_id: &str) -> Result<Option<IssuedSession>> {
        let issued = self.mint(user_id);
        let rotated = self
            .repo
            .rotate(&tokens::digest(token), &issued.session, self.clock.now())
            .await?;
        Ok(rotated.then_some(issued))
    }

    /// Active, unexpired session for `token`. No side effects.
    pub async fn validate(&self, token: &str) -> Result<Option<RefreshSession>> {
        let now = self.clock.now();
        let session = self.repo.find_by_token_hash(&tokens::digest(token)).await?;
        Ok(session.filter(|s| s.is_valid_at(now)))
    }

    /// `false` if there was no active session for `token`, including when a
    /// previous call already revoked it.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        self.repo.deactivate(&tokens::digest(token)).await
    }

    /// Deletes every expired row, active or not.
    pub async fn sweep(&self) -> Result<u64> {
        self.repo.delete_expired(self.clock.now()).await
    }

    fn mint(&self, user_id: &str) -> IssuedSession {
        let now = self.clock.now();
        let token = tokens::new_refresh_token();

        let session = RefreshSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: tokens::digest(&token),
            expires_at: now + self.ttl,
            is_active: true,
            created_at: now,
        };
        IssuedSession { token, session }
    }
}
