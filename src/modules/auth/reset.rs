use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::interface::{PasswordResetRepository, Result};
use super::model::PasswordResetToken;
use crate::services::{clock::Clock, tokens};

#[derive(Debug, Clone)]
pub struct IssuedResetToken {
    pub token: String,
    pub record: PasswordResetToken,
}

/// One-time password reset tokens. At most one live token per user.
#[derive(Clone)]
pub struct PasswordResetLifecycle {
    repo: Arc<dyn PasswordResetRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl PasswordResetLifecycle {
    pub fn new(repo: Arc<dyn PasswordResetRepository>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { repo, clock, ttl }
    }

    /// Invalidates any live token for `user_id` and issues a new one.
    pub async fn request(&self, user_id: &str) -> Result<IssuedResetToken> {
        let now = self.clock.now();
        let token = tokens::new_reset_token();

        let record = PasswordResetToken {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: tokens::digest(&token),
            expires_at: now + self.ttl,
            is_used: false,
            created_at: now,
        };

        let superseded = self.repo.issue(&record, now).await?;
        if superseded > 0 {
            tracing::debug!(user_id, superseded, "superseded earlier reset tokens");
        }

        Ok(IssuedResetToken { token, record })
    }

    pub async fn validate(&self, token: &str) -> Result<Option<PasswordResetToken>> {
        let now = self.clock.now();
        let record = self.repo.find_by_token_hash(&tokens::digest(token)).await?;
        Ok(record.filter(|r| r.is_valid_at(now)))
    }

    /// Marks the token used. `true` whenever the token exists, whatever its
    /// prior state.
    pub async fn consume(&self, token: &str) -> Result<bool> {
        self.repo.mark_used(&tokens::digest(token)).await
    }

    /// Spends `token` on a new password for `user_id` and revokes the user's
    /// sessions in the same step. Only one caller can ever win for a token;
    /// the others get `None`.
    pub async fn redeem(
        &self,
        token: &str,
        user_id: &str,
        password_hash: &str,
    ) -> Result<Option<u64>> {
        self.repo
            .redeem(&tokens::digest(token), user_id, password_hash, self.clock.now())
            .await
    }

    pub async fn sweep(&self) -> Result<u64> {
        self.repo.delete_expired(self.clock.now()).await
    }
}
