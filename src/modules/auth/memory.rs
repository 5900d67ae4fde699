//! Process-local store implementing all three repositories.
//!
//! A single async mutex guards every table, so each repository call is one
//! atomic step, matching what the MySQL implementation gets from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::interface::{
    AuthError, PasswordResetRepository, RefreshSessionRepository, Result, UserRepository,
};
use super::lockout::{FailureOutcome, LockoutPolicy};
use super::model::{PasswordResetToken, RefreshSession, User};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    sessions: HashMap<String, RefreshSession>,
    resets: HashMap<String, PasswordResetToken>,
}

impl Tables {
    fn insert_session(&mut self, session: &RefreshSession) -> Result<()> {
        if self.sessions.contains_key(&session.token_hash) {
            return Err(AuthError::Internal("refresh token collision".to_string()));
        }
        self.sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.lock().await;

        if tables
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(AuthError::UsernameTaken);
        }
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AuthError::EmailTaken);
        }

        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.lock().await.users.get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn release_expired_lock(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let mut tables = self.tables.lock().await;
        let Some(user) = tables.users.get_mut(user_id) else {
            return Ok(None);
        };
        policy.release_if_expired(user, now);
        Ok(Some(user.clone()))
    }

    async fn record_failed_login(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or(AuthError::InvalidCredential)?;
        Ok(policy.register_failure(user, now))
    }

    async fn record_successful_login(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or(AuthError::InvalidCredential)?;
        policy.register_success(user, now);
        Ok(())
    }

    async fn set_active(&self, user_id: &str, active: bool, now: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(user_id) {
            Some(user) => {
                user.is_active = active;
                user.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RefreshSessionRepository for MemoryStore {
    async fn create(&self, session: &RefreshSession, password_hash: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let current = tables
            .users
            .get(&session.user_id)
            .is_some_and(|u| u.is_active && u.password_hash == password_hash);
        if !current {
            return Ok(false);
        }

        tables.insert_session(session)?;
        Ok(true)
    }

    async fn rotate(
        &self,
        old_token_hash: &str,
        session: &RefreshSession,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let user_active = tables
            .users
            .get(&session.user_id)
            .is_some_and(|u| u.is_active);

        match tables.sessions.get_mut(old_token_hash) {
            Some(old) if user_active && old.user_id == session.user_id && old.is_valid_at(now) => {
                old.is_active = false;
            }
            _ => return Ok(false),
        }

        tables.insert_session(session)?;
        Ok(true)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>> {
        Ok(self.tables.lock().await.sessions.get(token_hash).cloned())
    }

    async fn deactivate(&self, token_hash: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get_mut(token_hash) {
            Some(session) if session.is_active => {
                session.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl PasswordResetRepository for MemoryStore {
    async fn issue(&self, token: &PasswordResetToken, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        if tables.resets.contains_key(&token.token_hash) {
            return Err(AuthError::Internal("reset token collision".to_string()));
        }

        let mut superseded = 0;
        for live in tables
            .resets
            .values_mut()
            .filter(|r| r.user_id == token.user_id && r.is_valid_at(now))
        {
            live.is_used = true;
            superseded += 1;
        }

        tables.resets.insert(token.token_hash.clone(), token.clone());
        Ok(superseded)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>> {
        Ok(self.tables.lock().await.resets.get(token_hash).cloned())
    }

    async fn mark_used(&self, token_hash: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.resets.get_mut(token_hash) {
            Some(record) => {
                record.is_used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn redeem(
        &self,
        token_hash: &str,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(user_id) {
            return Ok(None);
        }

        match tables.resets.get_mut(token_hash) {
            Some(record) if record.user_id == user_id && record.is_valid_at(now) => {
                record.is_used = true;
            }
            _ => return Ok(None),
        }

        if let Some(user) = tables.users.get_mut(user_id) {
            user.password_hash = password_hash.to_string();
            user.failed_login_attempts = 0;
            user.locked_until = None;
            user.updated_at = now;
        }

        let mut revoked = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.is_active)
        {
            session.is_active = false;
            revoked += 1;
        }
        Ok(Some(revoked))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.resets.len();
        tables.resets.retain(|_, r| r.expires_at > now);
        Ok((before - tables.resets.len()) as u64)
    }
}
