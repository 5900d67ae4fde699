use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool, Transaction};

use super::interface::{
    AuthError, PasswordResetRepository, RefreshSessionRepository, Result, UserRepository,
};
use super::lockout::{FailureOutcome, LockoutPolicy};
use super::model::{PasswordResetToken, RefreshSession, User};

/// MySQL-backed credential, session and reset-token tables.
///
/// Lockout transitions, session minting and rotation, reset issuance and
/// reset redemption each run in a transaction holding the user row
/// (`SELECT ... FOR UPDATE`); conditional `UPDATE`s inside them decide the
/// winner by affected-row count. Logout is a single conditional `UPDATE`.
#[derive(Clone)]
pub struct AuthCrud {
    pool: Pool<MySql>,
}

impl AuthCrud {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn lock_user(tx: &mut Transaction<'_, MySql>, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ? FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(user)
    }

    async fn insert_session(tx: &mut Transaction<'_, MySql>, session: &RefreshSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_sessions (id, user_id, token_hash, expires_at, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.is_active)
        .bind(session.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn store_lockout(tx: &mut Transaction<'_, MySql>, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = ?, locked_until = ?, last_login = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn map_unique_violation(e: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            // MySQL only reports the key name inside the message.
            return if db.message().contains("email") {
                AuthError::EmailTaken
            } else {
                AuthError::UsernameTaken
            };
        }
    }
    AuthError::Database(e)
}

#[async_trait]
impl UserRepository for AuthCrud {
    async fn create(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, is_active, email_verified,
                               failed_login_attempts, locked_until, last_login, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.email_verified)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn release_expired_lock(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let mut tx = self.pool.begin().await?;
        let Some(mut user) = Self::lock_user(&mut tx, user_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        if policy.release_if_expired(&mut user, now) {
            Self::store_lockout(&mut tx, &user).await?;
        }
        tx.commit().await?;

        Ok(Some(user))
    }

    async fn record_failed_login(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut user = Self::lock_user(&mut tx, user_id)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        let outcome = policy.register_failure(&mut user, now);
        Self::store_lockout(&mut tx, &user).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn record_successful_login(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let mut user = Self::lock_user(&mut tx, user_id)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        policy.register_success(&mut user, now);
        Self::store_lockout(&mut tx, &user).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn set_active(&self, user_id: &str, active: bool, now: DateTime<Utc>) -> Result<bool> {
        // The connection reports matched rows, so an unchanged flag still counts.
        let result = sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RefreshSessionRepository for AuthCrud {
    async fn create(&self, session: &RefreshSession, password_hash: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_user(&mut tx, &session.user_id)
            .await?
            .is_some_and(|u| u.is_active && u.password_hash == password_hash);
        if !current {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_session(&mut tx, session).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn rotate(
        &self,
        old_token_hash: &str,
        session: &RefreshSession,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let active = Self::lock_user(&mut tx, &session.user_id)
            .await?
            .is_some_and(|u| u.is_active);
        if !active {
            tx.rollback().await?;
            return Ok(false);
        }

        let retired = sqlx::query(
            r#"
            UPDATE refresh_sessions
            SET is_active = FALSE
            WHERE token_hash = ? AND user_id = ? AND is_active = TRUE AND expires_at > ?
            "#,
        )
        .bind(old_token_hash)
        .bind(&session.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if retired != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_session(&mut tx, session).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>> {
        let session =
            sqlx::query_as::<_, RefreshSession>("SELECT * FROM refresh_sessions WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn deactivate(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_sessions SET is_active = FALSE WHERE token_hash = ? AND is_active = TRUE",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PasswordResetRepository for AuthCrud {
    async fn issue(&self, token: &PasswordResetToken, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent requests for the same user.
        Self::lock_user(&mut tx, &token.user_id)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        let superseded = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET is_used = TRUE
            WHERE user_id = ? AND is_used = FALSE AND expires_at > ?
            "#,
        )
        .bind(&token.user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, is_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.is_used)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(superseded)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>> {
        let token = sqlx::query_as::<_, PasswordResetToken>(
            "SELECT * FROM password_reset_tokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    async fn mark_used(&self, token_hash: &str) -> Result<bool> {
        // Matched rows are reported, so already-used tokens still count.
        let result =
            sqlx::query("UPDATE password_reset_tokens SET is_used = TRUE WHERE token_hash = ?")
                .bind(token_hash)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn redeem(
        &self,
        token_hash: &str,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;
        if Self::lock_user(&mut tx, user_id).await?.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let claimed = sqlx::query(
            r#"
            UPDATE password_reset_tokens
            SET is_used = TRUE
            WHERE token_hash = ? AND user_id = ? AND is_used = FALSE AND expires_at > ?
            "#,
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, failed_login_attempts = 0, locked_until = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let revoked = sqlx::query(
            "UPDATE refresh_sessions SET is_active = FALSE WHERE user_id = ? AND is_active = TRUE",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(Some(revoked))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
