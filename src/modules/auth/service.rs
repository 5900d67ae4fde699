use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;
use validator::ValidateEmail;

use super::interface::{
    AuthError, PasswordResetRepository, RefreshSessionRepository, ResetNotifier, Result,
    SweepReport, TokenPair, UserRepository,
};
use super::lockout::{FailureOutcome, LockState, LockoutPolicy};
use super::model::User;
use super::reset::PasswordResetLifecycle;
use super::sessions::{IssuedSession, RefreshSessionStore};
use crate::config::AuthConfig;
use crate::services::clock::Clock;
use crate::services::hashing;
use crate::services::jwt::AccessTokenCodec;
use crate::services::password_policy::PasswordPolicy;

lazy_static! {
    static ref USERNAME: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,50}$").unwrap();
}

/// Orchestrates login, rotation, logout, password reset and per-request
/// identity resolution over the credential, session and reset stores.
pub struct Authenticator {
    users: Arc<dyn UserRepository>,
    sessions: RefreshSessionStore,
    resets: PasswordResetLifecycle,
    codec: AccessTokenCodec,
    lockout: LockoutPolicy,
    password_policy: PasswordPolicy,
    notifier: Arc<dyn ResetNotifier>,
    clock: Arc<dyn Clock>,
    // Verified against when the username is unknown, so both paths pay for
    // one Argon2 run.
    dummy_hash: String,
}

impl Authenticator {
    pub fn new(
        config: &AuthConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn RefreshSessionRepository>,
        resets: Arc<dyn PasswordResetRepository>,
        notifier: Arc<dyn ResetNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let dummy_hash = hashing::hash_password(&Uuid::new_v4().to_string())
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(Self {
            users,
            sessions: RefreshSessionStore::new(sessions, clock.clone(), config.refresh_token_ttl),
            resets: PasswordResetLifecycle::new(resets, clock.clone(), config.reset_token_ttl),
            codec: AccessTokenCodec::new(&config.signing_secret, config.access_token_ttl, clock.clone()),
            lockout: config.lockout_policy(),
            password_policy: config.password_policy.clone(),
            notifier,
            clock,
            dummy_hash,
        })
    }

    /// Builds the facade over one store that implements all three tables.
    pub fn with_store<S>(
        config: &AuthConfig,
        store: Arc<S>,
        notifier: Arc<dyn ResetNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self>
    where
        S: UserRepository + RefreshSessionRepository + PasswordResetRepository + 'static,
    {
        Self::new(
            config,
            store.clone(),
            store.clone(),
            store,
            notifier,
            clock,
        )
    }

    pub fn sessions(&self) -> &RefreshSessionStore {
        &self.sessions
    }

    pub fn resets(&self) -> &PasswordResetLifecycle {
        &self.resets
    }

    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let username = username.trim();
        let email = normalize_email(email);
        let email = email.as_str();

        if !USERNAME.is_match(username) {
            return Err(AuthError::Validation(
                "Username must be 3-50 characters of letters, digits, '_' or '-'".to_string(),
            ));
        }
        if !email.validate_email() {
            return Err(AuthError::Validation("Invalid email format".to_string()));
        }

        let violations = self.password_policy.validate(password, Some(username), Some(email));
        if !violations.is_empty() {
            return Err(AuthError::PasswordPolicyViolation(violations));
        }

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hashing::hash_password_blocking(password.to_string())
            .await
            .map_err(AuthError::Internal)?;

        let now = self.clock.now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            is_active: true,
            email_verified: false,
            failed_login_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };

        // Unique keys catch registrations racing past the checks above.
        self.users.create(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "user registered");

        Ok(user)
    }

    // =========================================================================
    // LOGIN / REFRESH / LOGOUT
    // =========================================================================

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let Some(user) = self.users.find_by_username(username.trim()).await? else {
            hashing::verify_password_blocking(password.to_string(), self.dummy_hash.clone()).await;
            return Err(AuthError::InvalidCredential);
        };

        let user = self.unlock_and_check(&user.id).await?;

        let verified =
            hashing::verify_password_blocking(password.to_string(), user.password_hash.clone()).await;

        if !verified {
            let outcome = self
                .users
                .record_failed_login(&user.id, &self.lockout, self.clock.now())
                .await?;

            return match outcome {
                FailureOutcome::Locked { until } => {
                    tracing::warn!(user_id = %user.id, %until, "account locked after repeated login failures");
                    Err(AuthError::AccountLocked)
                }
                FailureOutcome::Counted { remaining } => {
                    tracing::warn!(user_id = %user.id, remaining, "failed login");
                    Err(AuthError::InvalidCredential)
                }
            };
        }

        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        self.users
            .record_successful_login(&user.id, &self.lockout, self.clock.now())
            .await?;

        // Refused when a reset replaced the password after it was verified.
        let Some(issued) = self.sessions.open(&user).await? else {
            tracing::warn!(user_id = %user.id, "credential changed during login");
            return Err(AuthError::InvalidCredential);
        };
        let pair = self.token_pair(&user, issued)?;
        tracing::info!(user_id = %user.id, "login succeeded");

        self.sweep_sessions().await;
        Ok(pair)
    }

    /// Rotates a refresh token: the presented token is retired and a new
    /// pair is issued. Only one of several concurrent callers presenting the
    /// same token can win the rotation; the others get `InvalidCredential`,
    /// as does a caller overtaken by a password reset.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let session = self
            .sessions
            .validate(refresh_token)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        let user = self
            .users
            .find_by_id(&session.user_id)
            .await?
            .ok_or(AuthError::InvalidCredential)?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }
        let user = self.unlock_and_check(&user.id).await?;

        let Some(issued) = self.sessions.rotate(refresh_token, &user.id).await? else {
            tracing::warn!(user_id = %user.id, session_id = %session.id, "refresh token already rotated");
            return Err(AuthError::InvalidCredential);
        };

        let pair = self.token_pair(&user, issued)?;
        tracing::debug!(user_id = %user.id, session_id = %session.id, "refresh token rotated");

        self.sweep_sessions().await;
        Ok(pair)
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        if !self.sessions.revoke(refresh_token).await? {
            return Err(AuthError::InvalidCredential);
        }
        Ok(())
    }

    /// Identity behind an access token, re-checked against the store on
    /// every call.
    pub async fn current_user(&self, access_token: &str) -> Result<User> {
        let username = self
            .codec
            .parse(access_token)
            .map_err(|_| AuthError::InvalidCredential)?;

        let user = self
            .users
            .find_by_username(&username)
            .await?
            .ok_or(AuthError::InvalidCredential)?;
        if !user.is_active {
            return Err(AuthError::InactiveUser);
        }

        self.unlock_and_check(&user.id).await
    }

    // =========================================================================
    // PASSWORD RESET
    // =========================================================================

    /// Same outcome whether or not `email` belongs to an account.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        match self.users.find_by_email(&normalize_email(email)).await? {
            Some(user) if user.is_active => {
                let issued = self.resets.request(&user.id).await?;
                if let Err(e) = self
                    .notifier
                    .password_reset_issued(&user, &issued.token, issued.record.expires_at)
                    .await
                {
                    tracing::error!(user_id = %user.id, error = %e, "reset notification failed");
                }
            }
            _ => tracing::debug!("password reset requested for unknown or inactive account"),
        }

        if let Err(e) = self.resets.sweep().await {
            tracing::warn!(error = %e, "reset token sweep failed");
        }
        Ok(())
    }

    /// Sets a new password with a reset token and revokes every refresh
    /// session of the account, as one store operation.
    pub async fn complete_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        let record = self
            .resets
            .validate(token)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        let user = self
            .users
            .find_by_id(&record.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::InvalidCredential)?;

        let violations =
            self.password_policy
                .validate(new_password, Some(&user.username), Some(&user.email));
        if !violations.is_empty() {
            return Err(AuthError::PasswordPolicyViolation(violations));
        }

        let password_hash = hashing::hash_password_blocking(new_password.to_string())
            .await
            .map_err(AuthError::Internal)?;

        let Some(revoked) = self.resets.redeem(token, &user.id, &password_hash).await? else {
            return Err(AuthError::InvalidCredential);
        };

        tracing::info!(user_id = %user.id, revoked_sessions = revoked, "password reset completed");
        Ok(())
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Enables or disables an account. `false` if the user does not exist.
    pub async fn set_user_active(&self, user_id: &str, active: bool) -> Result<bool> {
        let found = self.users.set_active(user_id, active, self.clock.now()).await?;
        if found {
            tracing::info!(user_id, active, "account activity changed");
        }
        Ok(found)
    }

    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        Ok(SweepReport {
            sessions: self.sessions.sweep().await?,
            reset_tokens: self.resets.sweep().await?,
        })
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Clears a lapsed lock, then refuses if a lock is still in force.
    async fn unlock_and_check(&self, user_id: &str) -> Result<User> {
        let now = self.clock.now();
        let user = self
            .users
            .release_expired_lock(user_id, &self.lockout, now)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        match self.lockout.state(&user, now) {
            LockState::Locked { .. } => Err(AuthError::AccountLocked),
            LockState::Unlocked | LockState::LockExpired => Ok(user),
        }
    }

    fn token_pair(&self, user: &User, issued: IssuedSession) -> Result<TokenPair> {
        let access = self
            .codec
            .issue(&user.username)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: issued.token,
            expires_in: self.codec.get_access_token_duration_secs(),
            refresh_expires_at: issued.session.expires_at,
        })
    }

    async fn sweep_sessions(&self) {
        match self.sessions.sweep().await {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "swept expired refresh sessions"),
            Err(e) => tracing::warn!(error = %e, "refresh session sweep failed"),
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
