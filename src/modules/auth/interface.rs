use async_trait::async_trait;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};

use super::lockout::{FailureOutcome, LockoutPolicy};
use super::model::{PasswordResetToken, RefreshSession, User};
use super::schema::ErrorResponse;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

pub type Result<T> = std::result::Result<T, AuthError>;

/// Credential store. The lockout methods are atomic read-modify-writes:
/// implementations hold the user row (or the store) for the duration of the
/// transition.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    /// Clears a lock whose time has passed and returns the user as stored
    /// afterwards.
    async fn release_expired_lock(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<User>>;
    async fn record_failed_login(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome>;
    async fn record_successful_login(
        &self,
        user_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<()>;
    async fn set_active(&self, user_id: &str, active: bool, now: DateTime<Utc>) -> Result<bool>;
}

/// Session minting holds the owning user (row lock or store mutex) so it
/// serializes against a password reset of the same account.
#[async_trait]
pub trait RefreshSessionRepository: Send + Sync {
    /// Stores `session` only if its user is active and still has
    /// `password_hash`. `false` when the credential changed in the meantime.
    async fn create(&self, session: &RefreshSession, password_hash: &str) -> Result<bool>;
    /// Deactivates the active, unexpired session `old_token_hash` and stores
    /// `session` in its place, as one step. `false` when the old session was
    /// no longer usable or its user is inactive.
    async fn rotate(
        &self,
        old_token_hash: &str,
        session: &RefreshSession,
        now: DateTime<Utc>,
    ) -> Result<bool>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<RefreshSession>>;
    /// Flips an active session to inactive. `false` when no active session
    /// matched, which makes this the serialization point for rotation.
    async fn deactivate(&self, token_hash: &str) -> Result<bool>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait PasswordResetRepository: Send + Sync {
    /// Marks every live token of `token.user_id` used and stores `token`, as
    /// one atomic step. Returns how many tokens were invalidated.
    async fn issue(&self, token: &PasswordResetToken, now: DateTime<Utc>) -> Result<u64>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<PasswordResetToken>>;
    /// Sets `is_used`; `true` whenever the token exists.
    async fn mark_used(&self, token_hash: &str) -> Result<bool>;
    /// Completes a reset as one atomic step: claims the unused, unexpired
    /// token of `user_id`, stores the new hash, clears lockout state and
    /// deactivates every session of the user. `None` if the claim lost;
    /// otherwise the number of sessions revoked.
    async fn redeem(
        &self,
        token_hash: &str,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Delivery of reset tokens to the account's mailbox.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn password_reset_issued(&self, user: &User, token: &str, expires_at: DateTime<Utc>) -> Result<()>;
}

/// Default notifier for deployments without mail delivery. Records that a
/// reset was issued; the token itself is never written to the log.
#[derive(Debug, Default)]
pub struct LogResetNotifier;

#[async_trait]
impl ResetNotifier for LogResetNotifier {
    async fn password_reset_issued(&self, user: &User, _token: &str, expires_at: DateTime<Utc>) -> Result<()> {
        tracing::info!(user_id = %user.id, %expires_at, "password reset token issued");
        Ok(())
    }
}

// =============================================================================
// SERVICE RESULT TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub reset_tokens: u64,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredential,

    #[error("Account temporarily locked due to too many failed login attempts")]
    AccountLocked,

    #[error("Inactive user")]
    InactiveUser,

    #[error("Password does not meet security requirements")]
    PasswordPolicyViolation(Vec<String>),

    #[error("Username already registered")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::AccountLocked => StatusCode::UNAUTHORIZED,
            Self::InactiveUser => StatusCode::UNAUTHORIZED,
            Self::PasswordPolicyViolation(_) => StatusCode::BAD_REQUEST,
            Self::UsernameTaken => StatusCode::CONFLICT,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::AccountLocked => "account_locked",
            Self::InactiveUser => "inactive_user",
            Self::PasswordPolicyViolation(_) => "password_policy_violation",
            Self::UsernameTaken => "username_taken",
            Self::EmailTaken => "email_taken",
            Self::Validation(_) => "validation_error",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "auth store failure");
                ErrorResponse::new(self.code())
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "auth internal failure");
                ErrorResponse::new(self.code())
            }
            Self::PasswordPolicyViolation(errors) => {
                ErrorResponse::with_message(self.code(), self.to_string()).with_errors(errors.clone())
            }
            _ => ErrorResponse::with_message(self.code(), self.to_string()),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
