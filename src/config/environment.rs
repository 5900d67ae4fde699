use chrono::Duration;
use std::env;
use std::str::FromStr;

use crate::modules::auth::lockout::LockoutPolicy;
use crate::services::password_policy::PasswordPolicy;
use crate::services::tokens;

/// Tunables of the authentication core. Injected into the facade and the
/// access-token codec; nothing reads these from globals.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub signing_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub max_login_attempts: u32,
    pub lockout_duration: Duration,
    pub reset_token_ttl: Duration,
    pub password_policy: PasswordPolicy,
}

impl Default for AuthConfig {
    /// Operable defaults with a freshly generated secret. Tokens signed with
    /// it do not survive a restart.
    fn default() -> Self {
        Self {
            signing_secret: tokens::new_signing_secret(),
            access_token_ttl: Duration::minutes(30),
            refresh_token_ttl: Duration::days(7),
            max_login_attempts: 5,
            lockout_duration: Duration::minutes(15),
            reset_token_ttl: Duration::hours(1),
            password_policy: PasswordPolicy::default(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let signing_secret = match env::var("SECRET_KEY") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                tracing::warn!(
                    "SECRET_KEY not set; generated an ephemeral signing secret, access tokens will not survive a restart"
                );
                defaults.signing_secret
            }
        };

        let access_minutes: i64 = positive_var("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?;
        let refresh_days: i64 = positive_var("REFRESH_TOKEN_EXPIRE_DAYS", 7)?;
        let max_login_attempts: u32 = positive_var("MAX_LOGIN_ATTEMPTS", 5)?;
        let lockout_minutes: i64 = positive_var("LOCKOUT_DURATION_MINUTES", 15)?;
        let reset_hours: i64 = positive_var("PASSWORD_RESET_TOKEN_EXPIRE_HOURS", 1)?;

        Ok(Self {
            signing_secret,
            access_token_ttl: Duration::minutes(access_minutes),
            refresh_token_ttl: Duration::days(refresh_days),
            max_login_attempts,
            lockout_duration: Duration::minutes(lockout_minutes),
            reset_token_ttl: Duration::hours(reset_hours),
            password_policy: PasswordPolicy::from_env()?,
        })
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.max_login_attempts,
            duration: self.lockout_duration,
        }
    }
}

fn positive_var<T>(name: &str, default: T) -> Result<T, String>
where
    T: FromStr + PartialOrd + Default,
{
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };

    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| format!("{name} must be a number, got {raw:?}"))?;
    if value <= T::default() {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(value)
}

/// Environment configuration
/// Loads and validates environment variables
pub struct Config {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub auth: AuthConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            auth: AuthConfig::from_env()?,
        })
    }
}
