use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::clock::Clock;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // username
    pub exp: i64,           // expiration time
    pub iat: i64,           // issued at
    pub jti: String,        // unique token id
}

/// Any reason a presented access token is unusable. Deliberately carries no
/// detail: forged, malformed and expired tokens look the same to callers.
#[derive(Debug, thiserror::Error)]
#[error("invalid access token")]
pub struct InvalidAccessToken;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless HS256 access tokens. Expiry is checked against the injected
/// clock rather than the wall clock inside jsonwebtoken.
#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_duration: Duration,
    clock: Arc<dyn Clock>,
}

impl AccessTokenCodec {
    pub fn new(secret: &str, access_token_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_token_duration,
            clock,
        }
    }

    pub fn issue(&self, subject: &str) -> Result<AccessToken, jsonwebtoken::errors::Error> {
        self.issue_with_ttl(subject, self.access_token_duration)
    }

    pub fn issue_with_ttl(
        &self,
        subject: &str,
        ttl: Duration,
    ) -> Result<AccessToken, jsonwebtoken::errors::Error> {
        let now = self.clock.now();
        let expires_at = now + ttl;

        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(AccessToken { token, expires_at })
    }

    /// Returns the subject of a genuine, unexpired token.
    pub fn parse(&self, token: &str) -> Result<String, InvalidAccessToken> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| InvalidAccessToken)?;

        if data.claims.exp <= self.clock.now().timestamp() || data.claims.sub.is_empty() {
            return Err(InvalidAccessToken);
        }

        Ok(data.claims.sub)
    }

    pub fn get_access_token_duration_secs(&self) -> i64 {
        self.access_token_duration.num_seconds()
    }
}
