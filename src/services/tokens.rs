//! Opaque bearer secrets.
//!
//! Refresh and reset tokens leave the process exactly once, in the response
//! that minted them. Storage only ever sees [`digest`] of the token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const RESET_TOKEN_BYTES: usize = 32;
const SECRET_BYTES: usize = 32;

/// 122 bits of randomness from the OS generator.
pub fn new_refresh_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_reset_token() -> String {
    random_urlsafe(RESET_TOKEN_BYTES)
}

/// Signing secret for deployments that did not configure one.
pub fn new_signing_secret() -> String {
    random_urlsafe(SECRET_BYTES)
}

/// SHA-256 hex digest used as the lookup key for a bearer token.
pub fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
