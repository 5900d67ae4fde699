use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

// Tuned parameters: faster but still secure
// m=8MB, t=2 iterations, p=1 parallelism
fn get_argon2() -> Result<Argon2<'static>, argon2::Error> {
    let params = Params::new(8192, 2, 1, None)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Salted Argon2id digest in PHC string form. Two calls on the same input
/// never produce the same digest.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = get_argon2()?;
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Checks `password` against a stored digest.
///
/// A malformed digest is a mismatch, not an error: callers only ever need
/// the yes/no answer. The final comparison inside argon2 is constant-time.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    let Ok(argon2) = get_argon2() else {
        return false;
    };
    argon2.verify_password(password.as_bytes(), &parsed_hash).is_ok()
}

/// Runs [`hash_password`] on the blocking pool so request workers are not
/// stalled by the key-derivation work.
pub async fn hash_password_blocking(password: String) -> Result<String, String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

pub async fn verify_password_blocking(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}
