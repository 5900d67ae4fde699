pub mod clock;
pub mod hashing;
pub mod jwt;
pub mod password_policy;
pub mod security;
pub mod tokens;
