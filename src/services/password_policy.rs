use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::env;

lazy_static! {
    static ref COMMON_SEQUENCES: Regex =
        Regex::new(r"(?i)123456|654321|abcdef|qwerty|asdfgh|zxcvbn").unwrap();
}

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?`~";

const DEFAULT_FORBIDDEN_WORDS: &[&str] = &[
    "password", "admin", "root", "user", "guest", "test", "123456", "qwerty", "abc123",
    "welcome", "login", "pass", "secret", "master", "system", "default",
];

/// Password strength rules applied on registration and password reset.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    pub allow_whitespace: bool,
    pub max_consecutive_chars: usize,
    pub forbidden_words: Vec<String>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            allow_whitespace: false,
            max_consecutive_chars: 3,
            forbidden_words: DEFAULT_FORBIDDEN_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl PasswordPolicy {
    pub fn from_env() -> Result<Self, String> {
        let mut policy = Self::default();

        if let Ok(v) = env::var("PASSWORD_MIN_LENGTH") {
            policy.min_length = v
                .parse()
                .map_err(|_| format!("PASSWORD_MIN_LENGTH must be a number, got {v:?}"))?;
        }
        if let Ok(v) = env::var("PASSWORD_MAX_LENGTH") {
            policy.max_length = v
                .parse()
                .map_err(|_| format!("PASSWORD_MAX_LENGTH must be a number, got {v:?}"))?;
        }
        if policy.min_length == 0 || policy.min_length > policy.max_length {
            return Err("PASSWORD_MIN_LENGTH must be between 1 and PASSWORD_MAX_LENGTH".to_string());
        }

        Ok(policy)
    }

    /// Every rule `password` breaks. Empty means acceptable.
    pub fn validate(&self, password: &str, username: Option<&str>, email: Option<&str>) -> Vec<String> {
        let mut errors = Vec::new();
        let length = password.chars().count();

        if length < self.min_length {
            errors.push(format!("Password must be at least {} characters long", self.min_length));
        }
        if length > self.max_length {
            errors.push(format!("Password must not exceed {} characters", self.max_length));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            errors.push("Password must contain at least 1 uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
            errors.push("Password must contain at least 1 lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least 1 digit".to_string());
        }
        if self.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
            errors.push("Password must contain at least 1 special character".to_string());
        }
        if !self.allow_whitespace && password.chars().any(char::is_whitespace) {
            errors.push("Password cannot contain whitespace characters".to_string());
        }
        if longest_run(password) > self.max_consecutive_chars {
            errors.push(format!(
                "Password cannot have more than {} consecutive identical characters",
                self.max_consecutive_chars
            ));
        }
        if COMMON_SEQUENCES.is_match(password) {
            errors.push("Password contains a common character sequence".to_string());
        }

        let lowered = password.to_lowercase();
        if let Some(word) = self.forbidden_words.iter().find(|w| lowered.contains(w.as_str())) {
            errors.push(format!("Password cannot contain the word '{word}'"));
        }

        if let Some(username) = username.filter(|u| u.len() >= 3) {
            if lowered.contains(&username.to_lowercase()) {
                errors.push("Password cannot contain your username".to_string());
            }
        }
        if let Some(local) = email.and_then(|e| e.split('@').next()).filter(|l| l.len() >= 3) {
            if lowered.contains(&local.to_lowercase()) {
                errors.push("Password cannot contain your email address".to_string());
            }
        }

        errors
    }

    pub fn describe(&self) -> Vec<String> {
        let mut rules = vec![format!(
            "Between {} and {} characters",
            self.min_length, self.max_length
        )];
        if self.require_uppercase {
            rules.push("At least 1 uppercase letter".to_string());
        }
        if self.require_lowercase {
            rules.push("At least 1 lowercase letter".to_string());
        }
        if self.require_digit {
            rules.push("At least 1 digit".to_string());
        }
        if self.require_special {
            rules.push("At least 1 special character".to_string());
        }
        if !self.allow_whitespace {
            rules.push("No whitespace".to_string());
        }
        rules.push(format!(
            "No more than {} identical characters in a row",
            self.max_consecutive_chars
        ));
        rules.push("No common words or keyboard sequences".to_string());
        rules.push("Must not contain your username or email".to_string());
        rules
    }
}

fn longest_run(s: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;

    for c in s.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }

    longest
}
