use adventure_auth::config::AuthConfig;
use adventure_auth::modules::auth::{
    interface::{ResetNotifier, Result},
    memory::MemoryStore,
    model::User,
    Authenticator,
};
use adventure_auth::services::clock::ManualClock;
use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Keeps every reset token handed to the mailer so tests can play the
/// part of the user reading their inbox.
#[derive(Default)]
pub struct CapturingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl CapturingNotifier {
    pub fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ResetNotifier for CapturingNotifier {
    async fn password_reset_issued(&self, user: &User, token: &str, _expires_at: DateTime<Utc>) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), token.to_string()));
        Ok(())
    }
}

// Allow dead_code for utilities used by other test files
#[allow(dead_code)]
pub struct TestContext {
    pub server: TestServer,
    pub auth: Arc<Authenticator>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<CapturingNotifier>,
}

#[allow(dead_code)]
impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let notifier = Arc::new(CapturingNotifier::default());

        let auth = Arc::new(
            Authenticator::with_store(&config, store.clone(), notifier.clone(), clock.clone())
                .expect("Failed to build authenticator"),
        );

        let app = adventure_auth::create_app(auth.clone());
        let server = TestServer::new(app).expect("Failed to create test server");

        Self {
            server,
            auth,
            store,
            clock,
            notifier,
        }
    }

    pub async fn register(&self, username: &str, email: &str) {
        self.server
            .post("/auth/register")
            .json(&json!({
                "username": username,
                "email": email,
                "password": test_password(),
                "password_confirm": test_password()
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    pub async fn login_tokens(&self, username: &str, password: &str) -> (String, String) {
        let response = self
            .server
            .post("/auth/login")
            .json(&json!({
                "username": username,
                "password": password
            }))
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}

#[allow(dead_code)]
pub fn test_config() -> AuthConfig {
    AuthConfig {
        signing_secret: "test-secret-key-for-testing-only".to_string(),
        ..AuthConfig::default()
    }
}

// Helper to generate unique test email
#[allow(dead_code)]
pub fn test_email() -> String {
    format!("test_{}@example.com", uuid::Uuid::new_v4())
}

// Helper to generate test password
#[allow(dead_code)]
pub fn test_password() -> &'static str {
    "Gr@niteHarbor91"
}

#[allow(dead_code)]
pub fn other_password() -> &'static str {
    "Qu!etMeadow58"
}
