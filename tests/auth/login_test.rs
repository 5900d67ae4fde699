use adventure_auth::modules::auth::{interface::UserRepository, AuthError};
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use crate::common::{other_password, test_email, test_password, TestContext};

#[tokio::test]
async fn login_with_valid_credentials_returns_tokens() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({
            "username": "alice",
            "password": test_password()
        }))
        .await;

    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 30 * 60);
    assert_eq!(response.header("cache-control"), "no-store");
}

#[tokio::test]
async fn login_records_last_login() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    ctx.login_tokens("alice", test_password()).await;

    let user = ctx.store.find_by_username("alice").await.unwrap().unwrap();
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_identical() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    let wrong_password = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "username": "alice", "password": other_password() }))
        .await;
    let unknown_user = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "username": "nobody", "password": other_password() }))
        .await;

    wrong_password.assert_status(StatusCode::UNAUTHORIZED);
    unknown_user.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.text(), unknown_user.text());
}

#[tokio::test]
async fn login_with_missing_password_returns_unprocessable() {
    let ctx = TestContext::new().await;

    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "username": "alice" }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn login_returns_different_tokens_each_time() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    let first = ctx.login_tokens("alice", test_password()).await;
    let second = ctx.login_tokens("alice", test_password()).await;

    assert_ne!(first.0, second.0);
    assert_ne!(first.1, second.1);
}

#[tokio::test]
async fn lockout_scenario_over_http() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    for attempt in 1..=5 {
        let response = ctx
            .server
            .post("/auth/login")
            .json(&json!({ "username": "alice", "password": other_password() }))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = response.json();
        let expected = if attempt < 5 { "invalid_credential" } else { "account_locked" };
        assert_eq!(body["error"], expected, "attempt {attempt}");
    }

    // The right password does not get through while the lock holds.
    let response = ctx
        .server
        .post("/auth/login")
        .json(&json!({ "username": "alice", "password": test_password() }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "account_locked");

    ctx.clock.advance(Duration::minutes(15));

    ctx.login_tokens("alice", test_password()).await;
    let user = ctx.store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.locked_until.is_none());
}

#[tokio::test]
async fn lock_still_holds_one_second_before_expiry() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    for _ in 0..5 {
        let _ = ctx.auth.login("alice", other_password()).await;
    }

    ctx.clock.advance(Duration::minutes(15) - Duration::seconds(1));
    assert!(matches!(
        ctx.auth.login("alice", test_password()).await,
        Err(AuthError::AccountLocked)
    ));

    ctx.clock.advance(Duration::seconds(1));
    assert!(ctx.auth.login("alice", test_password()).await.is_ok());
}

#[tokio::test]
async fn successful_login_forgives_earlier_failures() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    for _ in 0..4 {
        let _ = ctx.auth.login("alice", other_password()).await;
    }
    ctx.auth.login("alice", test_password()).await.unwrap();

    let user = ctx.store.find_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.failed_login_attempts, 0);

    // A fresh budget of attempts: four more failures still do not lock.
    for _ in 0..4 {
        assert!(matches!(
            ctx.auth.login("alice", other_password()).await,
            Err(AuthError::InvalidCredential)
        ));
    }
}

#[tokio::test]
async fn disabled_account_cannot_log_in() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let user = ctx.store.find_by_username("alice").await.unwrap().unwrap();

    assert!(ctx.auth.set_user_active(&user.id, false).await.unwrap());

    assert!(matches!(
        ctx.auth.login("alice", test_password()).await,
        Err(AuthError::InactiveUser)
    ));
}

#[tokio::test]
async fn login_ignores_surrounding_whitespace_in_username() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;

    ctx.login_tokens("  alice ", test_password()).await;
}
