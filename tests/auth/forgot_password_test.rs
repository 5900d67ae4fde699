use adventure_auth::modules::auth::interface::UserRepository;
use axum::http::StatusCode;
use serde_json::json;

use crate::common::{test_email, TestContext};

#[tokio::test]
async fn known_and_unknown_emails_get_the_same_answer() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register("alice", &email).await;

    let known = ctx
        .server
        .post("/auth/forgot-password")
        .json(&json!({ "email": &email }))
        .await;
    let unknown = ctx
        .server
        .post("/auth/forgot-password")
        .json(&json!({ "email": "nobody@example.com" }))
        .await;

    known.assert_status_ok();
    unknown.assert_status_ok();
    assert_eq!(known.text(), unknown.text());

    assert_eq!(ctx.notifier.sent_count(), 1);
    assert!(ctx.notifier.last_token_for(&email).is_some());
}

#[tokio::test]
async fn disabled_accounts_get_no_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register("alice", &email).await;

    let user = ctx.store.find_by_username("alice").await.unwrap().unwrap();
    ctx.auth.set_user_active(&user.id, false).await.unwrap();

    ctx.server
        .post("/auth/forgot-password")
        .json(&json!({ "email": &email }))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(ctx.notifier.sent_count(), 0);
}

#[tokio::test]
async fn reset_token_is_url_safe() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register("alice", &email).await;

    ctx.auth.request_password_reset(&email).await.unwrap();

    let token = ctx.notifier.last_token_for(&email).unwrap();
    assert!(token.len() >= 43);
    assert!(token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[tokio::test]
async fn a_new_request_invalidates_the_previous_token() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register("alice", &email).await;

    ctx.auth.request_password_reset(&email).await.unwrap();
    let first = ctx.notifier.last_token_for(&email).unwrap();
    ctx.auth.request_password_reset(&email).await.unwrap();
    let second = ctx.notifier.last_token_for(&email).unwrap();

    assert_ne!(first, second);
    assert!(ctx.auth.resets().validate(&first).await.unwrap().is_none());
    assert!(ctx.auth.resets().validate(&second).await.unwrap().is_some());
}

#[tokio::test]
async fn email_lookup_ignores_case_and_whitespace() {
    let ctx = TestContext::new().await;
    let email = test_email();
    ctx.register("alice", &email).await;

    ctx.auth
        .request_password_reset(&format!(" {} ", email.to_uppercase()))
        .await
        .unwrap();

    assert!(ctx.notifier.last_token_for(&email).is_some());
}
