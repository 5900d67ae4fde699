use adventure_auth::modules::auth::{interface::UserRepository, AuthError};
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use crate::common::{test_email, test_password, TestContext};

#[tokio::test]
async fn refresh_rotates_the_token() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let (_, refresh_token) = ctx.login_tokens("alice", test_password()).await;

    let response = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let rotated = body["refresh_token"].as_str().unwrap();
    assert_ne!(rotated, refresh_token);

    // The new access token is accepted right away.
    ctx.server
        .get("/users/me")
        .authorization_bearer(body["access_token"].as_str().unwrap())
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn replayed_refresh_token_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let (_, refresh_token) = ctx.login_tokens("alice", test_password()).await;

    ctx.server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await
        .assert_status_ok();

    let replay = ctx
        .server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": &refresh_token }))
        .await;

    replay.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = replay.json();
    assert_eq!(body["error"], "invalid_credential");
}

#[tokio::test]
async fn unknown_refresh_token_is_rejected() {
    let ctx = TestContext::new().await;

    ctx.server
        .post("/auth/refresh")
        .json(&json!({ "refresh_token": "not-a-real-token" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_expires_after_its_ttl() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let (_, refresh_token) = ctx.login_tokens("alice", test_password()).await;

    ctx.clock.advance(Duration::days(7) + Duration::seconds(1));

    assert!(matches!(
        ctx.auth.refresh(&refresh_token).await,
        Err(AuthError::InvalidCredential)
    ));
}

#[tokio::test]
async fn refresh_for_disabled_account_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let (_, refresh_token) = ctx.login_tokens("alice", test_password()).await;

    let user = ctx.store.find_by_username("alice").await.unwrap().unwrap();
    ctx.auth.set_user_active(&user.id, false).await.unwrap();

    assert!(matches!(
        ctx.auth.refresh(&refresh_token).await,
        Err(AuthError::InactiveUser)
    ));
}

#[tokio::test]
async fn refresh_for_locked_account_is_rejected() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let (_, refresh_token) = ctx.login_tokens("alice", test_password()).await;

    for _ in 0..5 {
        let _ = ctx.auth.login("alice", "Wr0ng!Password").await;
    }

    assert!(matches!(
        ctx.auth.refresh(&refresh_token).await,
        Err(AuthError::AccountLocked)
    ));

    // Once the lock lapses the untouched session still rotates.
    ctx.clock.advance(Duration::minutes(15));
    assert!(ctx.auth.refresh(&refresh_token).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_with_one_token_has_a_single_winner() {
    let ctx = TestContext::new().await;
    ctx.register("alice", &test_email()).await;
    let (_, refresh_token) = ctx.login_tokens("alice", test_password()).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let auth = ctx.auth.clone();
            let token = refresh_token.clone();
            tokio::spawn(async move { auth.refresh(&token).await })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let mut winners = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, AuthError::InvalidCredential)),
        }
    }

    assert_eq!(winners, 1);
}
