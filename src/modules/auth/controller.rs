use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::modules::auth::{
    extractor::CurrentUser,
    interface::AuthError,
    schema::{
        CleanupResponse, ForgotPasswordRequest, LoginRequest, LogoutRequest, MessageResponse,
        PasswordPolicyResponse, RefreshTokenRequest, RegisterRequest, RegisterResponse,
        ResetPasswordRequest, TokenResponse, UserResponse,
    },
};

const RESET_REQUESTED: &str =
    "If an account with that email exists, a password reset link has been sent.";

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    if let Err(e) = req.validate() {
        return Err(AuthError::Validation(e.to_string()));
    }

    if req.password != req.password_confirm {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }

    let user = state
        .auth
        .register(&req.username, &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user: user.into() }),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AuthError> {
    let pair = state.auth.login(&req.username, &req.password).await?;
    Ok((StatusCode::OK, Json(pair.into())))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AuthError> {
    let pair = state.auth.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(pair.into())))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    state.auth.logout(&req.refresh_token).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Successfully logged out",
        }),
    ))
}

pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    state.auth.request_password_reset(&req.email).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: RESET_REQUESTED,
        }),
    ))
}

pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    if req.new_password != req.password_confirm {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }

    state
        .auth
        .complete_password_reset(&req.token, &req.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password has been reset. Please log in with your new password.",
        }),
    ))
}

pub async fn password_policy(State(state): State<Arc<AppState>>) -> Json<PasswordPolicyResponse> {
    let policy = state.auth.password_policy();
    Json(PasswordPolicyResponse {
        min_length: policy.min_length,
        max_length: policy.max_length,
        rules: policy.describe(),
    })
}

pub async fn cleanup_sessions(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<CleanupResponse>), AuthError> {
    let report = state.auth.sweep_expired().await?;
    tracing::info!(
        requested_by = %user.id,
        sessions = report.sessions,
        reset_tokens = report.reset_tokens,
        "manual cleanup"
    );

    Ok((
        StatusCode::OK,
        Json(CleanupResponse {
            sessions_removed: report.sessions,
            reset_tokens_removed: report.reset_tokens,
        }),
    ))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}
