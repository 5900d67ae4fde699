use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;
use super::controller;

pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(controller::register))
        .route("/login", post(controller::login))
        .route("/refresh", post(controller::refresh))
        .route("/logout", post(controller::logout))
        .route("/forgot-password", post(controller::forgot_password))
        .route("/reset-password", post(controller::reset_password))
        .route("/password-policy", get(controller::password_policy))
        .route("/cleanup-sessions", post(controller::cleanup_sessions))
}

pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(controller::me))
}
