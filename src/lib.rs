pub mod config;
pub mod modules;
pub mod services;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use modules::auth::{auth_routes, user_routes, Authenticator};
use services::security::security_headers;

pub struct AppState {
    pub auth: Arc<Authenticator>,
}

pub fn create_app(auth: Arc<Authenticator>) -> Router {
    let state = Arc::new(AppState { auth });

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .nest("/auth", auth_routes())
        .nest("/users", user_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(security_headers))
                .layer(RequestBodyLimitLayer::new(1024 * 16)), // 16KB max body
        )
        .with_state(state)
}

async fn root() -> &'static str {
    "Adventure Auth API"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
