use adventure_auth::config::{environment::Config, init_db};
use adventure_auth::modules::auth::{
    crud::AuthCrud, interface::LogResetNotifier, memory::MemoryStore, Authenticator,
};
use adventure_auth::services::clock::SystemClock;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adventure_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let clock = Arc::new(SystemClock);
    let notifier = Arc::new(LogResetNotifier);

    let auth = match &config.database_url {
        Some(url) => {
            let db = init_db(url).await?;
            tracing::info!("Connected to MySQL");
            Authenticator::with_store(&config.auth, Arc::new(AuthCrud::new(db)), notifier, clock)?
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            Authenticator::with_store(&config.auth, Arc::new(MemoryStore::new()), notifier, clock)?
        }
    };

    let app = adventure_auth::create_app(Arc::new(auth));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
