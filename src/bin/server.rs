//! Shoplist Server
//!
//! Serves the shopping-list API and its live WebSocket feeds.
//!
//! # Configuration
//!
//! Read from `~/.config/shoplist/server.yaml` (or `SHOPLIST_CONFIG`), with
//! `SHOPLIST_*` environment variables taking precedence:
//!
//! ```yaml
//! port: 8080
//! database_path: shoplist.db
//! public_url: https://lists.example.com
//! translate_url: https://libretranslate.de/translate
//! default_language: en
//! smtp:
//!   host: smtp.example.com
//!   port: 587
//!   user: lists
//!   pass: secret
//!   from_email: lists@example.com
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shoplist::auth::{Identity, Mailer};
use shoplist::config::ServerConfig;
use shoplist::db::Store;
use shoplist::server::{router, AppState};
use shoplist::translate::LibreTranslate;
use shoplist::views::AppContext;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoplist=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(None)?;

    if let Some(path) = &config.config_file {
        tracing::info!("Config file: {}", path.display());
    }
    tracing::info!(
        "Database: {} ({})",
        config.database_path.value.display(),
        config.database_path.source
    );
    tracing::info!("Public URL: {}", config.public_url.value);

    let store = Store::open(&config.database_path.value).await?;

    let mailer = config.email_config().map(Mailer::new);
    if mailer.is_none() {
        tracing::warn!("SMTP not configured, links will be logged instead of mailed");
    }

    let identity = Arc::new(Identity::new(
        store.users.clone(),
        store.sessions.clone(),
        mailer,
        config.public_url.value.clone(),
    ));
    spawn_cleanup(identity.clone());

    let state = AppState::new(
        AppContext::new(store, identity),
        LibreTranslate::new(config.translate_url.value.clone()),
        config.default_language.value.clone(),
    );
    let app = router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port.value));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Drops expired sessions and one-time tokens in the background.
fn spawn_cleanup(identity: Arc<Identity>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = identity.cleanup().await {
                tracing::warn!("Session cleanup failed: {}", e);
            }
        }
    });
}
