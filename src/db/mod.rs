mod item_repo;
mod list_repo;
mod session_repo;
mod share_repo;
mod user_repo;

pub use item_repo::{ItemRepository, ItemUpdate};
pub use list_repo::ListRepository;
pub use session_repo::{SessionRepository, SessionRow};
pub use share_repo::{AcceptOutcome, ShareRepository};
pub use user_repo::UserRepository;
pub(crate) use user_repo::is_unique_violation;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::feed::ChangeFeed;

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// All repositories over one pool, publishing to one change feed.
#[derive(Debug, Clone)]
pub struct Store {
    pub lists: ListRepository,
    pub items: ItemRepository,
    pub shares: ShareRepository,
    pub users: UserRepository,
    pub sessions: SessionRepository,
    feed: Arc<ChangeFeed>,
}

impl Store {
    pub fn new(pool: SqlitePool, feed: Arc<ChangeFeed>) -> Self {
        Self {
            lists: ListRepository::new(pool.clone(), feed.clone()),
            items: ItemRepository::new(pool.clone(), feed.clone()),
            shares: ShareRepository::new(pool.clone(), feed.clone()),
            users: UserRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool),
            feed,
        }
    }

    /// Opens the database at `path` with a fresh change feed.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let pool = init_db(path).await?;
        Ok(Self::new(pool, ChangeFeed::new()))
    }

    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }
}

/// Fixed-width RFC 3339 so that string order matches time order.
pub(crate) fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    value.map(parse_timestamp).transpose()
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
