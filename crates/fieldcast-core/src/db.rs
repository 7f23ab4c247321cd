//! `SQLite` plumbing shared by Fieldcast storage layers.
//!
//! Storage crates declare their database type with [`define_database!`],
//! which wires a pool built from [`PoolSettings`] to the crate's own
//! `migrations/` directory.

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Storage failures as seen by the notification engine.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Cannot prepare database location: {0}")]
    Io(String),

    #[error("Cannot open database: {0}")]
    Connection(String),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row no longer matches its model (bad enum string, type drift).
    #[error("Corrupt row: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Decode(e.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed => Self::Connection(e.to_string()),
            _ => Self::Query(e.to_string()),
        }
    }
}

/// Sizing of a file-backed pool.
///
/// Broadcast fan-out and concurrent read receipts contend for writes, so the
/// busy timeout bounds how long a writer waits for the database lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl PoolSettings {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Settings with zero values replaced by the defaults.
    pub const fn normalised(self) -> Self {
        Self {
            max_connections: if self.max_connections == 0 {
                Self::DEFAULT_MAX_CONNECTIONS
            } else {
                self.max_connections
            },
            busy_timeout: if self.busy_timeout.is_zero() {
                Self::DEFAULT_BUSY_TIMEOUT
            } else {
                self.busy_timeout
            },
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// Open (or create) the database file at `path`.
///
/// Missing parent directories are created. The pool runs in WAL mode with
/// foreign keys enforced.
pub async fn open_pool(path: &Path, settings: PoolSettings) -> Result<Pool<Sqlite>, DatabaseError> {
    let settings = settings.normalised();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            DatabaseError::Io(format!("{}: {e}", parent.display()))
        })?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(settings.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(format!("{}: {e}", path.display())))?;

    info!(
        path = %path.display(),
        max_connections = settings.max_connections,
        "Notification store opened"
    );

    Ok(pool)
}

/// Open a throwaway in-memory pool.
///
/// Limited to a single connection: every connection to `sqlite::memory:` is
/// its own database.
pub async fn open_pool_in_memory() -> Result<Pool<Sqlite>, DatabaseError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::Connection(e.to_string()))
}

/// Current wall-clock time in Unix seconds.
#[allow(clippy::cast_possible_wrap)]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Declare a storage handle backed by the calling crate's `migrations/`.
///
/// ```ignore
/// fieldcast_core::define_database!(NotifyDatabase, "Notification schema up to date");
/// ```
///
/// The handle is a cheap `Clone` around the pool and provides `open`,
/// `open_with`, `open_in_memory` and `pool`. Migrations run on every open.
#[macro_export]
macro_rules! define_database {
    ($name:ident, $migration_msg:expr) => {
        #[derive(Clone)]
        pub struct $name {
            pool: ::sqlx::Pool<::sqlx::Sqlite>,
        }

        impl $name {
            /// Open the database at `path` with default pool settings.
            pub async fn open(
                path: &::std::path::Path,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                Self::open_with(path, $crate::db::PoolSettings::default()).await
            }

            /// Open the database at `path` with explicit pool settings.
            pub async fn open_with(
                path: &::std::path::Path,
                settings: $crate::db::PoolSettings,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                Self::migrated($crate::db::open_pool(path, settings).await?).await
            }

            /// Open a private in-memory database.
            pub async fn open_in_memory() -> ::std::result::Result<Self, $crate::db::DatabaseError>
            {
                Self::migrated($crate::db::open_pool_in_memory().await?).await
            }

            async fn migrated(
                pool: ::sqlx::Pool<::sqlx::Sqlite>,
            ) -> ::std::result::Result<Self, $crate::db::DatabaseError> {
                ::sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(|e| $crate::db::DatabaseError::Migration(e.to_string()))?;

                ::tracing::debug!($migration_msg);
                Ok(Self { pool })
            }

            pub const fn pool(&self) -> &::sqlx::Pool<::sqlx::Sqlite> {
                &self.pool
            }
        }
    };
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unix_now_is_after_2024() {
        assert!(unix_now() > 1_704_067_200);
    }

    #[test]
    fn sqlx_errors_map_by_kind() {
        assert!(matches!(
            DatabaseError::from(sqlx::Error::RowNotFound),
            DatabaseError::NotFound(_)
        ));
        assert!(matches!(
            DatabaseError::from(sqlx::Error::PoolClosed),
            DatabaseError::Connection(_)
        ));
        assert!(matches!(
            DatabaseError::from(sqlx::Error::PoolTimedOut),
            DatabaseError::Query(_)
        ));
    }

    #[test]
    fn zero_pool_settings_fall_back_to_defaults() {
        let settings = PoolSettings {
            max_connections: 0,
            busy_timeout: Duration::ZERO,
        }
        .normalised();
        assert_eq!(settings, PoolSettings::default());
    }

    #[tokio::test]
    async fn file_pool_creates_parent_and_honours_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fieldcast.db");
        let settings = PoolSettings {
            max_connections: 2,
            ..PoolSettings::default()
        };

        let pool = open_pool(&path, settings).await.unwrap();
        assert!(path.exists());
        assert_eq!(pool.options().get_max_connections(), 2);
        pool.close().await;
    }

    #[tokio::test]
    async fn in_memory_pool_enforces_foreign_keys() {
        let pool = open_pool_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
