//! Connection pool, migrations and the serialized writer.

pub mod write_actor;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use daybook_core::errors::{DatabaseError, Error, Result};

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILENAME: &str = "daybook.db";

/// Per-connection pragmas. WAL keeps readers unblocked while the writer
/// thread holds its transaction; the busy timeout covers the WAL checkpoint.
#[derive(Debug)]
struct ConnectionOptions;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(r2d2::Error::QueryError)
    }
}

/// Creates the application data directory if needed and returns the path of
/// the database file inside it.
pub fn init(app_data_dir: &str) -> Result<String> {
    fs::create_dir_all(app_data_dir).map_err(|err| {
        Error::Database(DatabaseError::Internal(format!(
            "Failed to create data directory '{app_data_dir}': {err}"
        )))
    })?;
    let db_path = Path::new(app_data_dir).join(DB_FILENAME);
    Ok(db_path.to_string_lossy().to_string())
}

/// Applies any pending embedded migrations against the database file.
pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| Error::Database(DatabaseError::Migration(err.to_string())))?;
    Ok(())
}

/// Builds the shared connection pool.
pub fn create_pool(db_path: &str) -> Result<Arc<Pool<ConnectionManager<SqliteConnection>>>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(8)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(|err| Error::Database(DatabaseError::Pool(err.to_string())))?;
    Ok(Arc::new(pool))
}

/// Checks out a pooled connection. Read paths use this directly; writes go
/// through the [`WriteHandle`] instead.
pub fn get_connection(
    pool: &Arc<Pool<ConnectionManager<SqliteConnection>>>,
) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>> {
    Ok(pool.get().map_err(StorageError::from)?)
}
