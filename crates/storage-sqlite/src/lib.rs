//! SQLite persistence for Daybook.
//!
//! Record repositories write through a single serialized writer thread and
//! append a sync operation in the same transaction as every mutation, so the
//! operation log can never disagree with the tables it describes.

pub mod categories;
pub mod db;
pub mod entries;
pub mod errors;
pub mod goals;
pub mod schema;
pub mod sync;

pub use categories::CategoryRepository;
pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, WriteHandle};
pub use entries::EntryRepository;
pub use goals::GoalRepository;
pub use sync::{OperationLogRepository, SqliteRecordStore, SyncMetadataRepository};
