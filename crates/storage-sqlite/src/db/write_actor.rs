//! Single writer thread serializing every database mutation.
//!
//! SQLite permits one writer at a time. Funnelling all writes through one
//! thread that runs each job inside an immediate transaction removes
//! `SQLITE_BUSY` contention between concurrent async callers and gives the
//! repositories a place to make "table write + operation append" atomic.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use tokio::sync::{mpsc, oneshot};

use daybook_core::errors::{DatabaseError, Error, Result};

use crate::errors::StorageError;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Lets job closures keep returning the shared error type while the diesel
/// transaction machinery still gets a `From<diesel::result::Error>` impl.
enum TxError {
    App(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

/// Cloneable handle submitting jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<WriteJob>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside one immediate transaction.
    /// Everything the job writes commits or rolls back together; returning
    /// an error rolls back.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: WriteJob = Box::new(move |conn| {
            let outcome = conn
                .immediate_transaction(|conn| job(conn).map_err(TxError::App))
                .map_err(|err| match err {
                    TxError::App(err) => err,
                    TxError::Diesel(err) => StorageError::from(err).into(),
                });
            // The caller may have gone away; nothing to do then.
            let _ = reply_tx.send(outcome);
        });

        self.tx.send(wrapped).await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer is no longer running".to_string(),
            ))
        })?;
        reply_rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Database writer dropped the request".to_string(),
            ))
        })?
    }
}

/// Spawns the writer thread and returns the handle used to reach it. The
/// thread exits once every handle is dropped.
pub fn spawn_writer(pool: Pool<ConnectionManager<SqliteConnection>>) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<WriteJob>(256);
    std::thread::spawn(move || {
        while let Some(job) = rx.blocking_recv() {
            match pool.get() {
                Ok(mut conn) => job(&mut conn),
                // Dropping the job drops its reply channel; the caller gets
                // a writer error instead of hanging.
                Err(err) => log::error!("[Storage] Writer could not get a connection: {err}"),
            }
        }
    });
    WriteHandle { tx }
}
