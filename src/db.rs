use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use rand::Rng;
use tracing::{debug, warn};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Milliseconds SQLite waits on a locked database before reporting `SQLITE_BUSY`
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Attempts made by [`with_retry`] before giving up on a locked database
const MAX_LOCK_RETRIES: u32 = 5;

/// Applies per-connection pragmas when the pool opens a connection
///
/// SQLite keeps `foreign_keys` off by default and the setting is per
/// connection, so the cascading deletes in the schema only work if every
/// pooled connection turns it on.
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Creates the connection pool for the given SQLite URL
///
/// ### Arguments
///
/// * `database_url` - Path to the database file, or an SQLite URI such as
///   `file:test?mode=memory&cache=shared`
pub fn init_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .connection_customizer(Box::new(ConnectionOptions {
            busy_timeout: Duration::from_millis(BUSY_TIMEOUT_MS),
        }))
        .build(manager)
        .with_context(|| format!("Failed to create database pool for {}", database_url))
}

fn is_lock_error(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::Unknown, info) => {
            let message = info.message();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}

/// Runs a database operation, retrying with jittered exponential backoff
/// while SQLite reports the database as locked
///
/// Any other error is returned immediately. The backoff sleeps the calling
/// thread: bulk writers such as the sync run on `spawn_blocking`, while
/// handlers and the plate-solve worker make single-row writes and accept a
/// short stall of their runtime thread under contention.
pub fn with_retry<T, F>(conn: &mut SqliteConnection, mut operation: F) -> Result<T, DieselError>
where
    F: FnMut(&mut SqliteConnection) -> Result<T, DieselError>,
{
    let mut attempt = 0;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;
        match operation(conn) {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Database operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if is_lock_error(&err) && attempt < MAX_LOCK_RETRIES => {
                let jitter = rand::rng().random_range(0..=backoff_ms / 2);
                warn!(attempt, backoff_ms, "Database locked, retrying");
                thread::sleep(Duration::from_millis(backoff_ms + jitter));
                backoff_ms = (backoff_ms * 2).min(1_000);
            }
            Err(err) => return Err(err),
        }
    }
}
