//! DuckDB persistence for the fileshare key hierarchy.
//!
//! Stores three things and nothing else:
//!
//! - the master key (single row, raw bytes)
//! - one wrapped-key entry per (user, file), unique on that pair
//! - file metadata (name, backend location, expiry, status)
//!
//! No cryptography happens here. Callers hand in already-wrapped bytes and
//! get the same bytes back.

mod duckdb_store;
mod error;
mod model;
mod traits;

pub use duckdb_store::DuckDbStore;
pub use error::{StoreError, StoreResult};
pub use model::{EncryptionKeyEntry, FileRecord, FileStatus, UserId};
pub use traits::{FileCatalog, KeyStore};

use tracing::warn;

/// Opens the key database at `path`, capped to `memory_limit` and `threads`.
///
/// A crash mid-write can leave a `<db>.wal` that DuckDB then refuses to
/// replay. When the first open fails and such a file exists, it is dropped
/// and the open is tried once more. Whatever the WAL held was never
/// committed, so no wrapped key or file record that a caller saw succeed
/// is lost.
pub fn open_key_database(
    path: &std::path::Path,
    memory_limit: &str,
    threads: u32,
) -> StoreResult<duckdb::Connection> {
    let conn = match duckdb::Connection::open(path) {
        Ok(conn) => conn,
        Err(open_err) => {
            let wal = wal_path_for(path);
            if !wal.exists() || std::fs::remove_file(&wal).is_err() {
                return Err(open_err.into());
            }
            warn!(
                "key database {} would not open ({open_err}); discarded {} and retrying",
                path.display(),
                wal.display()
            );
            duckdb::Connection::open(path)?
        }
    };
    limit_resources(&conn, memory_limit, threads)?;
    Ok(conn)
}

/// `share.duckdb` -> `share.duckdb.wal`, `share` -> `share.wal`
fn wal_path_for(path: &std::path::Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    std::path::PathBuf::from(name)
}

// Unbounded, DuckDB takes most of the host's RAM and every core.
fn limit_resources(conn: &duckdb::Connection, memory_limit: &str, threads: u32) -> StoreResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{memory_limit}'; PRAGMA threads={threads};"
    ))?;
    Ok(())
}
