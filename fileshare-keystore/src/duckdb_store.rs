//! DuckDB implementation of [`KeyStore`] and [`FileCatalog`].

use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{StoreError, StoreResult};
use crate::model::{
    EncryptionKeyEntry, FileRecord, FileStatus, UserId, from_millis, from_millis_opt, to_millis,
};
use crate::traits::{FileCatalog, KeyStore};

const MASTER_KEY_ROW: i32 = 1;

const ENTRY_COLUMNS: &str = "user_id, file_id, encryption_key, dek_iv, user_kek, kek_iv, \
                             expiration_date, created_at, download_date";

const FILE_COLUMNS: &str = "file_id, file_name, file_path, upload_date, expiration_date, \
                            content_hash, size, status";

/// Key and file metadata store backed by a single DuckDB connection.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Opens or creates a store at `path`. `":memory:"` opens an in-memory database.
    pub fn open(path: &Path, memory_limit: &str, threads: u32) -> StoreResult<Self> {
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            crate::open_key_database(path, memory_limit, threads)?
        };
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::open_with_conn(Arc::new(Mutex::new(conn)))
    }

    /// Opens with an existing shared connection.
    pub fn open_with_conn(conn: Arc<Mutex<Connection>>) -> StoreResult<Self> {
        let store = Self { conn };
        store.ensure_tables()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Persistence(format!("connection lock poisoned: {e}")))
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS master_key (
                id INTEGER PRIMARY KEY,
                secret BLOB NOT NULL,
                created_at BIGINT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS encryption_keys (
                user_id BIGINT NOT NULL,
                file_id VARCHAR NOT NULL,
                encryption_key BLOB NOT NULL,
                dek_iv BLOB NOT NULL,
                user_kek BLOB NOT NULL,
                kek_iv BLOB NOT NULL,
                expiration_date BIGINT,
                created_at BIGINT NOT NULL,
                download_date BIGINT,
                PRIMARY KEY (user_id, file_id)
            );
            CREATE TABLE IF NOT EXISTS file_metadata (
                file_id VARCHAR PRIMARY KEY,
                file_name VARCHAR NOT NULL UNIQUE,
                file_path VARCHAR NOT NULL,
                upload_date BIGINT NOT NULL,
                expiration_date BIGINT,
                content_hash VARCHAR NOT NULL,
                size BIGINT NOT NULL DEFAULT 0,
                status VARCHAR NOT NULL
            );",
        )?;
        Ok(())
    }
}

fn entry_from_row(row: &Row<'_>) -> duckdb::Result<RawEntry> {
    Ok(RawEntry {
        user_id: row.get(0)?,
        file_id: row.get(1)?,
        encryption_key: row.get(2)?,
        dek_iv: row.get(3)?,
        user_kek: row.get(4)?,
        kek_iv: row.get(5)?,
        expiration_date: row.get(6)?,
        created_at: row.get(7)?,
        download_date: row.get(8)?,
    })
}

/// Row as read from DuckDB, before timestamp validation.
struct RawEntry {
    user_id: i64,
    file_id: String,
    encryption_key: Vec<u8>,
    dek_iv: Vec<u8>,
    user_kek: Vec<u8>,
    kek_iv: Vec<u8>,
    expiration_date: Option<i64>,
    created_at: i64,
    download_date: Option<i64>,
}

impl TryFrom<RawEntry> for EncryptionKeyEntry {
    type Error = StoreError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        Ok(EncryptionKeyEntry {
            user_id: raw.user_id,
            file_id: raw.file_id,
            encryption_key: raw.encryption_key,
            dek_iv: raw.dek_iv,
            user_kek: raw.user_kek,
            kek_iv: raw.kek_iv,
            expiration_date: from_millis_opt(raw.expiration_date)?,
            created_at: from_millis(raw.created_at)?,
            download_date: from_millis_opt(raw.download_date)?,
        })
    }
}

struct RawFile {
    file_id: String,
    file_name: String,
    location: String,
    upload_date: i64,
    expiration_date: Option<i64>,
    content_hash: String,
    size: i64,
    status: String,
}

fn file_from_row(row: &Row<'_>) -> duckdb::Result<RawFile> {
    Ok(RawFile {
        file_id: row.get(0)?,
        file_name: row.get(1)?,
        location: row.get(2)?,
        upload_date: row.get(3)?,
        expiration_date: row.get(4)?,
        content_hash: row.get(5)?,
        size: row.get(6)?,
        status: row.get(7)?,
    })
}

impl TryFrom<RawFile> for FileRecord {
    type Error = StoreError;

    fn try_from(raw: RawFile) -> Result<Self, Self::Error> {
        Ok(FileRecord {
            file_id: raw.file_id,
            file_name: raw.file_name,
            location: raw.location,
            upload_date: from_millis(raw.upload_date)?,
            expiration_date: from_millis_opt(raw.expiration_date)?,
            content_hash: raw.content_hash,
            size: raw.size,
            status: raw.status.parse()?,
        })
    }
}

impl KeyStore for DuckDbStore {
    fn load_master_key(&self) -> StoreResult<Option<Zeroizing<Vec<u8>>>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT secret FROM master_key WHERE id = ?",
            params![MASTER_KEY_ROW],
            |row| row.get::<_, Vec<u8>>(0),
        );
        match result {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn insert_master_key(&self, secret: &[u8]) -> StoreResult<()> {
        let conn = self.conn()?;
        let existing: i64 =
            conn.query_row("SELECT COUNT(*) FROM master_key", [], |row| row.get(0))?;
        if existing > 0 {
            return Err(StoreError::AlreadyExists("master key".to_string()));
        }
        conn.execute(
            "INSERT INTO master_key (id, secret, created_at) VALUES (?, ?, ?)",
            params![MASTER_KEY_ROW, secret, to_millis(Utc::now())],
        )?;
        Ok(())
    }

    fn replace_master_key(&self, secret: &[u8]) -> StoreResult<()> {
        // Single statement: the old secret and the new one are never both absent.
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO master_key (id, secret, created_at) VALUES (?, ?, ?)",
            params![MASTER_KEY_ROW, secret, to_millis(Utc::now())],
        )?;
        debug!("master key row replaced");
        Ok(())
    }

    fn upsert_entry(&self, entry: &EncryptionKeyEntry) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO encryption_keys ({ENTRY_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                entry.user_id,
                entry.file_id,
                entry.encryption_key,
                entry.dek_iv,
                entry.user_kek,
                entry.kek_iv,
                entry.expiration_date.map(to_millis),
                to_millis(entry.created_at),
                entry.download_date.map(to_millis),
            ],
        )?;
        Ok(())
    }

    fn get_entry(&self, user_id: UserId, file_id: &str) -> StoreResult<Option<EncryptionKeyEntry>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM encryption_keys WHERE user_id = ? AND file_id = ?"),
            params![user_id, file_id],
            entry_from_row,
        );
        match result {
            Ok(raw) => Ok(Some(raw.try_into()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_entry(&self, user_id: UserId, file_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM encryption_keys WHERE user_id = ? AND file_id = ?",
            params![user_id, file_id],
        )?;
        Ok(affected > 0)
    }

    fn delete_entries_for_file(&self, file_id: &str) -> StoreResult<usize> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM encryption_keys WHERE file_id = ?",
            params![file_id],
        )?;
        Ok(affected)
    }

    fn list_recipients(&self, file_id: &str) -> StoreResult<Vec<UserId>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT user_id FROM encryption_keys WHERE file_id = ? ORDER BY user_id")?;
        let ids = stmt
            .query_map(params![file_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn count_entries(&self) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM encryption_keys", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn mark_downloaded(
        &self,
        user_id: UserId,
        file_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE encryption_keys SET download_date = ? WHERE user_id = ? AND file_id = ?",
            params![to_millis(at), user_id, file_id],
        )?;
        Ok(affected > 0)
    }
}

impl FileCatalog for DuckDbStore {
    fn insert_file(&self, record: &FileRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let clashes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM file_metadata WHERE file_id = ? OR file_name = ?",
            params![record.file_id, record.file_name],
            |row| row.get(0),
        )?;
        if clashes > 0 {
            return Err(StoreError::AlreadyExists(format!(
                "file '{}' ({})",
                record.file_name, record.file_id
            )));
        }

        conn.execute(
            &format!("INSERT INTO file_metadata ({FILE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                record.file_id,
                record.file_name,
                record.location,
                to_millis(record.upload_date),
                record.expiration_date.map(to_millis),
                record.content_hash,
                record.size,
                record.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_file(&self, file_id: &str) -> StoreResult<Option<FileRecord>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!("SELECT {FILE_COLUMNS} FROM file_metadata WHERE file_id = ?"),
            params![file_id],
            file_from_row,
        );
        match result {
            Ok(raw) => Ok(Some(raw.try_into()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_file_status(&self, file_id: &str, status: FileStatus) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE file_metadata SET status = ? WHERE file_id = ?",
            params![status.as_str(), file_id],
        )?;
        Ok(affected > 0)
    }

    fn delete_file(&self, file_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM file_metadata WHERE file_id = ?",
            params![file_id],
        )?;
        Ok(affected > 0)
    }

    fn list_expired_files(&self, now: DateTime<Utc>) -> StoreResult<Vec<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM file_metadata
             WHERE status = 'encrypted'
               AND expiration_date IS NOT NULL
               AND expiration_date <= ?
             ORDER BY expiration_date"
        ))?;
        let raws = stmt
            .query_map(params![to_millis(now)], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(FileRecord::try_from).collect()
    }
}
