use rusqlite::{params, Connection, OptionalExtension};

use crate::state::DbPool;
use crate::store::StoreError;

/// Key names shared by every reader and writer of the key-value store.
pub mod keys {
    pub const LOGGED_IN_USER: &str = "loggedInUser";
    pub const USER_ID: &str = "userId";

    pub const PROFILE_IMAGE_PREFIX: &str = "profileImage_";
    pub const BIO_PREFIX: &str = "bio_";
    pub const POSTS_PREFIX: &str = "posts_";

    pub fn profile_image(username: &str) -> String {
        format!("{PROFILE_IMAGE_PREFIX}{username}")
    }

    pub fn bio(username: &str) -> String {
        format!("{BIO_PREFIX}{username}")
    }

    pub fn posts(username: &str) -> String {
        format!("{POSTS_PREFIX}{username}")
    }
}

/// Marks a key whose value is being rebuilt. Never a valid cached value.
const LEASE_PREFIX: &str = "\u{1}lease:";

/// Permission to fill a missing cache entry. Any write to the key made
/// after the lease was taken replaces it, and the fill is then refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease(String);

/// Read a key. Pending leases read as absent.
pub fn get(conn: &Connection, key: &str) -> Result<Option<String>, StoreError> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value.filter(|v| !v.starts_with(LEASE_PREFIX)))
}

pub fn upsert(conn: &Connection, key: &str, value: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO kv (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET
           value = excluded.value,
           updated_at = excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

/// Returns whether the key existed.
pub fn delete(conn: &Connection, key: &str) -> Result<bool, StoreError> {
    let rows = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(rows > 0)
}

/// Remove every key starting with `prefix`. Returns the count removed.
pub fn delete_prefix(conn: &Connection, prefix: &str) -> Result<u64, StoreError> {
    // substr avoids LIKE treating `_` in the prefix as a wildcard
    let rows = conn.execute(
        "DELETE FROM kv WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
    )?;
    Ok(rows as u64)
}

/// String key-value store backed by the `kv` table.
///
/// Writers that keep a cache entry in step with a row use the free
/// functions above inside the row's transaction. Readers that rebuild a
/// missing entry take a [`Lease`] before reading the source and fill
/// through it, so a rebuild that raced a write is dropped instead of
/// overwriting the newer value.
#[derive(Clone)]
pub struct KvStore {
    pool: DbPool,
}

impl KvStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        get(&conn, key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        upsert(&conn, key, value)
    }

    /// Returns whether the key existed.
    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        delete(&conn, key)
    }

    /// Claim a missing key for rebuilding. `None` when the key already
    /// holds a value. A pending lease from another reader is taken over.
    pub fn lease(&self, key: &str) -> Result<Option<Lease>, StoreError> {
        let lease = Lease(format!("{LEASE_PREFIX}{}", uuid::Uuid::now_v7()));
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at
             WHERE substr(kv.value, 1, length(?3)) = ?3",
            params![key, lease.0, LEASE_PREFIX],
        )?;
        Ok((rows > 0).then_some(lease))
    }

    /// Store `value` if `lease` is still current. Returns whether it was.
    pub fn fill(&self, key: &str, lease: &Lease, value: &str) -> Result<bool, StoreError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE kv SET value = ?3, updated_at = datetime('now')
             WHERE key = ?1 AND value = ?2",
            params![key, lease.0, value],
        )?;
        if rows == 0 {
            tracing::debug!(key = %key, "cache fill lost to a concurrent write");
        }
        Ok(rows > 0)
    }

    /// Drop a lease that will not be filled.
    pub fn release(&self, key: &str, lease: &Lease) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "DELETE FROM kv WHERE key = ?1 AND value = ?2",
            params![key, lease.0],
        )?;
        Ok(())
    }
}
