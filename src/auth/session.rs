use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::Session;
use crate::state::DbPool;
use crate::store::StoreError;

/// Create a new session for a user.
pub fn create_session(pool: &DbPool, username: &str, hours: u64) -> Result<Session, StoreError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, username, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, username, token, format!("+{} hours", hours)],
    )?;

    let expires_at: String = conn.query_row(
        "SELECT expires_at FROM sessions WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;

    tracing::debug!(username = %username, "session created");
    Ok(Session {
        token,
        username: username.to_string(),
        expires_at,
    })
}

/// Look up an unexpired session by token.
pub fn find_session(pool: &DbPool, token: &str) -> Result<Option<Session>, StoreError> {
    let conn = pool.get()?;
    let session = conn
        .query_row(
            "SELECT token, username, expires_at FROM sessions \
             WHERE token = ?1 AND expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    username: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

/// Delete a session by token. Returns whether one existed.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(rows > 0)
}

/// End every session. Takes a connection so account deletion can run it
/// inside its own transaction.
pub fn delete_all_sessions(conn: &Connection) -> Result<u64, StoreError> {
    let rows = conn.execute("DELETE FROM sessions", [])?;
    Ok(rows as u64)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
