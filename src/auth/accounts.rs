//! Signup, login and logout on top of the user store and the sessions
//! table. Also maintains the `loggedInUser` / `userId` entries.

use crate::auth::session;
use crate::db::models::Session;
use crate::state::DbPool;
use crate::store::kv::keys;
use crate::store::{DynUserRepository, KvStore, StoreError};
use crate::validation;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User not found")]
    UnknownUser,

    #[error("Incorrect password")]
    WrongPassword,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct Accounts {
    users: DynUserRepository,
    pool: DbPool,
    kv: KvStore,
    session_hours: u64,
}

impl Accounts {
    pub fn new(users: DynUserRepository, pool: DbPool, session_hours: u64) -> Self {
        Self {
            users,
            kv: KvStore::new(pool.clone()),
            pool,
            session_hours,
        }
    }

    /// Create an account and sign it in. Non-letters are stripped from the
    /// username before the store validates it.
    pub async fn signup(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = validation::sanitize_username(username);
        let id = self.users.create(&username, password).await?;
        self.start_session(&username, id)
    }

    /// Exact-match password check. A rejected login writes nothing.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        if user.password != password {
            tracing::info!(username = %username, "login rejected");
            return Err(AuthError::WrongPassword);
        }

        self.start_session(&user.username, user.id)
    }

    /// End the session behind `token`. Clears `loggedInUser` / `userId`
    /// when they name the same user. Unknown tokens are a no-op.
    pub fn logout(&self, token: &str) -> Result<(), AuthError> {
        let Some(current) = session::find_session(&self.pool, token)? else {
            session::delete_session(&self.pool, token)?;
            return Ok(());
        };

        session::delete_session(&self.pool, token)?;
        if self.kv.get(keys::LOGGED_IN_USER)?.as_deref() == Some(current.username.as_str()) {
            self.kv.remove(keys::LOGGED_IN_USER)?;
            self.kv.remove(keys::USER_ID)?;
        }
        tracing::info!(username = %current.username, "logged out");
        Ok(())
    }

    /// The most recently signed-in username, if any.
    pub fn logged_in_user(&self) -> Result<Option<String>, AuthError> {
        Ok(self.kv.get(keys::LOGGED_IN_USER)?)
    }

    fn start_session(&self, username: &str, user_id: i64) -> Result<Session, AuthError> {
        let session = session::create_session(&self.pool, username, self.session_hours)?;
        self.kv.set(keys::LOGGED_IN_USER, username)?;
        self.kv.set(keys::USER_ID, &user_id.to_string())?;
        tracing::info!(username = %username, "logged in");
        Ok(session)
    }
}
