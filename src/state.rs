use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::Accounts;
use crate::config::Config;
use crate::media::{DynMediaRelocator, LocalMediaStore};
use crate::moderation::ModerationPolicy;
use crate::profile::ProfileService;
use crate::store::{
    DynPostRepository, DynUserRepository, KvStore, SqlitePostRepository, SqliteUserRepository,
};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub users: DynUserRepository,
    pub posts: DynPostRepository,
    pub media: DynMediaRelocator,
    pub accounts: Accounts,
    pub profiles: Arc<ProfileService>,
}

impl AppState {
    /// Wire the SQLite-backed stores and local media over an already
    /// migrated pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let moderation = Arc::new(ModerationPolicy::new(&config.moderation));
        let media: DynMediaRelocator = Arc::new(LocalMediaStore::new(
            config.media_path(),
            config.staging_path(),
        ));
        let users: DynUserRepository =
            Arc::new(SqliteUserRepository::new(db.clone(), moderation.clone()));
        let posts: DynPostRepository = Arc::new(SqlitePostRepository::new(
            db.clone(),
            media.clone(),
            moderation.clone(),
        ));
        let accounts = Accounts::new(users.clone(), db.clone(), config.auth.session_hours);
        let profiles = Arc::new(ProfileService::new(
            users.clone(),
            posts.clone(),
            KvStore::new(db.clone()),
            media.clone(),
            moderation,
        ));

        Self {
            db,
            config,
            users,
            posts,
            media,
            accounts,
            profiles,
        }
    }
}
