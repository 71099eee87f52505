//! Throwaway SQLite stores for tests.
//!
//! Each store is a fresh, fully migrated database file under the test data directory (`../data` relative to the
//! crate under test, or `RECON_TEST_DATA_DIR` if set), so tests never share state.
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{ReconRepository, SqliteDatabase};

const DEFAULT_TEST_DATA_DIR: &str = "../data";

/// A migrated SQLite store backed by a scratch file. Call [`ScratchStore::destroy`] at the end of the test to remove
/// the file.
pub struct ScratchStore {
    pub url: String,
    pub db: SqliteDatabase,
}

impl ScratchStore {
    pub async fn create() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error connecting to the scratch store");
        Self { url, db }
    }

    pub async fn destroy(mut self) {
        if let Err(e) = self.db.close().await {
            warn!("🚀️ Error closing scratch store {}: {e}", self.url);
        }
        if let Err(e) = Sqlite::drop_database(&self.url).await {
            warn!("🚀️ Could not remove scratch store {}: {e}", self.url);
        }
    }
}

/// Loads `.env.test`, starts logging, and creates a freshly migrated database at `url`, replacing any database that
/// is already there.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    let dir = std::env::var("RECON_TEST_DATA_DIR").unwrap_or_else(|_| DEFAULT_TEST_DATA_DIR.to_string());
    format!("sqlite://{dir}/recon_test_{:016x}.db", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let mut db = SqliteDatabase::new_with_url(url, 1).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    db.close().await.expect("Error closing the migration connection");
    debug!("🚀️ Reconciliation tables created in {url}");
}

pub async fn create_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::drop_database(url).await.expect("Error removing the old test database");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("🚀️ Created test database {url}");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scratch_paths_are_unique_sqlite_urls() {
        let a = random_db_path();
        let b = random_db_path();
        assert!(a.starts_with("sqlite://"));
        assert!(a.ends_with(".db"));
        assert!(a.contains("/recon_test_"));
        assert_ne!(a, b);
    }
}
