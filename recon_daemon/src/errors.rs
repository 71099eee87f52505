use recon_engine::db::sqlite::SqliteDatabaseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Could not initialize the daemon. {0}")]
    InitializeError(String),
    #[error("A database error occurred. {0}")]
    DatabaseError(#[from] SqliteDatabaseError),
    #[error("An I/O error happened in the daemon. {0}")]
    IOError(#[from] std::io::Error),
}
