use recon_engine::{db::sqlite::db_url, ReconConfig};

/// The maximum number of database connections the daemon holds open.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub recon: ReconConfig,
}

impl DaemonConfig {
    pub fn from_env_or_default() -> Self {
        Self {
            database_url: db_url(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            recon: ReconConfig::from_env_or_default(),
        }
    }
}
