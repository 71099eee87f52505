use cucumber::World;
use log::*;
use recon_engine::{
    test_utils::{
        alarms::AlarmRecorder,
        prepare_env::{prepare_test_env, random_db_path},
    },
    ReconApi,
    ReconConfig,
    ReconError,
    SqliteDatabase,
    TimingReconApi,
};
use tokio::time::sleep;

#[derive(Default, Debug, World)]
pub struct ReconWorld {
    pub system: Option<ReconSystem>,
}

#[derive(Debug)]
pub struct ReconSystem {
    pub db_path: String,
    pub api: ReconApi<SqliteDatabase>,
    pub timing: TimingReconApi<SqliteDatabase>,
    pub alarms: AlarmRecorder,
    pub last_error: Option<ReconError>,
}

impl ReconWorld {
    pub fn system(&mut self) -> &mut ReconSystem {
        self.system.as_mut().expect("Reconciliation system not initialised")
    }

    pub fn api(&self) -> &ReconApi<SqliteDatabase> {
        &self.system.as_ref().expect("ReconApi not initialised").api
    }
}

impl ReconSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let alarms = AlarmRecorder::new();
        let config = ReconConfig::default();
        let api = ReconApi::new(db.clone(), config.clone(), alarms.service());
        let timing = TimingReconApi::new(db, config, alarms.service());
        Self { db_path: url, api, timing, alarms, last_error: None }
    }
}
