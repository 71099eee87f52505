//! # Reconciliation engine public API
//!
//! The API is split by use, so that clients can pick the parts they need:
//!
//! * [`realtime_api`] decides the reconciliation status of new orders, and processes refund and notify events for
//!   existing ones.
//! * [`timing_api`] sweeps up the orders that were left pending, one date at a time, and retries single orders.
//! * [`query_api`] reads back reconciliation results and generates the daily summaries.
//!
//! Every API is created by supplying a database backend that implements the backend traits it needs.
//!
//! ```rust,ignore
//! use recon_engine::{AlarmService, ReconApi, ReconConfig, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/recon_store.db", 5).await?;
//! let api = ReconApi::new(db, ReconConfig::from_env_or_default(), AlarmService::log_only());
//! let outcome = api.reconcile_order(request).await?;
//! ```
pub mod errors;
pub mod exception_recorder;
pub mod query_api;
pub mod realtime_api;
pub mod recon_objects;
mod refund_api;
pub mod resolution;
pub mod rules;
pub mod timing_api;
