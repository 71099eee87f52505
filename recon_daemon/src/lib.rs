//! # Reconciliation daemon
//!
//! Runs the scheduled side of the reconciliation engine. On start-up the daemon provisions the reconciliation tables
//! (unless `RECON_AUTO_INIT_TABLES` is off). When `RECON_TIMING_ENABLED` is set, it sweeps the previous day's pending
//! orders and then writes that day's summary, once every `RECON_TIMING_INTERVAL_SECS`, until it receives Ctrl-C.
//!
//! ## Configuration
//! The daemon is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod timing_worker;
