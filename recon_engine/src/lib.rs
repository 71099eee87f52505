//! Payment Reconciliation Engine
//!
//! The reconciliation engine decides whether each payment order balances: the pay, split and notify legs must all
//! have succeeded, and the amount paid must equal the amounts split to beneficiaries plus platform income and fees.
//! Orders that fail are recorded as exceptions, and operators are alerted through the alarm channel.
//!
//! The library is divided into these sections:
//! 1. Database management ([`mod@db`]). SQLite and an in-memory store are the supported backends. The data types used
//!    in the database are defined in [`mod@db_types`] and are public.
//! 2. The public API ([`mod@recon_api`]). Real-time reconciliation of orders, refunds and notifications, the daily
//!    sweep of pending orders, and queries over the results.
//! 3. Alarms ([`mod@alarm`]), sent to the log and optionally to a DingTalk robot webhook.
//! 4. Background refund reconciliation ([`mod@dispatch`]).
pub mod alarm;
pub mod config;
pub mod db;
pub mod db_types;
pub mod dispatch;
pub mod recon_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use alarm::AlarmService;
pub use config::ReconConfig;
pub use db::memory::MemoryDatabase;
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits::{ExceptionQueryFilter, InsertOrderResult, Page, Pagination, ReconQueries, ReconRepository};
pub use dispatch::RefundDispatcher;
pub use recon_api::{
    errors::ReconError,
    query_api::ReconQueryApi,
    realtime_api::ReconApi,
    recon_objects,
    timing_api::TimingReconApi,
};
