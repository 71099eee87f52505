//! # Reconciliation database backends
//!
//! This module defines the interface contracts that database backends must implement to be used by the reconciliation
//! engine.
//!
//! * [`ReconRepository`] is the persistence contract used by the decision engine, the refund and notify paths, and the
//!   batch sweep. All recon status transitions go through [`ReconRepository::update_recon_status`], which is a
//!   conditional update guarded by the status the caller expects the order to be in.
//! * [`ReconQueries`] provides read-only reporting queries. The decision engine never uses it.
//!
//! Two backends are provided: [`crate::SqliteDatabase`] and [`crate::MemoryDatabase`].
mod data_objects;
mod recon_queries;
mod recon_repository;

pub use data_objects::{ExceptionQueryFilter, InsertOrderResult, Page, Pagination};
pub use recon_queries::ReconQueries;
pub use recon_repository::ReconRepository;
