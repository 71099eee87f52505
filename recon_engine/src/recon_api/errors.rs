use thiserror::Error;

use crate::db_types::{ExceptionStep, OrderNo};

#[derive(Debug, Clone, Error)]
pub enum ReconError {
    #[error("Reconciliation is disabled")]
    EngineDisabled,
    #[error("Reconciliation of order {order_no} failed at step {step}: {message}")]
    Rejected { order_no: OrderNo, step: ExceptionStep, message: String },
    #[error("Order {0} not found")]
    OrderNotFound(OrderNo),
    #[error("Sub-order {sub_order_no} of merchant {merchant_id} not found")]
    SubOrderNotFound { merchant_id: String, sub_order_no: String },
    #[error("Merchant order {merchant_order_no} of merchant {merchant_id} not found")]
    MerchantOrderNotFound { merchant_id: String, merchant_order_no: String },
    #[error("Order {0} already exists")]
    DuplicateOrder(OrderNo),
    #[error("Amount cannot be represented: {0}")]
    AmountOverflow(String),
    #[error("Database write was not applied: {0}")]
    WriteRejected(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl ReconError {
    pub fn database<E: std::error::Error>(e: E) -> Self {
        Self::DatabaseError(e.to_string())
    }

    /// True for rule violations and failed lookups. False for persistence problems and a disabled engine.
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } |
                Self::OrderNotFound(_) |
                Self::SubOrderNotFound { .. } |
                Self::MerchantOrderNotFound { .. }
        )
    }

    /// The exception step of a rejected reconciliation
    pub fn exception_step(&self) -> Option<ExceptionStep> {
        match self {
            Self::Rejected { step, .. } => Some(*step),
            _ => None,
        }
    }
}
