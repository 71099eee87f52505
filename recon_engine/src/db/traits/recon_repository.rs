use std::future::Future;

use chrono::NaiveDate;

use crate::{
    db::traits::InsertOrderResult,
    db_types::{
        NewNotifyLog,
        NewOrder,
        NewReconException,
        NewReconSummary,
        NewRefundSplitSub,
        NewSplitSub,
        NotifyStatus,
        Order,
        OrderNo,
        ReconStatus,
        RefundUpdate,
        SplitSub,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the reconciliation engine.
///
/// Writes that can legitimately match nothing (the conditional updates) report `Ok(false)` rather than an error. Batch
/// writes return the number of rows saved. Callers must treat `false`, short counts and errors all as failures.
///
/// The returned futures are `Send` so that reconciliation work can be handed off to the async refund workers.
pub trait ReconRepository: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The URL of the database
    fn url(&self) -> &str;

    /// Inserts a new order. If an order with the same order number already exists, nothing is written and
    /// [`InsertOrderResult::AlreadyExists`] is returned.
    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<InsertOrderResult, Self::Error>> + Send;

    /// Inserts a new order and its split records in a single atomic operation. Either the order and every split
    /// record are saved, or nothing is.
    ///
    /// If the order already exists, nothing is written and [`InsertOrderResult::AlreadyExists`] is returned. A split
    /// record that cannot be saved (for example, a repeated sub-order number for the same merchant) fails the whole
    /// call and leaves no trace of the order.
    fn insert_order_with_splits(
        &self,
        order: NewOrder,
        splits: &[NewSplitSub],
    ) -> impl Future<Output = Result<InsertOrderResult, Self::Error>> + Send;

    /// Saves the split records of an order. Returns the number of records saved.
    fn save_split_subs(&self, splits: &[NewSplitSub]) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Appends refund allocation records. Returns the number of records saved.
    fn save_refund_split_subs(
        &self,
        refunds: &[NewRefundSplitSub],
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Saves a single exception record, returning its id.
    fn save_exception(&self, exception: NewReconException) -> impl Future<Output = Result<i64, Self::Error>> + Send;

    /// Saves a batch of exception records in one go. Returns the number of records saved.
    fn save_exceptions(
        &self,
        exceptions: &[NewReconException],
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Appends a notify log record, returning its id.
    fn save_notify_log(&self, log: NewNotifyLog) -> impl Future<Output = Result<i64, Self::Error>> + Send;

    /// Saves the daily summary, replacing any existing summary for the same date.
    fn save_summary(&self, summary: NewReconSummary) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Moves the order's reconciliation status from `expected` to `status`, but only if the order is currently in the
    /// `expected` state. The recon timestamp is set when the new status is terminal.
    ///
    /// Returns `false` if the order does not exist, or if its status was not `expected`.
    fn update_recon_status(
        &self,
        order_no: &OrderNo,
        expected: ReconStatus,
        status: ReconStatus,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Sets the notify status of the order. Returns `false` if the order does not exist.
    fn update_notify_status(
        &self,
        order_no: &OrderNo,
        status: NotifyStatus,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Records the refund status, amount and time on the order. Returns `false` if the order does not exist.
    fn update_refund(
        &self,
        order_no: &OrderNo,
        refund: RefundUpdate,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Updates the notify status and result of the split record identified by `(order_no, merchant_id,
    /// sub_order_no)`. Returns `false` if there is no such split record.
    fn update_split_sub_notify(
        &self,
        order_no: &OrderNo,
        merchant_id: &str,
        sub_order_no: &str,
        status: NotifyStatus,
        result: Option<String>,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    fn fetch_order(&self, order_no: &OrderNo) -> impl Future<Output = Result<Option<Order>, Self::Error>> + Send;

    /// Looks up an order using the merchant's own order reference.
    fn fetch_order_by_merchant_order_no(
        &self,
        merchant_id: &str,
        merchant_order_no: &str,
    ) -> impl Future<Output = Result<Option<Order>, Self::Error>> + Send;

    fn fetch_split_subs(&self, order_no: &OrderNo) -> impl Future<Output = Result<Vec<SplitSub>, Self::Error>> + Send;

    fn fetch_split_sub_by_sub_order_no(
        &self,
        merchant_id: &str,
        sub_order_no: &str,
    ) -> impl Future<Output = Result<Option<SplitSub>, Self::Error>> + Send;

    /// Fetches up to `limit` pending orders with an order time on `date`, and a row id strictly greater than
    /// `after_id`, in ascending id order.
    fn fetch_pending_orders(
        &self,
        date: NaiveDate,
        after_id: i64,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Order>, Self::Error>> + Send;

    /// Releases any resources held by the backend.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
