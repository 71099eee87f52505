use std::future::Future;

use chrono::NaiveDate;

use crate::{
    db::traits::{ExceptionQueryFilter, Page, Pagination},
    db_types::{NotifyLog, Order, OrderNo, ReconException, ReconStatus, ReconSummary, RefundSplitSub},
};

/// The `ReconQueries` trait defines read-only queries for reporting on reconciliation results.
pub trait ReconQueries: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches a page of the orders with an order time on `date`, optionally restricted to a single reconciliation
    /// status. Orders are returned in ascending id order. The page carries the total number of matching orders.
    fn fetch_orders_by_date(
        &self,
        date: NaiveDate,
        status: Option<ReconStatus>,
        page: Pagination,
    ) -> impl Future<Output = Result<Page<Order>, Self::Error>> + Send;

    fn fetch_exceptions(
        &self,
        order_no: &OrderNo,
    ) -> impl Future<Output = Result<Vec<ReconException>, Self::Error>> + Send;

    /// Fetches a page of the exceptions matching `filter`, newest first. The page carries the total number of matching
    /// exceptions.
    fn fetch_exceptions_filtered(
        &self,
        filter: &ExceptionQueryFilter,
        page: Pagination,
    ) -> impl Future<Output = Result<Page<ReconException>, Self::Error>> + Send;

    fn fetch_refund_split_subs(
        &self,
        order_no: &OrderNo,
    ) -> impl Future<Output = Result<Vec<RefundSplitSub>, Self::Error>> + Send;

    fn fetch_notify_logs(&self, order_no: &OrderNo) -> impl Future<Output = Result<Vec<NotifyLog>, Self::Error>> + Send;

    fn fetch_summary(&self, date: NaiveDate) -> impl Future<Output = Result<Option<ReconSummary>, Self::Error>> + Send;
}
