use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;

use super::errors::ReconError;
use crate::{
    db::traits::{ExceptionQueryFilter, Page, Pagination, ReconQueries, ReconRepository},
    db_types::{
        NewReconSummary,
        NotifyLog,
        Order,
        OrderNo,
        ReconException,
        ReconStatus,
        ReconSummary,
        RefundSplitSub,
        SplitSub,
    },
};

const SUMMARY_PAGE_SIZE: usize = 500;

/// Read access to reconciliation results, and daily summary generation.
#[derive(Clone)]
pub struct ReconQueryApi<B> {
    db: B,
}

impl<B> Debug for ReconQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconQueryApi")
    }
}

impl<B> ReconQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReconQueryApi<B>
where B: ReconRepository + ReconQueries
{
    pub async fn order(&self, order_no: &OrderNo) -> Result<Option<Order>, ReconError> {
        ReconRepository::fetch_order(&self.db, order_no).await.map_err(ReconError::database)
    }

    pub async fn recon_status(&self, order_no: &OrderNo) -> Result<Option<ReconStatus>, ReconError> {
        Ok(self.order(order_no).await?.map(|o| o.recon_status))
    }

    /// A page of the orders placed on `date`, with the total number of matching orders.
    pub async fn orders_by_date(
        &self,
        date: NaiveDate,
        status: Option<ReconStatus>,
        page: Pagination,
    ) -> Result<Page<Order>, ReconError> {
        self.db.fetch_orders_by_date(date, status, page).await.map_err(ReconError::database)
    }

    pub async fn exceptions(&self, order_no: &OrderNo) -> Result<Vec<ReconException>, ReconError> {
        self.db.fetch_exceptions(order_no).await.map_err(ReconError::database)
    }

    /// Lists exceptions across orders, newest first. Filter by merchant, by the date range they were raised in, or by
    /// the rule that raised them.
    pub async fn exceptions_filtered(
        &self,
        filter: &ExceptionQueryFilter,
        page: Pagination,
    ) -> Result<Page<ReconException>, ReconError> {
        self.db.fetch_exceptions_filtered(filter, page).await.map_err(ReconError::database)
    }

    /// The split records of an order, including their notify status.
    pub async fn split_subs(&self, order_no: &OrderNo) -> Result<Vec<SplitSub>, ReconError> {
        self.db.fetch_split_subs(order_no).await.map_err(ReconError::database)
    }

    pub async fn refund_splits(&self, order_no: &OrderNo) -> Result<Vec<RefundSplitSub>, ReconError> {
        self.db.fetch_refund_split_subs(order_no).await.map_err(ReconError::database)
    }

    pub async fn notify_logs(&self, order_no: &OrderNo) -> Result<Vec<NotifyLog>, ReconError> {
        self.db.fetch_notify_logs(order_no).await.map_err(ReconError::database)
    }

    pub async fn summary(&self, date: NaiveDate) -> Result<Option<ReconSummary>, ReconError> {
        self.db.fetch_summary(date).await.map_err(ReconError::database)
    }

    /// Tallies every order placed on `date` and saves the result, replacing any earlier summary for that date.
    pub async fn generate_daily_summary(&self, date: NaiveDate) -> Result<NewReconSummary, ReconError> {
        let mut summary = NewReconSummary::new(date);
        let mut page = 1;
        loop {
            let orders = self.orders_by_date(date, None, Pagination::page(page, SUMMARY_PAGE_SIZE)).await?;
            for order in &orders.items {
                summary.tally(order).map_err(|e| {
                    ReconError::AmountOverflow(format!("total of the orders placed on {date}. {e}"))
                })?;
            }
            if !orders.has_more() || orders.items.is_empty() {
                break;
            }
            page += 1;
        }
        self.db.save_summary(summary.clone()).await.map_err(ReconError::database)?;
        info!(
            "🗃️ Summary for {date}: {} orders, {} reconciled, {} failed, {} pending. Total {}",
            summary.total_orders, summary.success_count, summary.fail_count, summary.init_count, summary.total_amount
        );
        Ok(summary)
    }
}
