use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;
use sqlx::{migrate, SqlitePool};

use super::{db_url, exceptions, new_pool, notify_logs, orders, refunds, splits, summaries, SqliteDatabaseError};
use crate::{
    db::{
        sqlite::orders::OrderQueryFilter,
        traits::{ExceptionQueryFilter, InsertOrderResult, Page, Pagination, ReconQueries, ReconRepository},
    },
    db_types::{
        NewNotifyLog,
        NewOrder,
        NewReconException,
        NewReconSummary,
        NewRefundSplitSub,
        NewSplitSub,
        NotifyLog,
        NotifyStatus,
        Order,
        OrderNo,
        ReconException,
        ReconStatus,
        ReconSummary,
        RefundSplitSub,
        RefundUpdate,
        SplitSub,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl ReconRepository for SqliteDatabase {
    type Error = SqliteDatabaseError;

    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let order_no = order.order_no.clone();
        let result = orders::idempotent_insert(order, &mut conn).await?;
        if let InsertOrderResult::Inserted(id) = result {
            debug!("🗃️ Order {order_no} has been saved in the DB with id {id}");
        }
        Ok(result)
    }

    /// Takes a new order and its split records, and in a single atomic transaction,
    /// * inserts the order. If the order already exists, the transaction is rolled back and nothing further is done.
    /// * inserts every split record of the order.
    ///
    /// If any split record is rejected, the order is rolled back too.
    async fn insert_order_with_splits(
        &self,
        order: NewOrder,
        splits: &[NewSplitSub],
    ) -> Result<InsertOrderResult, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let order_no = order.order_no.clone();
        let id = match orders::idempotent_insert(order, &mut tx).await? {
            InsertOrderResult::Inserted(id) => id,
            existing @ InsertOrderResult::AlreadyExists(_) => return Ok(existing),
        };
        let count = splits::insert_split_subs(splits, &mut tx).await?;
        if count != splits.len() {
            return Err(SqliteDatabaseError::QueryError(format!(
                "only {count} of {} split records could be saved for order {order_no}",
                splits.len()
            )));
        }
        tx.commit().await?;
        debug!("🗃️ Order {order_no} has been saved in the DB with id {id}, along with {count} split records");
        Ok(InsertOrderResult::Inserted(id))
    }

    /// Saves all the split records in a single transaction.
    async fn save_split_subs(&self, splits: &[NewSplitSub]) -> Result<usize, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let count = splits::insert_split_subs(splits, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ {count} split records saved");
        Ok(count)
    }

    async fn save_refund_split_subs(&self, refunds: &[NewRefundSplitSub]) -> Result<usize, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let count = refunds::insert_refund_split_subs(refunds, &mut tx).await?;
        tx.commit().await?;
        trace!("🗃️ {count} refund split records saved");
        Ok(count)
    }

    async fn save_exception(&self, exception: NewReconException) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        exceptions::insert_exception(exception, &mut conn).await
    }

    async fn save_exceptions(&self, exceptions: &[NewReconException]) -> Result<usize, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let count = exceptions::insert_exceptions(exceptions, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn save_notify_log(&self, log: NewNotifyLog) -> Result<i64, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        notify_logs::insert_notify_log(log, &mut conn).await
    }

    async fn save_summary(&self, summary: NewReconSummary) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        summaries::upsert_summary(summary, &mut conn).await
    }

    async fn update_recon_status(
        &self,
        order_no: &OrderNo,
        expected: ReconStatus,
        status: ReconStatus,
    ) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::update_recon_status(order_no, expected, status, &mut conn).await
    }

    async fn update_notify_status(&self, order_no: &OrderNo, status: NotifyStatus) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::update_notify_status(order_no, status, &mut conn).await
    }

    async fn update_refund(&self, order_no: &OrderNo, refund: RefundUpdate) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::update_refund(order_no, refund, &mut conn).await
    }

    async fn update_split_sub_notify(
        &self,
        order_no: &OrderNo,
        merchant_id: &str,
        sub_order_no: &str,
        status: NotifyStatus,
        result: Option<String>,
    ) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        splits::update_notify(order_no, merchant_id, sub_order_no, status, result, &mut conn).await
    }

    async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_no(order_no, &mut conn).await
    }

    async fn fetch_order_by_merchant_order_no(
        &self,
        merchant_id: &str,
        merchant_order_no: &str,
    ) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_merchant_order_no(merchant_id, merchant_order_no, &mut conn).await
    }

    async fn fetch_split_subs(&self, order_no: &OrderNo) -> Result<Vec<SplitSub>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        splits::fetch_split_subs(order_no, &mut conn).await
    }

    async fn fetch_split_sub_by_sub_order_no(
        &self,
        merchant_id: &str,
        sub_order_no: &str,
    ) -> Result<Option<SplitSub>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        splits::fetch_split_sub_by_sub_order_no(merchant_id, sub_order_no, &mut conn).await
    }

    async fn fetch_pending_orders(&self, date: NaiveDate, after_id: i64, limit: usize) -> Result<Vec<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_pending_orders(date, after_id, limit, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.pool.close().await;
        Ok(())
    }
}

impl ReconQueries for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn fetch_orders_by_date(
        &self,
        date: NaiveDate,
        status: Option<ReconStatus>,
        page: Pagination,
    ) -> Result<Page<Order>, Self::Error> {
        let mut query = OrderQueryFilter::default().with_order_date(date).with_page(page.offset, page.limit);
        if let Some(status) = status {
            query = query.with_recon_status(status);
        }
        let mut conn = self.pool.acquire().await?;
        let total = orders::count_orders(&query, &mut conn).await?;
        let items = orders::fetch_orders(query, &mut conn).await?;
        Ok(Page::new(items, total, page))
    }

    async fn fetch_exceptions(&self, order_no: &OrderNo) -> Result<Vec<ReconException>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        exceptions::fetch_exceptions(order_no, &mut conn).await
    }

    async fn fetch_exceptions_filtered(
        &self,
        filter: &ExceptionQueryFilter,
        page: Pagination,
    ) -> Result<Page<ReconException>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        let total = exceptions::count_exceptions(filter, &mut conn).await?;
        let items = exceptions::fetch_exceptions_filtered(filter, page.offset, page.limit, &mut conn).await?;
        Ok(Page::new(items, total, page))
    }

    async fn fetch_refund_split_subs(&self, order_no: &OrderNo) -> Result<Vec<RefundSplitSub>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        refunds::fetch_refund_split_subs(order_no, &mut conn).await
    }

    async fn fetch_notify_logs(&self, order_no: &OrderNo) -> Result<Vec<NotifyLog>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        notify_logs::fetch_notify_logs(order_no, &mut conn).await
    }

    async fn fetch_summary(&self, date: NaiveDate) -> Result<Option<ReconSummary>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        summaries::fetch_summary(date, &mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the `RECON_DATABASE_URL` environment variable, or the default url.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Creates the reconciliation tables if they do not exist yet.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Reconciliation tables are up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
