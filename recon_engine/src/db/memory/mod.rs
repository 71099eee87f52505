//! In-memory database backend.
//!
//! [`MemoryDatabase`] implements [`ReconRepository`] and [`ReconQueries`] over plain collections behind a `RwLock`. It
//! is intended for tests and for embedding the engine where durability is not required.
//!
//! ## Limitations
//!
//! - No durability: all state is lost when the last handle is dropped
//! - Single-process only
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, Utc};
use log::*;
use thiserror::Error;

use crate::{
    db::traits::{ExceptionQueryFilter, InsertOrderResult, Page, Pagination, ReconQueries, ReconRepository},
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

#[derive(Debug, Clone, Error)]
pub enum MemoryDatabaseError {
    #[error("The in-memory store lock is poisoned")]
    LockPoisoned,
    #[error("The in-memory store is offline")]
    Offline,
    #[error("Split record for order {0} refers to an order that does not exist")]
    OrphanedSplit(OrderNo),
    #[error("Order {order_no} already has a split record for sub-order {sub_order_no} of merchant {merchant_id}")]
    DuplicateSubOrder { order_no: OrderNo, merchant_id: String, sub_order_no: String },
}

fn poison_err<T>(_: PoisonError<T>) -> MemoryDatabaseError {
    MemoryDatabaseError::LockPoisoned
}

#[derive(Debug, Default)]
struct Tables {
    offline: bool,
    orders: Vec<Order>,
    splits: Vec<SplitSub>,
    refunds: Vec<RefundSplitSub>,
    exceptions: Vec<ReconException>,
    notify_logs: Vec<NotifyLog>,
    summaries: Vec<ReconSummary>,
}

impl Tables {
    fn order_mut(&mut self, order_no: &OrderNo) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| &o.order_no == order_no)
    }

    /// A sub-order number may appear only once per order and merchant, both within the batch and against the stored
    /// records. Records without a sub-order number are not constrained.
    fn check_unique_sub_orders(&self, splits: &[NewSplitSub]) -> Result<(), MemoryDatabaseError> {
        for (i, split) in splits.iter().enumerate() {
            let Some(sub_order_no) = split.sub_order_no.as_deref() else {
                continue;
            };
            let same_key = |order_no: &OrderNo, merchant_id: &str, other: Option<&str>| {
                order_no == &split.order_no && merchant_id == split.merchant_id && other == Some(sub_order_no)
            };
            let stored = self.splits.iter().any(|s| same_key(&s.order_no, &s.merchant_id, s.sub_order_no.as_deref()));
            let repeated =
                splits[..i].iter().any(|s| same_key(&s.order_no, &s.merchant_id, s.sub_order_no.as_deref()));
            if stored || repeated {
                return Err(MemoryDatabaseError::DuplicateSubOrder {
                    order_no: split.order_no.clone(),
                    merchant_id: split.merchant_id.clone(),
                    sub_order_no: sub_order_no.to_string(),
                });
            }
        }
        Ok(())
    }

    fn push_splits(&mut self, splits: &[NewSplitSub]) {
        for split in splits {
            let id = next_id(self.splits.len());
            self.splits.push(split.clone().into_split_sub(id));
        }
    }
}

/// Thread-safe in-memory store. Clones share the same underlying tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every operation fails with [`MemoryDatabaseError::Offline`]. Used to simulate an unavailable
    /// database.
    pub fn set_offline(&self, offline: bool) -> Result<(), MemoryDatabaseError> {
        let mut tables = self.tables.write().map_err(poison_err)?;
        tables.offline = offline;
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, MemoryDatabaseError> {
        let tables = self.tables.read().map_err(poison_err)?;
        if tables.offline {
            return Err(MemoryDatabaseError::Offline);
        }
        Ok(tables)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, MemoryDatabaseError> {
        let tables = self.tables.write().map_err(poison_err)?;
        if tables.offline {
            return Err(MemoryDatabaseError::Offline);
        }
        Ok(tables)
    }
}

fn paged<'a, T: Clone + 'a>(matching: impl Iterator<Item = &'a T>, page: Pagination) -> Page<T> {
    let mut total = 0u64;
    let mut items = Vec::new();
    for (i, item) in matching.enumerate() {
        total += 1;
        if i >= page.offset && items.len() < page.limit {
            items.push(item.clone());
        }
    }
    Page::new(items, total, page)
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX).saturating_add(1)
}

impl ReconRepository for MemoryDatabase {
    type Error = MemoryDatabaseError;

    fn url(&self) -> &str {
        "memory://"
    }

    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, Self::Error> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.orders.iter().find(|o| o.order_no == order.order_no) {
            return Ok(InsertOrderResult::AlreadyExists(existing.id));
        }
        let id = next_id(tables.orders.len());
        trace!("🗃️ Order {} saved in memory with id {id}", order.order_no);
        tables.orders.push(order.into_order(id));
        Ok(InsertOrderResult::Inserted(id))
    }

    async fn insert_order_with_splits(
        &self,
        order: NewOrder,
        splits: &[NewSplitSub],
    ) -> Result<InsertOrderResult, Self::Error> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.orders.iter().find(|o| o.order_no == order.order_no) {
            return Ok(InsertOrderResult::AlreadyExists(existing.id));
        }
        if let Some(orphan) = splits.iter().find(|s| s.order_no != order.order_no) {
            return Err(MemoryDatabaseError::OrphanedSplit(orphan.order_no.clone()));
        }
        tables.check_unique_sub_orders(splits)?;
        let id = next_id(tables.orders.len());
        trace!("🗃️ Order {} saved in memory with id {id}, along with {} split records", order.order_no, splits.len());
        tables.orders.push(order.into_order(id));
        tables.push_splits(splits);
        Ok(InsertOrderResult::Inserted(id))
    }

    async fn save_split_subs(&self, splits: &[NewSplitSub]) -> Result<usize, Self::Error> {
        let mut tables = self.write()?;
        if let Some(orphan) = splits.iter().find(|s| !tables.orders.iter().any(|o| o.order_no == s.order_no)) {
            return Err(MemoryDatabaseError::OrphanedSplit(orphan.order_no.clone()));
        }
        tables.check_unique_sub_orders(splits)?;
        tables.push_splits(splits);
        Ok(splits.len())
    }

    async fn save_refund_split_subs(&self, refunds: &[NewRefundSplitSub]) -> Result<usize, Self::Error> {
        let mut tables = self.write()?;
        for refund in refunds {
            let id = next_id(tables.refunds.len());
            tables.refunds.push(refund.clone().into_refund_split_sub(id));
        }
        Ok(refunds.len())
    }

    async fn save_exception(&self, exception: NewReconException) -> Result<i64, Self::Error> {
        let mut tables = self.write()?;
        let id = next_id(tables.exceptions.len());
        tables.exceptions.push(exception.into_exception(id));
        Ok(id)
    }

    async fn save_exceptions(&self, exceptions: &[NewReconException]) -> Result<usize, Self::Error> {
        let mut tables = self.write()?;
        for exception in exceptions {
            let id = next_id(tables.exceptions.len());
            tables.exceptions.push(exception.clone().into_exception(id));
        }
        Ok(exceptions.len())
    }

    async fn save_notify_log(&self, log: NewNotifyLog) -> Result<i64, Self::Error> {
        let mut tables = self.write()?;
        let id = next_id(tables.notify_logs.len());
        tables.notify_logs.push(log.into_notify_log(id));
        Ok(id)
    }

    async fn save_summary(&self, summary: NewReconSummary) -> Result<(), Self::Error> {
        let mut tables = self.write()?;
        let now = Utc::now();
        match tables.summaries.iter_mut().find(|s| s.summary_date == summary.summary_date) {
            Some(existing) => {
                existing.total_orders = summary.total_orders;
                existing.success_count = summary.success_count;
                existing.fail_count = summary.fail_count;
                existing.init_count = summary.init_count;
                existing.total_amount = summary.total_amount;
                existing.updated_at = now;
            },
            None => {
                let id = next_id(tables.summaries.len());
                tables.summaries.push(ReconSummary {
                    id,
                    summary_date: summary.summary_date,
                    total_orders: summary.total_orders,
                    success_count: summary.success_count,
                    fail_count: summary.fail_count,
                    init_count: summary.init_count,
                    total_amount: summary.total_amount,
                    created_at: now,
                    updated_at: now,
                });
            },
        }
        Ok(())
    }

    async fn update_recon_status(
        &self,
        order_no: &OrderNo,
        expected: ReconStatus,
        status: ReconStatus,
    ) -> Result<bool, Self::Error> {
        let mut tables = self.write()?;
        let order = match tables.order_mut(order_no) {
            Some(order) if order.recon_status == expected => order,
            _ => return Ok(false),
        };
        let now = Utc::now();
        order.recon_status = status;
        if status.is_terminal() {
            order.recon_time = Some(now);
        }
        order.updated_at = now;
        Ok(true)
    }

    async fn update_notify_status(&self, order_no: &OrderNo, status: NotifyStatus) -> Result<bool, Self::Error> {
        let mut tables = self.write()?;
        Ok(tables
            .order_mut(order_no)
            .map(|order| {
                order.notify_status = status;
                order.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn update_refund(&self, order_no: &OrderNo, refund: RefundUpdate) -> Result<bool, Self::Error> {
        let mut tables = self.write()?;
        Ok(tables
            .order_mut(order_no)
            .map(|order| {
                order.refund_status = Some(refund.refund_status);
                order.refund_amount = Some(refund.refund_amount);
                order.refund_time = Some(refund.refund_time);
                order.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn update_split_sub_notify(
        &self,
        order_no: &OrderNo,
        merchant_id: &str,
        sub_order_no: &str,
        status: NotifyStatus,
        result: Option<String>,
    ) -> Result<bool, Self::Error> {
        let mut tables = self.write()?;
        let split = tables.splits.iter_mut().find(|s| {
            &s.order_no == order_no && s.merchant_id == merchant_id && s.sub_order_no.as_deref() == Some(sub_order_no)
        });
        Ok(split
            .map(|split| {
                split.notify_status = status;
                split.notify_result = result;
                split.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn fetch_order(&self, order_no: &OrderNo) -> Result<Option<Order>, Self::Error> {
        let tables = self.read()?;
        Ok(tables.orders.iter().find(|o| &o.order_no == order_no).cloned())
    }

    async fn fetch_order_by_merchant_order_no(
        &self,
        merchant_id: &str,
        merchant_order_no: &str,
    ) -> Result<Option<Order>, Self::Error> {
        let tables = self.read()?;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.merchant_id == merchant_id && o.merchant_order_no.as_deref() == Some(merchant_order_no))
            .cloned())
    }

    async fn fetch_split_subs(&self, order_no: &OrderNo) -> Result<Vec<SplitSub>, Self::Error> {
        let tables = self.read()?;
        Ok(tables.splits.iter().filter(|s| &s.order_no == order_no).cloned().collect())
    }

    async fn fetch_split_sub_by_sub_order_no(
        &self,
        merchant_id: &str,
        sub_order_no: &str,
    ) -> Result<Option<SplitSub>, Self::Error> {
        let tables = self.read()?;
        Ok(tables
            .splits
            .iter()
            .find(|s| s.merchant_id == merchant_id && s.sub_order_no.as_deref() == Some(sub_order_no))
            .cloned())
    }

    async fn fetch_pending_orders(&self, date: NaiveDate, after_id: i64, limit: usize) -> Result<Vec<Order>, Self::Error> {
        let tables = self.read()?;
        Ok(tables
            .orders
            .iter()
            .filter(|o| o.id > after_id && o.recon_status == ReconStatus::Pending && o.order_time.date_naive() == date)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ReconQueries for MemoryDatabase {
    type Error = MemoryDatabaseError;

    async fn fetch_orders_by_date(
        &self,
        date: NaiveDate,
        status: Option<ReconStatus>,
        page: Pagination,
    ) -> Result<Page<Order>, Self::Error> {
        let tables = self.read()?;
        let matching = tables
            .orders
            .iter()
            .filter(|o| o.order_time.date_naive() == date && status.map_or(true, |s| o.recon_status == s));
        Ok(paged(matching, page))
    }

    async fn fetch_exceptions(&self, order_no: &OrderNo) -> Result<Vec<ReconException>, Self::Error> {
        let tables = self.read()?;
        Ok(tables.exceptions.iter().filter(|e| &e.order_no == order_no).cloned().collect())
    }

    async fn fetch_exceptions_filtered(
        &self,
        filter: &ExceptionQueryFilter,
        page: Pagination,
    ) -> Result<Page<ReconException>, Self::Error> {
        let tables = self.read()?;
        let matching = tables
            .exceptions
            .iter()
            .rev()
            .filter(|e| filter.matches(&e.merchant_id, e.created_at.date_naive(), e.exception_step));
        Ok(paged(matching, page))
    }

    async fn fetch_refund_split_subs(&self, order_no: &OrderNo) -> Result<Vec<RefundSplitSub>, Self::Error> {
        let tables = self.read()?;
        Ok(tables.refunds.iter().filter(|r| &r.order_no == order_no).cloned().collect())
    }

    async fn fetch_notify_logs(&self, order_no: &OrderNo) -> Result<Vec<NotifyLog>, Self::Error> {
        let tables = self.read()?;
        Ok(tables.notify_logs.iter().filter(|l| &l.order_no == order_no).cloned().collect())
    }

    async fn fetch_summary(&self, date: NaiveDate) -> Result<Option<ReconSummary>, Self::Error> {
        let tables = self.read()?;
        Ok(tables.summaries.iter().find(|s| s.summary_date == date).cloned())
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::db_types::{Amount, PayStatus, SplitStatus};

    fn order(no: &str) -> NewOrder {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        NewOrder::new(OrderNo::from(no), "m1", Amount::from(100), time)
    }

    #[tokio::test]
    async fn duplicate_orders_are_not_overwritten() {
        let db = MemoryDatabase::new();
        let first = db.insert_order(order("o1")).await.unwrap();
        assert_eq!(first, InsertOrderResult::Inserted(1));
        let mut dup = order("o1");
        dup.actual_amount = Amount::from(999);
        let second = db.insert_order(dup).await.unwrap();
        assert_eq!(second, InsertOrderResult::AlreadyExists(1));
        let stored = db.fetch_order(&OrderNo::from("o1")).await.unwrap().unwrap();
        assert_eq!(stored.actual_amount, Amount::from(100));
    }

    #[tokio::test]
    async fn recon_status_updates_are_conditional() {
        let db = MemoryDatabase::new();
        db.insert_order(order("o1")).await.unwrap();
        let no = OrderNo::from("o1");
        assert!(db.update_recon_status(&no, ReconStatus::Pending, ReconStatus::Success).await.unwrap());
        assert!(!db.update_recon_status(&no, ReconStatus::Pending, ReconStatus::Failure).await.unwrap());
        let stored = db.fetch_order(&no).await.unwrap().unwrap();
        assert_eq!(stored.recon_status, ReconStatus::Success);
        assert!(stored.recon_time.is_some());
        let missing = OrderNo::from("nope");
        assert!(!db.update_recon_status(&missing, ReconStatus::Pending, ReconStatus::Success).await.unwrap());
    }

    #[tokio::test]
    async fn splits_need_a_parent_order() {
        let db = MemoryDatabase::new();
        let split = NewSplitSub {
            order_no: OrderNo::from("ghost"),
            sub_order_no: None,
            merchant_id: "m1".into(),
            split_amount: Amount::from(1),
            status: SplitStatus::Success,
            notify_status: NotifyStatus::Success,
            notify_result: None,
            created_at: Utc::now(),
        };
        let err = db.save_split_subs(&[split]).await.unwrap_err();
        assert!(matches!(err, MemoryDatabaseError::OrphanedSplit(_)));
    }

    fn split(order_no: &str, merchant_id: &str, sub_order_no: Option<&str>) -> NewSplitSub {
        NewSplitSub {
            order_no: OrderNo::from(order_no),
            sub_order_no: sub_order_no.map(String::from),
            merchant_id: merchant_id.into(),
            split_amount: Amount::from(1),
            status: SplitStatus::Success,
            notify_status: NotifyStatus::Processing,
            notify_result: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sub_orders_are_unique_per_order_and_merchant() {
        let db = MemoryDatabase::new();
        db.insert_order(order("o1")).await.unwrap();
        db.save_split_subs(&[split("o1", "m1", Some("s1"))]).await.unwrap();
        let err = db.save_split_subs(&[split("o1", "m1", Some("s1"))]).await.unwrap_err();
        assert!(matches!(err, MemoryDatabaseError::DuplicateSubOrder { ref sub_order_no, .. } if sub_order_no == "s1"));
        let batch = [split("o1", "m2", Some("s2")), split("o1", "m2", Some("s2"))];
        assert!(matches!(db.save_split_subs(&batch).await, Err(MemoryDatabaseError::DuplicateSubOrder { .. })));
        // Other merchants may reuse the number, and splits without a sub-order number are unconstrained
        let saved = db
            .save_split_subs(&[split("o1", "m2", Some("s1")), split("o1", "m1", None), split("o1", "m1", None)])
            .await
            .unwrap();
        assert_eq!(saved, 3);
        assert_eq!(db.fetch_split_subs(&OrderNo::from("o1")).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn orders_and_splits_are_saved_together() {
        let db = MemoryDatabase::new();
        let no = OrderNo::from("o1");
        let bad = [split("o1", "m1", Some("s1")), split("o1", "m1", Some("s1"))];
        let err = db.insert_order_with_splits(order("o1"), &bad).await.unwrap_err();
        assert!(matches!(err, MemoryDatabaseError::DuplicateSubOrder { .. }));
        assert!(db.fetch_order(&no).await.unwrap().is_none());
        assert!(db.fetch_split_subs(&no).await.unwrap().is_empty());

        let good = [split("o1", "m1", Some("s1")), split("o1", "m1", Some("s2"))];
        let result = db.insert_order_with_splits(order("o1"), &good).await.unwrap();
        assert_eq!(result, InsertOrderResult::Inserted(1));
        assert_eq!(db.fetch_split_subs(&no).await.unwrap().len(), 2);
        let again = db.insert_order_with_splits(order("o1"), &good).await.unwrap();
        assert_eq!(again, InsertOrderResult::AlreadyExists(1));
        assert_eq!(db.fetch_split_subs(&no).await.unwrap().len(), 2);
        let stray = [split("elsewhere", "m1", None)];
        assert!(matches!(
            db.insert_order_with_splits(order("o2"), &stray).await,
            Err(MemoryDatabaseError::OrphanedSplit(_))
        ));
        assert!(db.fetch_order(&OrderNo::from("o2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_orders_are_paged_by_id() {
        let db = MemoryDatabase::new();
        for i in 0..5 {
            db.insert_order(order(&format!("o{i}"))).await.unwrap();
        }
        let settled = order("settled").with_statuses(PayStatus::Success, SplitStatus::Success, NotifyStatus::Success);
        db.insert_order(settled).await.unwrap();
        db.update_recon_status(&OrderNo::from("settled"), ReconStatus::Pending, ReconStatus::Success).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let page = db.fetch_pending_orders(date, 0, 3).await.unwrap();
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let page = db.fetch_pending_orders(date, 3, 3).await.unwrap();
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![4, 5]);
        let other_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        assert!(db.fetch_pending_orders(other_day, 0, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_rejects_everything() {
        let db = MemoryDatabase::new();
        db.set_offline(true).unwrap();
        assert!(matches!(db.insert_order(order("o1")).await, Err(MemoryDatabaseError::Offline)));
        assert!(matches!(db.fetch_order(&OrderNo::from("o1")).await, Err(MemoryDatabaseError::Offline)));
        db.set_offline(false).unwrap();
        assert!(db.insert_order(order("o1")).await.is_ok());
    }
}
