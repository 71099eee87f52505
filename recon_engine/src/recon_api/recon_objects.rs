use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Amount,
    ExceptionStep,
    NotifyStatus,
    OrderNo,
    PayStatus,
    ReconStatus,
    RefundStatus,
    SplitStatus,
};

/// The merchant id recorded against orders that are reconciled without an explicit merchant.
pub const SELF_MERCHANT_ID: &str = "SELF";

//--------------------------------------        OrderKey       ---------------------------------------------------------
/// The ways an order can be identified by callers of the notify and refund paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKey {
    /// The canonical order number
    OrderNo(OrderNo),
    /// A beneficiary's sub-order number, unique per merchant
    SubOrder { merchant_id: String, sub_order_no: String },
    /// The merchant's own order reference
    MerchantOrder { merchant_id: String, merchant_order_no: String },
}

impl OrderKey {
    pub fn sub_order<S1: Into<String>, S2: Into<String>>(merchant_id: S1, sub_order_no: S2) -> Self {
        Self::SubOrder { merchant_id: merchant_id.into(), sub_order_no: sub_order_no.into() }
    }

    pub fn merchant_order<S1: Into<String>, S2: Into<String>>(merchant_id: S1, merchant_order_no: S2) -> Self {
        Self::MerchantOrder { merchant_id: merchant_id.into(), merchant_order_no: merchant_order_no.into() }
    }
}

impl From<OrderNo> for OrderKey {
    fn from(order_no: OrderNo) -> Self {
        Self::OrderNo(order_no)
    }
}

impl Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrderNo(no) => write!(f, "order {no}"),
            Self::SubOrder { merchant_id, sub_order_no } => write!(f, "sub-order {sub_order_no} ({merchant_id})"),
            Self::MerchantOrder { merchant_id, merchant_order_no } => {
                write!(f, "merchant order {merchant_order_no} ({merchant_id})")
            },
        }
    }
}

/// The result of resolving an [`OrderKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub order_no: OrderNo,
    /// The merchant the key belongs to, for keys that carry one
    pub merchant_id: Option<String>,
    pub sub_order_no: Option<String>,
    pub merchant_order_no: Option<String>,
}

impl ResolvedOrder {
    pub fn new(order_no: OrderNo) -> Self {
        Self { order_no, merchant_id: None, sub_order_no: None, merchant_order_no: None }
    }
}

//--------------------------------------   OrderReconRequest   ---------------------------------------------------------
/// One beneficiary's share of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitDetail {
    pub merchant_id: String,
    pub sub_order_no: Option<String>,
    pub amount: Amount,
}

impl SplitDetail {
    pub fn new<S: Into<String>>(merchant_id: S, amount: Amount) -> Self {
        Self { merchant_id: merchant_id.into(), sub_order_no: None, amount }
    }

    pub fn with_sub_order_no<S: Into<String>>(mut self, sub_order_no: S) -> Self {
        self.sub_order_no = Some(sub_order_no.into());
        self
    }
}

/// Everything the decision engine needs to reconcile a new order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReconRequest {
    pub order_no: OrderNo,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub merchant_order_no: Option<String>,
    pub pay_amount: Amount,
    pub platform_income: Amount,
    pub pay_fee: Amount,
    pub split_details: Vec<SplitDetail>,
    pub pay_status: PayStatus,
    pub split_status: SplitStatus,
    pub notify_status: NotifyStatus,
    pub order_time: DateTime<Utc>,
    pub pay_time: Option<DateTime<Utc>>,
}

impl OrderReconRequest {
    /// Creates a request for a self-operated order with no splits, income or fees, and all sub-statuses successful.
    pub fn new<O: Into<OrderNo>>(order_no: O, pay_amount: Amount) -> Self {
        let now = Utc::now();
        Self {
            order_no: order_no.into(),
            merchant_id: SELF_MERCHANT_ID.to_string(),
            merchant_name: None,
            merchant_order_no: None,
            pay_amount,
            platform_income: Amount::ZERO,
            pay_fee: Amount::ZERO,
            split_details: Vec::new(),
            pay_status: PayStatus::Success,
            split_status: SplitStatus::Success,
            notify_status: NotifyStatus::Success,
            order_time: now,
            pay_time: Some(now),
        }
    }

    pub fn with_merchant<S: Into<String>>(mut self, merchant_id: S, merchant_name: Option<String>) -> Self {
        self.merchant_id = merchant_id.into();
        self.merchant_name = merchant_name;
        self
    }

    pub fn with_merchant_order_no<S: Into<String>>(mut self, merchant_order_no: S) -> Self {
        self.merchant_order_no = Some(merchant_order_no.into());
        self
    }

    pub fn with_income_and_fee(mut self, platform_income: Amount, pay_fee: Amount) -> Self {
        self.platform_income = platform_income;
        self.pay_fee = pay_fee;
        self
    }

    pub fn with_split(mut self, split: SplitDetail) -> Self {
        self.split_details.push(split);
        self
    }

    pub fn with_splits(mut self, splits: Vec<SplitDetail>) -> Self {
        self.split_details = splits;
        self
    }

    pub fn with_statuses(mut self, pay: PayStatus, split: SplitStatus, notify: NotifyStatus) -> Self {
        self.pay_status = pay;
        self.split_status = split;
        self.notify_status = notify;
        self
    }

    pub fn with_order_time(mut self, order_time: DateTime<Utc>) -> Self {
        self.order_time = order_time;
        self
    }

    pub fn with_pay_time(mut self, pay_time: Option<DateTime<Utc>>) -> Self {
        self.pay_time = pay_time;
        self
    }
}

//--------------------------------------  RefundReconRequest   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundSplitDetail {
    pub merchant_id: String,
    pub sub_order_no: Option<String>,
    pub amount: Amount,
}

impl RefundSplitDetail {
    pub fn new<S: Into<String>>(merchant_id: S, amount: Amount) -> Self {
        Self { merchant_id: merchant_id.into(), sub_order_no: None, amount }
    }

    pub fn with_sub_order_no<S: Into<String>>(mut self, sub_order_no: S) -> Self {
        self.sub_order_no = Some(sub_order_no.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReconRequest {
    pub key: OrderKey,
    pub refund_amount: Amount,
    pub refund_time: DateTime<Utc>,
    pub refund_status: RefundStatus,
    pub splits: Vec<RefundSplitDetail>,
}

impl RefundReconRequest {
    /// A successful refund of `refund_amount`, happening now, with no split allocations.
    pub fn new<K: Into<OrderKey>>(key: K, refund_amount: Amount) -> Self {
        Self {
            key: key.into(),
            refund_amount,
            refund_time: Utc::now(),
            refund_status: RefundStatus::Success,
            splits: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: RefundStatus) -> Self {
        self.refund_status = status;
        self
    }

    pub fn with_refund_time(mut self, refund_time: DateTime<Utc>) -> Self {
        self.refund_time = refund_time;
        self
    }

    pub fn with_split(mut self, split: RefundSplitDetail) -> Self {
        self.splits.push(split);
        self
    }
}

//--------------------------------------  NotifyReconRequest   ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyReconRequest {
    pub key: OrderKey,
    pub merchant_id: String,
    pub notify_url: String,
    pub notify_status: NotifyStatus,
    pub notify_result: Option<String>,
}

impl NotifyReconRequest {
    pub fn new<K, S1, S2>(key: K, merchant_id: S1, notify_url: S2, status: NotifyStatus) -> Self
    where
        K: Into<OrderKey>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            key: key.into(),
            merchant_id: merchant_id.into(),
            notify_url: notify_url.into(),
            notify_status: status,
            notify_result: None,
        }
    }

    pub fn with_result<S: Into<String>>(mut self, result: S) -> Self {
        self.notify_result = Some(result.into());
        self
    }
}

//--------------------------------------       Outcomes        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconOutcome {
    pub order_no: OrderNo,
    pub recon_status: ReconStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub order_no: OrderNo,
    pub refund_status: RefundStatus,
    /// The number of refund allocation records written
    pub splits_recorded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyOutcome {
    pub order_no: OrderNo,
    pub log_id: i64,
    /// True if the notify moved the order's reconciliation status from pending to success
    pub status_advanced: bool,
}

/// What happened to a single pending order during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    Succeeded,
    Failed(ExceptionStep),
    /// A sub-status is still processing, so the order stays pending
    Skipped,
    /// The order's status was changed by someone else while it was being evaluated
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub date: NaiveDate,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub superseded: usize,
    pub errors: usize,
}

impl SweepReport {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, processed: 0, succeeded: 0, failed: 0, skipped: 0, superseded: 0, errors: 0 }
    }

    pub fn tally(&mut self, outcome: SweepOutcome) {
        match outcome {
            SweepOutcome::Succeeded => self.succeeded += 1,
            SweepOutcome::Failed(_) => self.failed += 1,
            SweepOutcome::Skipped => self.skipped += 1,
            SweepOutcome::Superseded => self.superseded += 1,
        }
    }
}

impl Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sweep for {}: {} orders processed. {} succeeded, {} failed, {} still pending, {} changed concurrently, {} \
             errors",
            self.date, self.processed, self.succeeded, self.failed, self.skipped, self.superseded, self.errors
        )
    }
}
