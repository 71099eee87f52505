//! Data types shared by the reconciliation engine and its database backends.
//!
//! The integer codes of the status enums are part of the storage format and are reproduced exactly. Note that
//! [`NotifyStatus`] does *not* share the numbering of the other statuses (`Failure` is `0`).
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use log::error;
pub use recon_common::{Amount, AmountOverflow};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid status value: {0}")]
pub struct ConversionError(String);

/// Declares an integer-coded status enum, along with its code, display and parsing conversions.
///
/// Unknown codes convert to the given default variant, logging an error, since the conversion from a stored code
/// cannot fail.
macro_rules! status_code {
    (
        $(#[$meta:meta])*
        $name:ident (default $default:ident) {
            $($(#[$vmeta:meta])* $variant:ident = $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code),+
        }

        impl $name {
            pub fn code(&self) -> i32 {
                *self as i32
            }
        }

        impl From<i32> for $name {
            fn from(code: i32) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    _ => {
                        error!(
                            "Invalid {} code: {code}. But this conversion cannot fail. Defaulting to {}",
                            stringify!($name),
                            stringify!($default)
                        );
                        Self::$default
                    },
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case(stringify!($variant)) || s == stringify!($code) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ConversionError(format!("{s} is not a valid {}", stringify!($name))))
            }
        }
    };
}

/// Shared behaviour of the three per-order sub-statuses that feed into the reconciliation decision.
pub trait SubStatus: Copy + Display {
    fn is_processing(&self) -> bool;
    fn is_failure(&self) -> bool;
}

//--------------------------------------      PayStatus       ---------------------------------------------------------
status_code! {
    /// The status of the payment itself.
    PayStatus (default Processing) {
        Processing = 0,
        Success = 1,
        Failure = 2,
    }
}

impl SubStatus for PayStatus {
    fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

//--------------------------------------     SplitStatus      ---------------------------------------------------------
status_code! {
    /// The status of the distribution of the order's funds to its beneficiaries.
    SplitStatus (default Processing) {
        Processing = 0,
        Success = 1,
        Failure = 2,
    }
}

impl SubStatus for SplitStatus {
    fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

//--------------------------------------     NotifyStatus     ---------------------------------------------------------
status_code! {
    /// The status of the merchant notification callback.
    NotifyStatus (default Processing) {
        Failure = 0,
        Success = 1,
        Processing = 2,
    }
}

impl SubStatus for NotifyStatus {
    fn is_processing(&self) -> bool {
        matches!(self, Self::Processing)
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

//--------------------------------------     ReconStatus      ---------------------------------------------------------
status_code! {
    /// The reconciliation verdict for an order. `Success` and `Failure` are terminal.
    ReconStatus (default Pending) {
        /// At least one sub-status is still processing, so no verdict has been reached yet.
        Pending = 0,
        Success = 1,
        Failure = 2,
    }
}

impl ReconStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

//--------------------------------------     RefundStatus     ---------------------------------------------------------
status_code! {
    RefundStatus (default Processing) {
        Processing = 0,
        Success = 1,
        Failure = 2,
    }
}

//--------------------------------------    ExceptionStep     ---------------------------------------------------------
status_code! {
    /// Identifies the reconciliation rule that raised an exception.
    ExceptionStep (default Other) {
        PayStatus = 1,
        SplitStatus = 2,
        NotifyStatus = 3,
        AmountMismatch = 4,
        Other = 5,
    }
}

impl ExceptionStep {
    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::PayStatus => "pay status failed",
            Self::SplitStatus => "split status failed",
            Self::NotifyStatus => "notify status failed",
            Self::AmountMismatch => "amount mismatch",
            Self::Other => "reconciliation error",
        }
    }
}

//--------------------------------------    ExceptionType     ---------------------------------------------------------
status_code! {
    ExceptionType (default Business) {
        /// A business rule violation raised by the reconciliation engine.
        Business = 1,
    }
}

//--------------------------------------        OrderNo        ---------------------------------------------------------
/// The canonical, globally unique order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderNo(pub String);

impl FromStr for OrderNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderNo {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    /// The merchant's own reference for this order. Unique per merchant when present.
    pub merchant_order_no: Option<String>,
    pub order_amount: Amount,
    /// The amount the customer actually paid
    pub actual_amount: Amount,
    pub platform_income: Amount,
    pub pay_fee: Amount,
    pub split_total_amount: Amount,
    pub pay_status: PayStatus,
    pub split_status: SplitStatus,
    pub notify_status: NotifyStatus,
    pub recon_status: ReconStatus,
    pub refund_status: Option<RefundStatus>,
    pub refund_amount: Option<Amount>,
    pub refund_time: Option<DateTime<Utc>>,
    pub order_time: DateTime<Utc>,
    pub pay_time: Option<DateTime<Utc>>,
    pub recon_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn any_processing(&self) -> bool {
        self.pay_status.is_processing() || self.split_status.is_processing() || self.notify_status.is_processing()
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: OrderNo,
    pub merchant_id: String,
    pub merchant_name: Option<String>,
    pub merchant_order_no: Option<String>,
    pub order_amount: Amount,
    pub actual_amount: Amount,
    pub platform_income: Amount,
    pub pay_fee: Amount,
    pub split_total_amount: Amount,
    pub pay_status: PayStatus,
    pub split_status: SplitStatus,
    pub notify_status: NotifyStatus,
    pub recon_status: ReconStatus,
    pub order_time: DateTime<Utc>,
    pub pay_time: Option<DateTime<Utc>>,
    pub recon_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Creates a new, pending order with all sub-statuses set to processing. The order and paid amounts are both set
    /// to `amount`.
    pub fn new(order_no: OrderNo, merchant_id: &str, amount: Amount, order_time: DateTime<Utc>) -> Self {
        Self {
            order_no,
            merchant_id: merchant_id.to_string(),
            merchant_name: None,
            merchant_order_no: None,
            order_amount: amount,
            actual_amount: amount,
            platform_income: Amount::ZERO,
            pay_fee: Amount::ZERO,
            split_total_amount: Amount::ZERO,
            pay_status: PayStatus::Processing,
            split_status: SplitStatus::Processing,
            notify_status: NotifyStatus::Processing,
            recon_status: ReconStatus::Pending,
            order_time,
            pay_time: None,
            recon_time: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_statuses(mut self, pay: PayStatus, split: SplitStatus, notify: NotifyStatus) -> Self {
        self.pay_status = pay;
        self.split_status = split;
        self.notify_status = notify;
        self
    }

    pub fn with_income_and_fee(mut self, platform_income: Amount, pay_fee: Amount) -> Self {
        self.platform_income = platform_income;
        self.pay_fee = pay_fee;
        self
    }

    pub fn with_merchant_order_no<S: Into<String>>(mut self, merchant_order_no: S) -> Self {
        self.merchant_order_no = Some(merchant_order_no.into());
        self
    }

    pub fn into_order(self, id: i64) -> Order {
        Order {
            id,
            order_no: self.order_no,
            merchant_id: self.merchant_id,
            merchant_name: self.merchant_name,
            merchant_order_no: self.merchant_order_no,
            order_amount: self.order_amount,
            actual_amount: self.actual_amount,
            platform_income: self.platform_income,
            pay_fee: self.pay_fee,
            split_total_amount: self.split_total_amount,
            pay_status: self.pay_status,
            split_status: self.split_status,
            notify_status: self.notify_status,
            recon_status: self.recon_status,
            refund_status: None,
            refund_amount: None,
            refund_time: None,
            order_time: self.order_time,
            pay_time: self.pay_time,
            recon_time: self.recon_time,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// The refund fields of an order, overwritten each time a refund is reconciled.
#[derive(Debug, Clone)]
pub struct RefundUpdate {
    pub refund_status: RefundStatus,
    pub refund_amount: Amount,
    pub refund_time: DateTime<Utc>,
}

//--------------------------------------       SplitSub        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SplitSub {
    pub id: i64,
    pub order_no: OrderNo,
    pub sub_order_no: Option<String>,
    pub merchant_id: String,
    pub split_amount: Amount,
    pub status: SplitStatus,
    pub notify_status: NotifyStatus,
    pub notify_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSplitSub {
    pub order_no: OrderNo,
    pub sub_order_no: Option<String>,
    pub merchant_id: String,
    pub split_amount: Amount,
    pub status: SplitStatus,
    pub notify_status: NotifyStatus,
    pub notify_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewSplitSub {
    pub fn into_split_sub(self, id: i64) -> SplitSub {
        SplitSub {
            id,
            order_no: self.order_no,
            sub_order_no: self.sub_order_no,
            merchant_id: self.merchant_id,
            split_amount: self.split_amount,
            status: self.status,
            notify_status: self.notify_status,
            notify_result: self.notify_result,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

//--------------------------------------    RefundSplitSub     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RefundSplitSub {
    pub id: i64,
    pub order_no: OrderNo,
    pub sub_order_no: Option<String>,
    pub merchant_id: String,
    pub merchant_order_no: Option<String>,
    pub refund_split_amount: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefundSplitSub {
    pub order_no: OrderNo,
    pub sub_order_no: Option<String>,
    pub merchant_id: String,
    pub merchant_order_no: Option<String>,
    pub refund_split_amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl NewRefundSplitSub {
    pub fn into_refund_split_sub(self, id: i64) -> RefundSplitSub {
        RefundSplitSub {
            id,
            order_no: self.order_no,
            sub_order_no: self.sub_order_no,
            merchant_id: self.merchant_id,
            merchant_order_no: self.merchant_order_no,
            refund_split_amount: self.refund_split_amount,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

//--------------------------------------    ReconException     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReconException {
    pub id: i64,
    pub order_no: OrderNo,
    pub merchant_id: String,
    pub exception_type: ExceptionType,
    pub exception_msg: String,
    pub exception_step: ExceptionStep,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReconException {
    pub order_no: OrderNo,
    pub merchant_id: String,
    pub exception_type: ExceptionType,
    pub exception_msg: String,
    pub exception_step: ExceptionStep,
    pub created_at: DateTime<Utc>,
}

impl NewReconException {
    /// A business exception raised by the reconciliation rules
    pub fn business(order_no: OrderNo, merchant_id: &str, message: &str, step: ExceptionStep) -> Self {
        Self {
            order_no,
            merchant_id: merchant_id.to_string(),
            exception_type: ExceptionType::Business,
            exception_msg: message.to_string(),
            exception_step: step,
            created_at: Utc::now(),
        }
    }

    pub fn into_exception(self, id: i64) -> ReconException {
        ReconException {
            id,
            order_no: self.order_no,
            merchant_id: self.merchant_id,
            exception_type: self.exception_type,
            exception_msg: self.exception_msg,
            exception_step: self.exception_step,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

//--------------------------------------       NotifyLog       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotifyLog {
    pub id: i64,
    pub order_no: OrderNo,
    pub sub_order_no: Option<String>,
    pub merchant_id: String,
    pub notify_url: String,
    pub notify_status: NotifyStatus,
    pub notify_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotifyLog {
    pub order_no: OrderNo,
    pub sub_order_no: Option<String>,
    pub merchant_id: String,
    pub notify_url: String,
    pub notify_status: NotifyStatus,
    pub notify_result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewNotifyLog {
    pub fn into_notify_log(self, id: i64) -> NotifyLog {
        NotifyLog {
            id,
            order_no: self.order_no,
            sub_order_no: self.sub_order_no,
            merchant_id: self.merchant_id,
            notify_url: self.notify_url,
            notify_status: self.notify_status,
            notify_result: self.notify_result,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

//--------------------------------------     ReconSummary      ---------------------------------------------------------
/// Daily reconciliation totals. There is at most one summary per date.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReconSummary {
    pub id: i64,
    pub summary_date: NaiveDate,
    pub total_orders: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub init_count: i64,
    pub total_amount: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReconSummary {
    pub summary_date: NaiveDate,
    pub total_orders: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub init_count: i64,
    pub total_amount: Amount,
}

impl NewReconSummary {
    pub fn new(summary_date: NaiveDate) -> Self {
        Self {
            summary_date,
            total_orders: 0,
            success_count: 0,
            fail_count: 0,
            init_count: 0,
            total_amount: Amount::ZERO,
        }
    }

    /// Adds an order to the running totals. Nothing is counted if the total amount would overflow.
    pub fn tally(&mut self, order: &Order) -> Result<(), AmountOverflow> {
        self.total_amount = self.total_amount.checked_add(order.actual_amount)?;
        self.total_orders += 1;
        match order.recon_status {
            ReconStatus::Pending => self.init_count += 1,
            ReconStatus::Success => self.success_count += 1,
            ReconStatus::Failure => self.fail_count += 1,
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes_are_preserved() {
        assert_eq!(PayStatus::Processing.code(), 0);
        assert_eq!(SplitStatus::Failure.code(), 2);
        assert_eq!(NotifyStatus::Failure.code(), 0);
        assert_eq!(NotifyStatus::Success.code(), 1);
        assert_eq!(NotifyStatus::Processing.code(), 2);
        assert_eq!(ReconStatus::Pending.code(), 0);
        assert_eq!(ExceptionStep::AmountMismatch.code(), 4);
        assert_eq!(ExceptionType::Business.code(), 1);
    }

    #[test]
    fn unknown_codes_fall_back_to_default() {
        assert_eq!(NotifyStatus::from(0), NotifyStatus::Failure);
        assert_eq!(NotifyStatus::from(7), NotifyStatus::Processing);
        assert_eq!(ReconStatus::from(-1), ReconStatus::Pending);
        assert_eq!(ExceptionStep::from(99), ExceptionStep::Other);
    }

    #[test]
    fn parse_statuses() {
        assert_eq!("success".parse::<ReconStatus>().unwrap(), ReconStatus::Success);
        assert_eq!("Failure".parse::<PayStatus>().unwrap(), PayStatus::Failure);
        assert_eq!("2".parse::<NotifyStatus>().unwrap(), NotifyStatus::Processing);
        assert!("unknown".parse::<SplitStatus>().is_err());
        assert_eq!(ExceptionStep::AmountMismatch.to_string(), "AmountMismatch");
    }

    #[test]
    fn summary_totals_refuse_to_overflow() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let time = Utc::now();
        let huge = NewOrder::new(OrderNo::from("BIG"), "M1", Amount::from(rust_decimal::Decimal::MAX), time);
        let small = NewOrder::new(OrderNo::from("SMALL"), "M1", Amount::from(1), time);
        let mut summary = NewReconSummary::new(date);
        assert!(summary.tally(&huge.into_order(1)).is_ok());
        assert_eq!(summary.tally(&small.into_order(2)), Err(AmountOverflow));
        assert_eq!(summary.total_orders, 1);
        assert_eq!(summary.init_count, 1);
        assert_eq!(summary.total_amount, Amount::from(rust_decimal::Decimal::MAX));
    }
}
