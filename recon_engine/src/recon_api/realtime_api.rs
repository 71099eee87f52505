use std::fmt::Debug;

use chrono::Utc;
use log::*;

use super::{
    errors::ReconError,
    exception_recorder::ExceptionRecorder,
    recon_objects::{NotifyOutcome, NotifyReconRequest, OrderKey, OrderReconRequest, ReconOutcome, ResolvedOrder},
    resolution::resolve_order_key,
    rules::{self, StatusVerdict},
};
use crate::{
    alarm::AlarmService,
    config::ReconConfig,
    db::traits::{InsertOrderResult, ReconRepository},
    db_types::{
        Amount,
        ExceptionStep,
        NewNotifyLog,
        NewOrder,
        NewSplitSub,
        NotifyStatus,
        OrderNo,
        ReconStatus,
    },
};

/// `ReconApi` is the real-time entry point of the reconciliation engine. It decides the reconciliation status of new
/// orders, and processes the refund and notify events that follow them.
#[derive(Clone)]
pub struct ReconApi<B> {
    db: B,
    config: ReconConfig,
    alarms: AlarmService,
    exceptions: ExceptionRecorder<B>,
}

impl<B> Debug for ReconApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconApi")
    }
}

impl<B> ReconApi<B> {
    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    pub fn alarms(&self) -> &AlarmService {
        &self.alarms
    }
}

impl<B> ReconApi<B>
where B: ReconRepository
{
    pub fn new(db: B, config: ReconConfig, alarms: AlarmService) -> Self {
        let exceptions = ExceptionRecorder::new(db.clone(), alarms.clone());
        Self { db, config, alarms, exceptions }
    }

    /// Reconciles a new order and saves it along with its split details. The order and its splits are written
    /// atomically, so a failed write leaves nothing behind and the same request can be retried.
    ///
    /// The rules are applied in order, and the first one that fails rejects the order:
    /// 1. The pay, split and notify statuses may not be `Failure`.
    /// 2. If every status is successful, the paid amount must equal the sum of the splits, platform income and fee,
    ///    to within the configured tolerance.
    ///
    /// A rejected order is not saved. An exception is recorded for it and an alarm is raised, and
    /// [`ReconError::Rejected`] is returned.
    ///
    /// Orders with a sub-status that is still processing are saved with a `Pending` status, to be picked up later by
    /// the sweep or a notify event. Otherwise the order is saved with a `Success` status.
    pub async fn reconcile_order(&self, request: OrderReconRequest) -> Result<ReconOutcome, ReconError> {
        self.ensure_enabled()?;
        let order_no = request.order_no.clone();
        let merchant_id = request.merchant_id.clone();
        trace!("⚖️ Reconciling order {order_no} for merchant {merchant_id}");
        let verdict = rules::evaluate_statuses(request.pay_status, request.split_status, request.notify_status);
        if let StatusVerdict::Failed(step) = verdict {
            let message = step.failure_message().to_string();
            return Err(self.reject(&order_no, &merchant_id, step, message).await);
        }
        let split_total = match rules::split_total(request.split_details.iter().map(|s| s.amount)) {
            Ok(total) => total,
            Err(e) => {
                let message = format!("split amounts cannot be totalled. {e}");
                return Err(self.reject(&order_no, &merchant_id, ExceptionStep::AmountMismatch, message).await);
            },
        };
        if verdict == StatusVerdict::Settled {
            let balanced = rules::check_amounts(
                request.pay_amount,
                split_total,
                request.platform_income,
                request.pay_fee,
                self.config.amount_tolerance,
            );
            if balanced.is_err() {
                let message = rules::amount_mismatch_message(
                    request.pay_amount,
                    split_total,
                    request.platform_income,
                    request.pay_fee,
                );
                return Err(self.reject(&order_no, &merchant_id, ExceptionStep::AmountMismatch, message).await);
            }
        }
        let recon_status = verdict.recon_status();
        let splits = split_records(&request);
        let order = new_order(request, split_total, recon_status);
        match self.db.insert_order_with_splits(order, &splits).await {
            Ok(InsertOrderResult::Inserted(id)) => {
                debug!("⚖️ Order {order_no} saved as #{id} with {} split records", splits.len())
            },
            Ok(InsertOrderResult::AlreadyExists(id)) => {
                warn!("⚖️ Order {order_no} already exists as #{id}");
                let err = ReconError::DuplicateOrder(order_no.clone());
                return Err(self.persistence_failure(&order_no, &merchant_id, err).await);
            },
            Err(e) => {
                let err = ReconError::database(e);
                return Err(self.persistence_failure(&order_no, &merchant_id, err).await);
            },
        }
        info!("⚖️ Order {order_no} reconciled. Status: {recon_status}");
        Ok(ReconOutcome { order_no, recon_status })
    }

    /// Records a merchant notification.
    ///
    /// The notify log is always written. If the order was identified by a sub-order, that split record's notify
    /// status and result are updated too. A successful notification marks the order as notified and, if the order is
    /// still pending, closes it as successful.
    ///
    /// The call succeeds once the log is written, whether the order was advanced or not.
    pub async fn reconcile_notify(&self, request: NotifyReconRequest) -> Result<NotifyOutcome, ReconError> {
        self.ensure_enabled()?;
        let resolved = self.resolve(&request.key).await?;
        let order_no = resolved.order_no.clone();
        let log = NewNotifyLog {
            order_no: order_no.clone(),
            sub_order_no: resolved.sub_order_no.clone(),
            merchant_id: request.merchant_id.clone(),
            notify_url: request.notify_url.clone(),
            notify_status: request.notify_status,
            notify_result: request.notify_result.clone(),
            created_at: Utc::now(),
        };
        let log_id = match self.db.save_notify_log(log).await {
            Ok(id) => id,
            Err(e) => {
                let err = ReconError::database(e);
                return Err(self.persistence_failure(&order_no, &request.merchant_id, err).await);
            },
        };
        trace!("⚖️ Notify log #{log_id} saved for order {order_no}");
        if let Some(sub_order_no) = &resolved.sub_order_no {
            let merchant_id = resolved.merchant_id.as_deref().unwrap_or(&request.merchant_id);
            let updated = self
                .db
                .update_split_sub_notify(
                    &order_no,
                    merchant_id,
                    sub_order_no,
                    request.notify_status,
                    request.notify_result.clone(),
                )
                .await;
            match updated {
                Ok(true) => trace!("⚖️ Notify status of sub-order {sub_order_no} set to {}", request.notify_status),
                Ok(false) => warn!("⚖️ Sub-order {sub_order_no} of order {order_no} disappeared before it was updated"),
                Err(e) => error!("⚖️ Could not update the notify status of sub-order {sub_order_no}. {e}"),
            }
        }
        let status_advanced = match request.notify_status {
            NotifyStatus::Success => self.advance_notified_order(&order_no).await,
            _ => false,
        };
        Ok(NotifyOutcome { order_no, log_id, status_advanced })
    }

    /// Resolves any order key to its canonical order number.
    pub async fn resolve(&self, key: &OrderKey) -> Result<ResolvedOrder, ReconError> {
        resolve_order_key(&self.db, key).await
    }

    async fn advance_notified_order(&self, order_no: &OrderNo) -> bool {
        match self.db.update_notify_status(order_no, NotifyStatus::Success).await {
            Ok(true) => {},
            Ok(false) => {
                warn!("⚖️ Notification received for order {order_no}, but the order does not exist");
                return false;
            },
            Err(e) => {
                error!("⚖️ Could not update the notify status of order {order_no}. {e}");
                return false;
            },
        }
        match self.db.update_recon_status(order_no, ReconStatus::Pending, ReconStatus::Success).await {
            Ok(true) => {
                info!("⚖️ Order {order_no} reconciled after a successful notification");
                true
            },
            Ok(false) => {
                debug!("⚖️ Order {order_no} was not pending, so its reconciliation status is unchanged");
                false
            },
            Err(e) => {
                error!("⚖️ Could not close order {order_no} after a successful notification. {e}");
                false
            },
        }
    }

    pub(crate) fn ensure_enabled(&self) -> Result<(), ReconError> {
        if self.config.enabled {
            Ok(())
        } else {
            warn!("⚖️ Reconciliation request received, but reconciliation is disabled");
            Err(ReconError::EngineDisabled)
        }
    }

    /// Records a business exception and returns the matching error.
    pub(crate) async fn reject(
        &self,
        order_no: &OrderNo,
        merchant_id: &str,
        step: ExceptionStep,
        message: String,
    ) -> ReconError {
        warn!("⚖️ Order {order_no} failed reconciliation. {message}");
        self.exceptions.record(order_no, merchant_id, &message, step).await;
        ReconError::Rejected { order_no: order_no.clone(), step, message }
    }

    /// Raises an alarm for a write that did not go through, and hands the error back.
    pub(crate) async fn persistence_failure(&self, order_no: &OrderNo, merchant_id: &str, err: ReconError) -> ReconError {
        error!("⚖️ {err}");
        self.alarms.send_recon_alarm(order_no, merchant_id, &err.to_string()).await;
        err
    }
}

fn split_records(request: &OrderReconRequest) -> Vec<NewSplitSub> {
    let now = Utc::now();
    request
        .split_details
        .iter()
        .map(|detail| NewSplitSub {
            order_no: request.order_no.clone(),
            sub_order_no: detail.sub_order_no.clone(),
            merchant_id: detail.merchant_id.clone(),
            split_amount: detail.amount,
            status: request.split_status,
            notify_status: NotifyStatus::Processing,
            notify_result: None,
            created_at: now,
        })
        .collect()
}

fn new_order(request: OrderReconRequest, split_total: Amount, recon_status: ReconStatus) -> NewOrder {
    let mut order = NewOrder::new(request.order_no, &request.merchant_id, request.pay_amount, request.order_time)
        .with_statuses(request.pay_status, request.split_status, request.notify_status)
        .with_income_and_fee(request.platform_income, request.pay_fee);
    order.merchant_name = request.merchant_name;
    order.merchant_order_no = request.merchant_order_no;
    order.split_total_amount = split_total;
    order.pay_time = request.pay_time;
    order.recon_status = recon_status;
    if recon_status.is_terminal() {
        order.recon_time = Some(Utc::now());
    }
    order
}
