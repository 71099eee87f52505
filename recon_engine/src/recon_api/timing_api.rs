use std::fmt::Debug;

use chrono::NaiveDate;
use log::*;

use super::{
    errors::ReconError,
    exception_recorder::ExceptionRecorder,
    recon_objects::{ReconOutcome, SweepOutcome, SweepReport},
    rules::{self, StatusVerdict},
};
use crate::{
    alarm::AlarmService,
    config::ReconConfig,
    db::traits::ReconRepository,
    db_types::{ExceptionStep, NewReconException, Order, OrderNo, ReconStatus},
};

/// `TimingReconApi` reconciles orders that were left pending by the real-time path, either one date at a time in a
/// sweep, or one order at a time on request.
#[derive(Clone)]
pub struct TimingReconApi<B> {
    db: B,
    config: ReconConfig,
    alarms: AlarmService,
    exceptions: ExceptionRecorder<B>,
}

impl<B> Debug for TimingReconApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TimingReconApi")
    }
}

impl<B> TimingReconApi<B> {
    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> TimingReconApi<B>
where B: ReconRepository
{
    pub fn new(db: B, config: ReconConfig, alarms: AlarmService) -> Self {
        let exceptions = ExceptionRecorder::new(db.clone(), alarms.clone());
        Self { db, config, alarms, exceptions }
    }

    /// Reconciles every pending order placed on `date`.
    ///
    /// Orders are fetched in pages of the configured batch size, in row id order, so that orders changing status
    /// during the sweep never cause others to be missed. The exceptions raised by a page are saved together. An order
    /// that cannot be evaluated is recorded as an exception and does not stop the sweep, but failing to fetch a page
    /// does. A summary alarm is sent when the sweep completes.
    pub async fn run_daily_sweep(&self, date: NaiveDate) -> Result<SweepReport, ReconError> {
        self.ensure_enabled()?;
        let batch_size = self.config.batch_size.max(1);
        info!("🕰️ Starting the reconciliation sweep for {date} in batches of {batch_size}");
        let mut report = SweepReport::new(date);
        let mut after_id = 0i64;
        loop {
            let page = match self.db.fetch_pending_orders(date, after_id, batch_size).await {
                Ok(page) => page,
                Err(e) => {
                    let err = ReconError::database(e);
                    let message = format!(
                        "Timing reconciliation for {date} aborted after {} orders. {err}",
                        report.processed
                    );
                    error!("🕰️ {message}");
                    self.alarms.send_alarm(&message).await;
                    return Err(err);
                },
            };
            let fetched = page.len();
            trace!("🕰️ Fetched {fetched} pending orders after #{after_id}");
            let mut exceptions = Vec::new();
            for order in &page {
                after_id = after_id.max(order.id);
                report.processed += 1;
                match self.evaluate_pending(order).await {
                    Ok((outcome, exception)) => {
                        report.tally(outcome);
                        exceptions.extend(exception);
                    },
                    Err(e) => {
                        error!("🕰️ Could not reconcile order {}. {e}", order.order_no);
                        report.errors += 1;
                        let message = format!("timing reconciliation error: {e}");
                        exceptions.push(NewReconException::business(
                            order.order_no.clone(),
                            &order.merchant_id,
                            &message,
                            ExceptionStep::Other,
                        ));
                    },
                }
            }
            self.exceptions.record_batch(exceptions).await;
            if fetched < batch_size {
                break;
            }
        }
        info!("🕰️ {report}");
        self.alarms.send_alarm(&format!("Timing reconciliation complete. {report}")).await;
        Ok(report)
    }

    /// Re-evaluates a single order with the sweep rules.
    ///
    /// Orders that are already reconciled keep their status. Pending orders that still have a processing sub-status
    /// stay pending.
    pub async fn retry_recon(&self, order_no: &OrderNo) -> Result<ReconOutcome, ReconError> {
        self.ensure_enabled()?;
        let order = self
            .db
            .fetch_order(order_no)
            .await
            .map_err(ReconError::database)?
            .ok_or_else(|| ReconError::OrderNotFound(order_no.clone()))?;
        if order.recon_status.is_terminal() {
            debug!("🕰️ Order {order_no} is already reconciled as {}", order.recon_status);
            return Ok(ReconOutcome { order_no: order.order_no, recon_status: order.recon_status });
        }
        let (outcome, exception) = self.evaluate_pending(&order).await?;
        if let Some(exception) = exception {
            self.exceptions.record_exception(exception).await;
        }
        let recon_status = match outcome {
            SweepOutcome::Succeeded => ReconStatus::Success,
            SweepOutcome::Failed(_) => ReconStatus::Failure,
            SweepOutcome::Skipped => ReconStatus::Pending,
            SweepOutcome::Superseded => self
                .db
                .fetch_order(order_no)
                .await
                .map_err(ReconError::database)?
                .map(|o| o.recon_status)
                .unwrap_or(ReconStatus::Pending),
        };
        info!("🕰️ Retried order {order_no}. Status: {recon_status}");
        Ok(ReconOutcome { order_no: order.order_no, recon_status })
    }

    /// Decides the status of a pending order and writes it. Any exception is returned rather than saved, so that the
    /// caller can batch them. No exception is returned if the order's status changed underneath us.
    async fn evaluate_pending(&self, order: &Order) -> Result<(SweepOutcome, Option<NewReconException>), ReconError> {
        let (status, step, message) =
            match rules::evaluate_statuses(order.pay_status, order.split_status, order.notify_status) {
                StatusVerdict::Pending => {
                    trace!("🕰️ Order {} still has a processing sub-status", order.order_no);
                    return Ok((SweepOutcome::Skipped, None));
                },
                StatusVerdict::Failed(step) => (ReconStatus::Failure, Some(step), step.failure_message().to_string()),
                StatusVerdict::Settled => {
                    let splits = self.db.fetch_split_subs(&order.order_no).await.map_err(ReconError::database)?;
                    let balanced = rules::split_total(splits.iter().map(|s| s.split_amount)).map(|split_total| {
                        let check = rules::check_amounts(
                            order.actual_amount,
                            split_total,
                            order.platform_income,
                            order.pay_fee,
                            self.config.amount_tolerance,
                        );
                        (split_total, check)
                    });
                    match balanced {
                        Ok((_, Ok(()))) => (ReconStatus::Success, None, String::new()),
                        Err(e) => {
                            let message = format!("split amounts cannot be totalled. {e}");
                            (ReconStatus::Failure, Some(ExceptionStep::AmountMismatch), message)
                        },
                        Ok((split_total, Err(_))) => {
                            let message = rules::amount_mismatch_message(
                                order.actual_amount,
                                split_total,
                                order.platform_income,
                                order.pay_fee,
                            );
                            (ReconStatus::Failure, Some(ExceptionStep::AmountMismatch), message)
                        },
                    }
                },
            };
        let updated =
            self.db.update_recon_status(&order.order_no, ReconStatus::Pending, status).await.map_err(ReconError::database)?;
        if !updated {
            debug!("🕰️ Order {} changed status while it was being reconciled. Leaving it alone.", order.order_no);
            return Ok((SweepOutcome::Superseded, None));
        }
        match step {
            Some(step) => {
                let exception = NewReconException::business(order.order_no.clone(), &order.merchant_id, &message, step);
                Ok((SweepOutcome::Failed(step), Some(exception)))
            },
            None => Ok((SweepOutcome::Succeeded, None)),
        }
    }

    fn ensure_enabled(&self) -> Result<(), ReconError> {
        if self.config.enabled {
            Ok(())
        } else {
            warn!("🕰️ Timing reconciliation requested, but reconciliation is disabled");
            Err(ReconError::EngineDisabled)
        }
    }
}
