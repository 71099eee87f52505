use log::*;

use crate::{
    alarm::AlarmService,
    db::traits::ReconRepository,
    db_types::{ExceptionStep, NewReconException, OrderNo},
};

/// Persists reconciliation exceptions and raises an alarm for each one.
///
/// Recording is best-effort. A failure to save an exception is logged, and the alarm is still sent, so that the
/// caller's original failure is never masked.
#[derive(Clone)]
pub struct ExceptionRecorder<B> {
    db: B,
    alarms: AlarmService,
}

impl<B> std::fmt::Debug for ExceptionRecorder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExceptionRecorder({:?})", self.alarms)
    }
}

impl<B> ExceptionRecorder<B>
where B: ReconRepository
{
    pub fn new(db: B, alarms: AlarmService) -> Self {
        Self { db, alarms }
    }

    pub async fn record(&self, order_no: &OrderNo, merchant_id: &str, message: &str, step: ExceptionStep) {
        let exception = NewReconException::business(order_no.clone(), merchant_id, message, step);
        self.record_exception(exception).await;
    }

    pub async fn record_exception(&self, exception: NewReconException) {
        match self.db.save_exception(exception.clone()).await {
            Ok(id) => debug!("🚨️ Exception #{id} recorded for order {}", exception.order_no),
            Err(e) => error!("🚨️ Could not save the exception for order {}. {e}", exception.order_no),
        }
        self.alarm(&exception).await;
    }

    /// Saves all the exceptions in a single write, then alarms each of them.
    pub async fn record_batch(&self, exceptions: Vec<NewReconException>) {
        if exceptions.is_empty() {
            return;
        }
        match self.db.save_exceptions(&exceptions).await {
            Ok(n) if n == exceptions.len() => debug!("🚨️ {n} exceptions recorded"),
            Ok(n) => error!("🚨️ Only {n} of {} exceptions were saved", exceptions.len()),
            Err(e) => error!("🚨️ Could not save a batch of {} exceptions. {e}", exceptions.len()),
        }
        for exception in &exceptions {
            self.alarm(exception).await;
        }
    }

    async fn alarm(&self, exception: &NewReconException) {
        self.alarms.send_recon_alarm(&exception.order_no, &exception.merchant_id, &exception.exception_msg).await;
    }
}
