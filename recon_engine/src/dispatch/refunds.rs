//! Fire-and-forget refund reconciliation.
//!
//! [`RefundDispatcher::reconcile_refund_async`] returns as soon as the refund is queued. The caller never sees the
//! result. Failures, including a full or closed queue, are only reported as alarms tagged `[ASYNC]`.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::task::JoinHandle;

use super::queue::{Handler, JobProducer, JobQueue};
use crate::{
    alarm::AlarmService,
    config::AsyncRefundConfig,
    db::traits::ReconRepository,
    recon_api::{
        errors::ReconError,
        realtime_api::ReconApi,
        recon_objects::{OrderKey, RefundReconRequest},
    },
};

#[derive(Clone)]
pub struct RefundDispatcher {
    producer: JobProducer<RefundReconRequest>,
    alarms: AlarmService,
}

impl std::fmt::Debug for RefundDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundDispatcher")
    }
}

impl RefundDispatcher {
    /// Creates a dispatcher and the queue that serves it. The queue does nothing until [`JobQueue::run`] is polled,
    /// and stops once every clone of the dispatcher has been dropped.
    pub fn new<B>(api: ReconApi<B>, config: &AsyncRefundConfig) -> (Self, JobQueue<RefundReconRequest>)
    where B: ReconRepository {
        let alarms = api.alarms().clone();
        let handler_alarms = alarms.clone();
        let api = Arc::new(api);
        let handler: Handler<RefundReconRequest> = Arc::new(move |request: RefundReconRequest| {
            let api = Arc::clone(&api);
            let alarms = handler_alarms.clone();
            Box::pin(async move {
                let key = request.key.clone();
                match api.reconcile_refund(request).await {
                    Ok(outcome) => {
                        debug!("📬️ Async refund for order {} reconciled", outcome.order_no)
                    },
                    Err(e) => alarms.send_alarm(&async_failure_message(&key, &e)).await,
                }
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let queue = JobQueue::new(config.queue_size, config.workers, handler);
        let producer = queue.producer();
        (Self { producer, alarms }, queue)
    }

    /// Creates a dispatcher and runs its queue on a new task. The task completes once every clone of the dispatcher
    /// has been dropped and all queued refunds have been handled.
    pub fn spawn<B>(api: ReconApi<B>, config: &AsyncRefundConfig) -> (Self, JoinHandle<()>)
    where B: ReconRepository {
        let (dispatcher, queue) = Self::new(api, config);
        let handle = tokio::spawn(queue.run());
        (dispatcher, handle)
    }

    /// Queues a refund for reconciliation and returns immediately.
    pub fn reconcile_refund_async(&self, request: RefundReconRequest) {
        let key = request.key.clone();
        if let Err(e) = self.producer.try_publish(request) {
            let message = format!("[ASYNC] Refund reconciliation for {key} was not queued. {e}");
            error!("📬️ {message}");
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let alarms = self.alarms.clone();
                    handle.spawn(async move { alarms.send_alarm(&message).await });
                },
                Err(_) => warn!("📬️ There is no async runtime available to deliver the alarm for {key}"),
            }
        }
    }
}

fn async_failure_message(key: &OrderKey, err: &ReconError) -> String {
    format!("[ASYNC] Refund reconciliation failed for {key}. {err}")
}
