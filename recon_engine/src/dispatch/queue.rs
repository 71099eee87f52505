//! A bounded job queue with a limited number of jobs in flight.
//!
//! Jobs are handed to an async handler. At most `max_in_flight` handlers run at the same time. When every producer
//! has been dropped, the queue drains the jobs that are still buffered, waits for all running jobs to finish, and then
//! [`JobQueue::run`] returns.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Semaphore,
};

pub type Handler<J> = Arc<dyn Fn(J) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("The job queue is full")]
    Full,
    #[error("The job queue has shut down")]
    Closed,
}

pub struct JobQueue<J: Send + 'static> {
    listener: mpsc::Receiver<J>,
    sender: mpsc::Sender<J>,
    handler: Handler<J>,
    max_in_flight: u32,
}

impl<J: Send + 'static> JobQueue<J> {
    pub fn new(buffer_size: usize, max_in_flight: u32, handler: Handler<J>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { listener: receiver, sender, handler, max_in_flight: max_in_flight.max(1) }
    }

    pub fn producer(&self) -> JobProducer<J> {
        JobProducer::new(self.sender.clone())
    }

    pub async fn run(mut self) {
        debug!("📬️ Starting job queue with up to {} jobs in flight", self.max_in_flight);
        // drop the internal sender so that the queue shuts down when the last producer is dropped
        drop(self.sender);
        let permits = Arc::new(Semaphore::new(self.max_in_flight as usize));
        while let Some(job) = self.listener.recv().await {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("📬️ Job queue cannot schedule any more work. {e}");
                    break;
                },
            };
            trace!("📬️ Handling job");
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                (handler)(job).await;
                drop(permit);
                trace!("📬️ Job handled");
            });
        }
        debug!("📬️ All producers are gone. Waiting for jobs in flight to complete");
        match permits.acquire_many(self.max_in_flight).await {
            Ok(_) => debug!("📬️ Job queue shutting down gracefully"),
            Err(e) => warn!("📬️ Job queue shut down without waiting for every job. {e}"),
        }
        debug!("📬️ Job queue has shut down");
    }
}

pub struct JobProducer<J> {
    sender: mpsc::Sender<J>,
}

impl<J> Clone for JobProducer<J> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<J> JobProducer<J> {
    pub fn new(sender: mpsc::Sender<J>) -> Self {
        Self { sender }
    }

    /// Queues a job without waiting. Fails if the queue is full or has shut down.
    pub fn try_publish(&self, job: J) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Queues a job, waiting for space if the queue is full.
    pub async fn publish(&self, job: J) -> Result<(), QueueError> {
        self.sender.send(job).await.map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn all_jobs_complete_before_shutdown() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = count.clone();
        let handler = Arc::new(move |v| {
            let count = count.clone();
            Box::pin(async move {
                debug!("Handler received {v}");
                let _ = count.fetch_add(v, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let queue = JobQueue::new(1, 3, handler);
        let producer_1 = queue.producer();
        let producer_2 = queue.producer();
        tokio::spawn(async move {
            for i in 0..5 {
                producer_1.publish(i * 2 + 1).await.unwrap();
            }
        });
        tokio::spawn(async move {
            for i in 0..5 {
                producer_2.publish(i * 2).await.unwrap();
            }
        });
        queue.run().await;
        assert_eq!(c2.load(Ordering::SeqCst), 45);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r2, p2) = (running.clone(), peak.clone());
        let handler = Arc::new(move |_: u32| {
            let running = r2.clone();
            let peak = p2.clone();
            Box::pin(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let queue = JobQueue::new(50, 2, handler);
        let producer = queue.producer();
        for i in 0..20 {
            producer.try_publish(i).unwrap();
        }
        drop(producer);
        queue.run().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn full_and_closed_queues_reject_jobs() {
        let handler: Handler<u32> = Arc::new(|_: u32| Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>);
        let queue = JobQueue::new(1, 1, handler);
        let producer = queue.producer();
        producer.try_publish(1).unwrap();
        assert_eq!(producer.try_publish(2), Err(QueueError::Full));
        drop(queue);
        assert_eq!(producer.try_publish(3), Err(QueueError::Closed));
    }
}
