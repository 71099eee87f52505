//! # Alarm notifier
//!
//! Alarms are human-readable strings sent to operators whenever reconciliation fails. Every alarm is written to the
//! log. When configured, alarms are also posted to a DingTalk robot webhook. Delivery is best-effort: failures are
//! logged and never propagate to the caller.
//!
//! In-process hooks can be registered to observe alarms, in the same way as the event hooks elsewhere in the engine.
mod webhook;

use std::{future::Future, pin::Pin, sync::Arc};

use futures_util::future::join_all;
use log::*;
pub use webhook::{text_message, AlarmError, DingTalkWebhook};

use crate::{
    config::{AlarmConfig, AlarmType},
    db_types::OrderNo,
};

pub type AlarmHook = Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct AlarmService {
    webhook: Option<DingTalkWebhook>,
    hooks: Vec<AlarmHook>,
}

impl std::fmt::Debug for AlarmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AlarmService(webhook: {:?}, hooks: {})", self.webhook, self.hooks.len())
    }
}

impl AlarmService {
    /// An alarm service that only writes to the log.
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn new(config: &AlarmConfig) -> Self {
        let webhook = match config.alarm_type {
            AlarmType::Log => None,
            AlarmType::DingTalk if config.dingtalk_webhook_url.is_blank() => {
                warn!("🚨️ DingTalk alarms are configured without a webhook url. Alarms will only be logged.");
                None
            },
            AlarmType::DingTalk => match DingTalkWebhook::new(config.dingtalk_webhook_url.clone()) {
                Ok(webhook) => Some(webhook),
                Err(e) => {
                    error!("🚨️ {e}. Alarms will only be logged.");
                    None
                },
            },
        };
        Self { webhook, hooks: Vec::new() }
    }

    pub fn with_hook<F>(mut self, f: F) -> Self
    where F: (Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.hooks.push(Arc::new(f));
        self
    }

    /// Sends an alarm. This never fails.
    pub async fn send_alarm(&self, content: &str) {
        warn!("🚨️ {content}");
        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.post(content).await {
                error!("🚨️ Failed to send alarm to DingTalk. {e}");
            }
        }
        if !self.hooks.is_empty() {
            join_all(self.hooks.iter().map(|hook| (hook)(content.to_string()))).await;
        }
    }

    /// Sends an alarm about a specific order.
    pub async fn send_recon_alarm(&self, order_no: &OrderNo, merchant_id: &str, message: &str) {
        let content = recon_alarm_message(order_no, merchant_id, message);
        self.send_alarm(&content).await;
    }
}

pub fn recon_alarm_message(order_no: &OrderNo, merchant_id: &str, message: &str) -> String {
    format!("[Recon alarm] order: {order_no}, merchant: {merchant_id}, message: {message}")
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn hooks_observe_alarms() {
        let _ = env_logger::try_init();
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let store = seen.clone();
        let alarms = AlarmService::log_only().with_hook(move |msg| {
            let store = store.clone();
            Box::pin(async move {
                store.lock().unwrap().push(msg);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        alarms.send_recon_alarm(&OrderNo::from("1001"), "m1", "amount mismatch").await;
        alarms.send_alarm("sweep complete").await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], "[Recon alarm] order: 1001, merchant: m1, message: amount mismatch");
        assert_eq!(seen[1], "sweep complete");
    }

    #[tokio::test]
    async fn webhook_failures_are_swallowed() {
        let config = AlarmConfig::dingtalk("http://127.0.0.1:9/robot/send");
        let alarms = AlarmService::new(&config);
        assert!(alarms.webhook.is_some());
        alarms.send_alarm("nobody is listening").await;
    }

    #[test]
    fn blank_webhook_falls_back_to_log() {
        let config = AlarmConfig::dingtalk("   ");
        let alarms = AlarmService::new(&config);
        assert!(alarms.webhook.is_none());
    }
}
