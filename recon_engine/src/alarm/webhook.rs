use std::time::Duration;

use log::*;
use recon_common::Secret;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AlarmError {
    #[error("Could not create the webhook client: {0}")]
    Initialization(String),
    #[error("Could not deliver the alarm: {0}")]
    Transport(String),
    #[error("The webhook rejected the alarm. Status {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Builds the JSON body for a DingTalk robot text message.
pub fn text_message(content: &str) -> Value {
    json!({
        "msgtype": "text",
        "text": { "content": content }
    })
}

/// Posts alarm messages to a DingTalk robot webhook.
#[derive(Clone)]
pub struct DingTalkWebhook {
    url: Secret<String>,
    client: Client,
}

impl std::fmt::Debug for DingTalkWebhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DingTalkWebhook({})", self.url)
    }
}

impl DingTalkWebhook {
    pub fn new(url: Secret<String>) -> Result<Self, AlarmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AlarmError::Initialization(e.to_string()))?;
        Ok(Self { url, client })
    }

    pub async fn post(&self, content: &str) -> Result<(), AlarmError> {
        let response = self
            .client
            .post(self.url.reveal())
            .json(&text_message(content))
            .send()
            .await
            .map_err(|e| AlarmError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            trace!("🚨️ Alarm delivered to webhook");
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(AlarmError::Rejected { status: status.as_u16(), message })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn message_format() {
        let body = text_message("order 1 failed");
        assert_eq!(body["msgtype"], "text");
        assert_eq!(body["text"]["content"], "order 1 failed");
    }

    #[tokio::test]
    async fn unreachable_webhook_is_a_transport_error() {
        let webhook = DingTalkWebhook::new(Secret::new("http://127.0.0.1:9/robot/send".to_string())).unwrap();
        let err = webhook.post("hello").await.unwrap_err();
        assert!(matches!(err, AlarmError::Transport(_)));
    }
}
