//! Fire-and-forget operator notifications.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::error::ClientResult;

/// Username messages are posted under.
pub const CHAT_USERNAME: &str = "snooze";

/// Sink for operator-facing messages. Delivery is best effort and never
/// blocks the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Logs every message and, when a webhook is configured, posts it to chat.
#[derive(Debug, Clone)]
pub struct ChatNotifier {
    client: Client,
    url: Option<String>,
}

impl ChatNotifier {
    pub fn new(url: Option<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.filter(|u| !u.trim().is_empty()),
        })
    }
}

/// Webhook body. `payload` repeats the message as a JSON string for chat
/// integrations that only read that field.
pub fn chat_body(message: &str) -> serde_json::Value {
    let payload = json!({ "username": CHAT_USERNAME, "text": message });
    json!({
        "username": CHAT_USERNAME,
        "text": message,
        "payload": payload.to_string(),
    })
}

impl Notifier for ChatNotifier {
    fn notify(&self, message: &str) {
        info!(target: "snooze::notify", "{message}");

        let Some(url) = self.url.clone() else {
            return;
        };
        let request = self.client.post(url).json(&chat_body(message));
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => warn!(status = %response.status(), "chat webhook rejected message"),
                Err(e) => warn!(error = %e, "chat webhook unreachable"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_embeds_payload_string() {
        let body = chat_body("App for service api is now up.");
        assert_eq!(body["username"], CHAT_USERNAME);
        assert_eq!(body["text"], "App for service api is now up.");

        let payload: serde_json::Value =
            serde_json::from_str(body["payload"].as_str().unwrap()).unwrap();
        assert_eq!(payload["text"], "App for service api is now up.");
    }

    #[tokio::test]
    async fn notify_without_webhook_only_logs() {
        let notifier = ChatNotifier::new(Some("  ".into())).unwrap();
        assert!(notifier.url.is_none());
        notifier.notify("hello");
    }
}
