//! Generic outbound-webhook channel.
//!
//! Posts outgoing messages (approval prompts, incident notifications) as a
//! JSON `{"text": ...}` body to a configured webhook URL — the format
//! accepted by Slack incoming webhooks and most self-hosted chat relays.
//! Inbound replies don't arrive over the same HTTP connection: the gateway's
//! `POST /commands` route (wired from whatever relay or slash-command
//! integration the operator points at it) feeds them into the receiver this
//! channel was constructed with.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::traits::{Channel, ChannelMessage};

pub struct WebhookChannel {
    name: String,
    webhook_url: String,
    http: reqwest::Client,
    inbound: Mutex<Option<mpsc::Receiver<ChannelMessage>>>,
}

impl WebhookChannel {
    pub fn new(
        name: impl Into<String>,
        webhook_url: impl Into<String>,
        inbound: mpsc::Receiver<ChannelMessage>,
    ) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            http: reqwest::Client::new(),
            inbound: Mutex::new(Some(inbound)),
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &str, _recipient: Option<&str>) -> Result<(), String> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("webhook relay returned {}", resp.status()));
        }
        Ok(())
    }

    /// Drains the inbound queue fed by `POST /commands` until the sender is
    /// dropped or `tx` can no longer accept messages.
    ///
    /// Takes the receiver on first call; a second concurrent `listen()` call
    /// on the same instance returns an error rather than panicking.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<(), String> {
        let mut rx = self
            .inbound
            .lock()
            .await
            .take()
            .ok_or_else(|| "webhook channel is already listening".to_string())?;
        while let Some(msg) = rx.recv().await {
            if tx.send(msg).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_false_for_empty_url() {
        let (_tx, rx) = mpsc::channel(1);
        let ch = WebhookChannel::new("chat", "", rx);
        assert!(!ch.health_check().await);
    }

    #[tokio::test]
    async fn health_check_true_for_configured_url() {
        let (_tx, rx) = mpsc::channel(1);
        let ch = WebhookChannel::new("chat", "https://hooks.example.com/x", rx);
        assert!(ch.health_check().await);
    }

    #[tokio::test]
    async fn listen_forwards_inbound_messages() {
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let ch = WebhookChannel::new("chat", "https://hooks.example.com/x", inbound_rx);

        inbound_tx
            .send(ChannelMessage::new("chat", "APPROVE deadbeef"))
            .await
            .unwrap();
        drop(inbound_tx);

        let (out_tx, mut out_rx) = mpsc::channel(4);
        ch.listen(out_tx).await.unwrap();
        let received = out_rx.recv().await.unwrap();
        assert_eq!(received.content, "APPROVE deadbeef");
    }

    #[tokio::test]
    async fn second_listen_call_errors() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let ch = WebhookChannel::new("chat", "https://hooks.example.com/x", rx);
        let (out_tx, _out_rx) = mpsc::channel(1);
        ch.listen(out_tx).await.unwrap();
        let (out_tx2, _out_rx2) = mpsc::channel(1);
        assert!(ch.listen(out_tx2).await.is_err());
    }
}
