//! Core channel abstractions for approval prompts and incident notifications.
//!
//! A **channel** is any transport layer over which [`ChannelMessage`]s flow
//! between the incident pipeline and an external peer (a chat webhook, an
//! operator typing `APPROVE <id>` back).
//!
//! # Implementing a Channel
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use crate::channels::traits::{Channel, ChannelMessage};
//!
//! struct MyChannel;
//!
//! #[async_trait]
//! impl Channel for MyChannel {
//!     fn name(&self) -> &str { "webhook" }
//!     async fn send(&self, msg: &str, recipient: Option<&str>) -> Result<(), String> { Ok(()) }
//!     async fn listen(&self, tx: tokio::sync::mpsc::Sender<ChannelMessage>) -> Result<(), String> { Ok(()) }
//!     async fn health_check(&self) -> bool { true }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ─── ChannelMessage ───────────────────────────────────────────────────────────

/// A message received from (or sent to) a channel peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Which channel this message came from.
    pub channel: String,
    /// Optional peer identifier (user ID, chat ID, webhook source, etc.).
    pub sender: Option<String>,
    /// The message payload.
    pub content: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Optional metadata (e.g. message ID for reply threading).
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl ChannelMessage {
    /// Convenience constructor with a UTC timestamp.
    pub fn new(channel: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            sender: None,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_metadata(mut self, metadata: std::collections::HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

// ─── Channel trait ────────────────────────────────────────────────────────────

/// Transport abstraction for sending and receiving messages.
///
/// Implementations must be `Send + Sync` so they can be stored in a shared
/// [`ChannelManager`] behind an `Arc`.
#[async_trait]
pub trait Channel: Send + Sync {
    /// A unique identifier for this channel type (e.g. `"chat"`, `"webhook"`).
    fn name(&self) -> &str;

    /// Send a message to the specified recipient (or the default recipient if `None`).
    async fn send(&self, message: &str, recipient: Option<&str>) -> Result<(), String>;

    /// Begin listening for inbound messages, forwarding them on `tx`.
    ///
    /// This method should run until the channel disconnects or the `tx` is dropped.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<(), String>;

    /// Perform a lightweight health check.  Returns `true` when the channel is
    /// operational.
    async fn health_check(&self) -> bool;
}
