//! A `Channel` wrapper recognising `APPROVE <id>` / `REJECT <id>` replies
//! and resolving them against the [`ApprovalGate`](crate::approval::ApprovalGate),
//! while forwarding everything else through to the underlying channel
//! unchanged. Registered as the approval channel that carries outgoing
//! approval prompts and parses `APPROVE`/`REJECT` replies.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::approval::{ApprovalGate, HumanDecision};

use super::traits::{Channel, ChannelMessage};

pub struct TextCommandChannel {
    inner: Arc<dyn Channel>,
    gate: Arc<ApprovalGate>,
}

impl TextCommandChannel {
    pub fn new(inner: Arc<dyn Channel>, gate: Arc<ApprovalGate>) -> Self {
        Self { inner, gate }
    }

    /// Parse `"APPROVE <uuid>"` / `"REJECT <uuid>"`, case-insensitive on the
    /// verb, exactly one id argument. Anything else is not a command.
    fn parse_command(text: &str) -> Option<(HumanDecision, Uuid)> {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let verb = parts.next()?;
        let id_str = parts.next()?.trim();
        let decision = match verb.to_ascii_uppercase().as_str() {
            "APPROVE" => HumanDecision::Approve,
            "REJECT" => HumanDecision::Reject,
            _ => return None,
        };
        let id = Uuid::parse_str(id_str).ok()?;
        Some((decision, id))
    }
}

#[async_trait]
impl Channel for TextCommandChannel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, message: &str, recipient: Option<&str>) -> Result<(), String> {
        self.inner.send(message, recipient).await
    }

    /// Listens on the inner channel, resolving approval commands against the
    /// gate directly and forwarding every other message on `tx` unmodified.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<(), String> {
        let (inner_tx, mut inner_rx) = mpsc::channel::<ChannelMessage>(64);
        let gate = self.gate.clone();
        let relay = async move {
            while let Some(msg) = inner_rx.recv().await {
                if let Some((decision, id)) = Self::parse_command(&msg.content) {
                    if !gate.resolve(id, decision).await {
                        tracing::warn!(approval_id = %id, "approval command referenced an unknown or already-resolved request");
                    }
                    continue;
                }
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        };
        tokio::select! {
            result = self.inner.listen(inner_tx) => result,
            _ = relay => Ok(()),
        }
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
