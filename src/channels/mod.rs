//! Channel abstraction layer for outbound notifications and inbound
//! approval commands.
//!
//! A **channel** is any transport layer that delivers
//! [`traits::ChannelMessage`]s between the incident pipeline and an
//! external peer (a chat room, a webhook relay).
//!
//! # Architecture
//!
//! ```text
//!   IncidentPipeline (Communicator stage) ──▶ send_chat_message tool
//!                                                    │
//!                                          ChannelManager::send(name, ..)
//!                                                    │
//!                                            TextCommandChannel
//!                                         (wraps an inner Channel,
//!                                          parses APPROVE/REJECT)
//!                                                    │
//!                                             WebhookChannel
//!                                   (outbound: POST to a chat webhook;
//!                                    inbound: gateway's POST /commands)
//! ```
//!
//! # Registering a channel
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use crate::channels::{ChannelManager, TextCommandChannel, webhook::WebhookChannel};
//!
//! let (_commands_tx, commands_rx) = mpsc::channel(64);
//! let webhook = Arc::new(WebhookChannel::new("chat", webhook_url, commands_rx));
//! let wrapped = Arc::new(TextCommandChannel::new(webhook, gate));
//! let mgr = Arc::new(ChannelManager::new());
//! mgr.register(wrapped).await.unwrap();
//! let (rx, _handles) = mgr.start_all(64).await;
//! ```

pub mod manager;
pub mod text_command;
pub mod traits;
pub mod webhook;

pub use manager::ChannelManager;
pub use text_command::TextCommandChannel;
pub use traits::{Channel, ChannelMessage};
pub use webhook::WebhookChannel;
