//! Delivery channels.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::{NotificationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
    Push,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Push => "push",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message accepted by a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub message_id: String,
}

/// Sends a rendered message to one recipient address.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SentMessage>;
}

/// Email channel that logs instead of talking to a mail server.
#[derive(Debug, Clone)]
pub struct LoggingEmailChannel {
    sender: String,
}

impl LoggingEmailChannel {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }
}

#[async_trait]
impl NotificationChannel for LoggingEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SentMessage> {
        let message_id = format!("email-{}", uuid::Uuid::new_v4());
        info!(
            from = %self.sender,
            to,
            subject,
            message_id = %message_id,
            "Email sent"
        );
        Ok(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            message_id,
        })
    }
}

#[derive(Debug, Default)]
struct InMemoryChannelState {
    sent: Vec<SentMessage>,
    failing_recipients: Vec<String>,
    fail_all: bool,
}

/// Channel that records messages, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannel {
    state: Arc<RwLock<InMemoryChannelState>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_all = fail;
    }

    /// Makes sends to one address fail.
    pub fn fail_for(&self, to: impl Into<String>) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failing_recipients
            .push(to.into());
    }

    /// Lets sends to every address succeed again.
    pub fn clear_failures(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.failing_recipients.clear();
        state.fail_all = false;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .len()
    }
}

#[async_trait]
impl NotificationChannel for InMemoryChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<SentMessage> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_all || state.failing_recipients.iter().any(|r| r == to) {
            return Err(NotificationError::Delivery {
                to: to.to_string(),
                reason: "mailbox unavailable".to_string(),
            });
        }

        let message = SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            message_id: format!("MSG-{:04}", state.sent.len() + 1),
        };
        state.sent.push(message.clone());
        Ok(message)
    }
}

/// SMS channel placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmsChannel;

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<SentMessage> {
        Err(NotificationError::UnsupportedChannel(ChannelKind::Sms))
    }
}

/// Push channel placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushChannel;

#[async_trait]
impl NotificationChannel for PushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Push
    }

    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<SentMessage> {
        Err(NotificationError::UnsupportedChannel(ChannelKind::Push))
    }
}
