use rpc::RpcError;
use thiserror::Error;

use crate::{Audience, ChannelKind};

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    /// The channel is declared but has no delivery mechanism.
    #[error("Unsupported notification channel: {0}")]
    UnsupportedChannel(ChannelKind),

    /// The channel accepted the message but could not deliver it.
    #[error("Delivery to {to} failed: {reason}")]
    Delivery { to: String, reason: String },

    /// The recipient lookup returned nothing for a known id.
    #[error("No {audience} recipient found for id {id}")]
    RecipientNotFound { audience: Audience, id: String },

    /// A recipient lookup failed.
    #[error("Recipient lookup failed: {0}")]
    Lookup(#[from] RpcError),
}

pub type Result<T> = std::result::Result<T, NotificationError>;
