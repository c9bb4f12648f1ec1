//! Notification fan-out for order events.
//!
//! For one event the fan-out resolves a recipient per audience, renders the
//! audience's template and hands the message to a [`NotificationChannel`].

pub mod channel;
pub mod error;
pub mod fanout;
pub mod recipients;
pub mod template;

pub use channel::{
    ChannelKind, InMemoryChannel, LoggingEmailChannel, NotificationChannel, PushChannel,
    SentMessage, SmsChannel,
};
pub use error::{NotificationError, Result};
pub use fanout::{FanoutReport, NotificationFanout};
pub use recipients::RecipientResolver;
pub use template::{Audience, RenderedMessage, render};
