//! User-visible notifications
//!
//! Mutations report their outcome through a [`NotificationSink`]. Dispatch is
//! fire-and-forget: a sink never blocks and never fails the mutation.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
    /// Something needs attention
    Warning,
    /// Informational
    Info,
}

/// A notification ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Severity
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Explorer link for the related transaction
    pub link: Option<String>,
}

impl Notification {
    /// Create a notification without a link
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
        }
    }

    /// Attach a link
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// "Transaction sent" notification linking to the transaction
    pub fn transaction_sent(explorer_link: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, "Success", "Transaction sent").with_link(explorer_link)
    }

    /// "Transaction failed!" notification carrying the error message
    pub fn transaction_failed(err: &impl std::fmt::Display) -> Self {
        Self::new(
            NotificationKind::Error,
            "Error",
            format!("Transaction failed! {}", err),
        )
    }
}

/// Destination for notifications
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification without blocking
    fn notify(&self, notification: Notification);
}

/// Sink writing notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let link = notification.link.as_deref().unwrap_or_default();
        match notification.kind {
            NotificationKind::Error => {
                error!(title = %notification.title, link, "{}", notification.message)
            }
            NotificationKind::Warning => {
                warn!(title = %notification.title, link, "{}", notification.message)
            }
            NotificationKind::Success | NotificationKind::Info => {
                info!(title = %notification.title, link, "{}", notification.message)
            }
        }
    }
}

/// Sink forwarding notifications to a channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a sink and the receiver that drains it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // A dropped receiver means nobody is displaying notifications
        let _ = self.sender.send(notification);
    }
}
