//! Portal event bus.
//!
//! Workflows publish [`PortalEvent`]s on a broadcast channel; front ends
//! subscribe and decide what to show. Publishing without subscribers is fine,
//! and a subscriber that falls behind skips the events it missed.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::session::{Session, SessionIdentity};

/// Default number of events buffered per subscriber
const DEFAULT_CAPACITY: usize = 64;

/// How a notice should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Work in progress
    Busy,
    Info,
    Success,
    Error,
}

/// A user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub level: NoticeLevel,
    /// Suggest reloading the session list to recover
    pub offer_reload: bool,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level,
            offer_reload: false,
        }
    }

    pub fn busy(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Busy, title, message)
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, title, message)
    }

    pub fn with_reload(mut self) -> Self {
        self.offer_reload = true;
        self
    }
}

/// Everything the portal reports to its front ends
#[derive(Debug, Clone)]
pub enum PortalEvent {
    /// A fresh session list is available
    SessionListLoaded(Vec<Session>),
    /// The session list couldn't be fetched
    SessionListFailed { message: String, forbidden: bool },
    /// A launch request was accepted by the service
    SessionRequested(SessionIdentity),
    SessionRequestFailed(String),
    /// A requested or watched session reached Running
    SessionRunning(Session),
    /// A delete request was accepted by the service
    SessionDeleteRequested(String),
    /// A deleted session has left the session list
    SessionTerminated(String),
    Notice(Notice),
}

impl PortalEvent {
    /// One-line summary for logs
    pub fn describe(&self) -> String {
        match self {
            PortalEvent::SessionListLoaded(sessions) => {
                format!("session list loaded ({} sessions)", sessions.len())
            }
            PortalEvent::SessionListFailed { message, forbidden } => {
                format!("session list failed (forbidden: {}): {}", forbidden, message)
            }
            PortalEvent::SessionRequested(identity) => format!("requested {}", identity),
            PortalEvent::SessionRequestFailed(message) => format!("request failed: {}", message),
            PortalEvent::SessionRunning(session) => {
                format!("{} ({}) running", session.name, session.id)
            }
            PortalEvent::SessionDeleteRequested(id) => format!("delete requested for {}", id),
            PortalEvent::SessionTerminated(id) => format!("{} terminated", id),
            PortalEvent::Notice(notice) => format!("notice: {}", notice.title),
        }
    }
}

/// Broadcast channel for portal events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PortalEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event, returning how many subscribers will see it
    pub fn publish(&self, event: PortalEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn notify(&self, notice: Notice) -> usize {
        self.publish(PortalEvent::Notice(notice))
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving end of the event bus
pub struct EventSubscription {
    rx: broadcast::Receiver<PortalEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once every bus handle is gone
    pub async fn recv(&mut self) -> Option<PortalEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event subscriber fell behind, skipped {} events", missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<PortalEvent> {
        use tokio::sync::broadcast::error::TryRecvError;

        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Event subscriber fell behind, skipped {} events", missed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every queued event
    #[cfg(test)]
    pub fn drain(&mut self) -> Vec<PortalEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
