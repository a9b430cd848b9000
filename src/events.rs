use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    Notification {
        level: NotificationLevel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        message: String,
    },
    /// Credentials were dropped; the UI should route to the login screen.
    SessionExpired {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        return_to: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    #[serde(flatten)]
    pub event: ClientEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub ts: String,
}

/// Fan-out point for notifications and session events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(200)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ClientEvent, request_id: Option<String>) {
        let envelope = EventEnvelope {
            event,
            request_id,
            ts: Utc::now().to_rfc3339(),
        };
        if self.tx.send(envelope).is_err() {
            debug!("event dropped, no subscribers");
        }
    }

    pub fn notify(&self, level: NotificationLevel, title: Option<&str>, message: impl Into<String>) {
        self.publish(
            ClientEvent::Notification {
                level,
                title: title.map(str::to_string),
                message: message.into(),
            },
            None,
        );
    }

    /// Single user-visible reporting point for backend failures.
    pub fn notify_api_error(&self, err: &ApiError) {
        if !err.should_notify() {
            return;
        }
        self.publish(
            ClientEvent::Notification {
                level: err.notification_level(),
                title: err.notification_title().map(str::to_string),
                message: err.message.clone(),
            },
            Some(err.request_id.clone()),
        );
    }
}
