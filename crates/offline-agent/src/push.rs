use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const DEFAULT_TAG: &str = "default";
pub const DEFAULT_CLICK_URL: &str = "/";

/// Push message body: `{title, body, tag?, data?: {url?}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub data: Option<NotificationData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub data: NotificationData,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title,
            body: payload.body,
            tag: payload.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            data: payload.data.unwrap_or_default(),
        }
    }
}

/// What subscribed clients are told to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Show { notification: Notification },
    Close { tag: String },
    OpenWindow { url: String },
}

/// Displayed notifications, keyed by tag, plus the event feed clients watch.
pub struct NotificationCenter {
    active: Mutex<Vec<Notification>>,
    tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            active: Mutex::new(Vec::new()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    /// Display a notification. One with the same tag is replaced.
    pub fn show(&self, payload: PushPayload) -> Notification {
        let notification = Notification::from(payload);
        {
            let mut active = self.active.lock();
            active.retain(|n| n.tag != notification.tag);
            active.push(notification.clone());
        }

        tracing::info!(
            tag = %notification.tag,
            title = %notification.title,
            "notification shown"
        );
        self.emit(NotificationEvent::Show {
            notification: notification.clone(),
        });
        notification
    }

    /// Close the notification with `tag` and open its URL (default `/`).
    /// Returns the URL opened, or `None` if no such notification is shown.
    pub fn click(&self, tag: &str) -> Option<String> {
        let clicked = {
            let mut active = self.active.lock();
            let idx = active.iter().position(|n| n.tag == tag)?;
            active.remove(idx)
        };

        let url = clicked
            .data
            .url
            .unwrap_or_else(|| DEFAULT_CLICK_URL.to_string());
        tracing::info!(tag = %tag, url = %url, "notification clicked");
        self.emit(NotificationEvent::Close {
            tag: tag.to_string(),
        });
        self.emit(NotificationEvent::OpenWindow { url: url.clone() });
        Some(url)
    }

    pub fn active(&self) -> Vec<Notification> {
        self.active.lock().clone()
    }

    fn emit(&self, event: NotificationEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(64)
    }
}
