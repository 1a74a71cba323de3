//! Push notifications and click routing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::{ClientId, ClientType, Clients};
use crate::config::SiteConfig;
use crate::Result;

pub const ACTION_VIEW_UPDATES: &str = "view-updates";
pub const ACTION_VISIT_WEBSITE: &str = "visit-website";
pub const ACTION_CLOSE: &str = "close";

const DEFAULT_BODY: &str = "New product updates and features have been released";
const UPDATES_PATH: &str = "/updates";
const ROOT_PATH: &str = "/";

/// Push payload sent by the site's backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum PushPayload {
    ProductUpdate { feature: String },
    Promotion { offer: String },
    Announcement { message: String },
}

impl PushPayload {
    fn body(&self) -> String {
        match self {
            PushPayload::ProductUpdate { feature } => format!("New feature released: {feature}"),
            PushPayload::Promotion { offer } => format!("Limited-time offer: {offer}"),
            PushPayload::Announcement { message } => format!("Announcement: {message}"),
        }
    }

    fn target(&self) -> &'static str {
        match self {
            PushPayload::ProductUpdate { .. } => "/products",
            PushPayload::Promotion { .. } => "/pricing",
            PushPayload::Announcement { .. } => "/news",
        }
    }

    /// Decode raw push data. Malformed JSON and unknown shapes yield `None`.
    fn decode(data: &[u8]) -> Option<Self> {
        let value: Value = match serde_json::from_slice(data) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Push payload parsing failed");
                return None;
            }
        };
        match PushPayload::deserialize(&value) {
            Ok(payload) => Some(payload),
            Err(e) => {
                debug!(error = %e, "Push payload not recognized, using defaults");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Page opened by a plain click.
    pub url: String,
}

/// A notification ready for the host to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the notification for an inbound push. Missing or unreadable
    /// data keeps the default body and root URL.
    pub fn from_push(config: &SiteConfig, data: Option<&[u8]>) -> Self {
        let defaults = &config.notifications;
        let action = |action: &str, title: &str| NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
            icon: defaults.action_icon.clone(),
        };

        let mut notification = Self {
            title: config.notification_title().to_string(),
            body: DEFAULT_BODY.to_string(),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            data: NotificationData {
                url: ROOT_PATH.to_string(),
            },
            actions: vec![
                action(ACTION_VIEW_UPDATES, "View updates"),
                action(ACTION_VISIT_WEBSITE, "Visit website"),
                action(ACTION_CLOSE, "Close"),
            ],
        };

        if let Some(payload) = data.and_then(PushPayload::decode) {
            notification.body = payload.body();
            notification.data.url = payload.target().to_string();
        }
        notification
    }
}

/// A click on a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub notification: Notification,
    /// Action button pressed; `None` for the notification body.
    pub action: Option<String>,
}

impl NotificationClick {
    pub fn new(notification: Notification, action: Option<String>) -> Self {
        Self {
            notification,
            action,
        }
    }

    /// Path to navigate to, or `None` when the click only dismisses.
    pub fn target(&self) -> Option<&str> {
        match self.action.as_deref() {
            Some(ACTION_CLOSE) => None,
            Some(ACTION_VIEW_UPDATES) => Some(UPDATES_PATH),
            Some(ACTION_VISIT_WEBSITE) => Some(ROOT_PATH),
            _ if self.notification.data.url.is_empty() => Some(ROOT_PATH),
            _ => Some(self.notification.data.url.as_str()),
        }
    }
}

/// What a notification click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Dismissed,
    /// An open page already showing the target was focused.
    Focused(ClientId),
    Opened(ClientId),
}

/// Focus the first window whose URL contains the click target, otherwise
/// open a new window there.
pub fn route_click(
    click: &NotificationClick,
    clients: &mut Clients,
    config: &SiteConfig,
) -> Result<ClickOutcome> {
    let Some(target) = click.target() else {
        debug!("Notification dismissed");
        return Ok(ClickOutcome::Dismissed);
    };

    let existing = clients
        .match_all(ClientType::Window)
        .into_iter()
        .find(|client| client.url.as_str().contains(target))
        .map(|client| client.id);

    match existing {
        Some(id) => {
            clients.focus(id)?;
            info!(path = target, client = ?id, "Focused existing page");
            Ok(ClickOutcome::Focused(id))
        }
        None => {
            let client = clients.open_window(config.resolve(target)?);
            info!(path = target, client = ?client.id, "Opened page");
            Ok(ClickOutcome::Opened(client.id))
        }
    }
}
