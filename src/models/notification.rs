use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Process-local identity of a captured notification. Unrelated to the log's
/// own record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    /// Read from the host notification log.
    System,
    /// Injected by another in-process feature.
    Synthetic,
}

/// Image handle for a sender, resolved by the app registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SenderIcon {
    File(PathBuf),
    DataUrl(String),
}

/// A normalized notification. Equality is identity: two notifications with
/// identical text are still different values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    id: NotificationId,
    pub source_id: String,
    pub source_name: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub icon: Option<SenderIcon>,
    pub origin: Origin,
}

impl PartialEq for Notification {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Notification {}

impl Notification {
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        text: NotificationText,
        icon: Option<SenderIcon>,
        origin: Origin,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            source_id: source_id.into(),
            source_name: source_name.into(),
            title: text.title,
            subtitle: text.subtitle,
            body: text.body,
            timestamp: Utc::now(),
            icon,
            origin,
        }
    }

    pub fn id(&self) -> NotificationId {
        self.id
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == Origin::Synthetic
    }

    /// Copy with the message content stripped, keeping the same identity.
    /// Used when previews are turned off.
    pub fn redacted(&self) -> Self {
        Self {
            subtitle: None,
            body: None,
            ..self.clone()
        }
    }
}

/// The text triple extracted from a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationText {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
}

impl NotificationText {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.subtitle.is_none() && self.body.is_none()
    }

    /// A payload shape "matched" when it produced a title or a body; a lone
    /// subtitle is not enough to stop looking at other shapes.
    pub fn has_content(&self) -> bool {
        self.title.is_some() || self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(title: &str) -> NotificationText {
        NotificationText {
            title: Some(title.into()),
            subtitle: Some("sub".into()),
            body: Some("body".into()),
        }
    }

    #[test]
    fn equality_is_by_identity_not_content() {
        let a = Notification::new("com.example.mail", "Mail", text("hi"), None, Origin::System);
        let b = Notification::new("com.example.mail", "Mail", text("hi"), None, Origin::System);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn redaction_keeps_identity_and_title() {
        let a = Notification::new("com.example.mail", "Mail", text("hi"), None, Origin::System);
        let r = a.redacted();
        assert_eq!(a, r);
        assert_eq!(r.title.as_deref(), Some("hi"));
        assert!(r.subtitle.is_none());
        assert!(r.body.is_none());
    }
}
