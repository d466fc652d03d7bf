pub mod payload;
pub mod senders;

use std::sync::Arc;

pub use payload::{extract_text, parse_tree, PayloadShape};
pub use senders::{SeenSender, SeenSenders};

use crate::collaborators::AppRegistry;
use crate::models::{Notification, NotificationText, Origin, RawRecord};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Turns raw log rows into [`Notification`]s.
pub struct RecordDecoder {
    /// ASCII-lowercased, matching how [`SeenSenders`] folds case.
    ignored: Vec<String>,
    registry: Arc<dyn AppRegistry>,
    seen: SeenSenders,
}

impl RecordDecoder {
    pub fn new(ignored: Vec<String>, registry: Arc<dyn AppRegistry>, seen: SeenSenders) -> Self {
        Self {
            ignored: ignored.into_iter().map(|id| id.to_ascii_lowercase()).collect(),
            registry,
            seen,
        }
    }

    pub fn seen_senders(&self) -> &SeenSenders {
        &self.seen
    }

    /// `None` for ignored senders and rows whose sender cannot be resolved.
    /// Unreadable payloads still produce a notification, with empty text.
    pub fn decode(&self, record: &RawRecord) -> Option<Notification> {
        let tree = parse_tree(&record.payload);
        if tree.is_none() && !record.payload.is_empty() {
            log_debug!("record {} has an unparseable payload", record.id);
        }

        let raw_sender = record
            .sender_identifier
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| tree.as_ref().and_then(payload::embedded_sender));
        let Some(raw_sender) = raw_sender else {
            log_debug!(
                "record {} skipped: sender {} not in sender table",
                record.id,
                record.sender_key
            );
            return None;
        };

        if self.is_ignored(&raw_sender) {
            return None;
        }
        let sender = self.canonical_identifier(&raw_sender);
        if sender != raw_sender && self.is_ignored(&sender) {
            return None;
        }

        let text = tree
            .as_ref()
            .map(extract_text)
            .unwrap_or_else(NotificationText::default);

        let (name, icon) = match self.seen.get(&sender) {
            Some(known) => (known.name, known.icon),
            None => {
                let name = self
                    .registry
                    .display_name(&sender)
                    .unwrap_or_else(|| fallback_name(&sender));
                let icon = self.registry.icon(&sender);
                if self.seen.record(&sender, &name, icon.clone()) {
                    log_debug!("first notification from {sender} ({name})");
                }
                (name, icon)
            }
        };

        Some(Notification::new(sender, name, text, icon, Origin::System))
    }

    fn is_ignored(&self, identifier: &str) -> bool {
        self.ignored
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(identifier))
    }

    /// A spelling we already recorded first, so known senders never reach the
    /// registry; then the registry's spelling; then the identifier as given.
    fn canonical_identifier(&self, raw: &str) -> String {
        if let Some(known) = self.seen.find_case_insensitive(raw) {
            return known;
        }
        if let Some(canonical) = self.registry.canonical_identifier(raw) {
            return canonical;
        }
        raw.to_string()
    }
}

/// Last dotted component of a reverse-DNS identifier.
fn fallback_name(identifier: &str) -> String {
    identifier
        .rsplit('.')
        .find(|part| !part.is_empty())
        .unwrap_or(identifier)
        .to_string()
}
