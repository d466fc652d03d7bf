use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::SenderIcon;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenSender {
    pub identifier: String,
    pub name: String,
    pub icon: Option<SenderIcon>,
    pub first_seen: DateTime<Utc>,
}

/// Every sender observed since the process started, keyed by canonical
/// identifier. Additive only, so it may be written from the reader side
/// without coordinating with the presentation side.
#[derive(Clone, Default)]
pub struct SeenSenders {
    entries: Arc<RwLock<HashMap<String, SeenSender>>>,
}

impl SeenSenders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sender. Returns true the first time `identifier` is seen;
    /// later calls never overwrite the stored entry.
    pub fn record(&self, identifier: &str, name: &str, icon: Option<SenderIcon>) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.contains_key(identifier) {
            return false;
        }
        entries.insert(
            identifier.to_string(),
            SeenSender {
                identifier: identifier.to_string(),
                name: name.to_string(),
                icon,
                first_seen: Utc::now(),
            },
        );
        true
    }

    pub fn get(&self, identifier: &str) -> Option<SeenSender> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identifier)
            .cloned()
    }

    /// Existing key equal to `identifier` ignoring ASCII case.
    pub fn find_case_insensitive(&self, identifier: &str) -> Option<String> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.contains_key(identifier) {
            return Some(identifier.to_string());
        }
        entries
            .keys()
            .find(|key| key.eq_ignore_ascii_case(identifier))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries ordered by first sighting.
    pub fn snapshot(&self) -> Vec<SeenSender> {
        let mut all: Vec<SeenSender> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        all
    }
}
