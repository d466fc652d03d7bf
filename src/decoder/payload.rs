//! Payload parsing. Blobs are property lists (binary or XML) on current hosts;
//! a JSON fallback covers hand-written fixtures and older exports. Either way
//! the result is lifted into a plain `serde_json::Value` tree so the shape
//! strategies below do not care where it came from.

use std::io::Cursor;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::models::NotificationText;

const TITLE_KEYS: &[&str] = &["titl", "title"];
const SUBTITLE_KEYS: &[&str] = &["subt", "subtitle"];
const BODY_KEYS: &[&str] = &["body", "message"];

/// Parse a raw blob. `None` when it is neither a property list nor JSON.
pub fn parse_tree(blob: &[u8]) -> Option<Value> {
    if blob.is_empty() {
        return None;
    }

    if let Ok(value) = plist::Value::from_reader(Cursor::new(blob)) {
        return Some(lift_plist(value));
    }

    serde_json::from_slice(blob).ok()
}

fn lift_plist(value: plist::Value) -> Value {
    match value {
        plist::Value::Dictionary(dict) => Value::Object(
            dict.into_iter()
                .map(|(key, value)| (key, lift_plist(value)))
                .collect::<Map<_, _>>(),
        ),
        plist::Value::Array(items) => Value::Array(items.into_iter().map(lift_plist).collect()),
        plist::Value::String(text) => Value::String(text),
        plist::Value::Boolean(flag) => Value::Bool(flag),
        plist::Value::Integer(int) => int
            .as_signed()
            .map(Number::from)
            .or_else(|| int.as_unsigned().map(Number::from))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        plist::Value::Real(real) => Number::from_f64(real)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        plist::Value::Date(date) => {
            let time: SystemTime = date.into();
            Value::String(DateTime::<Utc>::from(time).to_rfc3339())
        }
        plist::Value::Uid(uid) => Value::Number(Number::from(uid.get())),
        // Opaque binary members carry nothing displayable.
        _ => Value::Null,
    }
}

/// One historical payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Fields under a `req` sub-object (current hosts).
    Request,
    /// Same fields at the payload root (older hosts).
    Root,
    /// Push style `alert`, either a bare string or an object.
    PushAlert,
}

pub const SHAPES: [PayloadShape; 3] = [
    PayloadShape::Request,
    PayloadShape::Root,
    PayloadShape::PushAlert,
];

impl PayloadShape {
    pub fn extract(self, tree: &Value) -> Option<NotificationText> {
        let text = match self {
            PayloadShape::Request => fields_of(tree.get("req")?),
            PayloadShape::Root => fields_of(tree),
            PayloadShape::PushAlert => push_alert(tree)?,
        };
        text.has_content().then_some(text)
    }
}

/// First shape that yields a title or body wins. Unknown layouts give empty
/// text rather than an error.
pub fn extract_text(tree: &Value) -> NotificationText {
    SHAPES
        .iter()
        .find_map(|shape| shape.extract(tree))
        .unwrap_or_default()
}

/// Sender identifier some payloads carry at the root, used when the sender
/// table has no row for the record.
pub fn embedded_sender(tree: &Value) -> Option<String> {
    ["app", "bundle", "bundleIdentifier"]
        .iter()
        .find_map(|key| non_empty_str(tree.get(*key)?))
}

fn fields_of(node: &Value) -> NotificationText {
    NotificationText {
        title: first_string(node, TITLE_KEYS),
        subtitle: first_string(node, SUBTITLE_KEYS),
        body: first_string(node, BODY_KEYS),
    }
}

fn push_alert(tree: &Value) -> Option<NotificationText> {
    let alert = tree
        .get("alert")
        .or_else(|| tree.get("aps").and_then(|aps| aps.get("alert")))
        .or_else(|| tree.get("req").and_then(|req| req.get("alert")))?;

    match alert {
        Value::String(_) => Some(NotificationText {
            body: non_empty_str(alert),
            ..NotificationText::default()
        }),
        Value::Object(_) => Some(fields_of(alert)),
        _ => None,
    }
}

fn first_string(node: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_str(node.get(*key)?))
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
