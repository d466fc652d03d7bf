use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary key of a row in the host notification log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One row as read from the log, before decoding.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub id: RecordId,
    /// Foreign key into the log's sender table.
    pub sender_key: i64,
    /// Sender identifier resolved from the sender table, when the row exists.
    pub sender_identifier: Option<String>,
    pub payload: Vec<u8>,
    /// Delivery time as stored by the host, seconds since 2001-01-01. Not
    /// trusted for display.
    pub delivered_at: Option<f64>,
}
