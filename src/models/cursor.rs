use super::RecordId;

/// Highest record id processed in the current run. Only ever moves forward;
/// a new run starts a fresh cursor at the log's latest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(RecordId);

impl Cursor {
    pub fn at(latest: RecordId) -> Self {
        Self(latest)
    }

    pub fn position(&self) -> RecordId {
        self.0
    }

    /// Returns true when `id` is newer than the cursor, moving the cursor to it.
    pub fn advance(&mut self, id: RecordId) -> bool {
        if id > self.0 {
            self.0 = id;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_moves_backwards() {
        let mut cursor = Cursor::at(RecordId(10));
        assert!(cursor.advance(RecordId(12)));
        assert!(!cursor.advance(RecordId(11)));
        assert!(!cursor.advance(RecordId(12)));
        assert_eq!(cursor.position(), RecordId(12));
    }
}
