pub mod cursor;
pub mod notification;
pub mod record;

pub use cursor::Cursor;
pub use notification::{Notification, NotificationId, NotificationText, Origin, SenderIcon};
pub use record::{RawRecord, RecordId};
