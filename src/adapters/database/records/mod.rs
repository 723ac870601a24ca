mod conversation;
mod message;
mod notification;
mod user;

pub(crate) use conversation::{ConversationRecord, UnreadRecord};
pub(crate) use message::MessageRecord;
pub(crate) use notification::NotificationRecord;
pub(crate) use user::UserRecord;
