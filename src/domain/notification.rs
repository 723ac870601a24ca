use crate::domain::user::UserProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingRequest,
    BookingConfirmed,
    BookingCancelled,
    BookingCompleted,
    NewReview,
    NewMessage,
    PhotographerVerified,
    FavoriteAdded,
    System,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingRequest => "booking_request",
            Self::BookingConfirmed => "booking_confirmed",
            Self::BookingCancelled => "booking_cancelled",
            Self::BookingCompleted => "booking_completed",
            Self::NewReview => "new_review",
            Self::NewMessage => "new_message",
            Self::PhotographerVerified => "photographer_verified",
            Self::FavoriteAdded => "favorite_added",
            Self::System => "system",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booking_request" => Ok(Self::BookingRequest),
            "booking_confirmed" => Ok(Self::BookingConfirmed),
            "booking_cancelled" => Ok(Self::BookingCancelled),
            "booking_completed" => Ok(Self::BookingCompleted),
            "new_review" => Ok(Self::NewReview),
            "new_message" => Ok(Self::NewMessage),
            "photographer_verified" => Ok(Self::PhotographerVerified),
            "favorite_added" => Ok(Self::FavoriteAdded),
            "system" => Ok(Self::System),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

/// An entry of a user's in-app notification feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

impl NewNotification {
    #[must_use]
    pub fn into_notification(self, id: Uuid, created_at: OffsetDateTime) -> Notification {
        Notification {
            id,
            recipient_id: self.recipient_id,
            sender_id: self.sender_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            data: self.data,
            read: false,
            read_at: None,
            created_at,
        }
    }
}

/// A notification with the sender's display fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Option<UserProfile>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            NotificationKind::BookingRequest,
            NotificationKind::BookingCancelled,
            NotificationKind::PhotographerVerified,
            NotificationKind::System,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>(), Ok(kind));
        }
        assert!("booking_reminder".parse::<NotificationKind>().is_err());
    }

    #[test]
    fn test_notification_wire_shape() {
        let notification = NewNotification {
            recipient_id: Uuid::nil(),
            sender_id: None,
            kind: NotificationKind::NewReview,
            title: "New review".to_string(),
            message: "Sami rated you 5 stars".to_string(),
            data: json!({"rating": 5}),
        }
        .into_notification(Uuid::now_v7(), OffsetDateTime::UNIX_EPOCH);

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["type"], "new_review");
        assert_eq!(json["read"], false);
        assert_eq!(json["data"]["rating"], 5);
        assert!(json["readAt"].is_null());
    }
}
