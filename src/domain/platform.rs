//! Events raised by the booking, review and account services that end up in a user's
//! notification feed and on their devices.

use crate::domain::notification::{NewNotification, NotificationKind};
use crate::domain::push::{DEFAULT_ACCENT_COLOR, LOW_PRIORITY, PushNotification};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const CONFIRMED_COLOR: &str = "FF4CAF50";
const CANCELLED_COLOR: &str = "FFF44336";
const PENDING_COLOR: &str = "FFFF9800";
const UPDATED_COLOR: &str = "FF2196F3";
const FAVORITE_COLOR: &str = "FFE91E63";
const HIGH_RATING_COLOR: &str = "FFFFC107";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Client,
    Photographer,
    #[serde(other)]
    Admin,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PlatformEvent {
    BookingCreated {
        booking_id: Uuid,
        photographer_id: Uuid,
        client_id: Uuid,
        client_name: String,
        #[serde(default)]
        client_avatar: Option<String>,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        time: Option<String>,
        #[serde(default)]
        package_name: Option<String>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        price: Option<f64>,
    },
    BookingStatusChanged {
        booking_id: Uuid,
        client_id: Uuid,
        #[serde(default)]
        photographer_id: Option<Uuid>,
        photographer_name: String,
        #[serde(default)]
        photographer_avatar: Option<String>,
        status: BookingStatus,
        #[serde(default)]
        old_status: Option<String>,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        time_slot: Option<String>,
        #[serde(default)]
        package_name: Option<String>,
    },
    BookingCancelled {
        booking_id: Uuid,
        recipient_id: Uuid,
        cancelled_by: CancelledBy,
        #[serde(default)]
        client_name: Option<String>,
        #[serde(default)]
        photographer_name: Option<String>,
        #[serde(default)]
        date: Option<String>,
        #[serde(default)]
        time_slot: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    ReviewCreated {
        review_id: Uuid,
        photographer_id: Uuid,
        #[serde(default)]
        client_id: Option<Uuid>,
        rating: u8,
        #[serde(default)]
        comment: Option<String>,
        client_name: String,
        #[serde(default)]
        client_avatar: Option<String>,
    },
    FavoriteAdded {
        photographer_id: Uuid,
        client_id: Uuid,
        client_name: String,
        #[serde(default)]
        client_avatar: Option<String>,
    },
    VerificationApproved {
        user_id: Uuid,
    },
    VerificationRejected {
        user_id: Uuid,
        reason: String,
    },
    AccountBlocked {
        user_id: Uuid,
        reason: String,
    },
}

/// What a platform event turns into: a feed entry and a device push.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEvent {
    pub notification: NewNotification,
    pub push: PushNotification,
}

fn status_copy(status: BookingStatus, photographer_name: &str) -> (String, String, &'static str) {
    match status {
        BookingStatus::Confirmed => {
            ("✅ تم تأكيد الحجز".into(), format!("تم تأكيد حجزك مع {photographer_name}"), CONFIRMED_COLOR)
        }
        BookingStatus::Completed => (
            "✨ تم إكمال الحجز".into(),
            format!("تم إكمال حجزك مع {photographer_name}. نتمنى أن تكون راضياً عن الخدمة!"),
            DEFAULT_ACCENT_COLOR,
        ),
        BookingStatus::Cancelled => {
            ("❌ تم إلغاء الحجز".into(), format!("تم إلغاء حجزك مع {photographer_name}"), CANCELLED_COLOR)
        }
        BookingStatus::Pending => {
            ("⏳ حجز قيد الانتظار".into(), format!("حجزك مع {photographer_name} قيد المراجعة"), PENDING_COLOR)
        }
        BookingStatus::Other => {
            ("تحديث الحجز".into(), format!("تم تحديث حالة حجزك مع {photographer_name}"), UPDATED_COLOR)
        }
    }
}

const fn status_kind(status: BookingStatus) -> NotificationKind {
    match status {
        BookingStatus::Confirmed => NotificationKind::BookingConfirmed,
        BookingStatus::Completed => NotificationKind::BookingCompleted,
        BookingStatus::Cancelled => NotificationKind::BookingCancelled,
        BookingStatus::Pending | BookingStatus::Other => NotificationKind::System,
    }
}

fn rating_label(rating: u8) -> &'static str {
    match rating {
        5 => "ممتاز! 🌟",
        4 => "جيد جداً! 👍",
        3 => "جيد",
        2 => "يحتاج تحسين",
        1 => "ضعيف",
        _ => "",
    }
}

impl PlatformEvent {
    /// The user the event is addressed to.
    #[must_use]
    pub const fn recipient(&self) -> Uuid {
        match self {
            Self::BookingCreated { photographer_id, .. }
            | Self::ReviewCreated { photographer_id, .. }
            | Self::FavoriteAdded { photographer_id, .. } => *photographer_id,
            Self::BookingStatusChanged { client_id, .. } => *client_id,
            Self::BookingCancelled { recipient_id, .. } => *recipient_id,
            Self::VerificationApproved { user_id }
            | Self::VerificationRejected { user_id, .. }
            | Self::AccountBlocked { user_id, .. } => *user_id,
        }
    }

    /// The user whose action raised the event, when there is one.
    #[must_use]
    pub const fn sender(&self) -> Option<Uuid> {
        match self {
            Self::BookingCreated { client_id, .. } | Self::FavoriteAdded { client_id, .. } => Some(*client_id),
            Self::ReviewCreated { client_id, .. } => *client_id,
            Self::BookingStatusChanged { photographer_id, .. } => *photographer_id,
            Self::BookingCancelled { .. }
            | Self::VerificationApproved { .. }
            | Self::VerificationRejected { .. }
            | Self::AccountBlocked { .. } => None,
        }
    }

    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn render(&self) -> RenderedEvent {
        let (kind, push) = match self {
            Self::BookingCreated {
                booking_id,
                client_name,
                client_avatar,
                date,
                time,
                package_name,
                location,
                price,
                ..
            } => {
                let data = json!({
                    "type": "new_booking",
                    "bookingId": booking_id,
                    "clientName": client_name,
                    "clientAvatar": client_avatar.clone().unwrap_or_default(),
                    "date": date,
                    "time": time,
                    "packageName": package_name,
                    "location": location,
                    "price": price,
                    "screen": "bookings",
                });
                let push = PushNotification::new("🎉 حجز جديد!", format!("لديك حجز جديد من {client_name}"), data)
                    .with_large_icon(client_avatar.clone())
                    .with_accent_color(DEFAULT_ACCENT_COLOR);
                (NotificationKind::BookingRequest, push)
            }
            Self::BookingStatusChanged {
                booking_id,
                photographer_name,
                photographer_avatar,
                status,
                old_status,
                date,
                time_slot,
                package_name,
                ..
            } => {
                let (title, body, color) = status_copy(*status, photographer_name);
                let data = json!({
                    "type": "booking_status",
                    "bookingId": booking_id,
                    "status": status_label(*status),
                    "oldStatus": old_status,
                    "photographerName": photographer_name,
                    "photographerAvatar": photographer_avatar.clone().unwrap_or_default(),
                    "date": date,
                    "timeSlot": time_slot,
                    "packageName": package_name,
                    "screen": "bookings",
                });
                let push = PushNotification::new(title, body, data)
                    .with_large_icon(photographer_avatar.clone())
                    .with_accent_color(color);
                (status_kind(*status), push)
            }
            Self::BookingCancelled {
                booking_id, cancelled_by, client_name, photographer_name, date, time_slot, reason, ..
            } => {
                let canceller = match cancelled_by {
                    CancelledBy::Client => client_name.as_deref(),
                    CancelledBy::Photographer => photographer_name.as_deref(),
                    CancelledBy::Admin => None,
                };
                let body = canceller.map_or_else(
                    || "تم إلغاء الحجز من قبل الإدارة".to_string(),
                    |name| format!("قام {name} بإلغاء الحجز"),
                );
                let data = json!({
                    "type": "booking_cancelled",
                    "bookingId": booking_id,
                    "cancellerName": canceller,
                    "date": date,
                    "timeSlot": time_slot,
                    "reason": reason,
                    "screen": "bookings",
                });
                let push = PushNotification::new("❌ تم إلغاء الحجز", body, data).with_accent_color(CANCELLED_COLOR);
                (NotificationKind::BookingCancelled, push)
            }
            Self::ReviewCreated { review_id, rating, comment, client_name, client_avatar, .. } => {
                let stars = "⭐".repeat(usize::from(*rating).min(5));
                let title = format!("{stars} تقييم جديد {}", rating_label(*rating)).trim_end().to_string();
                let data = json!({
                    "type": "new_review",
                    "reviewId": review_id,
                    "rating": rating,
                    "comment": comment,
                    "clientName": client_name,
                    "clientAvatar": client_avatar.clone().unwrap_or_default(),
                    "screen": "reviews",
                });
                let color = if *rating >= 4 { HIGH_RATING_COLOR } else { PENDING_COLOR };
                let push = PushNotification::new(title, format!("{client_name} قيّمك بـ {rating} نجوم"), data)
                    .with_large_icon(client_avatar.clone())
                    .with_accent_color(color);
                (NotificationKind::NewReview, push)
            }
            Self::FavoriteAdded { client_name, client_avatar, .. } => {
                let data = json!({
                    "type": "new_favorite",
                    "clientName": client_name,
                    "clientAvatar": client_avatar.clone().unwrap_or_default(),
                    "screen": "profile",
                });
                let push = PushNotification::new("❤️ إعجاب جديد!", format!("أعجب {client_name} بملفك الشخصي"), data)
                    .with_large_icon(client_avatar.clone())
                    .with_accent_color(FAVORITE_COLOR)
                    .with_priority(LOW_PRIORITY);
                (NotificationKind::FavoriteAdded, push)
            }
            Self::VerificationApproved { .. } => {
                let data = json!({"type": "verification_approved", "screen": "profile"});
                let push =
                    PushNotification::new("✅ تم توثيق حسابك", "تهانينا! تم قبول طلب توثيق حسابك بنجاح.", data);
                (NotificationKind::PhotographerVerified, push)
            }
            Self::VerificationRejected { reason, .. } => {
                let data = json!({"type": "verification_rejected", "screen": "profile"});
                let push = PushNotification::new(
                    "❌ تم رفض طلب التوثيق",
                    format!("عذراً، تم رفض طلب توثيق حسابك. السبب: {reason}"),
                    data,
                );
                (NotificationKind::System, push)
            }
            Self::AccountBlocked { reason, .. } => {
                let data = json!({"type": "account_blocked", "reason": reason});
                let push =
                    PushNotification::new("⛔ تم حظر حسابك", format!("تم حظر حسابك من قبل الإدارة. السبب: {reason}"), data);
                (NotificationKind::System, push)
            }
        };

        let notification = NewNotification {
            recipient_id: self.recipient(),
            sender_id: self.sender(),
            kind,
            title: push.title.clone(),
            message: push.body.clone(),
            data: push.data.clone(),
        };

        RenderedEvent { notification, push }
    }
}

const fn status_label(status: BookingStatus) -> &'static str {
    match status {
        BookingStatus::Pending => "pending",
        BookingStatus::Confirmed => "confirmed",
        BookingStatus::Completed => "completed",
        BookingStatus::Cancelled => "cancelled",
        BookingStatus::Other => "updated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_created_goes_to_photographer() {
        let photographer = Uuid::new_v4();
        let client = Uuid::new_v4();
        let event: PlatformEvent = serde_json::from_value(json!({
            "type": "booking_created",
            "bookingId": Uuid::new_v4(),
            "photographerId": photographer,
            "clientId": client,
            "clientName": "Sami",
            "packageName": "Wedding",
        }))
        .unwrap();

        assert_eq!(event.recipient(), photographer);
        assert_eq!(event.sender(), Some(client));

        let rendered = event.render();
        assert_eq!(rendered.notification.kind, NotificationKind::BookingRequest);
        assert_eq!(rendered.push.body, "لديك حجز جديد من Sami");
        assert_eq!(rendered.push.data["screen"], "bookings");
        assert_eq!(rendered.notification.message, rendered.push.body);
    }

    #[test]
    fn test_unknown_status_falls_back_to_generic_copy() {
        let event: PlatformEvent = serde_json::from_value(json!({
            "type": "booking_status_changed",
            "bookingId": Uuid::new_v4(),
            "clientId": Uuid::new_v4(),
            "photographerName": "Lina",
            "status": "rescheduled",
        }))
        .unwrap();

        let rendered = event.render();
        assert_eq!(rendered.push.title, "تحديث الحجز");
        assert_eq!(rendered.notification.kind, NotificationKind::System);
        assert_eq!(rendered.push.accent_color.as_deref(), Some(UPDATED_COLOR));
    }

    #[test]
    fn test_admin_cancellation_has_no_canceller() {
        let event: PlatformEvent = serde_json::from_value(json!({
            "type": "booking_cancelled",
            "bookingId": Uuid::new_v4(),
            "recipientId": Uuid::new_v4(),
            "cancelledBy": "admin",
        }))
        .unwrap();

        let rendered = event.render();
        assert_eq!(rendered.push.body, "تم إلغاء الحجز من قبل الإدارة");
        assert!(rendered.push.data["cancellerName"].is_null());
    }

    #[test]
    fn test_review_title_has_stars() {
        let event = PlatformEvent::ReviewCreated {
            review_id: Uuid::new_v4(),
            photographer_id: Uuid::new_v4(),
            client_id: None,
            rating: 5,
            comment: None,
            client_name: "Omar".into(),
            client_avatar: None,
        };

        let rendered = event.render();
        assert!(rendered.push.title.starts_with("⭐⭐⭐⭐⭐"));
        assert_eq!(rendered.push.accent_color.as_deref(), Some(HIGH_RATING_COLOR));
        assert_eq!(rendered.notification.sender_id, None);
    }

    #[test]
    fn test_favorite_is_low_priority() {
        let event = PlatformEvent::FavoriteAdded {
            photographer_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Huda".into(),
            client_avatar: Some("https://cdn/h.png".into()),
        };

        let rendered = event.render();
        assert_eq!(rendered.push.priority, LOW_PRIORITY);
        assert_eq!(rendered.notification.kind, NotificationKind::FavoriteAdded);
    }
}
