use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Event,
    Announcement,
    #[default]
    System,
    Emergency,
    Billing,
}

text_enum!(NotificationKind {
    Event => "event",
    Announcement => "announcement",
    System => "system",
    Emergency => "emergency",
    Billing => "billing",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub organization_id: i64,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub kind: NotificationKind,
    pub is_read: bool,
    pub related_id: Option<i64>,
    pub related_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub organization_id: i64,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub related_id: Option<i64>,
    pub related_type: Option<String>,
}
