use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Academic,
    Sports,
    Cultural,
    #[default]
    Other,
}

text_enum!(EventCategory {
    Academic => "academic",
    Sports => "sports",
    Cultural => "cultural",
    Other => "other",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    #[default]
    Attending,
    NotAttending,
    Maybe,
}

text_enum!(RsvpStatus {
    Attending => "attending",
    NotAttending => "not_attending",
    Maybe => "maybe",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub organization_id: i64,
    pub branch_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub location: Option<String>,
    #[sqlx(try_from = "String")]
    pub category: EventCategory,
    pub created_by: String,
    pub max_attendees: Option<i32>,
    pub requires_rsvp: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub organization_id: i64,
    pub branch_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub category: EventCategory,
    pub created_by: String,
    pub max_attendees: Option<i32>,
    pub requires_rsvp: bool,
}

/// Partial event change. `branch_id` is re-validated against the caller's tenant.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    pub category: Option<EventCategory>,
    pub branch_id: Option<i64>,
    #[validate(range(min = 1))]
    pub max_attendees: Option<i32>,
    pub requires_rsvp: Option<bool>,
    pub is_active: Option<bool>,
}

impl Event {
    pub fn apply(&mut self, update: &EventUpdate) {
        if let Some(v) = &update.title {
            self.title = v.clone();
        }
        if let Some(v) = &update.description {
            self.description = Some(v.clone());
        }
        if let Some(v) = update.start_date {
            self.start_date = v;
        }
        if let Some(v) = update.start_time {
            self.start_time = v;
        }
        if let Some(v) = update.end_date {
            self.end_date = Some(v);
        }
        if let Some(v) = update.end_time {
            self.end_time = Some(v);
        }
        if let Some(v) = &update.location {
            self.location = Some(v.clone());
        }
        if let Some(v) = update.category {
            self.category = v;
        }
        if let Some(v) = update.branch_id {
            self.branch_id = v;
        }
        if let Some(v) = update.max_attendees {
            self.max_attendees = Some(v);
        }
        if let Some(v) = update.requires_rsvp {
            self.requires_rsvp = v;
        }
        if let Some(v) = update.is_active {
            self.is_active = v;
        }
        self.updated_at = Utc::now();
    }

    /// Events starting after `today` count as upcoming.
    pub fn is_upcoming(&self, today: NaiveDate) -> bool {
        self.start_date > today
    }
}

/// RSVP of one identity to one event; its tenant is the event's.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub id: i64,
    pub event_id: i64,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub status: RsvpStatus,
    pub created_at: DateTime<Utc>,
}
