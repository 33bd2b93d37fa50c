//! Request bodies and query strings for the resource routes. None of them
//! carries an organization id; the tenant always comes from the caller.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::{EventCategory, IdentityUpdate, Language, PostType, Role, RsvpStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchFilter {
    pub branch_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub branch_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    #[validate(length(max = 255))]
    pub first_name: Option<String>,
    #[validate(length(max = 255))]
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(length(max = 500))]
    pub profile_image_url: Option<String>,
    pub language: Option<Language>,
}

impl From<ProfileUpdateRequest> for IdentityUpdate {
    fn from(req: ProfileUpdateRequest) -> Self {
        IdentityUpdate {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            profile_image_url: req.profile_image_url,
            language: req.language,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub branch_id: i64,
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    #[validate(length(max = 255))]
    pub location: Option<String>,
    #[serde(default)]
    pub category: EventCategory,
    #[validate(range(min = 1))]
    pub max_attendees: Option<i32>,
    #[serde(default)]
    pub requires_rsvp: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct RsvpRequest {
    #[serde(default)]
    pub status: RsvpStatus,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub branch_id: i64,
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    #[serde(rename = "type", default)]
    pub post_type: PostType,
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub social_platforms: Vec<String>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 255))]
    pub first_name: Option<String>,
    #[validate(length(max = 255))]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(max = 255))]
    pub first_name: Option<String>,
    #[validate(length(max = 255))]
    pub last_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub branch_id: Option<i64>,
    pub language: Option<Language>,
    pub is_active: Option<bool>,
}

impl From<UpdateUserRequest> for IdentityUpdate {
    fn from(req: UpdateUserRequest) -> Self {
        IdentityUpdate {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            role: req.role,
            branch_id: req.branch_id,
            language: req.language,
            is_active: req.is_active,
            ..Default::default()
        }
    }
}
