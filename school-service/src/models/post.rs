use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    #[default]
    Announcement,
    News,
    Social,
}

text_enum!(PostType {
    Announcement => "announcement",
    News => "news",
    Social => "social",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub organization_id: i64,
    pub branch_id: i64,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    #[sqlx(try_from = "String")]
    pub post_type: PostType,
    pub created_by: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub is_published: bool,
    #[sqlx(json)]
    pub social_platforms: Vec<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub organization_id: i64,
    pub branch_id: i64,
    pub title: String,
    pub content: String,
    pub post_type: PostType,
    pub created_by: String,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub social_platforms: Vec<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdate {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub post_type: Option<PostType>,
    pub branch_id: Option<i64>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub is_published: Option<bool>,
    pub social_platforms: Option<Vec<String>>,
    #[validate(length(max = 500))]
    pub image_url: Option<String>,
}

impl Post {
    pub fn apply(&mut self, update: &PostUpdate) {
        if let Some(v) = &update.title {
            self.title = v.clone();
        }
        if let Some(v) = &update.content {
            self.content = v.clone();
        }
        if let Some(v) = update.post_type {
            self.post_type = v;
        }
        if let Some(v) = update.branch_id {
            self.branch_id = v;
        }
        if let Some(v) = update.scheduled_for {
            self.scheduled_for = Some(v);
        }
        if let Some(v) = update.is_published {
            if v && !self.is_published {
                self.published_at = Some(Utc::now());
            }
            self.is_published = v;
        }
        if let Some(v) = &update.social_platforms {
            self.social_platforms = v.clone();
        }
        if let Some(v) = &update.image_url {
            self.image_url = Some(v.clone());
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publishing_sets_published_at_once() {
        let now = Utc::now();
        let mut post = Post {
            id: 1,
            organization_id: 1,
            branch_id: 1,
            title: "Bake sale".into(),
            content: "Friday".into(),
            post_type: PostType::Announcement,
            created_by: "u".into(),
            scheduled_for: None,
            published_at: None,
            is_published: false,
            social_platforms: vec![],
            image_url: None,
            created_at: now,
            updated_at: now,
        };

        post.apply(&PostUpdate {
            is_published: Some(true),
            ..Default::default()
        });
        let first = post.published_at;
        assert!(first.is_some());

        post.apply(&PostUpdate {
            is_published: Some(true),
            ..Default::default()
        });
        assert_eq!(post.published_at, first);
    }

    #[test]
    fn test_post_type_field_is_named_type() {
        let update: PostUpdate = serde_json::from_value(serde_json::json!({"type": "news"})).unwrap();
        assert_eq!(update.post_type, Some(PostType::News));
    }
}
