//! PostgreSQL implementation of the storage contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;

use super::{CredentialStore, SchoolStore, ServiceError, SessionStore, UserDirectory};
use crate::models::{
    ActivityLog, Branch, BranchUpdate, CredentialRecord, Event, EventUpdate, Identity,
    IdentityUpdate, NewActivity, NewBranch, NewEvent, NewNotification, NewPost, Notification,
    Organization, OrganizationUpdate, Post, PostUpdate, Rsvp, RsvpStatus, Session,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> ServiceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ServiceError::Conflict(message.to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            ServiceError::Conflict(message.to_string())
        }
        _ => ServiceError::Database(err),
    }
}

async fn insert_user<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    identity: &Identity,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, email, first_name, last_name, profile_image_url,
                           organization_id, role, branch_id, language, is_active,
                           last_login_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(&identity.id)
    .bind(&identity.email)
    .bind(&identity.first_name)
    .bind(&identity.last_name)
    .bind(&identity.profile_image_url)
    .bind(identity.organization_id)
    .bind(identity.role.as_str())
    .bind(identity.branch_id)
    .bind(identity.language.as_str())
    .bind(identity.is_active)
    .bind(identity.last_login_at)
    .bind(identity.created_at)
    .bind(identity.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn insert_credential_row<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    record: &CredentialRecord,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO credentials (email, identity_id, password_hash, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(&record.email)
    .bind(&record.identity_id)
    .bind(&record.password_hash)
    .bind(record.updated_at)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ==================== Identity Operations ====================

#[async_trait]
impl UserDirectory for Database {
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Identity>("SELECT * FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Identity>("SELECT * FROM users WHERE email = $1")
                .bind(email.trim().to_lowercase())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<bool, ServiceError> {
        Ok(insert_user(&self.pool, identity).await?)
    }

    async fn update_identity(
        &self,
        id: &str,
        update: &IdentityUpdate,
    ) -> Result<Option<Identity>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Identity>(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                profile_image_url = COALESCE($5, profile_image_url),
                language = COALESCE($6, language),
                role = COALESCE($7, role),
                branch_id = COALESCE($8, branch_id),
                is_active = COALESCE($9, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(update.email.as_ref().map(|e| e.to_lowercase()))
        .bind(&update.profile_image_url)
        .bind(update.language.map(|l| l.as_str()))
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.branch_id)
        .bind(update.is_active)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Email already in use"))?;

        // The login credential follows the identity's email.
        if let (Some(identity), Some(_)) = (&updated, &update.email) {
            sqlx::query(
                "UPDATE credentials SET email = $2, updated_at = NOW() WHERE identity_id = $1 AND email <> $2",
            )
            .bind(id)
            .bind(&identity.email)
            .execute(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "Email already in use"))?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn list_identities(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Identity>, ServiceError> {
        Ok(sqlx::query_as::<_, Identity>(
            r#"
            SELECT * FROM users
            WHERE organization_id = $1 AND ($2::BIGINT IS NULL OR branch_id = $2)
            ORDER BY email
            "#,
        )
        .bind(organization_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ==================== Session Operations ====================

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        sqlx::query(
            "INSERT INTO sessions (id, identity_id, issued_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.id)
        .bind(&session.identity_id)
        .bind(session.issued_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn delete_session(&self, id: &str) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_sessions_for_identity(
        &self,
        identity_id: &str,
    ) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM sessions WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ==================== Credential Operations ====================

#[async_trait]
impl CredentialStore for Database {
    async fn find_credential(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, ServiceError> {
        Ok(sqlx::query_as::<_, CredentialRecord>(
            "SELECT identity_id, email, password_hash, updated_at FROM credentials WHERE email = $1",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_credential(&self, record: &CredentialRecord) -> Result<bool, ServiceError> {
        Ok(insert_credential_row(&self.pool, record).await?)
    }

    async fn register(
        &self,
        identity: &Identity,
        record: &CredentialRecord,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;
        if !insert_user(&mut *tx, identity).await? || !insert_credential_row(&mut *tx, record).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }
}

// ==================== Tenant Data Operations ====================

#[async_trait]
impl SchoolStore for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            ServiceError::Database(e)
        })?;
        Ok(())
    }

    async fn get_organization(&self, id: i64) -> Result<Option<Organization>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn ensure_organization(
        &self,
        organization: &Organization,
    ) -> Result<Organization, ServiceError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO organizations (id, name, slug, plan, max_branches, max_users, settings,
                                       is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(organization.id)
        .bind(&organization.name)
        .bind(&organization.slug)
        .bind(&organization.plan)
        .bind(organization.max_branches)
        .bind(organization.max_users)
        .bind(&organization.settings)
        .bind(organization.is_active)
        .bind(organization.created_at)
        .bind(organization.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            // Explicit ids bypass the sequence; move it past them.
            sqlx::query(
                "SELECT setval(pg_get_serial_sequence('organizations', 'id'), (SELECT MAX(id) FROM organizations))",
            )
            .execute(&self.pool)
            .await?;
        }

        self.get_organization(organization.id)
            .await?
            .ok_or(ServiceError::NotFound("Organization"))
    }

    async fn update_organization(
        &self,
        id: i64,
        update: &OrganizationUpdate,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations SET
                name = COALESCE($2, name),
                domain = COALESCE($3, domain),
                billing_email = COALESCE($4, billing_email),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.domain)
        .bind(&update.billing_email)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn replace_settings(
        &self,
        id: i64,
        settings: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "UPDATE organizations SET settings = $2, updated_at = NOW() WHERE id = $1 RETURNING settings",
        )
        .bind(id)
        .bind(settings)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(s,)| s))
    }

    async fn list_branches(&self, organization_id: i64) -> Result<Vec<Branch>, ServiceError> {
        Ok(sqlx::query_as::<_, Branch>(
            "SELECT * FROM branches WHERE organization_id = $1 ORDER BY name",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_branch(&self, id: i64) -> Result<Option<Branch>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_branch(&self, branch: NewBranch) -> Result<Branch, ServiceError> {
        Ok(sqlx::query_as::<_, Branch>(
            r#"
            INSERT INTO branches (organization_id, name, address, phone, email)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(branch.organization_id)
        .bind(branch.name)
        .bind(branch.address)
        .bind(branch.phone)
        .bind(branch.email)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_branch(
        &self,
        id: i64,
        update: &BranchUpdate,
    ) -> Result<Option<Branch>, ServiceError> {
        Ok(sqlx::query_as::<_, Branch>(
            r#"
            UPDATE branches SET
                name = COALESCE($2, name),
                address = COALESCE($3, address),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.address)
        .bind(&update.phone)
        .bind(&update.email)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_branch(&self, id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM branches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "Branch still has events or posts"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_events(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Event>, ServiceError> {
        Ok(sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE organization_id = $1 AND ($2::BIGINT IS NULL OR branch_id = $2)
            ORDER BY start_date, start_time
            "#,
        )
        .bind(organization_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_event(&self, event: NewEvent) -> Result<Event, ServiceError> {
        Ok(sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (organization_id, branch_id, title, description, start_date,
                                start_time, end_date, end_time, location, category, created_by,
                                max_attendees, requires_rsvp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(event.organization_id)
        .bind(event.branch_id)
        .bind(event.title)
        .bind(event.description)
        .bind(event.start_date)
        .bind(event.start_time)
        .bind(event.end_date)
        .bind(event.end_time)
        .bind(event.location)
        .bind(event.category.as_str())
        .bind(event.created_by)
        .bind(event.max_attendees)
        .bind(event.requires_rsvp)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_event(
        &self,
        id: i64,
        update: &EventUpdate,
    ) -> Result<Option<Event>, ServiceError> {
        Ok(sqlx::query_as::<_, Event>(
            r#"
            UPDATE events SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                start_date = COALESCE($4, start_date),
                start_time = COALESCE($5, start_time),
                end_date = COALESCE($6, end_date),
                end_time = COALESCE($7, end_time),
                location = COALESCE($8, location),
                category = COALESCE($9, category),
                branch_id = COALESCE($10, branch_id),
                max_attendees = COALESCE($11, max_attendees),
                requires_rsvp = COALESCE($12, requires_rsvp),
                is_active = COALESCE($13, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.start_date)
        .bind(update.start_time)
        .bind(update.end_date)
        .bind(update.end_time)
        .bind(&update.location)
        .bind(update.category.map(|c| c.as_str()))
        .bind(update.branch_id)
        .bind(update.max_attendees)
        .bind(update.requires_rsvp)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_event(&self, id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_rsvp(
        &self,
        event_id: i64,
        user_id: &str,
        status: RsvpStatus,
    ) -> Result<Rsvp, ServiceError> {
        Ok(sqlx::query_as::<_, Rsvp>(
            r#"
            INSERT INTO event_rsvps (event_id, user_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id, user_id) DO UPDATE SET status = EXCLUDED.status
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, ServiceError> {
        Ok(sqlx::query_as::<_, Rsvp>(
            "SELECT * FROM event_rsvps WHERE event_id = $1 ORDER BY created_at",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_posts(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Post>, ServiceError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE organization_id = $1 AND ($2::BIGINT IS NULL OR branch_id = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(organization_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, ServiceError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (organization_id, branch_id, title, content, post_type, created_by,
                               scheduled_for, published_at, is_published, social_platforms,
                               image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, CASE WHEN $8 THEN NOW() END, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(post.organization_id)
        .bind(post.branch_id)
        .bind(post.title)
        .bind(post.content)
        .bind(post.post_type.as_str())
        .bind(post.created_by)
        .bind(post.scheduled_for)
        .bind(post.is_published)
        .bind(Json(post.social_platforms))
        .bind(post.image_url)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_post(
        &self,
        id: i64,
        update: &PostUpdate,
    ) -> Result<Option<Post>, ServiceError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts SET
                title = COALESCE($2, title),
                content = COALESCE($3, content),
                post_type = COALESCE($4, post_type),
                branch_id = COALESCE($5, branch_id),
                scheduled_for = COALESCE($6, scheduled_for),
                published_at = CASE WHEN $7 AND NOT is_published THEN NOW() ELSE published_at END,
                is_published = COALESCE($7, is_published),
                social_platforms = COALESCE($8, social_platforms),
                image_url = COALESCE($9, image_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.content)
        .bind(update.post_type.map(|t| t.as_str()))
        .bind(update.branch_id)
        .bind(update.scheduled_for)
        .bind(update.is_published)
        .bind(update.social_platforms.as_ref().map(Json))
        .bind(&update.image_url)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>, ServiceError> {
        Ok(sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_notification(&self, id: i64) -> Result<Option<Notification>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, ServiceError> {
        Ok(sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (organization_id, user_id, title, message, kind,
                                       related_id, related_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(notification.organization_id)
        .bind(notification.user_id)
        .bind(notification.title)
        .bind(notification.message)
        .bind(notification.kind.as_str())
        .bind(notification.related_id)
        .bind(notification.related_type)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_activity(&self, activity: NewActivity) -> Result<ActivityLog, ServiceError> {
        Ok(sqlx::query_as::<_, ActivityLog>(
            r#"
            INSERT INTO activity_logs (organization_id, user_id, action, entity_type, entity_id,
                                       details, branch_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(activity.organization_id)
        .bind(activity.user_id)
        .bind(activity.action)
        .bind(activity.entity_type)
        .bind(activity.entity_id)
        .bind(activity.details)
        .bind(activity.branch_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list_activity(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActivityLog>, ServiceError> {
        Ok(sqlx::query_as::<_, ActivityLog>(
            r#"
            SELECT * FROM activity_logs
            WHERE organization_id = $1 AND ($2::BIGINT IS NULL OR branch_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(organization_id)
        .bind(branch_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
