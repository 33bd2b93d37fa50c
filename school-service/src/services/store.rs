//! Storage contracts. Each has an in-memory and a PostgreSQL implementation.
//!
//! Every method is a single atomic operation; callers never hold a transaction
//! across awaits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ServiceError;
use crate::models::{
    ActivityLog, Branch, BranchUpdate, CredentialRecord, Event, EventUpdate, Identity,
    IdentityUpdate, NewActivity, NewBranch, NewEvent, NewNotification, NewPost, Notification,
    Organization, OrganizationUpdate, Post, PostUpdate, Rsvp, RsvpStatus, Session,
};

/// Identity records, looked up by opaque id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, ServiceError>;

    async fn find_identity_by_email(&self, email: &str)
        -> Result<Option<Identity>, ServiceError>;

    /// Insert unless the id or email is already taken. Returns whether a row was written.
    async fn insert_identity(&self, identity: &Identity) -> Result<bool, ServiceError>;

    /// An email change also re-keys the identity's credential. Either record
    /// clashing with the new email is a conflict and nothing is written.
    async fn update_identity(
        &self,
        id: &str,
        update: &IdentityUpdate,
    ) -> Result<Option<Identity>, ServiceError>;

    async fn list_identities(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Identity>, ServiceError>;

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), ServiceError>;
}

/// Server-side sessions keyed by the digest of the client token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, ServiceError>;

    async fn delete_session(&self, id: &str) -> Result<(), ServiceError>;

    /// Revoke every session of an identity. Returns the number removed.
    async fn delete_sessions_for_identity(&self, identity_id: &str)
        -> Result<u64, ServiceError>;
}

/// Email/password credentials, unique by lower-cased email.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_credential(&self, email: &str)
        -> Result<Option<CredentialRecord>, ServiceError>;

    /// Insert unless a credential for the email exists. Returns whether a row was written.
    async fn insert_credential(&self, record: &CredentialRecord) -> Result<bool, ServiceError>;

    /// Write a new identity together with its credential, or neither. Returns
    /// false when the id or email is already taken by either record.
    async fn register(
        &self,
        identity: &Identity,
        record: &CredentialRecord,
    ) -> Result<bool, ServiceError>;
}

/// Tenant data behind the resource routes. Lookups by id are not tenant-filtered;
/// callers validate ownership with the tenant helper.
#[async_trait]
pub trait SchoolStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    async fn get_organization(&self, id: i64) -> Result<Option<Organization>, ServiceError>;

    /// Insert the organization if no row with its id exists; returns the stored row.
    async fn ensure_organization(
        &self,
        organization: &Organization,
    ) -> Result<Organization, ServiceError>;

    async fn update_organization(
        &self,
        id: i64,
        update: &OrganizationUpdate,
    ) -> Result<Option<Organization>, ServiceError>;

    async fn replace_settings(
        &self,
        id: i64,
        settings: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ServiceError>;

    async fn list_branches(&self, organization_id: i64) -> Result<Vec<Branch>, ServiceError>;

    async fn get_branch(&self, id: i64) -> Result<Option<Branch>, ServiceError>;

    async fn create_branch(&self, branch: NewBranch) -> Result<Branch, ServiceError>;

    async fn update_branch(
        &self,
        id: i64,
        update: &BranchUpdate,
    ) -> Result<Option<Branch>, ServiceError>;

    async fn delete_branch(&self, id: i64) -> Result<bool, ServiceError>;

    async fn list_events(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Event>, ServiceError>;

    async fn get_event(&self, id: i64) -> Result<Option<Event>, ServiceError>;

    async fn create_event(&self, event: NewEvent) -> Result<Event, ServiceError>;

    async fn update_event(
        &self,
        id: i64,
        update: &EventUpdate,
    ) -> Result<Option<Event>, ServiceError>;

    async fn delete_event(&self, id: i64) -> Result<bool, ServiceError>;

    async fn upsert_rsvp(
        &self,
        event_id: i64,
        user_id: &str,
        status: RsvpStatus,
    ) -> Result<Rsvp, ServiceError>;

    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, ServiceError>;

    async fn list_posts(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Post>, ServiceError>;

    async fn get_post(&self, id: i64) -> Result<Option<Post>, ServiceError>;

    async fn create_post(&self, post: NewPost) -> Result<Post, ServiceError>;

    async fn update_post(&self, id: i64, update: &PostUpdate)
        -> Result<Option<Post>, ServiceError>;

    async fn delete_post(&self, id: i64) -> Result<bool, ServiceError>;

    async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>, ServiceError>;

    async fn get_notification(&self, id: i64) -> Result<Option<Notification>, ServiceError>;

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, ServiceError>;

    async fn mark_notification_read(&self, id: i64) -> Result<bool, ServiceError>;

    async fn record_activity(&self, activity: NewActivity) -> Result<ActivityLog, ServiceError>;

    async fn list_activity(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActivityLog>, ServiceError>;
}
