//! In-process storage used for local development and tests.
//!
//! All state lives behind one mutex so every trait method is atomic with
//! respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::error::poisoned;
use super::{CredentialStore, SchoolStore, ServiceError, SessionStore, UserDirectory};
use crate::models::{
    ActivityLog, Branch, BranchUpdate, CredentialRecord, Event, EventUpdate, Identity,
    IdentityUpdate, NewActivity, NewBranch, NewEvent, NewNotification, NewPost, Notification,
    Organization, OrganizationUpdate, Post, PostUpdate, Rsvp, RsvpStatus, Session,
};

#[derive(Default)]
struct Inner {
    identities: HashMap<String, Identity>,
    sessions: HashMap<String, Session>,
    credentials: HashMap<String, CredentialRecord>,
    organizations: HashMap<i64, Organization>,
    branches: HashMap<i64, Branch>,
    events: HashMap<i64, Event>,
    rsvps: Vec<Rsvp>,
    posts: HashMap<i64, Post>,
    notifications: HashMap<i64, Notification>,
    activity: Vec<ActivityLog>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn email_taken(&self, email: &str, except_id: Option<&str>) -> bool {
        self.identities
            .values()
            .any(|i| i.email == email && Some(i.id.as_str()) != except_id)
    }

    /// Another identity's login credential already uses `email`.
    fn credential_taken(&self, email: &str, identity_id: &str) -> bool {
        self.credentials
            .get(email)
            .is_some_and(|c| c.identity_id != identity_id)
    }

    /// Re-key the identity's credential, if it has one, under its new email.
    fn move_credential(&mut self, identity_id: &str, email: &str) {
        let current = self
            .credentials
            .iter()
            .find(|(_, c)| c.identity_id == identity_id)
            .map(|(key, _)| key.clone());
        let Some(current) = current.filter(|key| key != email) else {
            return;
        };
        if let Some(mut record) = self.credentials.remove(&current) {
            record.email = email.to_string();
            record.updated_at = Utc::now();
            self.credentials.insert(record.email.clone(), record);
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ServiceError> {
        self.inner.lock().map_err(poisoned)
    }

    /// Number of live session records; used by tests to observe revocation.
    pub fn session_count(&self) -> usize {
        self.inner.lock().map(|i| i.sessions.len()).unwrap_or(0)
    }
}

fn in_branch(filter: Option<i64>, branch_id: i64) -> bool {
    filter.map_or(true, |b| b == branch_id)
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_identity(&self, id: &str) -> Result<Option<Identity>, ServiceError> {
        Ok(self.lock()?.identities.get(id).cloned())
    }

    async fn find_identity_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Identity>, ServiceError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn insert_identity(&self, identity: &Identity) -> Result<bool, ServiceError> {
        let mut inner = self.lock()?;
        if inner.identities.contains_key(&identity.id) || inner.email_taken(&identity.email, None)
        {
            return Ok(false);
        }
        inner
            .identities
            .insert(identity.id.clone(), identity.clone());
        Ok(true)
    }

    async fn update_identity(
        &self,
        id: &str,
        update: &IdentityUpdate,
    ) -> Result<Option<Identity>, ServiceError> {
        let mut inner = self.lock()?;
        if let Some(email) = &update.email {
            let email = email.to_lowercase();
            if inner.email_taken(&email, Some(id)) || inner.credential_taken(&email, id) {
                return Err(ServiceError::Conflict("Email already in use".to_string()));
            }
        }
        let Some(identity) = inner.identities.get_mut(id) else {
            return Ok(None);
        };
        identity.apply(update);
        let updated = identity.clone();
        if update.email.is_some() {
            inner.move_credential(id, &updated.email);
        }
        Ok(Some(updated))
    }

    async fn list_identities(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Identity>, ServiceError> {
        let mut found: Vec<Identity> = self
            .lock()?
            .identities
            .values()
            .filter(|i| i.organization_id == Some(organization_id))
            .filter(|i| branch_id.is_none() || i.branch_id == branch_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(found)
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), ServiceError> {
        if let Some(identity) = self.lock()?.identities.get_mut(id) {
            identity.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), ServiceError> {
        self.lock()?
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, ServiceError> {
        Ok(self.lock()?.sessions.get(id).cloned())
    }

    async fn delete_session(&self, id: &str) -> Result<(), ServiceError> {
        self.lock()?.sessions.remove(id);
        Ok(())
    }

    async fn delete_sessions_for_identity(
        &self,
        identity_id: &str,
    ) -> Result<u64, ServiceError> {
        let mut inner = self.lock()?;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.identity_id != identity_id);
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_credential(
        &self,
        email: &str,
    ) -> Result<Option<CredentialRecord>, ServiceError> {
        Ok(self
            .lock()?
            .credentials
            .get(&email.trim().to_lowercase())
            .cloned())
    }

    async fn insert_credential(&self, record: &CredentialRecord) -> Result<bool, ServiceError> {
        let mut inner = self.lock()?;
        if inner.credentials.contains_key(&record.email) {
            return Ok(false);
        }
        inner
            .credentials
            .insert(record.email.clone(), record.clone());
        Ok(true)
    }

    async fn register(
        &self,
        identity: &Identity,
        record: &CredentialRecord,
    ) -> Result<bool, ServiceError> {
        let mut inner = self.lock()?;
        if inner.identities.contains_key(&identity.id)
            || inner.email_taken(&identity.email, None)
            || inner.credentials.contains_key(&record.email)
        {
            return Ok(false);
        }
        inner
            .identities
            .insert(identity.id.clone(), identity.clone());
        inner
            .credentials
            .insert(record.email.clone(), record.clone());
        Ok(true)
    }
}

#[async_trait]
impl SchoolStore for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.lock().map(|_| ())
    }

    async fn get_organization(&self, id: i64) -> Result<Option<Organization>, ServiceError> {
        Ok(self.lock()?.organizations.get(&id).cloned())
    }

    async fn ensure_organization(
        &self,
        organization: &Organization,
    ) -> Result<Organization, ServiceError> {
        let mut inner = self.lock()?;
        // Keep generated ids clear of explicitly provisioned ones.
        inner.next_id = inner.next_id.max(organization.id);
        Ok(inner
            .organizations
            .entry(organization.id)
            .or_insert_with(|| organization.clone())
            .clone())
    }

    async fn update_organization(
        &self,
        id: i64,
        update: &OrganizationUpdate,
    ) -> Result<Option<Organization>, ServiceError> {
        Ok(self.lock()?.organizations.get_mut(&id).map(|org| {
            org.apply(update);
            org.clone()
        }))
    }

    async fn replace_settings(
        &self,
        id: i64,
        settings: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        Ok(self.lock()?.organizations.get_mut(&id).map(|org| {
            org.settings = settings;
            org.updated_at = Utc::now();
            org.settings.clone()
        }))
    }

    async fn list_branches(&self, organization_id: i64) -> Result<Vec<Branch>, ServiceError> {
        let mut found: Vec<Branch> = self
            .lock()?
            .branches
            .values()
            .filter(|b| b.organization_id == organization_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn get_branch(&self, id: i64) -> Result<Option<Branch>, ServiceError> {
        Ok(self.lock()?.branches.get(&id).cloned())
    }

    async fn create_branch(&self, branch: NewBranch) -> Result<Branch, ServiceError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let created = Branch {
            id: inner.next_id(),
            organization_id: branch.organization_id,
            name: branch.name,
            address: branch.address,
            phone: branch.phone,
            email: branch.email,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.branches.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_branch(
        &self,
        id: i64,
        update: &BranchUpdate,
    ) -> Result<Option<Branch>, ServiceError> {
        Ok(self.lock()?.branches.get_mut(&id).map(|branch| {
            branch.apply(update);
            branch.clone()
        }))
    }

    async fn delete_branch(&self, id: i64) -> Result<bool, ServiceError> {
        let mut inner = self.lock()?;
        let referenced = inner.events.values().any(|e| e.branch_id == id)
            || inner.posts.values().any(|p| p.branch_id == id);
        if referenced {
            return Err(ServiceError::Conflict(
                "Branch still has events or posts".to_string(),
            ));
        }
        for identity in inner.identities.values_mut() {
            if identity.branch_id == Some(id) {
                identity.branch_id = None;
            }
        }
        Ok(inner.branches.remove(&id).is_some())
    }

    async fn list_events(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Event>, ServiceError> {
        let mut found: Vec<Event> = self
            .lock()?
            .events
            .values()
            .filter(|e| e.organization_id == organization_id && in_branch(branch_id, e.branch_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.start_date, a.start_time).cmp(&(b.start_date, b.start_time)));
        Ok(found)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>, ServiceError> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    async fn create_event(&self, event: NewEvent) -> Result<Event, ServiceError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let created = Event {
            id: inner.next_id(),
            organization_id: event.organization_id,
            branch_id: event.branch_id,
            title: event.title,
            description: event.description,
            start_date: event.start_date,
            start_time: event.start_time,
            end_date: event.end_date,
            end_time: event.end_time,
            location: event.location,
            category: event.category,
            created_by: event.created_by,
            max_attendees: event.max_attendees,
            requires_rsvp: event.requires_rsvp,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.events.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        id: i64,
        update: &EventUpdate,
    ) -> Result<Option<Event>, ServiceError> {
        Ok(self.lock()?.events.get_mut(&id).map(|event| {
            event.apply(update);
            event.clone()
        }))
    }

    async fn delete_event(&self, id: i64) -> Result<bool, ServiceError> {
        let mut inner = self.lock()?;
        inner.rsvps.retain(|r| r.event_id != id);
        Ok(inner.events.remove(&id).is_some())
    }

    async fn upsert_rsvp(
        &self,
        event_id: i64,
        user_id: &str,
        status: RsvpStatus,
    ) -> Result<Rsvp, ServiceError> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner
            .rsvps
            .iter_mut()
            .find(|r| r.event_id == event_id && r.user_id == user_id)
        {
            existing.status = status;
            return Ok(existing.clone());
        }
        let rsvp = Rsvp {
            id: inner.next_id(),
            event_id,
            user_id: user_id.to_string(),
            status,
            created_at: Utc::now(),
        };
        inner.rsvps.push(rsvp.clone());
        Ok(rsvp)
    }

    async fn list_rsvps(&self, event_id: i64) -> Result<Vec<Rsvp>, ServiceError> {
        Ok(self
            .lock()?
            .rsvps
            .iter()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn list_posts(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
    ) -> Result<Vec<Post>, ServiceError> {
        let mut found: Vec<Post> = self
            .lock()?
            .posts
            .values()
            .filter(|p| p.organization_id == organization_id && in_branch(branch_id, p.branch_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, ServiceError> {
        Ok(self.lock()?.posts.get(&id).cloned())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, ServiceError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let created = Post {
            id: inner.next_id(),
            organization_id: post.organization_id,
            branch_id: post.branch_id,
            title: post.title,
            content: post.content,
            post_type: post.post_type,
            created_by: post.created_by,
            scheduled_for: post.scheduled_for,
            published_at: post.is_published.then_some(now),
            is_published: post.is_published,
            social_platforms: post.social_platforms,
            image_url: post.image_url,
            created_at: now,
            updated_at: now,
        };
        inner.posts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_post(
        &self,
        id: i64,
        update: &PostUpdate,
    ) -> Result<Option<Post>, ServiceError> {
        Ok(self.lock()?.posts.get_mut(&id).map(|post| {
            post.apply(update);
            post.clone()
        }))
    }

    async fn delete_post(&self, id: i64) -> Result<bool, ServiceError> {
        Ok(self.lock()?.posts.remove(&id).is_some())
    }

    async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>, ServiceError> {
        let mut found: Vec<Notification> = self
            .lock()?
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn get_notification(&self, id: i64) -> Result<Option<Notification>, ServiceError> {
        Ok(self.lock()?.notifications.get(&id).cloned())
    }

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, ServiceError> {
        let mut inner = self.lock()?;
        let created = Notification {
            id: inner.next_id(),
            organization_id: notification.organization_id,
            user_id: notification.user_id,
            title: notification.title,
            message: notification.message,
            kind: notification.kind,
            is_read: false,
            related_id: notification.related_id,
            related_type: notification.related_type,
            created_at: Utc::now(),
        };
        inner.notifications.insert(created.id, created.clone());
        Ok(created)
    }

    async fn mark_notification_read(&self, id: i64) -> Result<bool, ServiceError> {
        Ok(match self.lock()?.notifications.get_mut(&id) {
            Some(n) => {
                n.is_read = true;
                true
            }
            None => false,
        })
    }

    async fn record_activity(&self, activity: NewActivity) -> Result<ActivityLog, ServiceError> {
        let mut inner = self.lock()?;
        let log = ActivityLog {
            id: inner.next_id(),
            organization_id: activity.organization_id,
            user_id: activity.user_id,
            action: activity.action.to_string(),
            entity_type: activity.entity_type.to_string(),
            entity_id: activity.entity_id,
            details: activity.details,
            branch_id: activity.branch_id,
            created_at: Utc::now(),
        };
        inner.activity.push(log.clone());
        Ok(log)
    }

    async fn list_activity(
        &self,
        organization_id: i64,
        branch_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ActivityLog>, ServiceError> {
        let inner = self.lock()?;
        Ok(inner
            .activity
            .iter()
            .rev()
            .filter(|a| a.organization_id == organization_id)
            .filter(|a| branch_id.is_none() || a.branch_id == branch_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_identity_rejects_duplicate_email() {
        let store = MemoryStore::new();
        assert!(store
            .insert_identity(&Identity::new("a", "same@school.org", Role::Teacher))
            .await
            .unwrap());
        assert!(!store
            .insert_identity(&Identity::new("b", "SAME@school.org", Role::Parent))
            .await
            .unwrap());
        assert!(store.get_identity("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_sessions_for_identity_only_touches_that_identity() {
        let store = MemoryStore::new();
        for (id, owner) in [("s1", "u1"), ("s2", "u1"), ("s3", "u2")] {
            store
                .insert_session(&Session::new(id.into(), owner.into(), Duration::hours(1)))
                .await
                .unwrap();
        }

        assert_eq!(store.delete_sessions_for_identity("u1").await.unwrap(), 2);
        assert!(store.get_session("s3").await.unwrap().is_some());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_credentials_are_unique_by_email() {
        let store = MemoryStore::new();
        let record = CredentialRecord::new("u1".into(), "Admin@X.org", "h".into());
        assert!(store.insert_credential(&record).await.unwrap());
        assert!(!store.insert_credential(&record).await.unwrap());
        assert!(store.find_credential("admin@x.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_writes_both_records_or_neither() {
        let store = MemoryStore::new();
        let taken = CredentialRecord::new("someone".into(), "owner@x.org", "h".into());
        store.insert_credential(&taken).await.unwrap();

        let identity = Identity::new("u1", "owner@x.org", Role::Owner);
        let record = CredentialRecord::new("u1".into(), "owner@x.org", "h".into());
        assert!(!store.register(&identity, &record).await.unwrap());
        assert!(store.get_identity("u1").await.unwrap().is_none());

        let identity = Identity::new("u1", "fresh@x.org", Role::Owner);
        let record = CredentialRecord::new("u1".into(), "fresh@x.org", "h".into());
        assert!(store.register(&identity, &record).await.unwrap());
        assert!(store.get_identity("u1").await.unwrap().is_some());
        assert!(store.find_credential("fresh@x.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_email_change_moves_credential() {
        let store = MemoryStore::new();
        for (id, email) in [("u1", "one@x.org"), ("u2", "two@x.org")] {
            store
                .insert_identity(&Identity::new(id, email, Role::Admin))
                .await
                .unwrap();
            store
                .insert_credential(&CredentialRecord::new(id.into(), email, "h".into()))
                .await
                .unwrap();
        }

        let update = IdentityUpdate {
            email: Some("New@X.org".to_string()),
            ..Default::default()
        };
        store.update_identity("u1", &update).await.unwrap().unwrap();
        assert!(store.find_credential("one@x.org").await.unwrap().is_none());
        let moved = store.find_credential("new@x.org").await.unwrap().unwrap();
        assert_eq!(moved.identity_id, "u1");

        let clash = IdentityUpdate {
            email: Some("two@x.org".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_identity("u1", &clash).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(store.find_credential("new@x.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rsvp_upsert_keeps_single_row() {
        let store = MemoryStore::new();
        let first = store.upsert_rsvp(5, "u1", RsvpStatus::Maybe).await.unwrap();
        let second = store
            .upsert_rsvp(5, "u1", RsvpStatus::Attending)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let all = store.list_rsvps(5).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, RsvpStatus::Attending);
    }

    #[tokio::test]
    async fn test_generated_ids_skip_provisioned_organization() {
        let store = MemoryStore::new();
        store
            .ensure_organization(&Organization::new(10, "Provisioned"))
            .await
            .unwrap();
        let branch = store
            .create_branch(NewBranch {
                organization_id: 10,
                name: "Main".into(),
                address: None,
                phone: None,
                email: None,
            })
            .await
            .unwrap();
        assert!(branch.id > 10);
    }
}
