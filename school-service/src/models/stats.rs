use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use super::{Event, Identity, Post};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStats {
    pub total: usize,
    pub upcoming: usize,
    pub completed: usize,
}

impl EventStats {
    pub fn from_events(events: &[Event], today: NaiveDate) -> Self {
        let upcoming = events.iter().filter(|e| e.is_upcoming(today)).count();
        Self {
            total: events.len(),
            upcoming,
            completed: events.len() - upcoming,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialStats {
    pub total_posts: usize,
    pub recent_posts: usize,
    pub published_posts: usize,
}

impl SocialStats {
    /// Recent means created within the seven days before `now`.
    pub fn from_posts(posts: &[Post], now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(7);
        Self {
            total_posts: posts.len(),
            recent_posts: posts.iter().filter(|p| p.created_at >= cutoff).count(),
            published_posts: posts.iter().filter(|p| p.is_published).count(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

impl UserStats {
    pub fn from_identities(identities: &[Identity]) -> Self {
        let active = identities.iter().filter(|u| u.is_active).count();
        Self {
            total: identities.len(),
            active,
            inactive: identities.len() - active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsOverview {
    pub events: EventStats,
    pub social: SocialStats,
    pub users: UserStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_user_stats_counts_inactive() {
        let mut gone = Identity::new("b", "b@x.io", Role::Parent);
        gone.is_active = false;
        let stats = UserStats::from_identities(&[Identity::new("a", "a@x.io", Role::Teacher), gone]);
        assert_eq!(
            stats,
            UserStats {
                total: 2,
                active: 1,
                inactive: 1
            }
        );
    }

    #[test]
    fn test_empty_stats_are_zero() {
        assert_eq!(
            EventStats::from_events(&[], Utc::now().date_naive()),
            EventStats::default()
        );
    }
}
