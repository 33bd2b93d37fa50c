//! Domain models for the school platform.
//!
//! Every tenant-scoped model carries exactly one `organization_id`, assigned at
//! creation and never part of an update payload.

/// Closed string enums stored as TEXT columns and exchanged as lowercase JSON strings.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("Invalid {}: {}", stringify!($name), other)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

mod activity;
mod branch;
mod event;
mod identity;
mod notification;
mod organization;
mod post;
mod session;
mod stats;

pub use activity::{ActivityLog, NewActivity};
pub use branch::{Branch, BranchUpdate, NewBranch};
pub use event::{Event, EventCategory, EventUpdate, NewEvent, Rsvp, RsvpStatus};
pub use identity::{Identity, IdentityUpdate, Language, Role};
pub use notification::{NewNotification, Notification, NotificationKind};
pub use organization::{Organization, OrganizationUpdate};
pub use post::{NewPost, Post, PostType, PostUpdate};
pub use session::{CredentialRecord, Session};
pub use stats::{AnalyticsOverview, EventStats, SocialStats, UserStats};
