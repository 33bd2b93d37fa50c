pub mod guard;
pub mod tenant;

pub use guard::{require_session, CurrentIdentity, OrgAdmins, RequireRoles, RoleSet};
pub use tenant::{assert_same_tenant, resolve_organization, TenantError, TenantOwned, TenantScope};
