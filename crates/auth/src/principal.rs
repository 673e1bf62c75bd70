use stockledger_core::UserId;

use crate::{Permission, Role};

/// A resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve effective permissions from roles.
    pub fn from_roles(user_id: UserId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = roles.iter().flat_map(Role::permissions).collect();
        permissions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        permissions.dedup();
        Self {
            user_id,
            roles,
            permissions,
        }
    }
}
