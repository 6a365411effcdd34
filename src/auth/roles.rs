//! Staff roles and their fixed capability sets
//!
//! A role deterministically derives its permissions. The derived set is
//! stored on the staff document and recomputed whenever the role changes,
//! so a role change requires a fresh grant computation before save.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Staff roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Role {
    /// Full access to every operation
    Admin,
    /// Gate staff - marks attendance only
    Gate,
    /// Food staff - distributes entitlements only
    #[default]
    Food,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Gate => write!(f, "gate"),
            Role::Food => write!(f, "food"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "gate" => Ok(Role::Gate),
            "food" => Ok(Role::Food),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Capability set derived from a role.
///
/// Stored on the staff document, not derived at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    #[serde(default)]
    pub can_mark_attendance: bool,
    #[serde(default)]
    pub can_distribute_food: bool,
    #[serde(default)]
    pub can_undo_actions: bool,
    #[serde(default)]
    pub can_manage_users: bool,
    #[serde(default)]
    pub can_manage_settings: bool,
}

impl PermissionSet {
    /// Derive the capability set for a role
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Self {
                can_mark_attendance: true,
                can_distribute_food: true,
                can_undo_actions: true,
                can_manage_users: true,
                can_manage_settings: true,
            },
            Role::Gate => Self {
                can_mark_attendance: true,
                ..Self::default()
            },
            Role::Food => Self {
                can_distribute_food: true,
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_has_all_capabilities() {
        let perms = PermissionSet::for_role(Role::Admin);
        assert!(perms.can_mark_attendance);
        assert!(perms.can_distribute_food);
        assert!(perms.can_undo_actions);
        assert!(perms.can_manage_users);
        assert!(perms.can_manage_settings);
    }

    #[test]
    fn test_gate_only_marks_attendance() {
        let perms = PermissionSet::for_role(Role::Gate);
        assert!(perms.can_mark_attendance);
        assert!(!perms.can_distribute_food);
        assert!(!perms.can_undo_actions);
        assert!(!perms.can_manage_users);
        assert!(!perms.can_manage_settings);
    }

    #[test]
    fn test_food_only_distributes() {
        let perms = PermissionSet::for_role(Role::Food);
        assert!(!perms.can_mark_attendance);
        assert!(perms.can_distribute_food);
        assert!(!perms.can_undo_actions);
        assert!(!perms.can_manage_users);
        assert!(!perms.can_manage_settings);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("GATE".parse::<Role>().unwrap(), Role::Gate);
        assert_eq!("Food".parse::<Role>().unwrap(), Role::Food);
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_change_recomputes_grants() {
        // Promoting gate staff to admin must widen the stored set
        let before = PermissionSet::for_role(Role::Gate);
        let after = PermissionSet::for_role(Role::Admin);
        assert!(!before.can_manage_users);
        assert!(after.can_manage_users);
    }
}
