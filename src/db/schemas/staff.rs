//! Staff document schema
//!
//! Stores operator credentials, role, and the capability set derived from
//! that role at the last role change.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::{PermissionSet, Role};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for staff accounts
pub const STAFF_COLLECTION: &str = "staff";

/// Staff account stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StaffDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Login name, stored lowercase
    pub username: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Assigned role
    pub role: Role,

    /// Capability set derived from the role; recomputed on every role change
    #[serde(default)]
    pub permissions: PermissionSet,

    /// Token version for invalidation (increment to invalidate all tokens)
    #[serde(default)]
    pub token_version: i32,

    /// Whether the account is active
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl StaffDoc {
    /// Create a new staff document. The username is normalized to lowercase
    /// and the permission set is derived from the role.
    pub fn new(username: &str, password_hash: String, role: Role) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            username: username.trim().to_lowercase(),
            password_hash,
            role,
            permissions: PermissionSet::for_role(role),
            token_version: 1,
            is_active: true,
        }
    }

    /// Change the role, recomputing the stored capability set before save
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        self.permissions = PermissionSet::for_role(role);
    }
}

impl IntoIndexes for StaffDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "username": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("username_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for StaffDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_username_and_derives_permissions() {
        let staff = StaffDoc::new("  FrontGate ", "$argon2id$hash".into(), Role::Gate);
        assert_eq!(staff.username, "frontgate");
        assert!(staff.permissions.can_mark_attendance);
        assert!(!staff.permissions.can_distribute_food);
        assert!(staff.is_active);
        assert_eq!(staff.token_version, 1);
    }

    #[test]
    fn test_set_role_recomputes_permissions() {
        let mut staff = StaffDoc::new("ops", "hash".into(), Role::Food);
        assert!(!staff.permissions.can_manage_users);

        staff.set_role(Role::Admin);
        assert!(staff.permissions.can_manage_users);
        assert!(staff.permissions.can_mark_attendance);
    }
}
