//! Group registry schema
//!
//! Named collections of participant references used to fan out distribution
//! and undo operations. Soft-deleted via metadata; deletion clears the
//! participant backlinks but keeps distribution history.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for groups
pub const GROUP_COLLECTION: &str = "groups";

/// A member reference inside a group
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GroupMember {
    /// Opaque participant id
    pub participant_id: String,
    /// Username of the staff member who added them
    pub added_by: String,
    pub added_at: DateTime,
}

/// Group-scoped distribution record, kept separate from participant-level
/// entitlement history so a later "undo this group's last distribution" can
/// find the most recent not-yet-undone record for an entitlement.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GroupDistribution {
    pub entitlement: String,
    pub count: i64,
    pub actor: String,
    pub at: DateTime,
    #[serde(default)]
    pub undone: bool,
}

/// Group document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GroupDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Display name, unique case-insensitively
    pub name: String,

    /// Lowercased name, carries the unique index
    pub name_lower: String,

    /// Display color
    #[serde(default)]
    pub color: String,

    /// Free-form group classification (team, bus, table, ...)
    #[serde(default)]
    pub group_type: String,

    /// Ordered member references
    #[serde(default)]
    pub members: Vec<GroupMember>,

    /// Group-scoped distribution history
    #[serde(default)]
    pub distributions: Vec<GroupDistribution>,
}

impl GroupDoc {
    pub fn new(name: &str, color: &str, group_type: &str) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name: name.trim().to_string(),
            name_lower: name.trim().to_lowercase(),
            color: color.to_string(),
            group_type: group_type.to_string(),
            members: Vec::new(),
            distributions: Vec::new(),
        }
    }

    /// Whether a participant is already a member
    pub fn has_member(&self, participant_id: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.participant_id == participant_id)
    }

    /// Most recent not-yet-undone distribution record for an entitlement,
    /// by index
    pub fn last_open_distribution(&self, entitlement: &str) -> Option<usize> {
        self.distributions
            .iter()
            .rposition(|d| !d.undone && d.entitlement.eq_ignore_ascii_case(entitlement))
    }
}

impl IntoIndexes for GroupDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "name_lower": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("group_name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for GroupDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entitlement: &str, undone: bool) -> GroupDistribution {
        GroupDistribution {
            entitlement: entitlement.to_string(),
            count: 1,
            actor: "ops".into(),
            at: DateTime::now(),
            undone,
        }
    }

    #[test]
    fn test_last_open_distribution_skips_undone() {
        let mut group = GroupDoc::new("Bus 4", "blue", "bus");
        group.distributions.push(record("Breakfast", false));
        group.distributions.push(record("Breakfast", true));

        // Most recent Breakfast record is undone; the one before is open
        assert_eq!(group.last_open_distribution("breakfast"), Some(0));

        group.distributions.push(record("Breakfast", false));
        assert_eq!(group.last_open_distribution("Breakfast"), Some(2));
    }

    #[test]
    fn test_last_open_distribution_none_when_all_undone() {
        let mut group = GroupDoc::new("Bus 4", "blue", "bus");
        group.distributions.push(record("Lunch", true));
        assert_eq!(group.last_open_distribution("Lunch"), None);
        assert_eq!(group.last_open_distribution("Beer"), None);
    }
}
