//! Participant document schema - the ledger's unit of persistence
//!
//! One document per participant, carrying the attendance flag, the embedded
//! entitlement instances, group backlinks, and append-only history logs.
//! Participants are created at registration and never physically deleted.
//!
//! Every mutation is a read-modify-write of the whole document; two
//! concurrent writes to the same participant race last-writer-wins.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for participants
pub const PARTICIPANT_COLLECTION: &str = "participants";

/// One entitlement attached to one participant.
///
/// Name, category, countable flag, and cap are denormalized from the
/// originating template at attach time, so later template edits do not
/// silently change what a participant already holds.
///
/// Invariant: `given == given_at.len() == given_by.len()` at all times.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EntitlementInstance {
    /// Originating template
    pub template_id: Option<ObjectId>,

    /// Denormalized template name
    pub name: String,

    /// Denormalized category
    pub category: String,

    /// Denormalized countable flag
    pub countable: bool,

    /// Cap denormalized at attach time; setting overrides may supersede it
    /// at distribution time
    pub max_count: i64,

    /// Units granted so far. For non-countable entitlements this is 0 or
    /// the cap, never in between.
    #[serde(default)]
    pub given: i64,

    /// One entry per unit granted, appended in grant order
    #[serde(default)]
    pub given_at: Vec<DateTime>,

    /// Grantor username per unit, parallel to given_at
    #[serde(default)]
    pub given_by: Vec<String>,

    /// Last undo bookkeeping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undone_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<DateTime>,
    #[serde(default)]
    pub last_undone_count: i64,
}

impl EntitlementInstance {
    /// Attach-time constructor; `max_count` is the effective cap resolved at
    /// attach time.
    pub fn new(
        template_id: Option<ObjectId>,
        name: &str,
        category: &str,
        countable: bool,
        max_count: i64,
    ) -> Self {
        Self {
            template_id,
            name: name.to_string(),
            category: category.to_string(),
            countable,
            max_count,
            given: 0,
            given_at: Vec::new(),
            given_by: Vec::new(),
            undone_by: None,
            undone_at: None,
            last_undone_count: 0,
        }
    }

    /// Ledger consistency check: given matches both parallel lists
    pub fn is_consistent(&self) -> bool {
        self.given >= 0
            && self.given as usize == self.given_at.len()
            && self.given as usize == self.given_by.len()
    }
}

/// Participant-level entitlement history actions
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementAction {
    Distributed,
    Undone,
}

/// Append-only record of a grant or undo
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EntitlementEvent {
    pub entitlement: String,
    pub action: EntitlementAction,
    pub count: i64,
    pub actor: String,
    pub at: DateTime,
}

/// Append-only record of a player/participant reclassification
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TypeChange {
    pub from_player: bool,
    pub to_player: bool,
    pub changed_by: String,
    pub at: DateTime,
}

/// Participant document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ParticipantDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Opaque unique identifier carried by the scannable badge
    pub participant_id: String,

    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,

    /// Players and plain participants can have different default
    /// entitlements
    #[serde(default)]
    pub is_player: bool,

    #[serde(default)]
    pub food_preference: Option<String>,

    /// Presence flag set at the gate. Absence blocks new grants but undoing
    /// presence does not retract grants already made.
    #[serde(default)]
    pub is_present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_by: Option<String>,

    /// Entitlement instances, one per template name
    #[serde(default)]
    pub entitlements: Vec<EntitlementInstance>,

    /// Names of groups this participant belongs to
    #[serde(default)]
    pub groups: Vec<String>,

    /// Append-only grant/undo log
    #[serde(default)]
    pub entitlement_history: Vec<EntitlementEvent>,

    /// Append-only reclassification log
    #[serde(default)]
    pub type_history: Vec<TypeChange>,
}

impl ParticipantDoc {
    pub fn new(participant_id: &str, name: &str, email: &str, phone: &str, is_player: bool) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            participant_id: participant_id.to_string(),
            name: name.trim().to_string(),
            email: email.trim().to_lowercase(),
            phone: phone.trim().to_string(),
            is_player,
            food_preference: None,
            is_present: false,
            present_at: None,
            marked_by: None,
            entitlements: Vec::new(),
            groups: Vec::new(),
            entitlement_history: Vec::new(),
            type_history: Vec::new(),
        }
    }

    /// Case-insensitive instance lookup
    pub fn entitlement(&self, name: &str) -> Option<&EntitlementInstance> {
        self.entitlements
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive mutable instance lookup
    pub fn entitlement_mut(&mut self, name: &str) -> Option<&mut EntitlementInstance> {
        self.entitlements
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    pub fn has_entitlement(&self, name: &str) -> bool {
        self.entitlement(name).is_some()
    }

    /// Append a grant/undo record to the participant-level history
    pub fn record_event(&mut self, entitlement: &str, action: EntitlementAction, count: i64, actor: &str) {
        self.entitlement_history.push(EntitlementEvent {
            entitlement: entitlement.to_string(),
            action,
            count,
            actor: actor.to_string(),
            at: DateTime::now(),
        });
    }
}

impl IntoIndexes for ParticipantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on the badge identifier
            (
                doc! { "participant_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("participant_id_unique".to_string())
                        .build(),
                ),
            ),
            // Index on email for lookups
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .name("email_index".to_string())
                        .build(),
                ),
            ),
            // Index on group backlinks for membership queries
            (
                doc! { "groups": 1 },
                Some(
                    IndexOptions::builder()
                        .name("groups_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ParticipantDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entitlement_lookup_is_case_insensitive() {
        let mut p = ParticipantDoc::new("id-1", "Dana", "dana@example.com", "", false);
        p.entitlements
            .push(EntitlementInstance::new(None, "Beer", "beverage", true, 2));

        assert!(p.has_entitlement("beer"));
        assert!(p.has_entitlement("BEER"));
        assert!(!p.has_entitlement("wine"));
    }

    #[test]
    fn test_new_instance_is_consistent() {
        let inst = EntitlementInstance::new(None, "Lunch", "meal", false, 1);
        assert!(inst.is_consistent());
        assert_eq!(inst.given, 0);
        assert!(inst.given_at.is_empty());
        assert!(inst.given_by.is_empty());
    }

    #[test]
    fn test_email_normalized_on_create() {
        let p = ParticipantDoc::new("id-2", " Sam ", " Sam@Example.COM ", " 555 ", true);
        assert_eq!(p.email, "sam@example.com");
        assert_eq!(p.name, "Sam");
        assert_eq!(p.phone, "555");
        assert!(p.is_player);
        assert!(!p.is_present);
    }
}
