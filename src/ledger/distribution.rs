//! The distribution/undo state machine
//!
//! Grants and reverses entitlement units on a participant document, keeping
//! the ledger invariant `given == given_at.len() == given_by.len()` and
//! appending to the participant-level history on every success.
//!
//! These functions mutate the in-memory document only; persisting the
//! result is the caller's read-modify-write. Two concurrent cycles against
//! the same participant race last-writer-wins at the store.

use bson::DateTime;
use std::fmt;

use crate::db::schemas::{EntitlementAction, ParticipantDoc};
use crate::ledger::caps::{effective_cap, CapOverrides};

/// Business-rule rejection of a distribution or undo. These are expected
/// outcomes, not errors; bulk operations collect their rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Participant is not marked present
    NotPresent { participant: String },
    /// No instance with that name on the participant
    UnknownEntitlement { participant: String, entitlement: String },
    /// Countable grant would exceed the effective cap
    CapExceeded {
        participant: String,
        entitlement: String,
        given: i64,
        requested: i64,
        cap: i64,
    },
    /// Non-countable entitlement already granted
    AlreadyGiven { participant: String, entitlement: String },
    /// Undo requested but nothing has been given
    NothingToUndo { participant: String, entitlement: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotPresent { participant } => {
                write!(f, "{}: not checked in", participant)
            }
            Rejection::UnknownEntitlement { participant, entitlement } => {
                write!(f, "{}: no entitlement '{}'", participant, entitlement)
            }
            Rejection::CapExceeded { participant, entitlement, given, requested, cap } => {
                write!(
                    f,
                    "{}: {} of {} already given, {} more would exceed the limit of {}",
                    participant, given, entitlement, requested, cap
                )
            }
            Rejection::AlreadyGiven { participant, entitlement } => {
                write!(f, "{}: '{}' already given", participant, entitlement)
            }
            Rejection::NothingToUndo { participant, entitlement } => {
                write!(f, "{}: nothing to undo for '{}'", participant, entitlement)
            }
        }
    }
}

/// Successful grant summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Granted {
    pub entitlement: String,
    pub count: i64,
    pub given: i64,
    pub cap: i64,
}

/// Successful undo summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Undone {
    pub entitlement: String,
    pub count: i64,
    pub given: i64,
}

/// Grant `count` units of the named entitlement to a present participant.
///
/// Preconditions are checked in order, each a distinct failure: the
/// participant must be present, and the named instance must exist
/// (case-insensitive). The caller has already established that the
/// participant document itself exists.
///
/// Countable instances accept the grant iff `given + count` stays within
/// the effective cap; `count` identical (timestamp, actor) pairs are then
/// appended. Non-countable instances accept only from `given == 0` and
/// jump straight to the cap with a single pair; a repeat is rejected as
/// already given, never merged.
pub fn distribute(
    participant: &mut ParticipantDoc,
    entitlement: &str,
    count: i64,
    actor: &str,
    overrides: &CapOverrides,
) -> Result<Granted, Rejection> {
    let who = participant.participant_id.clone();

    if !participant.is_present {
        return Err(Rejection::NotPresent { participant: who });
    }

    let override_value = overrides.for_entitlement(entitlement);

    let instance = match participant.entitlement_mut(entitlement) {
        Some(i) => i,
        None => {
            return Err(Rejection::UnknownEntitlement {
                participant: who,
                entitlement: entitlement.to_string(),
            })
        }
    };

    let cap = effective_cap(override_value, instance.max_count);
    let name = instance.name.clone();
    let now = DateTime::now();

    let granted = if instance.countable {
        if instance.given + count > cap {
            return Err(Rejection::CapExceeded {
                participant: who,
                entitlement: name,
                given: instance.given,
                requested: count,
                cap,
            });
        }
        instance.given += count;
        for _ in 0..count {
            instance.given_at.push(now);
            instance.given_by.push(actor.to_string());
        }
        Granted {
            entitlement: instance.name.clone(),
            count,
            given: instance.given,
            cap,
        }
    } else {
        // Boolean-like: one action grants the full cap
        if instance.given >= cap {
            return Err(Rejection::AlreadyGiven {
                participant: who,
                entitlement: name,
            });
        }
        instance.given = cap;
        instance.given_at.push(now);
        instance.given_by.push(actor.to_string());
        Granted {
            entitlement: instance.name.clone(),
            count: 1,
            given: instance.given,
            cap,
        }
    };

    participant.record_event(
        &granted.entitlement,
        EntitlementAction::Distributed,
        granted.count,
        actor,
    );

    Ok(granted)
}

/// Reverse the most recent grant(s) of the named entitlement.
///
/// Undoing more than was given clamps silently. Countable instances lose
/// the last `undo_count` (timestamp, actor) pairs from the tails, the
/// mirror image of the append in [`distribute`]. Non-countable instances
/// reset fully regardless of the requested count. Presence is not required;
/// staff may retract a grant even after attendance was reverted.
pub fn undo(
    participant: &mut ParticipantDoc,
    entitlement: &str,
    count: i64,
    actor: &str,
) -> Result<Undone, Rejection> {
    let who = participant.participant_id.clone();

    let instance = match participant.entitlement_mut(entitlement) {
        Some(i) => i,
        None => {
            return Err(Rejection::UnknownEntitlement {
                participant: who,
                entitlement: entitlement.to_string(),
            })
        }
    };

    if instance.given <= 0 {
        return Err(Rejection::NothingToUndo {
            participant: who,
            entitlement: instance.name.clone(),
        });
    }

    let now = DateTime::now();

    let undone_count = if instance.countable {
        let undone_count = count.min(instance.given);
        instance.given -= undone_count;
        let keep = instance.given as usize;
        instance.given_at.truncate(keep);
        instance.given_by.truncate(keep);
        undone_count
    } else {
        // At most one unit ever exists; reset fully
        let undone_count = instance.given;
        instance.given = 0;
        instance.given_at.clear();
        instance.given_by.clear();
        undone_count
    };

    instance.undone_by = Some(actor.to_string());
    instance.undone_at = Some(now);
    instance.last_undone_count = undone_count;

    let name = instance.name.clone();
    let given = instance.given;

    participant.record_event(&name, EntitlementAction::Undone, undone_count, actor);

    Ok(Undone {
        entitlement: name,
        count: undone_count,
        given,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{EntitlementAction, EntitlementInstance};

    fn participant_with(name: &str, countable: bool, cap: i64) -> ParticipantDoc {
        let mut p = ParticipantDoc::new("p-1", "Dana", "dana@example.com", "", false);
        p.is_present = true;
        p.entitlements.push(EntitlementInstance::new(
            None,
            name,
            if countable { "beverage" } else { "meal" },
            countable,
            cap,
        ));
        p
    }

    #[test]
    fn test_countable_distribute_within_cap() {
        // Countable "Beer" cap=2, given=0: one unit, then two more rejected
        let mut p = participant_with("Beer", true, 2);

        let granted = distribute(&mut p, "Beer", 1, "bar-staff", &CapOverrides::new()).unwrap();
        assert_eq!(granted.given, 1);

        let inst = p.entitlement("Beer").unwrap();
        assert_eq!(inst.given, 1);
        assert_eq!(inst.given_at.len(), 1);
        assert_eq!(inst.given_by, vec!["bar-staff".to_string()]);
        assert!(inst.is_consistent());

        let event = p.entitlement_history.last().unwrap();
        assert_eq!(event.action, EntitlementAction::Distributed);
        assert_eq!(event.count, 1);
        assert_eq!(event.actor, "bar-staff");

        // 1 + 2 > 2: rejected, no state change
        let err = distribute(&mut p, "Beer", 2, "bar-staff", &CapOverrides::new()).unwrap_err();
        assert!(matches!(err, Rejection::CapExceeded { given: 1, requested: 2, cap: 2, .. }));
        assert_eq!(p.entitlement("Beer").unwrap().given, 1);
        assert_eq!(p.entitlement_history.len(), 1);
    }

    #[test]
    fn test_non_countable_distribute_once() {
        // Non-countable "Lunch" cap=1: second call rejected as already given
        let mut p = participant_with("Lunch", false, 1);

        let granted = distribute(&mut p, "Lunch", 1, "kitchen", &CapOverrides::new()).unwrap();
        assert_eq!(granted.given, 1);
        assert_eq!(p.entitlement("Lunch").unwrap().given_at.len(), 1);

        let err = distribute(&mut p, "Lunch", 1, "kitchen", &CapOverrides::new()).unwrap_err();
        assert!(matches!(err, Rejection::AlreadyGiven { .. }));
        assert_eq!(p.entitlement("Lunch").unwrap().given, 1);
    }

    #[test]
    fn test_non_countable_never_partial() {
        // Boolean entitlement with cap 1 jumps straight to the cap
        let mut p = participant_with("Lunch", false, 1);
        distribute(&mut p, "Lunch", 1, "kitchen", &CapOverrides::new()).unwrap();

        let inst = p.entitlement("Lunch").unwrap();
        assert!(inst.given == 0 || inst.given == inst.max_count);
        assert_eq!(inst.given, 1);
    }

    #[test]
    fn test_distribute_rejected_when_absent() {
        let mut p = participant_with("Beer", true, 2);
        p.is_present = false;

        let err = distribute(&mut p, "Beer", 1, "bar-staff", &CapOverrides::new()).unwrap_err();
        assert!(matches!(err, Rejection::NotPresent { .. }));
        assert_eq!(p.entitlement("Beer").unwrap().given, 0);
        assert!(p.entitlement_history.is_empty());
    }

    #[test]
    fn test_distribute_unknown_entitlement() {
        let mut p = participant_with("Beer", true, 2);
        let err = distribute(&mut p, "Wine", 1, "bar-staff", &CapOverrides::new()).unwrap_err();
        assert!(matches!(err, Rejection::UnknownEntitlement { .. }));
    }

    #[test]
    fn test_setting_override_raises_cap() {
        // beerLimit=3 beats the stored cap of 2
        let mut p = participant_with("Beer", true, 2);
        let mut overrides = CapOverrides::new();
        overrides.insert("beerLimit", 3);

        distribute(&mut p, "Beer", 3, "bar-staff", &overrides).unwrap();
        assert_eq!(p.entitlement("Beer").unwrap().given, 3);

        let err = distribute(&mut p, "Beer", 1, "bar-staff", &overrides).unwrap_err();
        assert!(matches!(err, Rejection::CapExceeded { cap: 3, .. }));
    }

    #[test]
    fn test_undo_truncates_tail_in_reverse_order() {
        // Distribute twice by different actors, undo one: the most recent
        // grantor's entry goes first
        let mut p = participant_with("Beer", true, 3);
        distribute(&mut p, "Beer", 1, "alice", &CapOverrides::new()).unwrap();
        distribute(&mut p, "Beer", 1, "bob", &CapOverrides::new()).unwrap();

        let undone = undo(&mut p, "Beer", 1, "carol").unwrap();
        assert_eq!(undone.count, 1);
        assert_eq!(undone.given, 1);

        let inst = p.entitlement("Beer").unwrap();
        assert_eq!(inst.given_by, vec!["alice".to_string()]);
        assert!(inst.is_consistent());
        assert_eq!(inst.undone_by.as_deref(), Some("carol"));
        assert_eq!(inst.last_undone_count, 1);
    }

    #[test]
    fn test_full_undo_restores_pre_distribution_state() {
        let mut p = participant_with("Beer", true, 3);
        distribute(&mut p, "Beer", 2, "alice", &CapOverrides::new()).unwrap();
        undo(&mut p, "Beer", 2, "alice").unwrap();

        let inst = p.entitlement("Beer").unwrap();
        assert_eq!(inst.given, 0);
        assert!(inst.given_at.is_empty());
        assert!(inst.given_by.is_empty());
        assert!(inst.is_consistent());

        // Both actions are on the history log
        assert_eq!(p.entitlement_history.len(), 2);
        assert_eq!(p.entitlement_history[1].action, EntitlementAction::Undone);
        assert_eq!(p.entitlement_history[1].count, 2);
    }

    #[test]
    fn test_undo_non_countable_resets_fully() {
        // Lunch given=1: undo count=1 clears everything and records the undo
        let mut p = participant_with("Lunch", false, 1);
        distribute(&mut p, "Lunch", 1, "kitchen", &CapOverrides::new()).unwrap();

        let undone = undo(&mut p, "Lunch", 1, "kitchen").unwrap();
        assert_eq!(undone.count, 1);

        let inst = p.entitlement("Lunch").unwrap();
        assert_eq!(inst.given, 0);
        assert!(inst.given_at.is_empty());
        assert!(inst.given_by.is_empty());
        assert!(inst.undone_at.is_some());
        assert_eq!(inst.undone_by.as_deref(), Some("kitchen"));
        assert_eq!(inst.last_undone_count, 1);
    }

    #[test]
    fn test_undo_rejected_when_nothing_given() {
        let mut p = participant_with("Beer", true, 2);
        let err = undo(&mut p, "Beer", 1, "alice").unwrap_err();
        assert!(matches!(err, Rejection::NothingToUndo { .. }));
        assert!(p.entitlement_history.is_empty());
    }

    #[test]
    fn test_undo_clamps_to_given() {
        // Undoing more than was given clamps rather than erroring
        let mut p = participant_with("Beer", true, 5);
        distribute(&mut p, "Beer", 2, "alice", &CapOverrides::new()).unwrap();

        let undone = undo(&mut p, "Beer", 10, "alice").unwrap();
        assert_eq!(undone.count, 2);
        assert_eq!(p.entitlement("Beer").unwrap().given, 0);
    }

    #[test]
    fn test_undo_allowed_when_absent() {
        // Presence is not required for undo
        let mut p = participant_with("Beer", true, 2);
        distribute(&mut p, "Beer", 1, "alice", &CapOverrides::new()).unwrap();
        p.is_present = false;

        assert!(undo(&mut p, "Beer", 1, "alice").is_ok());
    }

    #[test]
    fn test_attendance_undo_does_not_retract_grants() {
        // Clearing the presence flag leaves the ledger untouched
        let mut p = participant_with("Lunch", false, 1);
        distribute(&mut p, "Lunch", 1, "kitchen", &CapOverrides::new()).unwrap();

        p.is_present = false;
        p.present_at = None;
        p.marked_by = None;

        let inst = p.entitlement("Lunch").unwrap();
        assert_eq!(inst.given, 1);
        assert!(inst.is_consistent());
    }

    #[test]
    fn test_fan_out_is_best_effort() {
        // Three participants, one absent: two grants succeed, one rejection
        // is collected, processing never aborts
        let mut members = vec![
            participant_with("Breakfast", false, 1),
            participant_with("Breakfast", false, 1),
            participant_with("Breakfast", false, 1),
        ];
        members[1].participant_id = "p-2".into();
        members[1].is_present = false;
        members[2].participant_id = "p-3".into();

        let mut succeeded = Vec::new();
        let mut errors = Vec::new();
        for member in members.iter_mut() {
            match distribute(member, "Breakfast", 1, "kitchen", &CapOverrides::new()) {
                Ok(_) => succeeded.push(member.participant_id.clone()),
                Err(e) => errors.push(e.to_string()),
            }
        }

        assert_eq!(succeeded, vec!["p-1".to_string(), "p-3".to_string()]);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("p-2"));
        assert!(errors[0].contains("not checked in"));
    }
}
