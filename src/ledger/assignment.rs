//! Default-template auto-assignment
//!
//! Attaches entitlement instances to a participant from the active template
//! catalog without staff intervention. Runs at registration, after a type
//! change, and on demand.

use crate::db::schemas::{EntitlementInstance, ParticipantDoc, TemplateDoc};
use crate::ledger::caps::{effective_cap, CapOverrides};

/// Attach every active template the participant is eligible for and does
/// not already hold (name match is case-insensitive). The attach-time cap
/// is the effective cap at this moment, denormalized onto the instance.
///
/// Idempotent: a second run attaches nothing.
pub fn auto_assign(
    participant: &mut ParticipantDoc,
    templates: &[TemplateDoc],
    overrides: &CapOverrides,
) -> usize {
    let mut attached = 0;

    for template in templates {
        if !template.is_active {
            continue;
        }

        let eligible = if participant.is_player {
            template.default_for_players
        } else {
            template.default_for_participants
        };
        if !eligible {
            continue;
        }

        if participant.has_entitlement(&template.name) {
            continue;
        }

        let cap = effective_cap(
            overrides.for_entitlement(&template.name),
            template.default_max,
        );
        participant.entitlements.push(EntitlementInstance::new(
            template._id,
            &template.name,
            &template.category,
            template.countable,
            cap,
        ));
        attached += 1;
    }

    attached
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str, players: bool, participants: bool) -> TemplateDoc {
        TemplateDoc::new(name, "meal", false, 1, players, participants)
    }

    fn catalog() -> Vec<TemplateDoc> {
        vec![
            template("Breakfast", true, true),
            template("Lunch", true, true),
            template("PlayerKit", true, false),
            template("VisitorPass", false, true),
        ]
    }

    #[test]
    fn test_assigns_by_participant_type() {
        let templates = catalog();

        let mut player = ParticipantDoc::new("p-1", "Ada", "ada@example.com", "", true);
        assert_eq!(auto_assign(&mut player, &templates, &CapOverrides::new()), 3);
        assert!(player.has_entitlement("PlayerKit"));
        assert!(!player.has_entitlement("VisitorPass"));

        let mut visitor = ParticipantDoc::new("p-2", "Bo", "bo@example.com", "", false);
        assert_eq!(auto_assign(&mut visitor, &templates, &CapOverrides::new()), 3);
        assert!(visitor.has_entitlement("VisitorPass"));
        assert!(!visitor.has_entitlement("PlayerKit"));
    }

    #[test]
    fn test_second_run_attaches_nothing() {
        let templates = catalog();
        let mut p = ParticipantDoc::new("p-1", "Ada", "ada@example.com", "", true);

        assert_eq!(auto_assign(&mut p, &templates, &CapOverrides::new()), 3);
        assert_eq!(auto_assign(&mut p, &templates, &CapOverrides::new()), 0);
        assert_eq!(p.entitlements.len(), 3);
    }

    #[test]
    fn test_skips_inactive_templates() {
        let mut templates = catalog();
        templates[0].is_active = false;

        let mut p = ParticipantDoc::new("p-1", "Ada", "ada@example.com", "", true);
        auto_assign(&mut p, &templates, &CapOverrides::new());
        assert!(!p.has_entitlement("Breakfast"));
        assert!(p.has_entitlement("Lunch"));
    }

    #[test]
    fn test_existing_instance_not_duplicated_case_insensitive() {
        let templates = catalog();
        let mut p = ParticipantDoc::new("p-1", "Ada", "ada@example.com", "", false);
        p.entitlements.push(EntitlementInstance::new(
            None, "BREAKFAST", "meal", false, 1,
        ));

        auto_assign(&mut p, &templates, &CapOverrides::new());
        let breakfasts = p
            .entitlements
            .iter()
            .filter(|e| e.name.eq_ignore_ascii_case("breakfast"))
            .count();
        assert_eq!(breakfasts, 1);
    }

    #[test]
    fn test_attach_time_cap_uses_override() {
        let mut templates = catalog();
        templates.push(TemplateDoc::new("Beer", "beverage", true, 2, true, true));

        let mut overrides = CapOverrides::new();
        overrides.insert("beerLimit", 4);

        let mut p = ParticipantDoc::new("p-1", "Ada", "ada@example.com", "", true);
        auto_assign(&mut p, &templates, &overrides);

        assert_eq!(p.entitlement("Beer").unwrap().max_count, 4);
    }
}
