//! Effective cap resolution
//!
//! The cap actually enforced at distribution time is the global setting
//! override for the entitlement's name when one exists, otherwise the cap
//! stored on the instance. Resolved on every distribution and undo, never
//! cached, so caps cannot drift out of sync with policy changes made after
//! an instance was created.

use std::collections::HashMap;

/// Setting keys that can override an entitlement cap globally. Only these
/// two names map to override keys.
const SETTING_KEYS: &[(&str, &str)] = &[
    ("beer", "beerLimit"),
    ("specialbeverage", "specialBeverageLimit"),
];

/// Map an entitlement name to its global setting key, if it has one.
/// Matching is case-insensitive.
pub fn setting_key_for(entitlement: &str) -> Option<&'static str> {
    let lower = entitlement.to_lowercase();
    SETTING_KEYS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, key)| *key)
}

/// All setting keys that can carry cap overrides, for prefetching.
pub fn override_setting_keys() -> Vec<&'static str> {
    SETTING_KEYS.iter().map(|(_, key)| *key).collect()
}

/// Snapshot of cap-override settings fetched once per operation.
#[derive(Debug, Clone, Default)]
pub struct CapOverrides {
    values: HashMap<String, i64>,
}

impl CapOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a setting value by its key (e.g. "beerLimit")
    pub fn insert(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), value);
    }

    /// Override value for an entitlement name, if its name maps to a
    /// setting key and that setting exists
    pub fn for_entitlement(&self, entitlement: &str) -> Option<i64> {
        setting_key_for(entitlement).and_then(|key| self.values.get(key).copied())
    }
}

/// The cap enforced for one operation: the override wins, the stored cap is
/// the fallback.
pub fn effective_cap(override_value: Option<i64>, stored: i64) -> i64 {
    override_value.unwrap_or(stored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_key_mapping() {
        assert_eq!(setting_key_for("beer"), Some("beerLimit"));
        assert_eq!(setting_key_for("Beer"), Some("beerLimit"));
        assert_eq!(setting_key_for("BEER"), Some("beerLimit"));
        assert_eq!(setting_key_for("specialBeverage"), Some("specialBeverageLimit"));
        assert_eq!(setting_key_for("lunch"), None);
        assert_eq!(setting_key_for("breakfast"), None);
    }

    #[test]
    fn test_override_wins_over_stored_cap() {
        // Setting "beerLimit"=3 exists; instance stores cap 2.
        // Effective cap resolves to 3 regardless of the stored value.
        let mut overrides = CapOverrides::new();
        overrides.insert("beerLimit", 3);

        let cap = effective_cap(overrides.for_entitlement("Beer"), 2);
        assert_eq!(cap, 3);
    }

    #[test]
    fn test_stored_cap_used_when_no_override() {
        let overrides = CapOverrides::new();
        assert_eq!(effective_cap(overrides.for_entitlement("Beer"), 2), 2);
        assert_eq!(effective_cap(overrides.for_entitlement("Lunch"), 1), 1);
    }

    #[test]
    fn test_unmapped_name_ignores_settings() {
        // A "lunchLimit" setting would have no mapped entitlement; a Lunch
        // distribution must keep using the stored cap.
        let mut overrides = CapOverrides::new();
        overrides.insert("beerLimit", 5);
        assert_eq!(overrides.for_entitlement("Lunch"), None);
    }
}
