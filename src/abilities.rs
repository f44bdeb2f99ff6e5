//! Ability totals derived from a `traits` block.
//!
//! A traits block is a small YAML document:
//!
//! ```yaml
//! base:
//!   Agility: 1
//!   Strength: 0
//! bonus:
//!   - { Agility: 1 }
//!   - { agility: 1, presence: 2 }
//! ```
//!
//! Keys are matched case-insensitively. `bonus` (or `bonuses`) may be a single
//! map or a list of maps; all of them are summed onto `base`. Anything that
//! cannot be understood contributes zero, so this never fails.

use serde::Serialize;
use serde_yaml::{Mapping, Value};

/// The six fixed ability names, lower-cased.
pub const ABILITY_NAMES: [&str; 6] = [
    "agility",
    "strength",
    "finesse",
    "instinct",
    "presence",
    "knowledge",
];

/// Per-ability totals, always covering all six abilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AbilityTotals {
    totals: [f64; 6],
}

impl AbilityTotals {
    /// Total for `name`. The lookup is case-sensitive against the lower-case names.
    pub fn get(&self, name: &str) -> Option<f64> {
        ABILITY_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.totals[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        ABILITY_NAMES.iter().copied().zip(self.totals.iter().copied())
    }

    fn add_map(&mut self, map: &Mapping) {
        for (key, value) in map {
            let Some(key) = key.as_str() else { continue };
            let key = key.trim().to_ascii_lowercase();
            if let Some(i) = ABILITY_NAMES.iter().position(|n| *n == key) {
                self.totals[i] += numeric(value);
            }
        }
    }
}

/// Compute ability totals from the raw text of a traits block.
pub fn compute_totals(text: &str) -> AbilityTotals {
    let mut totals = AbilityTotals::default();

    let Ok(Value::Mapping(root)) = serde_yaml::from_str::<Value>(text) else {
        return totals;
    };

    if let Some(Value::Mapping(base)) = lookup(&root, "base") {
        totals.add_map(base);
    }

    for key in ["bonus", "bonuses"] {
        match lookup(&root, key) {
            Some(Value::Mapping(bonus)) => totals.add_map(bonus),
            Some(Value::Sequence(list)) => list
                .iter()
                .filter_map(Value::as_mapping)
                .for_each(|bonus| totals.add_map(bonus)),
            _ => {}
        }
    }

    totals
}

/// Case-insensitive top-level key lookup.
fn lookup<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_str().is_some_and(|k| k.trim().eq_ignore_ascii_case(key)))
        .map(|(_, v)| v)
}

/// Numeric value of a YAML scalar; numeric strings are accepted, the rest is zero.
fn numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_plus_bonus_list() {
        let totals = compute_totals(
            "base:\n  Agility: 0\nbonus:\n  - Agility: 1\n  - Agility: 1\n",
        );
        assert_eq!(totals.get("agility"), Some(2.0));
        // Absent everywhere
        assert_eq!(totals.get("knowledge"), Some(0.0));
    }

    #[test]
    fn test_single_bonus_map_and_case_insensitive_keys() {
        let totals = compute_totals(
            "BASE:\n  STRENGTH: 2\n  presence: -1\nbonuses:\n  Strength: 1\n  PRESENCE: 1\n",
        );
        assert_eq!(totals.get("strength"), Some(3.0));
        assert_eq!(totals.get("presence"), Some(0.0));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let totals = compute_totals("base:\n  finesse: \"2\"\n  instinct: lots\n");
        assert_eq!(totals.get("finesse"), Some(2.0));
        assert_eq!(totals.get("instinct"), Some(0.0));
    }

    #[test]
    fn test_malformed_input_is_all_zero() {
        for text in ["", "not: [valid", "- just\n- a list", "base: 3"] {
            let totals = compute_totals(text);
            assert!(totals.iter().all(|(_, v)| v == 0.0), "input {text:?}");
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive_on_output() {
        let totals = compute_totals("base:\n  agility: 1\n");
        assert_eq!(totals.get("agility"), Some(1.0));
        assert_eq!(totals.get("Agility"), None);
        assert_eq!(totals.get("luck"), None);
    }

    #[test]
    fn test_iter_covers_all_six() {
        let names: Vec<_> = AbilityTotals::default().iter().map(|(n, _)| n).collect();
        assert_eq!(names, ABILITY_NAMES);
    }
}
