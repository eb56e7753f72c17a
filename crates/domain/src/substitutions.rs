//! Placeholder name to value mapping consumed by the formula evaluator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resolved placeholder values, keyed without the leading `@`
/// (e.g. `ability.strength.modifier`).
///
/// Built up step by step during a derivation pass; each step reads what the
/// previous steps wrote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstitutionTable(BTreeMap<String, f64>);

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value of `name`, or 0 when it has not been written.
    pub fn value_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Copy of this table with `entries` layered on top.
    pub fn with_overrides<'a>(&self, entries: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let mut table = self.clone();
        for (name, value) in entries {
            table.insert(name, value);
        }
        table
    }
}

impl FromIterator<(String, f64)> for SubstitutionTable {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_do_not_touch_original() {
        let mut base = SubstitutionTable::new();
        base.insert("level", 5.0);
        let layered = base.with_overrides([("level", 7.0), ("entity.level", 3.0)]);

        assert_eq!(base.get("level"), Some(5.0));
        assert_eq!(layered.get("level"), Some(7.0));
        assert_eq!(layered.value_or_zero("entity.level"), 3.0);
        assert_eq!(base.value_or_zero("entity.level"), 0.0);
    }
}
