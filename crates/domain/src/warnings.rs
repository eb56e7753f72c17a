//! Non-fatal diagnostics.
//!
//! Warnings are appended to a derived sheet or to an operation outcome instead
//! of being raised. A derivation always produces a sheet; a mutating operation
//! always produces a record. What went wrong along the way is carried here.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of warning categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    // Formula evaluation
    UnknownPlaceholder,
    InvalidFormula,

    // Custom variables
    CircularDependency,

    // Character record and content
    InvalidCgeConfig,
    KnownLimitExceeded,

    // Slots
    NoSlotsRemaining,
    CgeStateNotFound,
    InvalidLevel,
    SlotsAlreadyFull,
    SlotAlreadyUsed,
    SlotNotPrepared,

    // Preparation and known entities
    CgeNotFound,
    EntityNotKnown,
    SlotOutOfBounds,
    SlotAlreadyPrepared,
    EntityAlreadyKnown,
    EntityNotFound,

    // Pools and resources
    InsufficientPool,
    ResourceClamped,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownPlaceholder => "unknown_placeholder",
            Self::InvalidFormula => "invalid_formula",
            Self::CircularDependency => "circular_dependency",
            Self::InvalidCgeConfig => "invalid_cge_config",
            Self::KnownLimitExceeded => "known_limit_exceeded",
            Self::NoSlotsRemaining => "no_slots_remaining",
            Self::CgeStateNotFound => "cge_state_not_found",
            Self::InvalidLevel => "invalid_level",
            Self::SlotsAlreadyFull => "slots_already_full",
            Self::SlotAlreadyUsed => "slot_already_used",
            Self::SlotNotPrepared => "slot_not_prepared",
            Self::CgeNotFound => "cge_not_found",
            Self::EntityNotKnown => "entity_not_known",
            Self::SlotOutOfBounds => "slot_out_of_bounds",
            Self::SlotAlreadyPrepared => "slot_already_prepared",
            Self::EntityAlreadyKnown => "entity_already_known",
            Self::EntityNotFound => "entity_not_found",
            Self::InsufficientPool => "insufficient_pool",
            Self::ResourceClamped => "resource_clamped",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single non-fatal diagnostic: `{ kind, message, context? }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context entry (e.g. `cgeId`, `level`, `slotId`).
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Drops repeated warnings, keeping the first occurrence of each.
pub fn dedup_warnings(warnings: Vec<Warning>) -> Vec<Warning> {
    let mut seen = BTreeSet::new();
    warnings
        .into_iter()
        .filter(|warning| seen.insert(warning.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&WarningKind::NoSlotsRemaining).unwrap();
        assert_eq!(json, "\"no_slots_remaining\"");
        assert_eq!(WarningKind::NoSlotsRemaining.as_str(), "no_slots_remaining");
    }

    #[test]
    fn context_is_omitted_when_empty() {
        let warning = Warning::new(WarningKind::InvalidLevel, "bad level");
        let json = serde_json::to_value(&warning).unwrap();
        assert!(json.get("context").is_none());

        let warning = warning.with_context("level", -1);
        assert_eq!(warning.context("level"), Some("-1"));
    }

    #[test]
    fn dedup_keeps_first_occurrence_in_order() {
        let a = Warning::new(WarningKind::UnknownPlaceholder, "a");
        let b = Warning::new(WarningKind::UnknownPlaceholder, "b");
        let deduped = dedup_warnings(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(deduped, vec![a, b]);
    }
}
