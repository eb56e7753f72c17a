//! Persisted per-character CGE state.
//!
//! Plain maps keyed by level or slot id. Entries that become empty are
//! dropped, so undoing an operation restores the record exactly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::character::CharacterRecord;
use crate::error::DomainError;

/// Address of one bound slot: `"<trackId>:<level>-<index>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotId {
    pub track_id: String,
    pub level: u32,
    pub index: u32,
}

impl SlotId {
    pub fn new(track_id: impl Into<String>, level: u32, index: u32) -> Self {
        Self {
            track_id: track_id.into(),
            level,
            index,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.track_id, self.level, self.index)
    }
}

impl FromStr for SlotId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::parse(format!("Invalid slot id: {s}"));
        let (track_id, position) = s.rsplit_once(':').ok_or_else(invalid)?;
        let (level, index) = position.split_once('-').ok_or_else(invalid)?;
        if track_id.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            track_id: track_id.to_string(),
            level: level.parse().map_err(|_| invalid())?,
            index: index.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for SlotId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlotId> for String {
    fn from(value: SlotId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgeState {
    /// Entity level (`-1` for level-less groups) to known entity ids, in
    /// the order they were learned.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub known_selections: BTreeMap<i32, Vec<String>>,
    /// Remaining generic slots per level; absent means full.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slot_current_values: BTreeMap<u32, u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bound_preparations: BTreeMap<SlotId, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub used_bound_slots: BTreeMap<SlotId, bool>,
}

impl CgeState {
    pub fn is_empty(&self) -> bool {
        self.known_selections.is_empty()
            && self.slot_current_values.is_empty()
            && self.bound_preparations.is_empty()
            && self.used_bound_slots.is_empty()
    }

    pub fn is_used(&self, slot_id: &SlotId) -> bool {
        self.used_bound_slots.get(slot_id).copied().unwrap_or(false)
    }

    pub fn prepared_entity(&self, slot_id: &SlotId) -> Option<&str> {
        self.bound_preparations.get(slot_id).map(String::as_str)
    }

    /// `(index, entity id)` prepared at `level` of `track_id`, by index.
    pub fn preparations_by_level(&self, track_id: &str, level: u32) -> Vec<(u32, &str)> {
        self.bound_preparations
            .iter()
            .filter(|(slot, _)| slot.track_id == track_id && slot.level == level)
            .map(|(slot, entity)| (slot.index, entity.as_str()))
            .collect()
    }

    pub fn preparation_count(&self, entity_id: &str) -> usize {
        self.bound_preparations
            .values()
            .filter(|entity| entity.as_str() == entity_id)
            .count()
    }

    pub fn unique_prepared_entities(&self) -> BTreeSet<&str> {
        self.bound_preparations.values().map(String::as_str).collect()
    }

    pub fn total_prepared(&self) -> usize {
        self.bound_preparations.len()
    }

    /// Used bound slots of `track_id` at `level`.
    pub fn used_count(&self, track_id: &str, level: u32) -> u32 {
        self.used_bound_slots
            .iter()
            .filter(|(slot, used)| **used && slot.track_id == track_id && slot.level == level)
            .count() as u32
    }

    pub fn known_by_level(&self, level: i32) -> &[String] {
        self.known_selections
            .get(&level)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn known_counts_by_level(&self) -> BTreeMap<i32, usize> {
        self.known_selections
            .iter()
            .map(|(level, ids)| (*level, ids.len()))
            .collect()
    }

    pub fn total_known(&self) -> usize {
        self.known_selections.values().map(Vec::len).sum()
    }

    pub fn is_known(&self, entity_id: &str) -> bool {
        self.known_selections
            .values()
            .any(|ids| ids.iter().any(|id| id == entity_id))
    }

    fn prune(&mut self) {
        self.known_selections.retain(|_, ids| !ids.is_empty());
        self.used_bound_slots.retain(|_, used| *used);
    }
}

/// Copy of `record` with the state of `cge_id` edited by `edit`.
///
/// The state is created on demand and removed again when left empty.
pub(crate) fn edit_cge_state(
    record: &CharacterRecord,
    cge_id: &str,
    edit: impl FnOnce(&mut CgeState),
) -> CharacterRecord {
    let mut updated = record.clone();
    let mut state = updated.cge_state.remove(cge_id).unwrap_or_default();
    edit(&mut state);
    state.prune();
    if !state.is_empty() {
        updated.cge_state.insert(cge_id.to_string(), state);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_id_parses_and_displays() {
        let slot: SlotId = "base:3-0".parse().unwrap();
        assert_eq!(slot, SlotId::new("base", 3, 0));
        assert_eq!(slot.to_string(), "base:3-0");

        let namespaced: SlotId = "cleric:domain:2-1".parse().unwrap();
        assert_eq!(namespaced.track_id, "cleric:domain");

        assert!("base:3".parse::<SlotId>().is_err());
        assert!(":1-0".parse::<SlotId>().is_err());
        assert!("base:x-0".parse::<SlotId>().is_err());
    }

    #[test]
    fn state_serializes_as_plain_maps() {
        let mut state = CgeState::default();
        state
            .bound_preparations
            .insert(SlotId::new("base", 1, 0), "magic-missile".to_string());
        state.slot_current_values.insert(2, 1);
        state.known_selections.insert(-1, vec!["mind-thrust".to_string()]);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "knownSelections": { "-1": ["mind-thrust"] },
                "slotCurrentValues": { "2": 1 },
                "boundPreparations": { "base:1-0": "magic-missile" }
            })
        );
        let back: CgeState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn queries_report_preparations_and_known() {
        let mut state = CgeState::default();
        state
            .bound_preparations
            .insert(SlotId::new("base", 1, 1), "sleep".to_string());
        state
            .bound_preparations
            .insert(SlotId::new("base", 1, 0), "magic-missile".to_string());
        state
            .bound_preparations
            .insert(SlotId::new("base", 2, 0), "magic-missile".to_string());
        state.known_selections.insert(
            1,
            vec!["magic-missile".to_string(), "sleep".to_string()],
        );

        assert_eq!(
            state.preparations_by_level("base", 1),
            vec![(0, "magic-missile"), (1, "sleep")]
        );
        assert_eq!(state.preparation_count("magic-missile"), 2);
        assert_eq!(state.unique_prepared_entities().len(), 2);
        assert_eq!(state.total_prepared(), 3);
        assert_eq!(state.known_by_level(1).len(), 2);
        assert!(state.known_by_level(4).is_empty());
        assert_eq!(state.known_counts_by_level(), BTreeMap::from([(1, 2)]));
        assert_eq!(state.total_known(), 2);
        assert!(state.is_known("sleep"));
        assert!(!state.is_known("fireball"));
    }

    #[test]
    fn empty_state_is_removed_from_record() {
        let record = CharacterRecord::new("c1", "Mialee");
        let slot = SlotId::new("base", 1, 0);

        let prepared = edit_cge_state(&record, "wizard-spells", |state| {
            state.bound_preparations.insert(slot.clone(), "sleep".to_string());
        });
        assert!(prepared.cge_state.contains_key("wizard-spells"));

        let cleared = edit_cge_state(&prepared, "wizard-spells", |state| {
            state.bound_preparations.remove(&slot);
        });
        assert_eq!(cleared, record);
    }
}
