//! Generic and bound slot consumption.

use super::calculate::CalculatedCge;
use super::state::{edit_cge_state, SlotId};
use super::cge_not_found;
use crate::character::CharacterRecord;
use crate::outcome::OperationOutcome;
use crate::warnings::{Warning, WarningKind};

/// Spends one slot of `level` on the first SLOTS track.
///
/// With nothing left the record is returned unchanged with a
/// `no_slots_remaining` warning; the count never drops below 0.
pub fn use_slot(
    record: &CharacterRecord,
    cge: Option<&CalculatedCge>,
    cge_id: &str,
    level: i32,
) -> OperationOutcome {
    let Some(cge) = cge else {
        return cge_not_found(record, cge_id);
    };
    let Ok(level) = u32::try_from(level) else {
        return OperationOutcome::unchanged(
            record,
            Warning::new(WarningKind::InvalidLevel, format!("Invalid slot level: {level}"))
                .with_context("cgeId", cge_id)
                .with_context("level", level),
        );
    };

    let slot = cge
        .config
        .primary_slot_track()
        .and_then(|track| cge.track(&track.id))
        .and_then(|track| track.slot(level));

    let Some(slot) = slot.filter(|slot| slot.current > 0) else {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::NoSlotsRemaining,
                format!("No level {level} slots remaining for {cge_id}"),
            )
            .with_context("cgeId", cge_id)
            .with_context("level", level),
        );
    };

    let max = slot.max;
    let updated = edit_cge_state(record, cge_id, |state| {
        let remaining = state
            .slot_current_values
            .get(&level)
            .copied()
            .unwrap_or(max)
            .min(max);
        state
            .slot_current_values
            .insert(level, remaining.saturating_sub(1));
    });

    tracing::debug!(cge_id, level, "Slot used");
    OperationOutcome::new(updated)
}

/// Restores every slot of the CGE. Preparations survive; usage clears.
pub fn refresh_slots(record: &CharacterRecord, cge_id: &str) -> OperationOutcome {
    let Some(state) = record.cge_state.get(cge_id) else {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::CgeStateNotFound,
                format!("No state recorded for {cge_id}"),
            )
            .with_context("cgeId", cge_id),
        );
    };

    if state.slot_current_values.is_empty() && state.used_bound_slots.is_empty() {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::SlotsAlreadyFull,
                format!("All slots of {cge_id} are already available"),
            )
            .with_context("cgeId", cge_id),
        );
    }

    let updated = edit_cge_state(record, cge_id, |state| {
        state.slot_current_values.clear();
        state.used_bound_slots.clear();
    });

    tracing::debug!(cge_id, "Slots refreshed");
    OperationOutcome::new(updated)
}

/// Marks a prepared bound slot as used.
pub fn use_bound_slot(record: &CharacterRecord, cge_id: &str, slot_id: &SlotId) -> OperationOutcome {
    let state = record.cge_state.get(cge_id);

    if state.is_some_and(|state| state.is_used(slot_id)) {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::SlotAlreadyUsed,
                format!("Slot {slot_id} was already used"),
            )
            .with_context("cgeId", cge_id)
            .with_context("slotId", slot_id),
        );
    }

    if state.and_then(|state| state.prepared_entity(slot_id)).is_none() {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::SlotNotPrepared,
                format!("Slot {slot_id} has nothing prepared"),
            )
            .with_context("cgeId", cge_id)
            .with_context("slotId", slot_id),
        );
    }

    let updated = edit_cge_state(record, cge_id, |state| {
        state.used_bound_slots.insert(slot_id.clone(), true);
    });

    tracing::debug!(cge_id, slot_id = %slot_id, "Bound slot used");
    OperationOutcome::new(updated)
}

#[cfg(test)]
mod tests {
    use super::super::{fixtures, testing};
    use super::*;

    fn sorcerer() -> CharacterRecord {
        CharacterRecord::new("c1", "Hennet")
    }

    #[test]
    fn using_a_slot_decrements_persisted_count() {
        let record = sorcerer();
        let (cge, _) = testing::calculate(&fixtures::sorcerer(), 1, &record);

        let outcome = use_slot(&record, Some(&cge), "sorcerer-spells", 1);

        assert!(outcome.warnings.is_empty());
        let state = &outcome.character.cge_state["sorcerer-spells"];
        assert_eq!(state.slot_current_values.get(&1), Some(&2));
    }

    #[test]
    fn using_an_empty_level_warns_and_never_goes_negative() {
        let mut record = sorcerer();
        record = edit_cge_state(&record, "sorcerer-spells", |state| {
            state.slot_current_values.insert(1, 0);
        });
        let (cge, _) = testing::calculate(&fixtures::sorcerer(), 1, &record);

        let outcome = use_slot(&record, Some(&cge), "sorcerer-spells", 1);

        assert_eq!(outcome.character, record);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::NoSlotsRemaining);
        assert_eq!(
            outcome.character.cge_state["sorcerer-spells"].slot_current_values[&1],
            0
        );
    }

    #[test]
    fn levels_without_slots_and_negative_levels_warn() {
        let record = sorcerer();
        let (cge, _) = testing::calculate(&fixtures::sorcerer(), 1, &record);

        let missing = use_slot(&record, Some(&cge), "sorcerer-spells", 4);
        assert_eq!(missing.warnings[0].kind, WarningKind::NoSlotsRemaining);

        let negative = use_slot(&record, Some(&cge), "sorcerer-spells", -1);
        assert_eq!(negative.warnings[0].kind, WarningKind::InvalidLevel);

        let unknown = use_slot(&record, None, "bard-spells", 1);
        assert_eq!(unknown.warnings[0].kind, WarningKind::CgeNotFound);
        assert_eq!(unknown.character, record);
    }

    #[test]
    fn refresh_clears_usage_and_keeps_preparations() {
        let slot = SlotId::new("base", 1, 0);
        let record = edit_cge_state(&sorcerer(), "wizard-spells", |state| {
            state.bound_preparations.insert(slot.clone(), "sleep".to_string());
            state.used_bound_slots.insert(slot.clone(), true);
            state.slot_current_values.insert(1, 1);
        });

        let outcome = refresh_slots(&record, "wizard-spells");

        let state = &outcome.character.cge_state["wizard-spells"];
        assert!(state.slot_current_values.is_empty());
        assert!(!state.is_used(&slot));
        assert_eq!(state.prepared_entity(&slot), Some("sleep"));

        let again = refresh_slots(&outcome.character, "wizard-spells");
        assert_eq!(again.warnings[0].kind, WarningKind::SlotsAlreadyFull);

        let missing = refresh_slots(&sorcerer(), "wizard-spells");
        assert_eq!(missing.warnings[0].kind, WarningKind::CgeStateNotFound);
    }

    #[test]
    fn bound_slot_moves_from_prepared_to_used_once() {
        let slot = SlotId::new("base", 1, 0);
        let empty = use_bound_slot(&sorcerer(), "wizard-spells", &slot);
        assert_eq!(empty.warnings[0].kind, WarningKind::SlotNotPrepared);

        let record = edit_cge_state(&sorcerer(), "wizard-spells", |state| {
            state.bound_preparations.insert(slot.clone(), "sleep".to_string());
        });
        let used = use_bound_slot(&record, "wizard-spells", &slot);
        assert!(used.warnings.is_empty());
        assert!(used.character.cge_state["wizard-spells"].is_used(&slot));

        let twice = use_bound_slot(&used.character, "wizard-spells", &slot);
        assert_eq!(twice.warnings[0].kind, WarningKind::SlotAlreadyUsed);
        assert_eq!(twice.character, used.character);
    }

    #[test]
    fn used_bound_slots_reduce_calculated_current() {
        let slot = SlotId::new("base", 1, 0);
        let record = edit_cge_state(&sorcerer(), "wizard-spells", |state| {
            state.bound_preparations.insert(slot.clone(), "sleep".to_string());
        });
        let used = use_bound_slot(&record, "wizard-spells", &slot).character;

        let (cge, _) = testing::calculate(&fixtures::wizard(), 1, &used);
        let first = cge.tracks[0].slot(1).unwrap();
        assert_eq!((first.max, first.current), (1, 0));
    }
}
