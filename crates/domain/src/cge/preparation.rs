//! Bound (Vancian) preparation.

use super::calculate::CalculatedCge;
use super::cge_not_found;
use super::state::{edit_cge_state, SlotId};
use crate::character::CharacterRecord;
use crate::outcome::OperationOutcome;
use crate::warnings::{Warning, WarningKind};

/// Binds `entity_id` to slot `index` of `level` on the first bound track.
///
/// Preparing an entity that is not known, or a slot beyond the current
/// maximum, still goes through; both are reported.
pub fn prepare_entity_in_slot(
    record: &CharacterRecord,
    cge: Option<&CalculatedCge>,
    cge_id: &str,
    level: u32,
    index: u32,
    entity_id: &str,
) -> OperationOutcome {
    let Some(cge) = cge else {
        return cge_not_found(record, cge_id);
    };
    let Some(track) = cge.config.first_bound_track() else {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::InvalidCgeConfig,
                format!("{cge_id} has no track with bound preparation"),
            )
            .with_context("cgeId", cge_id),
        );
    };

    let slot_id = SlotId::new(track.id.clone(), level, index);
    let state = record.cge_state.get(cge_id);
    let mut warnings = Vec::new();

    let max = cge
        .track(&track.id)
        .and_then(|track| track.slot(level))
        .map(|slot| slot.max)
        .unwrap_or(0);
    if index >= max {
        warnings.push(
            Warning::new(
                WarningKind::SlotOutOfBounds,
                format!("Slot {slot_id} is beyond the {max} level {level} slots"),
            )
            .with_context("cgeId", cge_id)
            .with_context("slotId", &slot_id),
        );
    }

    if cge.config.tracks_known() && !state.is_some_and(|state| state.is_known(entity_id)) {
        warnings.push(
            Warning::new(
                WarningKind::EntityNotKnown,
                format!("{entity_id} is not among the known entities of {cge_id}"),
            )
            .with_context("cgeId", cge_id)
            .with_context("entityId", entity_id),
        );
    }

    if let Some(previous) = state.and_then(|state| state.prepared_entity(&slot_id)) {
        warnings.push(
            Warning::new(
                WarningKind::SlotAlreadyPrepared,
                format!("Slot {slot_id} held {previous}; replaced"),
            )
            .with_context("cgeId", cge_id)
            .with_context("slotId", &slot_id)
            .with_context("previousEntityId", previous),
        );
    }

    let updated = edit_cge_state(record, cge_id, |state| {
        state
            .bound_preparations
            .insert(slot_id.clone(), entity_id.to_string());
    });

    tracing::debug!(cge_id, slot_id = %slot_id, entity_id, "Entity prepared");
    OperationOutcome::with_warnings(updated, warnings)
}

/// Clears slot `index` of `level` on the first bound track, usage included.
pub fn unprepare_slot(
    record: &CharacterRecord,
    cge: Option<&CalculatedCge>,
    cge_id: &str,
    level: u32,
    index: u32,
) -> OperationOutcome {
    let Some(cge) = cge else {
        return cge_not_found(record, cge_id);
    };
    let Some(track) = cge.config.first_bound_track() else {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::InvalidCgeConfig,
                format!("{cge_id} has no track with bound preparation"),
            )
            .with_context("cgeId", cge_id),
        );
    };

    let slot_id = SlotId::new(track.id.clone(), level, index);
    let prepared = record
        .cge_state
        .get(cge_id)
        .and_then(|state| state.prepared_entity(&slot_id))
        .is_some();
    if !prepared {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::SlotNotPrepared,
                format!("Slot {slot_id} has nothing prepared"),
            )
            .with_context("cgeId", cge_id)
            .with_context("slotId", &slot_id),
        );
    }

    let updated = edit_cge_state(record, cge_id, |state| {
        state.bound_preparations.remove(&slot_id);
        state.used_bound_slots.remove(&slot_id);
    });

    tracing::debug!(cge_id, slot_id = %slot_id, "Slot unprepared");
    OperationOutcome::new(updated)
}

/// Clears every slot holding `entity_id`. Returns how many were cleared.
pub fn unprepare_entity(
    record: &CharacterRecord,
    cge_id: &str,
    entity_id: &str,
) -> (OperationOutcome, usize) {
    let slots: Vec<SlotId> = record
        .cge_state
        .get(cge_id)
        .map(|state| {
            state
                .bound_preparations
                .iter()
                .filter(|(_, entity)| entity.as_str() == entity_id)
                .map(|(slot, _)| slot.clone())
                .collect()
        })
        .unwrap_or_default();

    if slots.is_empty() {
        return (OperationOutcome::new(record.clone()), 0);
    }

    let updated = edit_cge_state(record, cge_id, |state| {
        for slot in &slots {
            state.bound_preparations.remove(slot);
            state.used_bound_slots.remove(slot);
        }
    });
    (OperationOutcome::new(updated), slots.len())
}

#[cfg(test)]
mod tests {
    use super::super::known::add_known_entity;
    use super::super::{fixtures, testing};
    use super::*;

    fn wizard() -> CharacterRecord {
        CharacterRecord::new("c1", "Mialee")
    }

    #[test]
    fn prepare_then_unprepare_restores_the_record() {
        let record = add_known_entity(&wizard(), "wizard-spells", "fireball", 3).character;
        let (cge, _) = testing::calculate(&fixtures::wizard(), 5, &record);

        let prepared = prepare_entity_in_slot(&record, Some(&cge), "wizard-spells", 3, 0, "fireball");
        assert!(prepared.warnings.is_empty());
        let slot = SlotId::new("base", 3, 0);
        assert_eq!(
            prepared.character.cge_state["wizard-spells"].prepared_entity(&slot),
            Some("fireball")
        );

        let cleared = unprepare_slot(&prepared.character, Some(&cge), "wizard-spells", 3, 0);
        assert!(cleared.warnings.is_empty());
        assert_eq!(cleared.character, record);
    }

    #[test]
    fn unknown_and_out_of_bounds_preparations_go_through_with_warnings() {
        let record = wizard();
        let (cge, _) = testing::calculate(&fixtures::wizard(), 5, &record);

        let outcome = prepare_entity_in_slot(&record, Some(&cge), "wizard-spells", 3, 4, "fireball");

        let kinds: Vec<WarningKind> = outcome.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::SlotOutOfBounds, WarningKind::EntityNotKnown]);
        assert_eq!(
            outcome.character.cge_state["wizard-spells"]
                .prepared_entity(&SlotId::new("base", 3, 4)),
            Some("fireball")
        );
    }

    #[test]
    fn preparing_an_occupied_slot_replaces_it() {
        let record = add_known_entity(&wizard(), "wizard-spells", "sleep", 1).character;
        let record = add_known_entity(&record, "wizard-spells", "charm-person", 1).character;
        let (cge, _) = testing::calculate(&fixtures::wizard(), 1, &record);

        let first = prepare_entity_in_slot(&record, Some(&cge), "wizard-spells", 1, 0, "sleep");
        let second =
            prepare_entity_in_slot(&first.character, Some(&cge), "wizard-spells", 1, 0, "charm-person");

        assert_eq!(second.warnings.len(), 1);
        assert_eq!(second.warnings[0].kind, WarningKind::SlotAlreadyPrepared);
        assert_eq!(second.warnings[0].context("previousEntityId"), Some("sleep"));
    }

    #[test]
    fn unprepare_reports_empty_slots_and_missing_groups() {
        let record = wizard();
        let (cge, _) = testing::calculate(&fixtures::wizard(), 1, &record);

        let empty = unprepare_slot(&record, Some(&cge), "wizard-spells", 1, 0);
        assert_eq!(empty.warnings[0].kind, WarningKind::SlotNotPrepared);

        let missing = unprepare_slot(&record, None, "wizard-spells", 1, 0);
        assert_eq!(missing.warnings[0].kind, WarningKind::CgeNotFound);
    }

    #[test]
    fn unprepare_entity_clears_every_binding() {
        let record = wizard();
        let (cge, _) = testing::calculate(&fixtures::wizard(), 5, &record);
        let record = prepare_entity_in_slot(&record, Some(&cge), "wizard-spells", 1, 0, "sleep").character;
        let record = prepare_entity_in_slot(&record, Some(&cge), "wizard-spells", 1, 1, "sleep").character;

        let (outcome, cleared) = unprepare_entity(&record, "wizard-spells", "sleep");

        assert_eq!(cleared, 2);
        assert!(!outcome.character.cge_state.contains_key("wizard-spells"));
    }
}
