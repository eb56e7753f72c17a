//! Known-entity lists.

use super::preparation::unprepare_entity;
use super::state::edit_cge_state;
use crate::character::CharacterRecord;
use crate::outcome::OperationOutcome;
use crate::warnings::{Warning, WarningKind};

/// Adds `entity_id` to the known list at `level` (`-1` for level-less).
pub fn add_known_entity(
    record: &CharacterRecord,
    cge_id: &str,
    entity_id: &str,
    level: i32,
) -> OperationOutcome {
    let already = record
        .cge_state
        .get(cge_id)
        .is_some_and(|state| state.is_known(entity_id));
    if already {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::EntityAlreadyKnown,
                format!("{entity_id} is already known by {cge_id}"),
            )
            .with_context("cgeId", cge_id)
            .with_context("entityId", entity_id),
        );
    }

    let updated = edit_cge_state(record, cge_id, |state| {
        state
            .known_selections
            .entry(level)
            .or_default()
            .push(entity_id.to_string());
    });

    tracing::debug!(cge_id, entity_id, level, "Known entity added");
    OperationOutcome::new(updated)
}

/// Forgets `entity_id` at every level and clears its preparations.
pub fn remove_known_entity(
    record: &CharacterRecord,
    cge_id: &str,
    entity_id: &str,
) -> OperationOutcome {
    let known = record
        .cge_state
        .get(cge_id)
        .is_some_and(|state| state.is_known(entity_id));
    if !known {
        return OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::EntityNotFound,
                format!("{entity_id} is not known by {cge_id}"),
            )
            .with_context("cgeId", cge_id)
            .with_context("entityId", entity_id),
        );
    }

    let forgotten = edit_cge_state(record, cge_id, |state| {
        for ids in state.known_selections.values_mut() {
            ids.retain(|id| id != entity_id);
        }
    });
    let (outcome, unprepared) = unprepare_entity(&forgotten, cge_id, entity_id);

    tracing::debug!(cge_id, entity_id, unprepared, "Known entity removed");
    outcome
}

#[cfg(test)]
mod tests {
    use super::super::state::SlotId;
    use super::*;

    #[test]
    fn add_keeps_learning_order_and_rejects_duplicates() {
        let record = CharacterRecord::new("c1", "Hennet");
        let record = add_known_entity(&record, "sorcerer-spells", "magic-missile", 1).character;
        let record = add_known_entity(&record, "sorcerer-spells", "shield", 1).character;

        assert_eq!(
            record.cge_state["sorcerer-spells"].known_by_level(1),
            ["magic-missile".to_string(), "shield".to_string()]
        );

        let duplicate = add_known_entity(&record, "sorcerer-spells", "shield", 2);
        assert_eq!(duplicate.warnings[0].kind, WarningKind::EntityAlreadyKnown);
        assert_eq!(duplicate.character, record);
    }

    #[test]
    fn remove_undoes_add_and_clears_preparations() {
        let empty = CharacterRecord::new("c1", "Mialee");
        let known = add_known_entity(&empty, "wizard-spells", "sleep", 1).character;
        let prepared = edit_cge_state(&known, "wizard-spells", |state| {
            state
                .bound_preparations
                .insert(SlotId::new("base", 1, 0), "sleep".to_string());
        });

        let outcome = remove_known_entity(&prepared, "wizard-spells", "sleep");

        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.character, empty);
    }

    #[test]
    fn removing_an_unknown_entity_warns() {
        let record = CharacterRecord::new("c1", "Mialee");
        let outcome = remove_known_entity(&record, "wizard-spells", "sleep");
        assert_eq!(outcome.warnings[0].kind, WarningKind::EntityNotFound);
    }
}
