//! Single-owner mutation facade.
//!
//! A [`CharacterUpdater`] owns one character record and its derived sheet.
//! Each operation reads the current sheet, produces a new record through the
//! pure operations of this crate, and re-derives. Hosts keep one updater per
//! character so mutations of the same record never interleave.

use crate::cge::{self, SlotId};
use crate::character::{Buff, CharacterRecord, Item};
use crate::derive::{derive_with, DeriveOptions};
use crate::error::DomainError;
use crate::outcome::{OperationOutcome, UpdateResult};
use crate::resources;
use crate::sheet::DerivedSheet;
use crate::warnings::WarningKind;

pub const CHARACTER_NOT_SET: &str = "Character is not set";
pub const RESOURCE_NOT_FOUND: &str = "Resource not found";
pub const NO_CALCULATED_RESOURCES: &str = "No calculated resources found";
pub const INSUFFICIENT_POOL: &str = "Insufficient pool";

/// Substitution read by [`CharacterUpdater::rest`] for hit points regained;
/// the character level when absent.
pub const REST_HEALING_KEY: &str = "rest.healing";

#[derive(Debug, Clone, Default)]
pub struct CharacterUpdater {
    character: Option<CharacterRecord>,
    sheet: Option<DerivedSheet>,
    options: DeriveOptions,
}

impl CharacterUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DeriveOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Takes ownership of `record` and derives it. A record that breaks an
    /// invariant is refused and the previous one kept.
    pub fn set_character(&mut self, record: CharacterRecord) -> UpdateResult {
        if let Err(err) = record.validate() {
            tracing::error!(character_id = %record.id, error = %err, "Refusing character record");
            return UpdateResult::failure(err.to_string());
        }
        self.sheet = Some(derive_with(&record, &self.options));
        self.character = Some(record);
        UpdateResult::ok(Vec::new())
    }

    pub fn character(&self) -> Option<&CharacterRecord> {
        self.character.as_ref()
    }

    pub fn into_character(self) -> Option<CharacterRecord> {
        self.character
    }

    /// Last derived sheet.
    pub fn sheet(&self) -> Option<&DerivedSheet> {
        self.sheet.as_ref()
    }

    /// Re-derives the sheet from the current record.
    pub fn derive(&mut self) -> Option<&DerivedSheet> {
        let record = self.character.as_ref()?;
        self.sheet = Some(derive_with(record, &self.options));
        self.sheet.as_ref()
    }

    /// Runs `operation` against the record and the current sheet, stores the
    /// new record and re-derives.
    fn apply(
        &mut self,
        operation: &str,
        run: impl FnOnce(&CharacterRecord, &DerivedSheet) -> Result<OperationOutcome, UpdateResult>,
    ) -> UpdateResult {
        let Some(record) = self.character.as_ref() else {
            return UpdateResult::failure(CHARACTER_NOT_SET);
        };
        let sheet = match self.sheet.take() {
            Some(sheet) => sheet,
            None => derive_with(record, &self.options),
        };

        let outcome = match run(record, &sheet) {
            Ok(outcome) => outcome,
            Err(result) => {
                self.sheet = Some(sheet);
                return result;
            }
        };

        tracing::debug!(
            character_id = %outcome.character.id,
            operation,
            warnings = outcome.warnings.len(),
            "Character updated"
        );
        self.sheet = Some(derive_with(&outcome.character, &self.options));
        self.character = Some(outcome.character);
        UpdateResult::ok(outcome.warnings)
    }

    // =========================================================================
    // CGE
    // =========================================================================

    pub fn use_slot_for_cge(&mut self, cge_id: &str, level: i32) -> UpdateResult {
        self.apply("use_slot", |record, sheet| {
            Ok(cge::use_slot(record, sheet.cge.get(cge_id), cge_id, level))
        })
    }

    pub fn refresh_slots_for_cge(&mut self, cge_id: &str) -> UpdateResult {
        self.apply("refresh_slots", |record, sheet| {
            if !sheet.cge.contains_key(cge_id) {
                return Ok(cge::cge_not_found(record, cge_id));
            }
            Ok(cge::refresh_slots(record, cge_id))
        })
    }

    pub fn prepare_entity_for_cge(
        &mut self,
        cge_id: &str,
        level: u32,
        index: u32,
        entity_id: &str,
    ) -> UpdateResult {
        self.apply("prepare_entity", |record, sheet| {
            Ok(cge::prepare_entity_in_slot(
                record,
                sheet.cge.get(cge_id),
                cge_id,
                level,
                index,
                entity_id,
            ))
        })
    }

    pub fn unprepare_slot_for_cge(&mut self, cge_id: &str, level: u32, index: u32) -> UpdateResult {
        self.apply("unprepare_slot", |record, sheet| {
            Ok(cge::unprepare_slot(record, sheet.cge.get(cge_id), cge_id, level, index))
        })
    }

    /// `slot_id` is `"<trackId>:<level>-<index>"`.
    pub fn use_bound_slot_for_cge(&mut self, cge_id: &str, slot_id: &str) -> UpdateResult {
        self.apply("use_bound_slot", |record, sheet| {
            let slot_id: SlotId = slot_id
                .parse()
                .map_err(|err: DomainError| UpdateResult::failure(err.to_string()))?;
            if !sheet.cge.contains_key(cge_id) {
                return Ok(cge::cge_not_found(record, cge_id));
            }
            Ok(cge::use_bound_slot(record, cge_id, &slot_id))
        })
    }

    pub fn add_known_entity(&mut self, cge_id: &str, entity_id: &str, level: i32) -> UpdateResult {
        self.apply("add_known_entity", |record, sheet| {
            if !sheet.cge.contains_key(cge_id) {
                return Ok(cge::cge_not_found(record, cge_id));
            }
            Ok(cge::add_known_entity(record, cge_id, entity_id, level))
        })
    }

    pub fn remove_known_entity(&mut self, cge_id: &str, entity_id: &str) -> UpdateResult {
        self.apply("remove_known_entity", |record, sheet| {
            if !sheet.cge.contains_key(cge_id) {
                return Ok(cge::cge_not_found(record, cge_id));
            }
            Ok(cge::remove_known_entity(record, cge_id, entity_id))
        })
    }

    /// Clears every preparation of `entity_id`; returns how many slots
    /// were cleared.
    pub fn unprepare_entity(&mut self, cge_id: &str, entity_id: &str) -> (UpdateResult, usize) {
        let mut cleared = 0;
        let result = self.apply("unprepare_entity", |record, sheet| {
            if !sheet.cge.contains_key(cge_id) {
                return Ok(cge::cge_not_found(record, cge_id));
            }
            let (outcome, count) = cge::unprepare_entity(record, cge_id, entity_id);
            cleared = count;
            Ok(outcome)
        });
        (result, cleared)
    }

    /// Spends `cost` from a pool group. Spending more than is left fails
    /// unless `allow_overspend`.
    pub fn use_pool_for_cge(&mut self, cge_id: &str, cost: f64, allow_overspend: bool) -> UpdateResult {
        self.apply("use_pool", |record, sheet| {
            let used = cge::use_pool(
                record,
                sheet.cge.get(cge_id),
                &sheet.resources,
                cge_id,
                cost,
                allow_overspend,
            );
            let refused = used
                .outcome
                .warnings
                .iter()
                .any(|warning| warning.kind == WarningKind::InsufficientPool);
            if refused {
                return Err(UpdateResult::failure_with_warnings(
                    INSUFFICIENT_POOL,
                    used.outcome.warnings,
                ));
            }
            Ok(used.outcome)
        })
    }

    pub fn refresh_pool_for_cge(&mut self, cge_id: &str) -> UpdateResult {
        self.apply("refresh_pool", |record, sheet| {
            Ok(cge::refresh_pool(record, sheet.cge.get(cge_id), &sheet.resources, cge_id))
        })
    }

    // =========================================================================
    // Resources
    // =========================================================================

    pub fn consume_resource(&mut self, resource_id: &str, amount: Option<f64>) -> UpdateResult {
        self.apply("consume_resource", |record, sheet| {
            let resource = sheet
                .resource(resource_id)
                .ok_or_else(|| UpdateResult::failure(RESOURCE_NOT_FOUND))?;
            Ok(resources::consume_resource(record, resource, amount))
        })
    }

    pub fn recharge_resource(&mut self, resource_id: &str, amount: Option<f64>) -> UpdateResult {
        self.apply("recharge_resource", |record, sheet| {
            let resource = sheet
                .resource(resource_id)
                .ok_or_else(|| UpdateResult::failure(RESOURCE_NOT_FOUND))?;
            Ok(resources::recharge_resource(record, resource, amount))
        })
    }

    pub fn recharge_all_resources(&mut self) -> UpdateResult {
        self.apply("recharge_all_resources", |record, sheet| {
            if sheet.resources.is_empty() {
                return Err(UpdateResult::failure(NO_CALCULATED_RESOURCES));
            }
            Ok(resources::recharge_all_resources(record, sheet.resources.values()))
        })
    }

    /// Heals, recharges every resource and refreshes every CGE's slots.
    pub fn rest(&mut self) -> UpdateResult {
        self.apply("rest", |record, sheet| {
            let healing = sheet
                .substitution_values
                .get(REST_HEALING_KEY)
                .unwrap_or_else(|| f64::from(record.level()));
            let mut updated = with_hp_change(record, healing);

            updated = resources::recharge_all_resources(&updated, sheet.resources.values()).character;
            for cge_id in sheet.cge.keys() {
                // Groups already full only produce informational warnings.
                updated = cge::refresh_slots(&updated, cge_id).character;
            }
            Ok(OperationOutcome::new(updated))
        })
    }

    // =========================================================================
    // Buffs, items and hit points
    // =========================================================================

    pub fn toggle_buff(&mut self, buff_id: &str) -> UpdateResult {
        self.apply("toggle_buff", |record, _| {
            let mut updated = record.clone();
            let buff = updated
                .buffs
                .iter_mut()
                .find(|buff| buff.unique_id == buff_id)
                .ok_or_else(|| UpdateResult::failure(format!("Buff not found: {buff_id}")))?;
            buff.active = !buff.active;
            Ok(OperationOutcome::new(updated))
        })
    }

    pub fn toggle_item_equipped(&mut self, item_id: &str) -> UpdateResult {
        self.apply("toggle_item_equipped", |record, _| {
            let mut updated = record.clone();
            let item = updated
                .items
                .iter_mut()
                .find(|item| item.unique_id == item_id)
                .ok_or_else(|| UpdateResult::failure(format!("Item not found: {item_id}")))?;
            item.equipped = !item.equipped;
            Ok(OperationOutcome::new(updated))
        })
    }

    pub fn add_buff(&mut self, buff: Buff) -> UpdateResult {
        self.apply("add_buff", |record, _| {
            check_named("buff", &buff.unique_id, &buff.name)?;
            if record.buff(&buff.unique_id).is_some() {
                return Err(UpdateResult::failure(format!(
                    "Buff already exists: {}",
                    buff.unique_id
                )));
            }
            let mut updated = record.clone();
            updated.buffs.push(buff);
            Ok(OperationOutcome::new(updated))
        })
    }

    /// Replaces the buff carrying the same id.
    pub fn edit_buff(&mut self, buff: Buff) -> UpdateResult {
        self.apply("edit_buff", |record, _| {
            check_named("buff", &buff.unique_id, &buff.name)?;
            let mut updated = record.clone();
            let slot = updated
                .buffs
                .iter_mut()
                .find(|existing| existing.unique_id == buff.unique_id)
                .ok_or_else(|| {
                    UpdateResult::failure(format!("Buff not found: {}", buff.unique_id))
                })?;
            *slot = buff;
            Ok(OperationOutcome::new(updated))
        })
    }

    pub fn delete_buff(&mut self, buff_id: &str) -> UpdateResult {
        self.apply("delete_buff", |record, _| {
            if record.buff(buff_id).is_none() {
                return Err(UpdateResult::failure(format!("Buff not found: {buff_id}")));
            }
            let mut updated = record.clone();
            updated.buffs.retain(|buff| buff.unique_id != buff_id);
            Ok(OperationOutcome::new(updated))
        })
    }

    pub fn add_item(&mut self, item: Item) -> UpdateResult {
        self.apply("add_item", |record, _| {
            check_named("item", &item.unique_id, &item.name)?;
            if record.item(&item.unique_id).is_some() {
                return Err(UpdateResult::failure(format!(
                    "Item already exists: {}",
                    item.unique_id
                )));
            }
            let mut updated = record.clone();
            updated.items.push(item);
            Ok(OperationOutcome::new(updated))
        })
    }

    pub fn remove_item(&mut self, item_id: &str) -> UpdateResult {
        self.apply("remove_item", |record, _| {
            if record.item(item_id).is_none() {
                return Err(UpdateResult::failure(format!("Item not found: {item_id}")));
            }
            let mut updated = record.clone();
            updated.items.retain(|item| item.unique_id != item_id);
            Ok(OperationOutcome::new(updated))
        })
    }

    /// Replaces the item carrying the same id.
    pub fn update_item(&mut self, item: Item) -> UpdateResult {
        self.apply("update_item", |record, _| {
            check_named("item", &item.unique_id, &item.name)?;
            let mut updated = record.clone();
            let slot = updated
                .items
                .iter_mut()
                .find(|existing| existing.unique_id == item.unique_id)
                .ok_or_else(|| {
                    UpdateResult::failure(format!("Item not found: {}", item.unique_id))
                })?;
            *slot = item;
            Ok(OperationOutcome::new(updated))
        })
    }

    pub fn toggle_contextual_change(&mut self, contextual_id: &str) -> UpdateResult {
        self.apply("toggle_contextual_change", |record, _| {
            let exists = record
                .contextual_changes
                .iter()
                .any(|contextual| contextual.id == contextual_id);
            if !exists {
                return Err(UpdateResult::failure(format!(
                    "Contextual change not found: {contextual_id}"
                )));
            }
            let mut updated = record.clone();
            if !updated.active_contextual_changes.remove(contextual_id) {
                updated
                    .active_contextual_changes
                    .insert(contextual_id.to_string());
            }
            Ok(OperationOutcome::new(updated))
        })
    }

    /// Positive `delta` heals, negative deals damage. Healing stops at the
    /// maximum.
    pub fn update_hp(&mut self, delta: f64) -> UpdateResult {
        self.apply("update_hp", |record, _| {
            Ok(OperationOutcome::new(with_hp_change(record, delta)))
        })
    }
}

/// Refuses a buff or item without an id or a name.
fn check_named(what: &str, unique_id: &str, name: &str) -> Result<(), UpdateResult> {
    if unique_id.trim().is_empty() || name.trim().is_empty() {
        return Err(UpdateResult::failure(format!("Invalid {what}: id and name are required")));
    }
    Ok(())
}

fn with_hp_change(record: &CharacterRecord, delta: f64) -> CharacterRecord {
    let mut updated = record.clone();
    updated.hit_points.damage = (updated.hit_points.damage - delta).max(0.0);
    updated
}
