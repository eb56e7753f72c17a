//! Updater operations addressable by name.
//!
//! Command-line hosts name an operation and pass its arguments as strings,
//! e.g. `prepare wizard-spells 1 0 magic-missile` or `hp -7`. Buffs and
//! items are passed as one JSON argument.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use zukus_domain::{Buff, CharacterUpdater, Item, UpdateResult};

use super::error::CharacterSheetError;

const OVERSPEND_FLAG: &str = "--overspend";

/// One mutating [`CharacterUpdater`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetOperation {
    UseSlot { cge_id: String, level: i32 },
    RefreshSlots { cge_id: String },
    Prepare {
        cge_id: String,
        level: u32,
        index: u32,
        entity_id: String,
    },
    Unprepare { cge_id: String, level: u32, index: u32 },
    UnprepareEntity { cge_id: String, entity_id: String },
    UseBoundSlot { cge_id: String, slot_id: String },
    AddKnown {
        cge_id: String,
        entity_id: String,
        level: i32,
    },
    RemoveKnown { cge_id: String, entity_id: String },
    UsePool {
        cge_id: String,
        cost: f64,
        allow_overspend: bool,
    },
    RefreshPool { cge_id: String },
    ConsumeResource { resource_id: String, amount: Option<f64> },
    RechargeResource { resource_id: String, amount: Option<f64> },
    RechargeAllResources,
    Rest,
    ToggleBuff { buff_id: String },
    AddBuff { buff: Buff },
    EditBuff { buff: Buff },
    DeleteBuff { buff_id: String },
    ToggleItemEquipped { item_id: String },
    AddItem { item: Item },
    UpdateItem { item: Item },
    RemoveItem { item_id: String },
    ToggleContextualChange { contextual_id: String },
    UpdateHp { delta: f64 },
}

impl SheetOperation {
    /// Operation names with their argument synopsis.
    pub const USAGE: &'static [(&'static str, &'static str)] = &[
        ("use-slot", "<cge-id> <level>"),
        ("refresh-slots", "<cge-id>"),
        ("prepare", "<cge-id> <level> <index> <entity-id>"),
        ("unprepare", "<cge-id> <level> <index>"),
        ("unprepare-entity", "<cge-id> <entity-id>"),
        ("use-bound-slot", "<cge-id> <track:level-index>"),
        ("add-known", "<cge-id> <entity-id> <level>"),
        ("remove-known", "<cge-id> <entity-id>"),
        ("use-pool", "<cge-id> <cost> [--overspend]"),
        ("refresh-pool", "<cge-id>"),
        ("consume", "<resource-id> [amount]"),
        ("recharge", "<resource-id> [amount]"),
        ("recharge-all", ""),
        ("rest", ""),
        ("toggle-buff", "<buff-id>"),
        ("add-buff", "<buff-json>"),
        ("edit-buff", "<buff-json>"),
        ("delete-buff", "<buff-id>"),
        ("toggle-item", "<item-id>"),
        ("add-item", "<item-json>"),
        ("update-item", "<item-json>"),
        ("remove-item", "<item-id>"),
        ("toggle-context", "<contextual-change-id>"),
        ("hp", "<delta>"),
    ];

    pub fn parse(name: &str, args: &[String]) -> Result<Self, CharacterSheetError> {
        let args = Args { name: canonical(name)?, args };
        let operation = match args.name {
            "use-slot" => Self::UseSlot {
                cge_id: args.text(0)?,
                level: args.number(1)?,
            },
            "refresh-slots" => Self::RefreshSlots {
                cge_id: args.text(0)?,
            },
            "prepare" => Self::Prepare {
                cge_id: args.text(0)?,
                level: args.number(1)?,
                index: args.number(2)?,
                entity_id: args.text(3)?,
            },
            "unprepare" => Self::Unprepare {
                cge_id: args.text(0)?,
                level: args.number(1)?,
                index: args.number(2)?,
            },
            "unprepare-entity" => Self::UnprepareEntity {
                cge_id: args.text(0)?,
                entity_id: args.text(1)?,
            },
            "use-bound-slot" => Self::UseBoundSlot {
                cge_id: args.text(0)?,
                slot_id: args.text(1)?,
            },
            "add-known" => Self::AddKnown {
                cge_id: args.text(0)?,
                entity_id: args.text(1)?,
                level: args.number(2)?,
            },
            "remove-known" => Self::RemoveKnown {
                cge_id: args.text(0)?,
                entity_id: args.text(1)?,
            },
            "use-pool" => Self::UsePool {
                cge_id: args.text(0)?,
                cost: args.number(1)?,
                allow_overspend: args.flag(2, OVERSPEND_FLAG)?,
            },
            "refresh-pool" => Self::RefreshPool {
                cge_id: args.text(0)?,
            },
            "consume" => Self::ConsumeResource {
                resource_id: args.text(0)?,
                amount: args.optional_number(1)?,
            },
            "recharge" => Self::RechargeResource {
                resource_id: args.text(0)?,
                amount: args.optional_number(1)?,
            },
            "recharge-all" => Self::RechargeAllResources,
            "rest" => Self::Rest,
            "toggle-buff" => Self::ToggleBuff {
                buff_id: args.text(0)?,
            },
            "add-buff" => Self::AddBuff { buff: args.json(0)? },
            "edit-buff" => Self::EditBuff { buff: args.json(0)? },
            "delete-buff" => Self::DeleteBuff {
                buff_id: args.text(0)?,
            },
            "toggle-item" => Self::ToggleItemEquipped {
                item_id: args.text(0)?,
            },
            "add-item" => Self::AddItem { item: args.json(0)? },
            "update-item" => Self::UpdateItem { item: args.json(0)? },
            "remove-item" => Self::RemoveItem {
                item_id: args.text(0)?,
            },
            "toggle-context" => Self::ToggleContextualChange {
                contextual_id: args.text(0)?,
            },
            "hp" => Self::UpdateHp {
                delta: args.number(0)?,
            },
            other => return Err(CharacterSheetError::UnknownOperation(other.to_string())),
        };
        Ok(operation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UseSlot { .. } => "use-slot",
            Self::RefreshSlots { .. } => "refresh-slots",
            Self::Prepare { .. } => "prepare",
            Self::Unprepare { .. } => "unprepare",
            Self::UnprepareEntity { .. } => "unprepare-entity",
            Self::UseBoundSlot { .. } => "use-bound-slot",
            Self::AddKnown { .. } => "add-known",
            Self::RemoveKnown { .. } => "remove-known",
            Self::UsePool { .. } => "use-pool",
            Self::RefreshPool { .. } => "refresh-pool",
            Self::ConsumeResource { .. } => "consume",
            Self::RechargeResource { .. } => "recharge",
            Self::RechargeAllResources => "recharge-all",
            Self::Rest => "rest",
            Self::ToggleBuff { .. } => "toggle-buff",
            Self::AddBuff { .. } => "add-buff",
            Self::EditBuff { .. } => "edit-buff",
            Self::DeleteBuff { .. } => "delete-buff",
            Self::ToggleItemEquipped { .. } => "toggle-item",
            Self::AddItem { .. } => "add-item",
            Self::UpdateItem { .. } => "update-item",
            Self::RemoveItem { .. } => "remove-item",
            Self::ToggleContextualChange { .. } => "toggle-context",
            Self::UpdateHp { .. } => "hp",
        }
    }

    pub fn apply(&self, updater: &mut CharacterUpdater) -> UpdateResult {
        match self {
            Self::UseSlot { cge_id, level } => updater.use_slot_for_cge(cge_id, *level),
            Self::RefreshSlots { cge_id } => updater.refresh_slots_for_cge(cge_id),
            Self::Prepare {
                cge_id,
                level,
                index,
                entity_id,
            } => updater.prepare_entity_for_cge(cge_id, *level, *index, entity_id),
            Self::Unprepare {
                cge_id,
                level,
                index,
            } => updater.unprepare_slot_for_cge(cge_id, *level, *index),
            Self::UnprepareEntity { cge_id, entity_id } => {
                updater.unprepare_entity(cge_id, entity_id).0
            }
            Self::UseBoundSlot { cge_id, slot_id } => updater.use_bound_slot_for_cge(cge_id, slot_id),
            Self::AddKnown {
                cge_id,
                entity_id,
                level,
            } => updater.add_known_entity(cge_id, entity_id, *level),
            Self::RemoveKnown { cge_id, entity_id } => updater.remove_known_entity(cge_id, entity_id),
            Self::UsePool {
                cge_id,
                cost,
                allow_overspend,
            } => updater.use_pool_for_cge(cge_id, *cost, *allow_overspend),
            Self::RefreshPool { cge_id } => updater.refresh_pool_for_cge(cge_id),
            Self::ConsumeResource {
                resource_id,
                amount,
            } => updater.consume_resource(resource_id, *amount),
            Self::RechargeResource {
                resource_id,
                amount,
            } => updater.recharge_resource(resource_id, *amount),
            Self::RechargeAllResources => updater.recharge_all_resources(),
            Self::Rest => updater.rest(),
            Self::ToggleBuff { buff_id } => updater.toggle_buff(buff_id),
            Self::AddBuff { buff } => updater.add_buff(buff.clone()),
            Self::EditBuff { buff } => updater.edit_buff(buff.clone()),
            Self::DeleteBuff { buff_id } => updater.delete_buff(buff_id),
            Self::ToggleItemEquipped { item_id } => updater.toggle_item_equipped(item_id),
            Self::AddItem { item } => updater.add_item(item.clone()),
            Self::UpdateItem { item } => updater.update_item(item.clone()),
            Self::RemoveItem { item_id } => updater.remove_item(item_id),
            Self::ToggleContextualChange { contextual_id } => {
                updater.toggle_contextual_change(contextual_id)
            }
            Self::UpdateHp { delta } => updater.update_hp(*delta),
        }
    }
}

/// Maps a user-supplied name onto its `&'static` entry in [`SheetOperation::USAGE`].
fn canonical(name: &str) -> Result<&'static str, CharacterSheetError> {
    let normalized = name.replace('_', "-");
    SheetOperation::USAGE
        .iter()
        .map(|(known, _)| *known)
        .find(|known| *known == normalized)
        .ok_or_else(|| CharacterSheetError::UnknownOperation(name.to_string()))
}

struct Args<'a> {
    name: &'static str,
    args: &'a [String],
}

impl Args<'_> {
    fn text(&self, index: usize) -> Result<String, CharacterSheetError> {
        self.args.get(index).cloned().ok_or_else(|| {
            CharacterSheetError::invalid_arguments(self.name, format!("missing argument {}", index + 1))
        })
    }

    fn number<T: FromStr>(&self, index: usize) -> Result<T, CharacterSheetError> {
        let raw = self.text(index)?;
        raw.parse().map_err(|_| {
            CharacterSheetError::invalid_arguments(self.name, format!("{raw:?} is not a number"))
        })
    }

    fn optional_number<T: FromStr>(&self, index: usize) -> Result<Option<T>, CharacterSheetError> {
        if index < self.args.len() {
            self.number(index).map(Some)
        } else {
            Ok(None)
        }
    }

    fn json<T: DeserializeOwned>(&self, index: usize) -> Result<T, CharacterSheetError> {
        let raw = self.text(index)?;
        serde_json::from_str(&raw).map_err(|err| {
            CharacterSheetError::invalid_arguments(self.name, format!("invalid JSON: {err}"))
        })
    }

    fn flag(&self, index: usize, flag: &str) -> Result<bool, CharacterSheetError> {
        match self.args.get(index) {
            None => Ok(false),
            Some(value) if value == flag => Ok(true),
            Some(value) => Err(CharacterSheetError::invalid_arguments(
                self.name,
                format!("unexpected argument {value:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_every_listed_operation_name() {
        for (name, _) in SheetOperation::USAGE {
            let filler = args(&["x", "1", "2", "y"]);
            match SheetOperation::parse(name, &filler) {
                Ok(operation) => assert_eq!(operation.name(), *name),
                Err(CharacterSheetError::InvalidArguments { operation, .. }) => {
                    assert_eq!(operation, *name)
                }
                Err(other) => panic!("{name}: {other}"),
            }
        }
    }

    #[test]
    fn parses_prepare_arguments() {
        let operation =
            SheetOperation::parse("prepare", &args(&["wizard-spells", "1", "0", "magic-missile"]))
                .unwrap();

        assert_eq!(
            operation,
            SheetOperation::Prepare {
                cge_id: "wizard-spells".to_string(),
                level: 1,
                index: 0,
                entity_id: "magic-missile".to_string(),
            }
        );
    }

    #[test]
    fn accepts_snake_case_names_and_negative_numbers() {
        let operation = SheetOperation::parse("use_slot", &args(&["wizard-spells", "-1"])).unwrap();
        assert_eq!(
            operation,
            SheetOperation::UseSlot {
                cge_id: "wizard-spells".to_string(),
                level: -1,
            }
        );

        let hp = SheetOperation::parse("hp", &args(&["-7"])).unwrap();
        assert_eq!(hp, SheetOperation::UpdateHp { delta: -7.0 });
    }

    #[test]
    fn optional_amount_and_overspend_flag() {
        let consume = SheetOperation::parse("consume", &args(&["ki"])).unwrap();
        assert_eq!(
            consume,
            SheetOperation::ConsumeResource {
                resource_id: "ki".to_string(),
                amount: None,
            }
        );

        let pool =
            SheetOperation::parse("use-pool", &args(&["psion-powers", "5", "--overspend"])).unwrap();
        assert_eq!(
            pool,
            SheetOperation::UsePool {
                cge_id: "psion-powers".to_string(),
                cost: 5.0,
                allow_overspend: true,
            }
        );

        let err = SheetOperation::parse("use-pool", &args(&["psion-powers", "5", "--force"]));
        assert!(matches!(err, Err(CharacterSheetError::InvalidArguments { .. })));
    }

    #[test]
    fn parses_buff_and_item_json() {
        let operation = SheetOperation::parse(
            "add-buff",
            &args(&[r#"{"uniqueId":"bless","name":"Bless","active":true,"changes":[{"type":"ATTACK_ROLLS","formula":{"expression":"1"},"bonusTypeId":"MORALE"}]}"#]),
        )
        .unwrap();
        let SheetOperation::AddBuff { buff } = &operation else {
            panic!("expected add-buff, got {operation:?}");
        };
        assert_eq!(buff.unique_id, "bless");
        assert!(buff.active);
        assert_eq!(buff.changes.len(), 1);

        let item = SheetOperation::parse("update_item", &args(&[r#"{"uniqueId":"ring","name":"Ring"}"#]))
            .unwrap();
        assert_eq!(item.name(), "update-item");

        let removed = SheetOperation::parse("remove-item", &args(&["ring"])).unwrap();
        assert_eq!(
            removed,
            SheetOperation::RemoveItem {
                item_id: "ring".to_string()
            }
        );

        assert!(matches!(
            SheetOperation::parse("edit-buff", &args(&["{not json"])),
            Err(CharacterSheetError::InvalidArguments { operation: "edit-buff", .. })
        ));
    }

    #[test]
    fn rejects_unknown_names_and_bad_arguments() {
        assert!(matches!(
            SheetOperation::parse("fly", &[]),
            Err(CharacterSheetError::UnknownOperation(name)) if name == "fly"
        ));
        assert!(matches!(
            SheetOperation::parse("use-slot", &args(&["wizard-spells"])),
            Err(CharacterSheetError::InvalidArguments { operation: "use-slot", .. })
        ));
        assert!(matches!(
            SheetOperation::parse("prepare", &args(&["wizard-spells", "one", "0", "x"])),
            Err(CharacterSheetError::InvalidArguments { operation: "prepare", .. })
        ));
    }
}
