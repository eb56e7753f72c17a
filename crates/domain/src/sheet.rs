//! The derived character sheet.
//!
//! Pure output of [`crate::derive`]. Every total carries the sources that
//! produced it so the UI can explain the number.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cge::CalculatedCge;
use crate::changes::{Ability, ContextualChange};
use crate::character::SizeCategory;
use crate::custom_variables::CustomVariable;
use crate::resources::CalculatedResource;
use crate::sources::SourceValue;
use crate::stacking::StackedTotal;
use crate::substitutions::SubstitutionTable;
use crate::warnings::Warning;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedAbility {
    pub unique_id: Ability,
    pub base_score: f64,
    pub total_score: f64,
    pub modifier: f64,
    /// Modifier plus ABILITY_CHECKS bonuses.
    pub check_total: f64,
    pub source_values: Vec<SourceValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check_source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSize {
    pub base: SizeCategory,
    pub category: SizeCategory,
    pub value: f64,
    pub modifier: f64,
    pub source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedHitPoints {
    pub max: f64,
    pub current: f64,
    pub temporary: f64,
    pub damage: f64,
    pub source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedBab {
    /// Sum of class progressions.
    pub base: f64,
    pub total: f64,
    pub source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSavingThrow {
    pub base: f64,
    pub total: f64,
    pub ability: Ability,
    pub source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingThrows {
    pub fortitude: CalculatedSavingThrow,
    pub reflex: CalculatedSavingThrow,
    pub will: CalculatedSavingThrow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedArmorClass {
    pub total: f64,
    pub touch: f64,
    pub flat_footed: f64,
    pub natural: StackedTotal,
    pub source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSkill {
    pub unique_id: String,
    pub ability: Ability,
    pub ranks: f64,
    pub total: f64,
    pub source_values: Vec<SourceValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSheet {
    pub character_id: String,
    pub name: String,
    pub level: u32,
    pub abilities: BTreeMap<Ability, CalculatedAbility>,
    pub size: CalculatedSize,
    pub initiative: StackedTotal,
    pub hit_points: CalculatedHitPoints,
    pub bab: CalculatedBab,
    pub saving_throws: SavingThrows,
    pub armor_class: CalculatedArmorClass,
    pub skills: BTreeMap<String, CalculatedSkill>,
    pub speeds: BTreeMap<String, StackedTotal>,
    pub attack: StackedTotal,
    pub damage: StackedTotal,
    pub custom_variables: Vec<CustomVariable>,
    pub resources: BTreeMap<String, CalculatedResource>,
    pub cge: BTreeMap<String, CalculatedCge>,
    pub available_contextual_changes: Vec<ContextualChange>,
    pub substitution_values: SubstitutionTable,
    pub warnings: Vec<Warning>,
}

impl DerivedSheet {
    pub fn ability(&self, ability: Ability) -> Option<&CalculatedAbility> {
        self.abilities.get(&ability)
    }

    pub fn custom_variable(&self, unique_id: &str) -> Option<&CustomVariable> {
        self.custom_variables
            .iter()
            .find(|variable| variable.unique_id == unique_id)
    }

    pub fn resource(&self, resource_id: &str) -> Option<&CalculatedResource> {
        self.resources.get(resource_id)
    }
}
