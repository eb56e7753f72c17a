//! The persisted character record.
//!
//! Everything here is player data: base scores, class levels, what is
//! equipped or active, and the runtime state of resources and CGEs. Derived
//! numbers never live on the record; they are recomputed by [`crate::derive`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cge::CgeState;
use crate::changes::{Ability, Change, ChangeOrigin, ContextualChange, OriginType, SpecialChange};
use crate::error::DomainError;
use crate::resources::ResourceCurrentValue;

// =============================================================================
// Classes
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BabProgression {
    Good,
    #[default]
    Average,
    Poor,
}

impl BabProgression {
    pub fn at_level(self, level: u32) -> u32 {
        match self {
            Self::Good => level,
            Self::Average => level * 3 / 4,
            Self::Poor => level / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveProgression {
    Good,
    #[default]
    Poor,
}

impl SaveProgression {
    pub fn at_level(self, level: u32) -> u32 {
        match self {
            Self::Good => 2 + level / 2,
            Self::Poor => level / 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSaves {
    #[serde(default)]
    pub fortitude: SaveProgression,
    #[serde(default)]
    pub reflex: SaveProgression,
    #[serde(default)]
    pub will: SaveProgression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLevels {
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub level: u32,
    #[serde(default)]
    pub bab_progression: BabProgression,
    #[serde(default)]
    pub saves: ClassSaves,
    #[serde(default = "default_hit_die")]
    pub hit_die: u32,
}

fn default_hit_die() -> u32 {
    8
}

impl ClassLevels {
    pub fn new(class_id: impl Into<String>, level: u32) -> Self {
        Self {
            class_id: class_id.into(),
            name: None,
            level,
            bab_progression: BabProgression::default(),
            saves: ClassSaves::default(),
            hit_die: default_hit_die(),
        }
    }
}

// =============================================================================
// Size
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeCategory {
    Fine,
    Diminutive,
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    Huge,
    Gargantuan,
    Colossal,
}

impl SizeCategory {
    const ORDER: [SizeCategory; 9] = [
        Self::Fine,
        Self::Diminutive,
        Self::Tiny,
        Self::Small,
        Self::Medium,
        Self::Large,
        Self::Huge,
        Self::Gargantuan,
        Self::Colossal,
    ];

    /// Steps away from Medium (Fine is -4, Colossal 4).
    pub fn value(self) -> i32 {
        match self {
            Self::Fine => -4,
            Self::Diminutive => -3,
            Self::Tiny => -2,
            Self::Small => -1,
            Self::Medium => 0,
            Self::Large => 1,
            Self::Huge => 2,
            Self::Gargantuan => 3,
            Self::Colossal => 4,
        }
    }

    /// Category at `value` steps from Medium, clamped to the scale.
    pub fn from_value(value: i32) -> Self {
        let index = (value + 4).clamp(0, 8) as usize;
        Self::ORDER[index]
    }

    /// Attack and AC modifier.
    pub fn modifier(self) -> i32 {
        match self {
            Self::Fine => 8,
            Self::Diminutive => 4,
            Self::Tiny => 2,
            Self::Small => 1,
            Self::Medium => 0,
            Self::Large => -1,
            Self::Huge => -2,
            Self::Gargantuan => -4,
            Self::Colossal => -8,
        }
    }
}

// =============================================================================
// Equipment and buffs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRanks {
    pub ability: Ability,
    #[serde(default)]
    pub ranks: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitPoints {
    /// Hit die rolls, without constitution.
    #[serde(default)]
    pub rolled: f64,
    #[serde(default)]
    pub damage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buff {
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_changes: Vec<SpecialChange>,
}

/// Changes of an item apply only while it is equipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub unique_id: String,
    pub name: String,
    #[serde(default)]
    pub equipped: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Change>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_changes: Vec<SpecialChange>,
}

// =============================================================================
// Record
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ability_scores: BTreeMap<Ability, f64>,
    #[serde(default)]
    pub classes: Vec<ClassLevels>,
    #[serde(default)]
    pub size: SizeCategory,
    #[serde(default)]
    pub base_speeds: BTreeMap<String, f64>,
    #[serde(default)]
    pub skill_ranks: BTreeMap<String, SkillRanks>,
    #[serde(default)]
    pub hit_points: HitPoints,
    /// Changes already resolved by the entity/level layer.
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub special_changes: Vec<SpecialChange>,
    #[serde(default)]
    pub buffs: Vec<Buff>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub contextual_changes: Vec<ContextualChange>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub active_contextual_changes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_current_values: BTreeMap<String, ResourceCurrentValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cge_state: BTreeMap<String, CgeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CharacterRecord {
    /// A level-0 character with every ability at 10.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ability_scores: Ability::ALL.into_iter().map(|a| (a, 10.0)).collect(),
            classes: Vec::new(),
            size: SizeCategory::default(),
            base_speeds: BTreeMap::new(),
            skill_ranks: BTreeMap::new(),
            hit_points: HitPoints::default(),
            changes: Vec::new(),
            special_changes: Vec::new(),
            buffs: Vec::new(),
            items: Vec::new(),
            contextual_changes: Vec::new(),
            active_contextual_changes: BTreeSet::new(),
            resource_current_values: BTreeMap::new(),
            cge_state: BTreeMap::new(),
            updated_at: None,
        }
    }

    pub fn ability_score(&self, ability: Ability) -> f64 {
        self.ability_scores.get(&ability).copied().unwrap_or(10.0)
    }

    pub fn class_level(&self, class_id: &str) -> u32 {
        self.classes
            .iter()
            .filter(|class| class.class_id == class_id)
            .map(|class| class.level)
            .sum()
    }

    /// Character level: the sum of every class level.
    pub fn level(&self) -> u32 {
        self.classes.iter().map(|class| class.level).sum()
    }

    pub fn buff(&self, buff_id: &str) -> Option<&Buff> {
        self.buffs.iter().find(|buff| buff.unique_id == buff_id)
    }

    pub fn item(&self, item_id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.unique_id == item_id)
    }

    /// Every change currently in effect: the record's own, active buffs,
    /// equipped items and confirmed contextual changes.
    ///
    /// Buff and item changes are attributed to the buff or item.
    pub fn collect_changes(&self) -> Vec<Change> {
        let mut changes = self.changes.clone();

        for buff in self.buffs.iter().filter(|buff| buff.active) {
            let origin = ChangeOrigin::new(OriginType::Buff, buff.unique_id.clone(), buff.name.clone());
            changes.extend(
                buff.changes
                    .iter()
                    .map(|change| change.clone().with_origin(origin.clone())),
            );
        }

        for item in self.items.iter().filter(|item| item.equipped) {
            let origin = ChangeOrigin::new(OriginType::Item, item.unique_id.clone(), item.name.clone());
            changes.extend(
                item.changes
                    .iter()
                    .map(|change| change.clone().with_origin(origin.clone())),
            );
        }

        for contextual in self
            .contextual_changes
            .iter()
            .filter(|contextual| self.active_contextual_changes.contains(&contextual.id))
        {
            changes.extend(contextual.changes.iter().cloned().map(|mut change| {
                if change.origin.origin_id.is_empty() {
                    change.origin.origin_id = contextual
                        .origin_id
                        .clone()
                        .unwrap_or_else(|| contextual.id.clone());
                }
                if change.origin.name.is_empty() {
                    change.origin.name = contextual.name.clone();
                }
                change
            }));
        }

        changes
    }

    /// Special changes of the record, active buffs and equipped items.
    pub fn collect_special_changes(&self) -> Vec<SpecialChange> {
        let buffs = self
            .buffs
            .iter()
            .filter(|buff| buff.active)
            .flat_map(|buff| buff.special_changes.iter());
        let items = self
            .items
            .iter()
            .filter(|item| item.equipped)
            .flat_map(|item| item.special_changes.iter());

        self.special_changes
            .iter()
            .chain(buffs)
            .chain(items)
            .cloned()
            .collect()
    }

    /// Checks the invariants derivation relies on.
    ///
    /// Only upstream bugs produce a record that fails here.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::invariant("Character id is empty"));
        }
        if let Some((ability, score)) = self
            .ability_scores
            .iter()
            .find(|(_, score)| !score.is_finite())
        {
            return Err(DomainError::invariant(format!(
                "Ability score {ability} is not a number: {score}"
            )));
        }
        let mut class_ids = BTreeSet::new();
        for class in &self.classes {
            if !class_ids.insert(class.class_id.as_str()) {
                return Err(DomainError::invariant(format!(
                    "Class {} appears more than once",
                    class.class_id
                )));
            }
        }
        if !self.hit_points.rolled.is_finite() || !self.hit_points.damage.is_finite() {
            return Err(DomainError::invariant("Hit points are not numbers"));
        }
        Ok(())
    }
}
