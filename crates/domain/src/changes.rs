//! Changes: atomic, data-only modifiers produced by any origin
//!
//! A [`Change`] names the quantity it targets (its [`ChangeKind`]), a
//! [`Formula`], a [`BonusType`] and where it came from. The kind is a closed
//! tagged union so every consumer matches it exhaustively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cge::CgeConfig;
use crate::custom_variables::CustomVariableDefinition;
use crate::error::DomainError;
use crate::formula::Formula;
use crate::resources::ResourceDefinition;

// =============================================================================
// Bonus types
// =============================================================================

/// Bonus type tag governing stacking.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BonusType {
    Base,
    Replacement,
    #[default]
    Untyped,
    Enhancement,
    Morale,
    Luck,
    Insight,
    Competence,
    Profane,
    Divine,
    Sacred,
    Resistance,
    Circumstance,
    Status,
    Dodge,
    Deflection,
    Misc,
    Size,
    Racial,
    Armor,
    Shield,
    NaturalArmor,
    Dexterity,
}

impl BonusType {
    pub const ALL: [BonusType; 23] = [
        Self::Base,
        Self::Replacement,
        Self::Untyped,
        Self::Enhancement,
        Self::Morale,
        Self::Luck,
        Self::Insight,
        Self::Competence,
        Self::Profane,
        Self::Divine,
        Self::Sacred,
        Self::Resistance,
        Self::Circumstance,
        Self::Status,
        Self::Dodge,
        Self::Deflection,
        Self::Misc,
        Self::Size,
        Self::Racial,
        Self::Armor,
        Self::Shield,
        Self::NaturalArmor,
        Self::Dexterity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "BASE",
            Self::Replacement => "REPLACEMENT",
            Self::Untyped => "UNTYPED",
            Self::Enhancement => "ENHANCEMENT",
            Self::Morale => "MORALE",
            Self::Luck => "LUCK",
            Self::Insight => "INSIGHT",
            Self::Competence => "COMPETENCE",
            Self::Profane => "PROFANE",
            Self::Divine => "DIVINE",
            Self::Sacred => "SACRED",
            Self::Resistance => "RESISTANCE",
            Self::Circumstance => "CIRCUMSTANCE",
            Self::Status => "STATUS",
            Self::Dodge => "DODGE",
            Self::Deflection => "DEFLECTION",
            Self::Misc => "MISC",
            Self::Size => "SIZE",
            Self::Racial => "RACIAL",
            Self::Armor => "ARMOR",
            Self::Shield => "SHIELD",
            Self::NaturalArmor => "NATURAL_ARMOR",
            Self::Dexterity => "DEXTERITY",
        }
    }
}

impl fmt::Display for BonusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BonusType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|bonus_type| bonus_type.as_str() == upper)
            .ok_or_else(|| DomainError::parse(format!("Unknown bonus type: {s}")))
    }
}

// =============================================================================
// Provenance
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginType {
    Item,
    Feat,
    ClassFeature,
    RaceFeature,
    Spell,
    Potion,
    Environment,
    #[default]
    Other,
    Base,
    SpecialFeature,
    Entity,
    Buff,
    Race,
}

/// Where a change came from, kept for audit and display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOrigin {
    #[serde(default)]
    pub origin_id: String,
    #[serde(default)]
    pub origin_type: OriginType,
    #[serde(default)]
    pub name: String,
}

impl ChangeOrigin {
    pub fn new(origin_type: OriginType, origin_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            origin_type,
            name: name.into(),
        }
    }
}

// =============================================================================
// Change kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub const ALL: [Ability; 6] = [
        Self::Strength,
        Self::Dexterity,
        Self::Constitution,
        Self::Intelligence,
        Self::Wisdom,
        Self::Charisma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strength => "strength",
            Self::Dexterity => "dexterity",
            Self::Constitution => "constitution",
            Self::Intelligence => "intelligence",
            Self::Wisdom => "wisdom",
            Self::Charisma => "charisma",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SavingThrowTarget {
    Fortitude,
    Reflex,
    Will,
    All,
}

impl SavingThrowTarget {
    /// Whether a change with this target applies to `save`.
    pub fn applies_to(self, save: SavingThrowTarget) -> bool {
        self == Self::All || self == save
    }
}

/// What a change modifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    #[serde(rename_all = "camelCase")]
    AbilityScore { ability_unique_id: Ability },
    #[serde(rename_all = "camelCase")]
    AbilityChecks { ability_unique_id: Ability },
    Ac,
    NaturalAc,
    #[serde(rename_all = "camelCase")]
    SavingThrow { saving_throw_unique_id: SavingThrowTarget },
    #[serde(rename_all = "camelCase")]
    Skill { skill_unique_id: String },
    #[serde(rename_all = "camelCase")]
    AbilitySkills { ability_unique_id: Ability },
    Bab,
    Initiative,
    #[serde(rename_all = "camelCase")]
    Speed { speed_unique_id: String },
    AttackRolls,
    Damage,
    TemporaryHp,
    Size,
    #[serde(rename_all = "camelCase")]
    CustomVariable { unique_id: String },
}

/// An atomic modifier. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub formula: Formula,
    #[serde(default)]
    pub bonus_type_id: BonusType,
    #[serde(flatten)]
    pub origin: ChangeOrigin,
}

impl Change {
    pub fn new(kind: ChangeKind, formula: impl Into<Formula>, bonus_type_id: BonusType) -> Self {
        Self {
            kind,
            formula: formula.into(),
            bonus_type_id,
            origin: ChangeOrigin::default(),
        }
    }

    pub fn with_origin(mut self, origin: ChangeOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Target custom variable id, when this is a CUSTOM_VARIABLE change.
    pub fn custom_variable_target(&self) -> Option<&str> {
        match &self.kind {
            ChangeKind::CustomVariable { unique_id } => Some(unique_id),
            _ => None,
        }
    }
}

// =============================================================================
// Special and contextual changes
// =============================================================================

/// Changes that define things rather than modify them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpecialChange {
    CustomVariableDefinition(CustomVariableDefinition),
    ResourceDefinition(ResourceDefinition),
    CgeDefinition { config: CgeConfig },
}

/// Changes applied only while the player confirms the situation
/// (flanking, charging, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualChange {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_round_trips_content_json() {
        let json = serde_json::json!({
            "type": "ABILITY_SCORE",
            "abilityUniqueId": "strength",
            "formula": { "expression": "2" },
            "bonusTypeId": "ENHANCEMENT",
            "originId": "belt-of-giant-strength",
            "originType": "item",
            "name": "Belt of Giant Strength"
        });
        let change: Change = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(
            change.kind,
            ChangeKind::AbilityScore {
                ability_unique_id: Ability::Strength
            }
        );
        assert_eq!(change.bonus_type_id, BonusType::Enhancement);
        assert_eq!(change.origin.origin_type, OriginType::Item);
        assert_eq!(serde_json::to_value(&change).unwrap(), json);
    }

    #[test]
    fn bonus_type_defaults_to_untyped() {
        let change: Change = serde_json::from_value(serde_json::json!({
            "type": "CUSTOM_VARIABLE",
            "uniqueId": "sneakAttackDice",
            "formula": { "expression": "1" }
        }))
        .unwrap();
        assert_eq!(change.bonus_type_id, BonusType::Untyped);
        assert_eq!(change.custom_variable_target(), Some("sneakAttackDice"));
    }

    #[test]
    fn bonus_type_parses_case_insensitively() {
        assert_eq!("natural_armor".parse::<BonusType>().unwrap(), BonusType::NaturalArmor);
        assert!("BOGUS".parse::<BonusType>().is_err());
    }

    #[test]
    fn saving_throw_all_applies_everywhere() {
        assert!(SavingThrowTarget::All.applies_to(SavingThrowTarget::Will));
        assert!(!SavingThrowTarget::Reflex.applies_to(SavingThrowTarget::Will));
    }
}
