//! Content-supplied configuration of a CGE (casting/generic-entity group).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::formula::Formula;
use crate::resources::ResourceDefinition;
use crate::warnings::{Warning, WarningKind};

/// Class level to per-entity-level counts (index 0 is entity level 0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LevelTable(pub BTreeMap<u32, Vec<u32>>);

// Tables sit inside internally tagged enums, where serde buffers map keys
// as strings, so class levels are parsed from the key text.
impl<'de> Deserialize<'de> for LevelTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Vec<u32>>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(level, counts)| {
                level
                    .trim()
                    .parse::<u32>()
                    .map(|level| (level, counts))
                    .map_err(|_| serde::de::Error::custom(format!("invalid class level {level:?}")))
            })
            .collect()
    }
}

impl LevelTable {
    pub fn row(&self, class_level: u32) -> Option<&[u32]> {
        self.0.get(&class_level).map(Vec::as_slice)
    }

    /// `(entity level, count)` for every positive count in the row.
    pub fn positive_entries(&self, class_level: u32) -> Vec<(u32, u32)> {
        self.row(class_level)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(level, count)| (level as u32, *count))
            .collect()
    }
}

impl FromIterator<(u32, Vec<u32>)> for LevelTable {
    fn from_iter<T: IntoIterator<Item = (u32, Vec<u32>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshType {
    #[default]
    Daily,
    Encounter,
    Manual,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnownConfig {
    /// No limit (a wizard's spellbook).
    Unlimited,
    /// Limit per entity level (a sorcerer).
    LimitedPerEntityLevel { table: LevelTable },
    /// One total across levels, from a table (first column) or a formula.
    LimitedTotal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<LevelTable>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        formula: Option<Formula>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceConfig {
    /// At will, nothing is consumed.
    #[serde(rename = "NONE")]
    AtWill,
    #[serde(rename_all = "camelCase")]
    Slots {
        table: LevelTable,
        /// Variable prefix expanded to `@<bonusVariable>.<level>`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bonus_variable: Option<String>,
        #[serde(default)]
        refresh: RefreshType,
    },
    #[serde(rename_all = "camelCase")]
    Pool {
        resource_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cost_path: Option<String>,
        #[serde(default)]
        refresh: RefreshType,
    },
}

impl ResourceConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AtWill => "NONE",
            Self::Slots { .. } => "SLOTS",
            Self::Pool { .. } => "POOL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreparationConfig {
    /// Uses any known entity on the spot.
    #[serde(rename = "NONE")]
    Spontaneous,
    /// Binds an entity to a specific slot ahead of use.
    Bound,
}

impl PreparationConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Spontaneous => "NONE",
            Self::Bound => "BOUND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub resource: ResourceConfig,
    pub preparation: PreparationConfig,
}

impl Track {
    pub fn is_slots(&self) -> bool {
        matches!(self.resource, ResourceConfig::Slots { .. })
    }

    pub fn is_bound(&self) -> bool {
        self.preparation == PreparationConfig::Bound
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesConfig {
    /// Prefix of per-class variables (`wizard` gives `wizard.slot.1.max`).
    pub class_prefix: String,
    /// Prefix shared by every group of the same entity type.
    pub generic_prefix: String,
    pub caster_level_var: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgeLabels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgeConfig {
    pub id: String,
    pub class_id: String,
    /// "spell", "power", "maneuver", "invocation", ...
    pub entity_type: String,
    /// Field of the entity holding its level.
    pub level_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known: Option<KnownConfig>,
    pub tracks: Vec<Track>,
    pub variables: VariablesConfig,
    #[serde(default)]
    pub labels: CgeLabels,
}

impl CgeConfig {
    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == track_id)
    }

    /// Track that `prepare`/`unprepare` address.
    pub fn first_bound_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|track| track.is_bound() && track.is_slots())
    }

    /// Track that generic slot use addresses.
    pub fn primary_slot_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|track| track.is_slots())
    }

    pub fn first_pool_track(&self) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|track| matches!(track.resource, ResourceConfig::Pool { .. }))
    }

    /// Whether selections are tracked against a known list.
    pub fn tracks_known(&self) -> bool {
        self.known.is_some()
    }

    /// Structural problems, one warning each.
    pub fn validate(&self) -> Vec<Warning> {
        self.tracks
            .iter()
            .filter(|track| track.is_bound() && !track.is_slots())
            .map(|track| {
                Warning::new(
                    WarningKind::InvalidCgeConfig,
                    format!(
                        "Track \"{}\" of {}: BOUND preparation requires SLOTS resource",
                        track.id, self.id
                    ),
                )
                .with_context("cgeId", &self.id)
                .with_context("trackId", &track.id)
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Wizard-style: one slot track with bound preparation, unlimited book.
    pub fn wizard() -> CgeConfig {
        CgeConfig {
            id: "wizard-spells".to_string(),
            class_id: "wizard".to_string(),
            entity_type: "spell".to_string(),
            level_path: "@entity.level".to_string(),
            resources: Vec::new(),
            known: Some(KnownConfig::Unlimited),
            tracks: vec![Track {
                id: "base".to_string(),
                label: None,
                resource: ResourceConfig::Slots {
                    table: [
                        (1, vec![3, 1]),
                        (3, vec![4, 2, 1]),
                        (5, vec![4, 3, 2, 1]),
                    ]
                    .into_iter()
                    .collect(),
                    bonus_variable: None,
                    refresh: RefreshType::Daily,
                },
                preparation: PreparationConfig::Bound,
            }],
            variables: VariablesConfig {
                class_prefix: "wizard".to_string(),
                generic_prefix: "spell".to_string(),
                caster_level_var: "wizardCasterLevel".to_string(),
            },
            labels: CgeLabels::default(),
        }
    }

    /// Sorcerer-style: spontaneous slots, limited known per level.
    pub fn sorcerer() -> CgeConfig {
        CgeConfig {
            id: "sorcerer-spells".to_string(),
            class_id: "sorcerer".to_string(),
            entity_type: "spell".to_string(),
            level_path: "@entity.level".to_string(),
            resources: Vec::new(),
            known: Some(KnownConfig::LimitedPerEntityLevel {
                table: [(1, vec![4, 2]), (5, vec![6, 4, 2])].into_iter().collect(),
            }),
            tracks: vec![Track {
                id: "base".to_string(),
                label: None,
                resource: ResourceConfig::Slots {
                    table: [(1, vec![5, 3]), (5, vec![6, 6, 4])].into_iter().collect(),
                    bonus_variable: Some("bonusSpells".to_string()),
                    refresh: RefreshType::Daily,
                },
                preparation: PreparationConfig::Spontaneous,
            }],
            variables: VariablesConfig {
                class_prefix: "sorcerer".to_string(),
                generic_prefix: "spell".to_string(),
                caster_level_var: "sorcererCasterLevel".to_string(),
            },
            labels: CgeLabels::default(),
        }
    }

    /// Psion-style: power point pool, limited total known.
    pub fn psion() -> CgeConfig {
        CgeConfig {
            id: "psion-powers".to_string(),
            class_id: "psion".to_string(),
            entity_type: "power".to_string(),
            level_path: "@entity.level".to_string(),
            resources: vec![ResourceDefinition::new(
                "power-points",
                "Power Points",
                "@level * 2",
            )],
            known: Some(KnownConfig::LimitedTotal {
                table: None,
                formula: Some(Formula::expression("@level + 2")),
            }),
            tracks: vec![Track {
                id: "pool".to_string(),
                label: None,
                resource: ResourceConfig::Pool {
                    resource_id: "power-points".to_string(),
                    cost_path: None,
                    refresh: RefreshType::Daily,
                },
                preparation: PreparationConfig::Spontaneous,
            }],
            variables: VariablesConfig {
                class_prefix: "psion".to_string(),
                generic_prefix: "power".to_string(),
                caster_level_var: "psionManifesterLevel".to_string(),
            },
            labels: CgeLabels::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_content_config() {
        let json = serde_json::json!({
            "id": "cleric-spells",
            "classId": "cleric",
            "entityType": "spell",
            "levelPath": "@entity.level",
            "tracks": [
                {
                    "id": "base",
                    "resource": { "type": "SLOTS", "table": { "1": [3, 1] }, "refresh": "daily" },
                    "preparation": { "type": "BOUND" }
                },
                {
                    "id": "domain",
                    "resource": { "type": "SLOTS", "table": { "1": [0, 1] } },
                    "preparation": { "type": "BOUND" }
                }
            ],
            "variables": {
                "classPrefix": "cleric",
                "genericPrefix": "spell",
                "casterLevelVar": "clericCasterLevel"
            }
        });
        let config: CgeConfig = serde_json::from_value(json).unwrap();

        assert_eq!(config.tracks.len(), 2);
        assert_eq!(config.first_bound_track().map(|t| t.id.as_str()), Some("base"));
        assert!(config.known.is_none());
        assert!(config.validate().is_empty());
        match &config.tracks[1].resource {
            ResourceConfig::Slots { table, .. } => {
                assert_eq!(table.positive_entries(1), vec![(1, 1)]);
            }
            other => panic!("unexpected resource {other:?}"),
        }
    }

    #[test]
    fn bound_without_slots_is_reported() {
        let mut config = fixtures::psion();
        config.tracks[0].preparation = PreparationConfig::Bound;

        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::InvalidCgeConfig);
        assert_eq!(warnings[0].context("trackId"), Some("pool"));
    }

    #[test]
    fn level_table_rejects_non_numeric_levels() {
        let result = serde_json::from_value::<LevelTable>(serde_json::json!({ "first": [1] }));
        assert!(result.is_err());
    }

    #[test]
    fn level_table_skips_empty_counts() {
        let table: LevelTable = [(2, vec![3, 0, 1])].into_iter().collect();
        assert_eq!(table.positive_entries(2), vec![(0, 3), (2, 1)]);
        assert!(table.positive_entries(1).is_empty());
    }
}
