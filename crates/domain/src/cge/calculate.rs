//! Per-derivation CGE computation.
//!
//! Slot and known limits are compiled into custom variable definitions
//! before custom variables resolve, so any change can raise them
//! (`CUSTOM_VARIABLE` targeting `wizard.slot.3.max`). This step then reads
//! the final values back and merges them with the persisted [`CgeState`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::{CgeConfig, CgeLabels, KnownConfig, LevelTable, ResourceConfig, Track};
use super::state::{CgeState, SlotId};
use crate::changes::BonusType;
use crate::custom_variables::{custom_variable_key, BaseSource, CustomVariableDefinition};
use crate::formula::Formula;
use crate::resources::CalculatedResource;
use crate::substitutions::SubstitutionTable;
use crate::warnings::{Warning, WarningKind};

/// Level used for limits that span all entity levels.
pub const TOTAL_LEVEL: i32 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedKnownLimit {
    pub level: i32,
    pub max: f64,
    pub current: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedBoundSlot {
    pub slot_id: SlotId,
    pub level: u32,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_entity_id: Option<String>,
    pub used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSlot {
    pub level: u32,
    pub max: u32,
    pub current: u32,
    /// Slots above the table value.
    pub bonus: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bound_slots: Vec<CalculatedBoundSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedPool {
    pub resource_id: String,
    pub max: f64,
    pub current: f64,
    pub min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedTrack {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub resource_type: String,
    pub preparation_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<CalculatedSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<CalculatedPool>,
}

impl CalculatedTrack {
    pub fn slot(&self, level: u32) -> Option<&CalculatedSlot> {
        self.slots.iter().find(|slot| slot.level == level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedCge {
    pub id: String,
    pub class_id: String,
    pub entity_type: String,
    pub class_level: u32,
    pub caster_level: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_limits: Vec<CalculatedKnownLimit>,
    pub tracks: Vec<CalculatedTrack>,
    #[serde(default)]
    pub labels: CgeLabels,
    pub config: CgeConfig,
}

impl CalculatedCge {
    pub fn track(&self, track_id: &str) -> Option<&CalculatedTrack> {
        self.tracks.iter().find(|track| track.id == track_id)
    }
}

// =============================================================================
// Variable names
// =============================================================================

/// Slot max variable. The first SLOTS track owns the short name.
pub fn slot_variable(config: &CgeConfig, track: &Track, level: u32) -> String {
    let prefix = &config.variables.class_prefix;
    let is_primary = config
        .primary_slot_track()
        .is_some_and(|primary| primary.id == track.id);
    if is_primary {
        format!("{prefix}.slot.{level}.max")
    } else {
        format!("{prefix}.{}.slot.{level}.max", track.id)
    }
}

fn slot_current_key(config: &CgeConfig, track: &Track, level: u32) -> String {
    let max_key = slot_variable(config, track, level);
    format!("{}.current", max_key.trim_end_matches(".max"))
}

pub fn known_level_variable(config: &CgeConfig, level: u32) -> String {
    format!("{}.known.{level}.max", config.variables.class_prefix)
}

pub fn known_total_variable(config: &CgeConfig) -> String {
    format!("{}.known.total.max", config.variables.class_prefix)
}

fn definition(
    variable_id: String,
    name: String,
    sources: Vec<BaseSource>,
) -> CustomVariableDefinition {
    CustomVariableDefinition {
        variable_id,
        name,
        description: None,
        base_sources: sources,
    }
}

/// Custom variable definitions seeding slot counts, known limits and the
/// caster level of one CGE at `class_level`.
pub fn compile_cge_variable_definitions(
    config: &CgeConfig,
    class_level: u32,
) -> Vec<CustomVariableDefinition> {
    if class_level == 0 {
        return Vec::new();
    }
    let class = &config.class_id;
    let mut definitions = Vec::new();

    match &config.known {
        Some(KnownConfig::LimitedPerEntityLevel { table }) => {
            for (level, max) in table.positive_entries(class_level) {
                definitions.push(definition(
                    known_level_variable(config, level),
                    format!("{class} known level {level}"),
                    vec![BaseSource::new(
                        max.to_string(),
                        BonusType::Base,
                        format!("{class} base known level {level}"),
                    )],
                ));
            }
        }
        Some(KnownConfig::LimitedTotal { table, formula }) => {
            let from_table = table
                .as_ref()
                .and_then(|table| table.row(class_level))
                .and_then(|row| row.first())
                .map(|max| Formula::expression(max.to_string()));
            if let Some(formula) = from_table.or_else(|| formula.clone()) {
                definitions.push(definition(
                    known_total_variable(config),
                    format!("{class} total known"),
                    vec![BaseSource::new(
                        formula,
                        BonusType::Base,
                        format!("{class} base known total"),
                    )],
                ));
            }
        }
        Some(KnownConfig::Unlimited) | None => {}
    }

    for track in &config.tracks {
        let ResourceConfig::Slots {
            table,
            bonus_variable,
            ..
        } = &track.resource
        else {
            continue;
        };
        for (level, max) in table.positive_entries(class_level) {
            let mut sources = vec![BaseSource::new(
                max.to_string(),
                BonusType::Base,
                format!("{class} base slots level {level}"),
            )];
            if let Some(bonus) = bonus_variable {
                let bonus = bonus.trim_start_matches('@');
                sources.push(BaseSource::new(
                    format!("@{bonus}.{level}"),
                    BonusType::Untyped,
                    format!("{bonus} level {level}"),
                ));
            }
            definitions.push(definition(
                slot_variable(config, track, level),
                format!("{class} slots level {level}"),
                sources,
            ));
        }
    }

    definitions.push(definition(
        config.variables.caster_level_var.clone(),
        format!("{class} caster level"),
        vec![BaseSource::new(
            class_level.to_string(),
            BonusType::Base,
            format!("{class} base caster level"),
        )],
    ));

    definitions
}

/// Seeds missing `<bonusVariable>.<level>` entries with 0 so slot
/// definitions referencing them resolve quietly.
pub fn seed_bonus_variables(
    config: &CgeConfig,
    class_level: u32,
    substitutions: &mut SubstitutionTable,
) {
    for track in &config.tracks {
        let ResourceConfig::Slots {
            table,
            bonus_variable: Some(bonus),
            ..
        } = &track.resource
        else {
            continue;
        };
        let bonus = bonus.trim_start_matches('@');
        for (level, _) in table.positive_entries(class_level) {
            let key = format!("{bonus}.{level}");
            if !substitutions.contains(&key) {
                substitutions.insert(key, 0.0);
            }
        }
    }
}

// =============================================================================
// Calculation
// =============================================================================

fn final_value(substitutions: &SubstitutionTable, variable: &str, fallback: f64) -> f64 {
    substitutions
        .get(&custom_variable_key(variable))
        .unwrap_or(fallback)
}

fn to_count(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.floor().min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// Computes one CGE. Callers skip CGEs whose class level is 0.
pub fn calculate_cge(
    config: &CgeConfig,
    class_level: u32,
    state: Option<&CgeState>,
    resources: &BTreeMap<String, CalculatedResource>,
    substitutions: &mut SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> CalculatedCge {
    let empty = CgeState::default();
    let state = state.unwrap_or(&empty);
    warnings.extend(config.validate());

    let known_limits = calculate_known_limits(config, class_level, state, substitutions, warnings);
    let tracks = config
        .tracks
        .iter()
        .map(|track| calculate_track(config, track, class_level, state, resources, substitutions, warnings))
        .collect();

    let caster_level = final_value(
        substitutions,
        &config.variables.caster_level_var,
        f64::from(class_level),
    );

    tracing::trace!(cge_id = %config.id, class_level, caster_level, "CGE calculated");

    CalculatedCge {
        id: config.id.clone(),
        class_id: config.class_id.clone(),
        entity_type: config.entity_type.clone(),
        class_level,
        caster_level,
        known_limits,
        tracks,
        labels: config.labels.clone(),
        config: config.clone(),
    }
}

fn calculate_known_limits(
    config: &CgeConfig,
    class_level: u32,
    state: &CgeState,
    substitutions: &mut SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> Vec<CalculatedKnownLimit> {
    let mut limits = Vec::new();
    match &config.known {
        Some(KnownConfig::LimitedPerEntityLevel { table }) => {
            for (level, base) in table.positive_entries(class_level) {
                let variable = known_level_variable(config, level);
                let max = final_value(substitutions, &variable, f64::from(base));
                substitutions.insert(variable, max);
                limits.push(CalculatedKnownLimit {
                    level: level as i32,
                    max,
                    current: state.known_by_level(level as i32).len(),
                });
            }
        }
        Some(KnownConfig::LimitedTotal { .. }) => {
            let variable = known_total_variable(config);
            if let Some(max) = substitutions.get(&custom_variable_key(&variable)) {
                substitutions.insert(variable, max);
                limits.push(CalculatedKnownLimit {
                    level: TOTAL_LEVEL,
                    max,
                    current: state.total_known(),
                });
            }
        }
        Some(KnownConfig::Unlimited) | None => {}
    }

    for limit in &limits {
        if limit.current as f64 > limit.max {
            warnings.push(
                Warning::new(
                    WarningKind::KnownLimitExceeded,
                    format!(
                        "{} knows {} entities at level {}, limit is {}",
                        config.id, limit.current, limit.level, limit.max
                    ),
                )
                .with_context("cgeId", &config.id)
                .with_context("level", limit.level),
            );
        }
    }
    limits
}

fn calculate_track(
    config: &CgeConfig,
    track: &Track,
    class_level: u32,
    state: &CgeState,
    resources: &BTreeMap<String, CalculatedResource>,
    substitutions: &mut SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> CalculatedTrack {
    let mut calculated = CalculatedTrack {
        id: track.id.clone(),
        label: track.label.clone(),
        resource_type: track.resource.type_name().to_string(),
        preparation_type: track.preparation.type_name().to_string(),
        slots: Vec::new(),
        pool: None,
    };

    match &track.resource {
        ResourceConfig::Slots { table, .. } => {
            calculated.slots =
                calculate_slots(config, track, table, class_level, state, substitutions);
        }
        ResourceConfig::Pool { resource_id, .. } => match resources.get(resource_id) {
            Some(resource) => {
                calculated.pool = Some(CalculatedPool {
                    resource_id: resource_id.clone(),
                    max: resource.max_value,
                    current: resource.current_value,
                    min: resource.min_value,
                });
            }
            None => warnings.push(
                Warning::new(
                    WarningKind::InvalidCgeConfig,
                    format!(
                        "Track \"{}\" of {} uses undefined resource {resource_id}",
                        track.id, config.id
                    ),
                )
                .with_context("cgeId", &config.id)
                .with_context("resourceId", resource_id),
            ),
        },
        ResourceConfig::AtWill => {}
    }

    calculated
}

fn calculate_slots(
    config: &CgeConfig,
    track: &Track,
    table: &LevelTable,
    class_level: u32,
    state: &CgeState,
    substitutions: &mut SubstitutionTable,
) -> Vec<CalculatedSlot> {
    let is_primary = config
        .primary_slot_track()
        .is_some_and(|primary| primary.id == track.id);

    table
        .positive_entries(class_level)
        .into_iter()
        .map(|(level, base)| {
            let variable = slot_variable(config, track, level);
            let max = to_count(final_value(substitutions, &variable, f64::from(base)));

            let remaining = if is_primary {
                state
                    .slot_current_values
                    .get(&level)
                    .copied()
                    .unwrap_or(max)
                    .min(max)
            } else {
                max
            };
            let current = remaining.saturating_sub(state.used_count(&track.id, level));

            let bound_slots = if track.is_bound() {
                (0..max)
                    .map(|index| {
                        let slot_id = SlotId::new(track.id.clone(), level, index);
                        CalculatedBoundSlot {
                            prepared_entity_id: state.prepared_entity(&slot_id).map(str::to_string),
                            used: state.is_used(&slot_id),
                            slot_id,
                            level,
                            index,
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };

            substitutions.insert(variable, f64::from(max));
            substitutions.insert(slot_current_key(config, track, level), f64::from(current));

            CalculatedSlot {
                level,
                max,
                current,
                bonus: i64::from(max) - i64::from(base),
                bound_slots,
            }
        })
        .collect()
}
