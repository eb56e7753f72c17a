//! Derivation orchestrator: character record to [`DerivedSheet`].
//!
//! One pass seeds the substitution table from the record, then runs each
//! step in dependency order. A step reads the table, stacks its sources and
//! writes its totals back for the steps after it:
//!
//! size, ability scores, custom variables, initiative, hit points, BAB,
//! saving throws, armor class, skills, speeds, attack/damage, resources, CGE.
//!
//! Derivation never fails. Problems end up in `DerivedSheet::warnings`.

mod combat;
mod stats;

use std::collections::BTreeMap;

use crate::cge::{
    calculate_cge, compile_cge_variable_definitions, seed_bonus_variables, CgeConfig,
};
use crate::changes::{Change, ChangeKind, SpecialChange};
use crate::character::CharacterRecord;
use crate::custom_variables::{resolve_custom_variables, CustomVariableDefinition};
use crate::resources::{calculate_resources, CalculatedResource, ResourceDefinition};
use crate::sheet::DerivedSheet;
use crate::sources::{compile_sources, SourceValue};
use crate::stacking::{StackedTotal, StackingPolicy};
use crate::substitutions::SubstitutionTable;
use crate::warnings::{dedup_warnings, Warning};

/// Knobs of a derivation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeriveOptions {
    pub stacking: StackingPolicy,
}

/// Derives with the default stacking table.
pub fn derive(record: &CharacterRecord) -> DerivedSheet {
    derive_with(record, &DeriveOptions::default())
}

pub fn derive_with(record: &CharacterRecord, options: &DeriveOptions) -> DerivedSheet {
    let special_changes = record.collect_special_changes();
    let mut pass = Pass {
        record,
        changes: record.collect_changes(),
        policy: &options.stacking,
        substitutions: SubstitutionTable::new(),
        warnings: Vec::new(),
    };
    pass.seed();

    let active_cges: Vec<(&CgeConfig, u32)> = special_changes
        .iter()
        .filter_map(|special| match special {
            SpecialChange::CgeDefinition { config } => Some(config),
            _ => None,
        })
        .map(|config| (config, record.class_level(&config.class_id)))
        .filter(|(_, class_level)| *class_level > 0)
        .collect();

    let size = pass.size();
    let abilities = pass.abilities();

    let mut definitions: Vec<CustomVariableDefinition> = special_changes
        .iter()
        .filter_map(|special| match special {
            SpecialChange::CustomVariableDefinition(definition) => Some(definition.clone()),
            _ => None,
        })
        .collect();
    for (config, class_level) in &active_cges {
        seed_bonus_variables(config, *class_level, &mut pass.substitutions);
        definitions.extend(compile_cge_variable_definitions(config, *class_level));
    }
    let resolution = resolve_custom_variables(
        &definitions,
        &pass.changes,
        pass.policy,
        &mut pass.substitutions,
        &mut pass.warnings,
    );

    let initiative = pass.initiative();
    let hit_points = pass.hit_points();
    let bab = pass.bab();
    let saving_throws = pass.saving_throws();
    let armor_class = pass.armor_class();
    let skills = pass.skills();
    let speeds = pass.speeds();
    let attack = pass.stack_total("attack.bonus.total", Vec::new(), |kind| {
        matches!(kind, ChangeKind::AttackRolls)
    });
    let damage = pass.stack_total("damage.bonus.total", Vec::new(), |kind| {
        matches!(kind, ChangeKind::Damage)
    });

    let resource_definitions: Vec<ResourceDefinition> = special_changes
        .iter()
        .filter_map(|special| match special {
            SpecialChange::ResourceDefinition(definition) => Some(definition),
            _ => None,
        })
        .chain(active_cges.iter().flat_map(|(config, _)| config.resources.iter()))
        .cloned()
        .collect();
    let resources = calculate_resources(
        &resource_definitions,
        &pass.changes,
        &record.resource_current_values,
        pass.policy,
        &mut pass.substitutions,
        &mut pass.warnings,
    );

    let mut cge = BTreeMap::new();
    for (config, class_level) in &active_cges {
        let calculated = calculate_cge(
            config,
            *class_level,
            record.cge_state.get(&config.id),
            &resources,
            &mut pass.substitutions,
            &mut pass.warnings,
        );
        cge.entry(config.id.clone()).or_insert(calculated);
    }

    let mut custom_variables = resolution.variables;
    for variable in resources.values().flat_map(CalculatedResource::custom_variables) {
        if custom_variables.iter().all(|existing| existing.unique_id != variable.unique_id) {
            custom_variables.push(variable);
        }
    }
    custom_variables.sort_by(|a, b| a.unique_id.cmp(&b.unique_id));

    let warnings = dedup_warnings(pass.warnings);
    tracing::debug!(
        character_id = %record.id,
        level = record.level(),
        variables = custom_variables.len(),
        resources = resources.len(),
        cges = cge.len(),
        warnings = warnings.len(),
        "Character derived"
    );

    DerivedSheet {
        character_id: record.id.clone(),
        name: record.name.clone(),
        level: record.level(),
        abilities,
        size,
        initiative,
        hit_points,
        bab,
        saving_throws,
        armor_class,
        skills,
        speeds,
        attack,
        damage,
        custom_variables,
        resources,
        cge,
        available_contextual_changes: record.contextual_changes.clone(),
        substitution_values: pass.substitutions,
        warnings,
    }
}

// =============================================================================
// Pass state
// =============================================================================

pub(crate) struct Pass<'a> {
    record: &'a CharacterRecord,
    changes: Vec<Change>,
    policy: &'a StackingPolicy,
    substitutions: SubstitutionTable,
    warnings: Vec<Warning>,
}

impl Pass<'_> {
    /// Values known before any change is evaluated.
    fn seed(&mut self) {
        let record = self.record;
        let level = f64::from(record.level());
        let subs = &mut self.substitutions;

        subs.insert("level", level);
        subs.insert("casterLevel", level);
        subs.insert("hitDice", level);
        for class in &record.classes {
            subs.insert(format!("class.{}.level", class.class_id), f64::from(class.level));
        }
        subs.insert("bab.base", combat::base_attack_bonus(record));
        for (key, target, _) in combat::SAVES {
            subs.insert(format!("savingThrow.{key}.base"), combat::base_save(record, target));
        }
        subs.insert("size.base", f64::from(record.size.value()));
        for (speed, value) in &record.base_speeds {
            subs.insert(format!("speed.{speed}.base"), *value);
        }
        for (ability, score) in &record.ability_scores {
            subs.insert(format!("ability.{ability}.baseScore"), *score);
        }
    }

    /// Stacks `fixed` sources with every change whose kind matches.
    fn stack(&mut self, fixed: Vec<SourceValue>, matches: impl Fn(&ChangeKind) -> bool) -> StackedTotal {
        let mut sources = fixed;
        sources.extend(compile_sources(
            self.changes.iter().filter(|change| matches(&change.kind)),
            &self.substitutions,
            &mut self.warnings,
        ));
        self.policy.resolve(sources)
    }

    /// [`Self::stack`], writing the total under `key`.
    fn stack_total(
        &mut self,
        key: &str,
        fixed: Vec<SourceValue>,
        matches: impl Fn(&ChangeKind) -> bool,
    ) -> StackedTotal {
        let stacked = self.stack(fixed, matches);
        self.substitutions.insert(key, stacked.total);
        stacked
    }
}
