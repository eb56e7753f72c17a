//! CGE resource engine: slots, pools, bound preparations and known entities.
//!
//! Configuration comes from content ([`CgeConfig`]), player choices are
//! persisted on the record ([`CgeState`]), and each derivation merges the two
//! into a [`CalculatedCge`]. Operations take the record plus the last
//! calculation and return a new record. They never refuse an action; what
//! could not be done is reported as a warning.

mod calculate;
mod config;
mod known;
mod pool;
mod preparation;
mod slots;
mod state;

pub use calculate::{
    calculate_cge, compile_cge_variable_definitions, known_level_variable,
    known_total_variable, seed_bonus_variables, slot_variable, CalculatedBoundSlot,
    CalculatedCge, CalculatedKnownLimit, CalculatedPool, CalculatedSlot, CalculatedTrack,
    TOTAL_LEVEL,
};
pub use config::{
    CgeConfig, CgeLabels, KnownConfig, LevelTable, PreparationConfig, RefreshType,
    ResourceConfig, Track, VariablesConfig,
};
pub use known::{add_known_entity, remove_known_entity};
pub use pool::{entity_cost, refresh_pool, use_pool, PoolUse, DEFAULT_COST_PATH};
pub use preparation::{prepare_entity_in_slot, unprepare_entity, unprepare_slot};
pub use slots::{refresh_slots, use_bound_slot, use_slot};
pub use state::{CgeState, SlotId};

#[cfg(test)]
pub(crate) use config::fixtures;
pub(crate) use state::edit_cge_state;

use crate::character::CharacterRecord;
use crate::outcome::OperationOutcome;
use crate::warnings::{Warning, WarningKind};

pub(crate) fn cge_not_found(record: &CharacterRecord, cge_id: &str) -> OperationOutcome {
    OperationOutcome::unchanged(
        record,
        Warning::new(WarningKind::CgeNotFound, format!("CGE not found: {cge_id}"))
            .with_context("cgeId", cge_id),
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use super::*;
    use crate::custom_variables::resolve_custom_variables;
    use crate::resources::{calculate_resources, CalculatedResource};
    use crate::stacking::StackingPolicy;
    use crate::substitutions::SubstitutionTable;

    /// Resources and CGE of `config` for `record` at `class_level`.
    pub fn calculate(
        config: &CgeConfig,
        class_level: u32,
        record: &CharacterRecord,
    ) -> (CalculatedCge, BTreeMap<String, CalculatedResource>) {
        let policy = StackingPolicy::default();
        let mut subs = SubstitutionTable::new();
        subs.insert("level", f64::from(class_level));
        let mut warnings = Vec::new();

        seed_bonus_variables(config, class_level, &mut subs);
        let definitions = compile_cge_variable_definitions(config, class_level);
        resolve_custom_variables(&definitions, &[], &policy, &mut subs, &mut warnings);
        let resources = calculate_resources(
            &config.resources,
            &[],
            &record.resource_current_values,
            &policy,
            &mut subs,
            &mut warnings,
        );
        let cge = calculate_cge(
            config,
            class_level,
            record.cge_state.get(&config.id),
            &resources,
            &mut subs,
            &mut warnings,
        );
        (cge, resources)
    }
}
