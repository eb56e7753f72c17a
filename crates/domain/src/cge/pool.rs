//! Pool-backed groups (power points and the like).

use std::collections::BTreeMap;

use super::calculate::CalculatedCge;
use super::cge_not_found;
use super::config::{ResourceConfig, Track};
use crate::character::CharacterRecord;
use crate::formula::{evaluate, Evaluation, EvaluationError};
use crate::outcome::OperationOutcome;
use crate::resources::{consume_resource, recharge_all_resources, CalculatedResource};
use crate::substitutions::SubstitutionTable;
use crate::warnings::{Warning, WarningKind};

/// Cost formula used when a pool track names none.
pub const DEFAULT_COST_PATH: &str = "@entity.level";

#[derive(Debug, Clone, PartialEq)]
pub struct PoolUse {
    pub outcome: OperationOutcome,
    /// Whether anything was deducted.
    pub spent: bool,
}

/// Cost of using an entity from `track`, evaluated against the entity's own
/// fields exposed as `@entity.<field>`.
pub fn entity_cost(
    track: &Track,
    entity_fields: &BTreeMap<String, f64>,
) -> Result<Evaluation, EvaluationError> {
    let cost_path = match &track.resource {
        ResourceConfig::Pool {
            cost_path: Some(path),
            ..
        } => path.as_str(),
        _ => DEFAULT_COST_PATH,
    };
    let substitutions: SubstitutionTable = entity_fields
        .iter()
        .map(|(field, value)| (format!("entity.{field}"), *value))
        .collect();
    evaluate(cost_path, &substitutions)
}

fn pool_resource<'a>(
    cge: &CalculatedCge,
    resources: &'a BTreeMap<String, CalculatedResource>,
) -> Result<&'a CalculatedResource, Warning> {
    let resource_id = match cge.config.first_pool_track().map(|track| &track.resource) {
        Some(ResourceConfig::Pool { resource_id, .. }) => resource_id,
        _ => {
            return Err(Warning::new(
                WarningKind::InvalidCgeConfig,
                format!("{} has no pool track", cge.id),
            )
            .with_context("cgeId", &cge.id))
        }
    };
    resources.get(resource_id).ok_or_else(|| {
        Warning::new(
            WarningKind::InvalidCgeConfig,
            format!("{} uses undefined resource {resource_id}", cge.id),
        )
        .with_context("cgeId", &cge.id)
        .with_context("resourceId", resource_id)
    })
}

/// Spends `cost` from the group's pool.
///
/// A cost above the current value is refused unless `allow_overspend`; an
/// allowed overspend clamps at the resource minimum.
pub fn use_pool(
    record: &CharacterRecord,
    cge: Option<&CalculatedCge>,
    resources: &BTreeMap<String, CalculatedResource>,
    cge_id: &str,
    cost: f64,
    allow_overspend: bool,
) -> PoolUse {
    let refused = |outcome| PoolUse {
        outcome,
        spent: false,
    };
    let Some(cge) = cge else {
        return refused(cge_not_found(record, cge_id));
    };
    let resource = match pool_resource(cge, resources) {
        Ok(resource) => resource,
        Err(warning) => return refused(OperationOutcome::unchanged(record, warning)),
    };

    if cost > resource.current_value && !allow_overspend {
        return refused(OperationOutcome::unchanged(
            record,
            Warning::new(
                WarningKind::InsufficientPool,
                format!(
                    "{} has {} points, {cost} needed",
                    resource.name, resource.current_value
                ),
            )
            .with_context("cgeId", cge_id)
            .with_context("resourceId", &resource.unique_id)
            .with_context("cost", cost),
        ));
    }

    tracing::debug!(cge_id, cost, allow_overspend, "Pool spent");
    PoolUse {
        outcome: consume_resource(record, resource, Some(cost)),
        spent: true,
    }
}

/// Fills the group's pool to its maximum.
pub fn refresh_pool(
    record: &CharacterRecord,
    cge: Option<&CalculatedCge>,
    resources: &BTreeMap<String, CalculatedResource>,
    cge_id: &str,
) -> OperationOutcome {
    let Some(cge) = cge else {
        return cge_not_found(record, cge_id);
    };
    match pool_resource(cge, resources) {
        Ok(resource) => recharge_all_resources(record, [resource]),
        Err(warning) => OperationOutcome::unchanged(record, warning),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{fixtures, testing};
    use super::*;
    use crate::resources::ResourceCurrentValue;

    fn psion_with(points: f64) -> CharacterRecord {
        let mut record = CharacterRecord::new("c1", "Psion");
        record.resource_current_values.insert(
            "power-points".to_string(),
            ResourceCurrentValue {
                current_value: points,
            },
        );
        record
    }

    fn points(record: &CharacterRecord) -> f64 {
        record.resource_current_values["power-points"].current_value
    }

    #[test]
    fn overspending_requires_explicit_permission() {
        let record = psion_with(4.0);
        let (cge, resources) = testing::calculate(&fixtures::psion(), 5, &record);
        assert_eq!(cge.tracks[0].pool.as_ref().map(|pool| pool.current), Some(4.0));

        let refused = use_pool(&record, Some(&cge), &resources, "psion-powers", 5.0, false);
        assert!(!refused.spent);
        assert_eq!(refused.outcome.character, record);
        assert_eq!(refused.outcome.warnings[0].kind, WarningKind::InsufficientPool);

        let allowed = use_pool(&record, Some(&cge), &resources, "psion-powers", 5.0, true);
        assert!(allowed.spent);
        assert_eq!(points(&allowed.outcome.character), 0.0);
        assert_eq!(allowed.outcome.warnings[0].kind, WarningKind::ResourceClamped);
    }

    #[test]
    fn affordable_costs_are_deducted() {
        let record = psion_with(10.0);
        let (cge, resources) = testing::calculate(&fixtures::psion(), 5, &record);

        let used = use_pool(&record, Some(&cge), &resources, "psion-powers", 3.0, false);

        assert!(used.spent);
        assert!(used.outcome.warnings.is_empty());
        assert_eq!(points(&used.outcome.character), 7.0);
    }

    #[test]
    fn refresh_fills_the_pool() {
        let record = psion_with(1.0);
        let (cge, resources) = testing::calculate(&fixtures::psion(), 5, &record);

        let refreshed = refresh_pool(&record, Some(&cge), &resources, "psion-powers");
        assert_eq!(points(&refreshed.character), 10.0);
    }

    #[test]
    fn slot_groups_have_no_pool() {
        let record = CharacterRecord::new("c1", "Mialee");
        let (cge, resources) = testing::calculate(&fixtures::wizard(), 1, &record);

        let used = use_pool(&record, Some(&cge), &resources, "wizard-spells", 1.0, true);
        assert!(!used.spent);
        assert_eq!(used.outcome.warnings[0].kind, WarningKind::InvalidCgeConfig);
    }

    #[test]
    fn entity_cost_reads_entity_fields() {
        let track = fixtures::psion().tracks.remove(0);
        let fields = BTreeMap::from([("level".to_string(), 3.0)]);
        assert_eq!(entity_cost(&track, &fields).unwrap().value, 3.0);

        let mut custom = track.clone();
        custom.resource = ResourceConfig::Pool {
            resource_id: "power-points".to_string(),
            cost_path: Some("@entity.level * 2 - 1".to_string()),
            refresh: Default::default(),
        };
        assert_eq!(entity_cost(&custom, &fields).unwrap().value, 5.0);
    }
}
