//! Consumable resources (ki, channel energy, rage rounds, CGE pools)
//!
//! Every property of a resource is computed like a custom variable: the
//! definition's formula as a BASE source plus any CUSTOM_VARIABLE change
//! targeting `resources.<id>.<property>`, stacked.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::changes::{BonusType, Change, ChangeKind, ChangeOrigin, OriginType};
use crate::character::CharacterRecord;
use crate::custom_variables::CustomVariable;
use crate::formula::Formula;
use crate::outcome::OperationOutcome;
use crate::sources::{compile_sources, SourceValue};
use crate::stacking::StackingPolicy;
use crate::substitutions::SubstitutionTable;
use crate::warnings::{Warning, WarningKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub resource_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_value_formula: Formula,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value_formula: Option<Formula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_charges_per_use_formula: Option<Formula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recharge_formula: Option<Formula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value_formula: Option<Formula>,
}

impl ResourceDefinition {
    pub fn new(resource_id: impl Into<String>, name: impl Into<String>, max: impl Into<Formula>) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: name.into(),
            description: None,
            max_value_formula: max.into(),
            min_value_formula: None,
            default_charges_per_use_formula: None,
            recharge_formula: None,
            initial_value_formula: None,
        }
    }
}

/// Persisted current value of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCurrentValue {
    pub current_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedResource {
    pub unique_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_value: f64,
    pub min_value: f64,
    pub current_value: f64,
    pub default_charges_per_use: f64,
    pub recharge_amount: f64,
    pub max_value_sources: Vec<SourceValue>,
    pub min_value_sources: Vec<SourceValue>,
    pub default_charges_per_use_sources: Vec<SourceValue>,
    pub recharge_amount_sources: Vec<SourceValue>,
}

impl CalculatedResource {
    /// Each property as a sheet variable keyed `resources.<id>.<property>`.
    pub fn custom_variables(&self) -> Vec<CustomVariable> {
        let property = |key: &str, label: &str, total_value: f64, sources: &[SourceValue]| {
            CustomVariable {
                unique_id: resource_key(&self.unique_id, key),
                name: format!("{} {label}", self.name),
                description: None,
                total_value,
                sources: sources.to_vec(),
            }
        };
        vec![
            property("current", "current", self.current_value, &[]),
            property(
                "defaultChargesPerUse",
                "charges per use",
                self.default_charges_per_use,
                &self.default_charges_per_use_sources,
            ),
            property("max", "max", self.max_value, &self.max_value_sources),
            property("min", "min", self.min_value, &self.min_value_sources),
            property(
                "rechargeAmount",
                "recharge amount",
                self.recharge_amount,
                &self.recharge_amount_sources,
            ),
        ]
    }
}

/// Substitution key of a resource property.
pub fn resource_key(resource_id: &str, property: &str) -> String {
    format!("resources.{resource_id}.{property}")
}

struct PropertyValue {
    value: f64,
    sources: Vec<SourceValue>,
}

fn calculate_property(
    definition: &ResourceDefinition,
    property: &str,
    formula: Formula,
    changes: &[Change],
    policy: &StackingPolicy,
    substitutions: &SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> PropertyValue {
    let key = resource_key(&definition.resource_id, property);
    let base = Change::new(
        ChangeKind::CustomVariable {
            unique_id: key.clone(),
        },
        formula,
        BonusType::Base,
    )
    .with_origin(ChangeOrigin::new(
        OriginType::Base,
        definition.resource_id.clone(),
        format!("{} {property}", definition.name),
    ));

    let extra = changes
        .iter()
        .filter(|change| change.custom_variable_target() == Some(key.as_str()));
    let sources = compile_sources(std::iter::once(&base).chain(extra), substitutions, warnings);
    let stacked = policy.resolve(sources);

    PropertyValue {
        value: stacked.total,
        sources: stacked.source_values,
    }
}

/// Computes every resource and writes `resources.<id>.*` substitutions.
///
/// Later definitions with an id already seen are ignored.
pub fn calculate_resources(
    definitions: &[ResourceDefinition],
    changes: &[Change],
    current_values: &BTreeMap<String, ResourceCurrentValue>,
    policy: &StackingPolicy,
    substitutions: &mut SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> BTreeMap<String, CalculatedResource> {
    let mut resources = BTreeMap::new();

    for definition in definitions {
        if resources.contains_key(&definition.resource_id) {
            continue;
        }
        let id = definition.resource_id.as_str();
        let subs: &SubstitutionTable = substitutions;
        let property = |name: &str, formula: Formula, warnings: &mut Vec<Warning>| {
            calculate_property(definition, name, formula, changes, policy, subs, warnings)
        };

        let max = property("max", definition.max_value_formula.clone(), warnings);
        let min = property(
            "min",
            definition.min_value_formula.clone().unwrap_or_else(|| Formula::expression("0")),
            warnings,
        );
        let charges = property(
            "defaultChargesPerUse",
            definition
                .default_charges_per_use_formula
                .clone()
                .unwrap_or_else(|| Formula::expression("1")),
            warnings,
        );
        let recharge = property(
            "rechargeAmount",
            definition.recharge_formula.clone().unwrap_or_else(|| Formula::expression("0")),
            warnings,
        );

        let current = match current_values.get(id) {
            Some(persisted) => persisted.current_value,
            None => match &definition.initial_value_formula {
                Some(initial) => property("initial", initial.clone(), warnings).value,
                None => max.value,
            },
        };
        let current = clamp(current, min.value, max.value);

        tracing::trace!(resource_id = id, max = max.value, current, "Resource calculated");

        resources.insert(
            definition.resource_id.clone(),
            CalculatedResource {
                unique_id: definition.resource_id.clone(),
                name: definition.name.clone(),
                description: definition.description.clone(),
                max_value: max.value,
                min_value: min.value,
                current_value: current,
                default_charges_per_use: charges.value,
                recharge_amount: recharge.value,
                max_value_sources: max.sources,
                min_value_sources: min.sources,
                default_charges_per_use_sources: charges.sources,
                recharge_amount_sources: recharge.sources,
            },
        );
    }

    for resource in resources.values() {
        let id = &resource.unique_id;
        substitutions.insert(resource_key(id, "max"), resource.max_value);
        substitutions.insert(resource_key(id, "min"), resource.min_value);
        substitutions.insert(resource_key(id, "current"), resource.current_value);
        substitutions.insert(
            resource_key(id, "defaultChargesPerUse"),
            resource.default_charges_per_use,
        );
        substitutions.insert(resource_key(id, "rechargeAmount"), resource.recharge_amount);
    }

    resources
}

/// `value` clamped into `[min, max]`, `min` winning when they cross.
pub(crate) fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}

// =============================================================================
// Operations
// =============================================================================

fn with_current(record: &CharacterRecord, resource_id: &str, value: f64) -> CharacterRecord {
    let mut updated = record.clone();
    updated.resource_current_values.insert(
        resource_id.to_string(),
        ResourceCurrentValue {
            current_value: value,
        },
    );
    updated
}

/// Spends `amount` (default: charges per use). Never goes below the minimum.
pub fn consume_resource(
    record: &CharacterRecord,
    resource: &CalculatedResource,
    amount: Option<f64>,
) -> OperationOutcome {
    let amount = amount.unwrap_or(resource.default_charges_per_use);
    let wanted = resource.current_value - amount;
    let next = clamp(wanted, resource.min_value, resource.max_value);

    let mut warnings = Vec::new();
    if wanted < resource.min_value {
        warnings.push(
            Warning::new(
                WarningKind::ResourceClamped,
                format!(
                    "{} cannot go below {}; clamped",
                    resource.name, resource.min_value
                ),
            )
            .with_context("resourceId", &resource.unique_id)
            .with_context("requested", amount),
        );
    }

    tracing::debug!(resource_id = %resource.unique_id, amount, current = next, "Resource consumed");
    OperationOutcome::with_warnings(with_current(record, &resource.unique_id, next), warnings)
}

/// Restores `amount` (default: recharge amount). Never goes above the maximum.
pub fn recharge_resource(
    record: &CharacterRecord,
    resource: &CalculatedResource,
    amount: Option<f64>,
) -> OperationOutcome {
    let amount = amount.unwrap_or(resource.recharge_amount);
    let next = clamp(
        resource.current_value + amount,
        resource.min_value,
        resource.max_value,
    );
    tracing::debug!(resource_id = %resource.unique_id, amount, current = next, "Resource recharged");
    OperationOutcome::new(with_current(record, &resource.unique_id, next))
}

/// Sets every resource to its maximum.
pub fn recharge_all_resources<'a>(
    record: &CharacterRecord,
    resources: impl IntoIterator<Item = &'a CalculatedResource>,
) -> OperationOutcome {
    let mut updated = record.clone();
    for resource in resources {
        updated.resource_current_values.insert(
            resource.unique_id.clone(),
            ResourceCurrentValue {
                current_value: resource.max_value,
            },
        );
    }
    OperationOutcome::new(updated)
}
