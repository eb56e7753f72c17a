//! Custom variable resolver
//!
//! Custom variables are named, character-scoped values that other formulas
//! reference as `@customVariable.<id>`. Each variable may have many sources
//! (a definition's base sources plus every CUSTOM_VARIABLE change that
//! targets it), so they are stacked like any other quantity.
//!
//! Variables form a dependency graph. Evaluation follows Kahn's algorithm
//! over that graph. Variables on a cycle are still evaluated: references to
//! other members of their own cycle read as 0, and each cyclic variable
//! gets exactly one `circular_dependency` warning.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::changes::{BonusType, Change, ChangeKind, ChangeOrigin, OriginType};
use crate::formula::{Formula, CUSTOM_VARIABLE_PREFIX};
use crate::sources::{compile_sources, SourceValue};
use crate::stacking::StackingPolicy;
use crate::substitutions::SubstitutionTable;
use crate::warnings::{Warning, WarningKind};

/// Variable ids in this namespace are resource properties, computed by the
/// resources step instead.
pub const RESOURCE_NAMESPACE: &str = "resources.";

/// A base source seeded by a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseSource {
    pub formula: Formula,
    #[serde(default = "base_bonus_type")]
    pub bonus_type_id: BonusType,
    #[serde(default)]
    pub name: String,
}

fn base_bonus_type() -> BonusType {
    BonusType::Base
}

impl BaseSource {
    pub fn new(formula: impl Into<Formula>, bonus_type_id: BonusType, name: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            bonus_type_id,
            name: name.into(),
        }
    }
}

/// Explicit declaration of a custom variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomVariableDefinition {
    pub variable_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub base_sources: Vec<BaseSource>,
}

impl CustomVariableDefinition {
    /// Base sources as changes targeting this variable.
    pub fn to_changes(&self) -> Vec<Change> {
        self.base_sources
            .iter()
            .map(|base| {
                Change::new(
                    ChangeKind::CustomVariable {
                        unique_id: self.variable_id.clone(),
                    },
                    base.formula.clone(),
                    base.bonus_type_id,
                )
                .with_origin(ChangeOrigin::new(
                    OriginType::Other,
                    self.variable_id.clone(),
                    if base.name.is_empty() {
                        self.name.clone()
                    } else {
                        base.name.clone()
                    },
                ))
            })
            .collect()
    }
}

/// A resolved custom variable as it appears on the sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomVariable {
    pub unique_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub total_value: f64,
    pub sources: Vec<SourceValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomVariableResolution {
    /// Ordered by variable id.
    pub variables: Vec<CustomVariable>,
    /// Each cycle's members, sorted; cycles sorted by first member.
    pub cycles: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct Node {
    name: Option<String>,
    description: Option<String>,
    changes: Vec<Change>,
}

/// Substitution key for a custom variable.
pub fn custom_variable_key(id: &str) -> String {
    format!("{CUSTOM_VARIABLE_PREFIX}{id}")
}

/// Resolves every custom variable defined by `definitions` or targeted by a
/// CUSTOM_VARIABLE change in `changes`, writing `customVariable.<id>` into
/// `substitutions` as each one resolves.
pub fn resolve_custom_variables(
    definitions: &[CustomVariableDefinition],
    changes: &[Change],
    policy: &StackingPolicy,
    substitutions: &mut SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> CustomVariableResolution {
    let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
    for definition in definitions {
        let node = nodes.entry(definition.variable_id.clone()).or_default();
        node.name = Some(definition.name.clone());
        node.description = definition.description.clone();
        node.changes.extend(definition.to_changes());
    }
    for change in changes {
        if let Some(target) = change.custom_variable_target() {
            if target.starts_with(RESOURCE_NAMESPACE) {
                continue;
            }
            nodes
                .entry(target.to_string())
                .or_default()
                .changes
                .push(change.clone());
        }
    }

    // Edges point from a variable to the variables it reads.
    let dependencies: BTreeMap<&str, BTreeSet<&str>> = nodes
        .iter()
        .map(|(id, node)| {
            let deps = node
                .changes
                .iter()
                .flat_map(|change| change.formula.custom_variable_dependencies())
                .filter_map(|dep| nodes.get_key_value(dep.as_str()).map(|(key, _)| key.as_str()))
                .collect();
            (id.as_str(), deps)
        })
        .collect();

    let (order, remaining) = kahn_order(&dependencies, &BTreeMap::new());
    tracing::trace!(?order, "Custom variable evaluation order");

    let mut resolved: BTreeMap<String, CustomVariable> = BTreeMap::new();
    for id in &order {
        let variable = evaluate_node(id, &nodes[*id], policy, substitutions, warnings);
        substitutions.insert(custom_variable_key(id), variable.total_value);
        resolved.insert(id.to_string(), variable);
    }

    let mut cycles = Vec::new();
    if !remaining.is_empty() {
        let components = cyclic_components(&dependencies, &remaining);

        let mut component_of: BTreeMap<&str, &BTreeSet<&str>> = BTreeMap::new();
        for component in &components {
            for member in component {
                component_of.insert(*member, component);
            }
        }

        for component in &components {
            let members: Vec<String> = component.iter().map(|m| m.to_string()).collect();
            tracing::warn!(cycle = ?members, "Circular dependency between custom variables");
            for member in &members {
                warnings.push(
                    Warning::new(
                        WarningKind::CircularDependency,
                        format!(
                            "Custom variable {member} is part of a circular dependency: {}",
                            members.join(" -> ")
                        ),
                    )
                    .with_context("variableId", member)
                    .with_context("cycle", members.join(",")),
                );
            }
            cycles.push(members);
        }

        // Drop edges inside a cycle so what is left is a DAG.
        let ignored: BTreeMap<&str, BTreeSet<&str>> = component_of
            .iter()
            .map(|(id, component)| (*id, (*component).clone()))
            .collect();
        let remaining_deps: BTreeMap<&str, BTreeSet<&str>> = dependencies
            .iter()
            .filter(|(id, _)| remaining.contains(*id))
            .map(|(id, deps)| (*id, deps.clone()))
            .collect();
        let (late_order, _) = kahn_order(&remaining_deps, &ignored);

        for id in &late_order {
            let variable = match component_of.get(id) {
                Some(component) => {
                    let zeroed: Vec<(String, f64)> = component
                        .iter()
                        .map(|member| (custom_variable_key(member), 0.0))
                        .collect();
                    let snapshot = substitutions
                        .with_overrides(zeroed.iter().map(|(key, value)| (key.as_str(), *value)));
                    evaluate_node(id, &nodes[*id], policy, &snapshot, warnings)
                }
                None => evaluate_node(id, &nodes[*id], policy, substitutions, warnings),
            };
            substitutions.insert(custom_variable_key(id), variable.total_value);
            resolved.insert(id.to_string(), variable);
        }
    }

    CustomVariableResolution {
        variables: resolved.into_values().collect(),
        cycles,
    }
}

fn evaluate_node(
    id: &str,
    node: &Node,
    policy: &StackingPolicy,
    substitutions: &SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> CustomVariable {
    let sources = compile_sources(&node.changes, substitutions, warnings);
    let stacked = policy.resolve(sources);
    CustomVariable {
        unique_id: id.to_string(),
        name: node.name.clone().unwrap_or_else(|| id.to_string()),
        description: node.description.clone(),
        total_value: stacked.total,
        sources: stacked.source_values,
    }
}

/// Kahn's algorithm, smallest id first among ready nodes.
///
/// `ignored` lists, per node, dependencies that do not hold it back.
/// Returns the order and the nodes that never became ready.
fn kahn_order<'a>(
    dependencies: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    ignored: &BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> (Vec<&'a str>, BTreeSet<&'a str>) {
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (id, deps) in dependencies {
        let mut count = 0;
        for dep in deps {
            let skip = ignored.get(id).is_some_and(|set| set.contains(dep))
                || !dependencies.contains_key(dep);
            if skip {
                continue;
            }
            count += 1;
            dependents.entry(*dep).or_default().push(*id);
        }
        pending.insert(*id, count);
    }

    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(id) = ready.pop_first() {
        order.push(id);
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    let done: BTreeSet<&str> = order.iter().copied().collect();
    let remaining = dependencies
        .keys()
        .copied()
        .filter(|id| !done.contains(id))
        .collect();
    (order, remaining)
}

/// Strongly connected components among `remaining` that contain a cycle.
fn cyclic_components<'a>(
    dependencies: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    remaining: &BTreeSet<&'a str>,
) -> Vec<BTreeSet<&'a str>> {
    let reach: BTreeMap<&str, BTreeSet<&str>> = remaining
        .iter()
        .map(|id| (*id, reachable(dependencies, remaining, *id)))
        .collect();

    let mut components: Vec<BTreeSet<&str>> = Vec::new();
    let mut assigned: BTreeSet<&str> = BTreeSet::new();
    for id in remaining {
        if assigned.contains(id) || !reach[id].contains(id) {
            continue;
        }
        let component: BTreeSet<&str> = reach[id]
            .iter()
            .copied()
            .filter(|other| reach[other].contains(id))
            .collect();
        assigned.extend(component.iter().copied());
        components.push(component);
    }
    components
}

/// Nodes reachable from `start` through at least one edge.
fn reachable<'a>(
    dependencies: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    remaining: &BTreeSet<&'a str>,
    start: &'a str,
) -> BTreeSet<&'a str> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&str> = dependencies
        .get(start)
        .into_iter()
        .flatten()
        .copied()
        .collect();
    while let Some(id) = stack.pop() {
        if !remaining.contains(id) || !seen.insert(id) {
            continue;
        }
        stack.extend(dependencies.get(id).into_iter().flatten().copied());
    }
    seen
}
