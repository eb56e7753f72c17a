//! Stacking resolver
//!
//! Aggregates the [`SourceValue`]s of one derived quantity into a total.
//! Which bonus types stack with themselves is an injectable
//! [`StackingPolicy`]; REPLACEMENT is handled outside the table.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::changes::BonusType;
use crate::sources::SourceValue;

/// How positive values of one bonus type combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackRule {
    /// Every value counts.
    Stack,
    /// Only the highest value counts.
    HighestOnly,
}

/// Bonus type to stacking rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackingPolicy {
    rules: BTreeMap<BonusType, StackRule>,
    fallback: StackRule,
}

impl Default for StackingPolicy {
    fn default() -> Self {
        let rules = [
            BonusType::Base,
            BonusType::Untyped,
            BonusType::Circumstance,
            BonusType::Dodge,
            BonusType::Dexterity,
        ]
        .into_iter()
        .map(|bonus_type| (bonus_type, StackRule::Stack))
        .collect();

        Self {
            rules,
            fallback: StackRule::HighestOnly,
        }
    }
}

impl StackingPolicy {
    pub fn rule(&self, bonus_type: BonusType) -> StackRule {
        self.rules.get(&bonus_type).copied().unwrap_or(self.fallback)
    }

    /// Overrides the rule for one bonus type.
    pub fn with_rule(mut self, bonus_type: BonusType, rule: StackRule) -> Self {
        self.rules.insert(bonus_type, rule);
        self
    }

    /// Aggregates `sources` into a total.
    ///
    /// 1. Zero values are kept but not relevant.
    /// 2. The highest REPLACEMENT, if any, supersedes every BASE and every
    ///    lower REPLACEMENT.
    /// 3. Negative values always count.
    /// 4. Positive values of a stacking type sum; other types keep only
    ///    their highest value, the first one on ties.
    ///
    /// Output sources are ordered BASE and REPLACEMENT first, then by
    /// descending value, stable on input order.
    pub fn resolve(&self, mut sources: Vec<SourceValue>) -> StackedTotal {
        for source in sources.iter_mut() {
            source.relevant = source.value != 0.0 && source.value.is_finite();
        }

        let replacement = best_index(&sources, |source| {
            source.relevant && source.bonus_type_id == BonusType::Replacement
        });
        if let Some(winner) = replacement {
            for (index, source) in sources.iter_mut().enumerate() {
                let superseded = matches!(
                    source.bonus_type_id,
                    BonusType::Base | BonusType::Replacement
                );
                if superseded && index != winner {
                    source.relevant = false;
                }
            }
        }

        let mut best_by_type: BTreeMap<BonusType, usize> = BTreeMap::new();
        for (index, source) in sources.iter().enumerate() {
            let bonus_type = source.bonus_type_id;
            if !source.relevant
                || source.value < 0.0
                || bonus_type == BonusType::Replacement
                || self.rule(bonus_type) == StackRule::Stack
            {
                continue;
            }
            best_by_type
                .entry(bonus_type)
                .and_modify(|best| {
                    if source.value > sources[*best].value {
                        *best = index;
                    }
                })
                .or_insert(index);
        }
        for (index, source) in sources.iter_mut().enumerate() {
            let bonus_type = source.bonus_type_id;
            if let Some(best) = best_by_type.get(&bonus_type) {
                if source.relevant && source.value > 0.0 && *best != index {
                    source.relevant = false;
                }
            }
        }

        let total = sources
            .iter()
            .filter(|source| source.relevant)
            .map(|source| source.value)
            .sum();

        sources.sort_by(display_order);

        StackedTotal {
            total,
            source_values: sources,
        }
    }
}

fn best_index(sources: &[SourceValue], pred: impl Fn(&SourceValue) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, source) in sources.iter().enumerate() {
        if !pred(source) {
            continue;
        }
        match best {
            Some(current) if sources[current].value >= source.value => {}
            _ => best = Some(index),
        }
    }
    best
}

fn display_order(a: &SourceValue, b: &SourceValue) -> Ordering {
    let rank = |source: &SourceValue| match source.bonus_type_id {
        BonusType::Base | BonusType::Replacement => 0,
        _ => 1,
    };
    rank(a)
        .cmp(&rank(b))
        .then_with(|| b.value.total_cmp(&a.value))
}

/// Aggregated quantity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackedTotal {
    pub total: f64,
    pub source_values: Vec<SourceValue>,
}

/// Resolves with the default table.
pub fn resolve(sources: Vec<SourceValue>) -> StackedTotal {
    StackingPolicy::default().resolve(sources)
}
