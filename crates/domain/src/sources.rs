//! Source compiler: `Change` plus substitution table to `SourceValue`.

use serde::{Deserialize, Serialize};

use crate::changes::{BonusType, Change, OriginType};
use crate::substitutions::SubstitutionTable;
use crate::warnings::{Warning, WarningKind};

/// An evaluated change, with provenance kept for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceValue {
    pub source_unique_id: String,
    pub source_name: String,
    pub origin_type: OriginType,
    pub bonus_type_id: BonusType,
    pub value: f64,
    /// False when the stacking rules exclude this source from the total.
    pub relevant: bool,
}

impl SourceValue {
    /// A source that does not come from a change (class progressions, base
    /// ability scores, table values).
    pub fn fixed(
        source_unique_id: impl Into<String>,
        source_name: impl Into<String>,
        bonus_type_id: BonusType,
        value: f64,
    ) -> Self {
        Self {
            source_unique_id: source_unique_id.into(),
            source_name: source_name.into(),
            origin_type: OriginType::Base,
            bonus_type_id,
            value,
            relevant: true,
        }
    }
}

/// Evaluates `change` against `substitutions`.
///
/// Never fails: a formula that does not parse or evaluate yields 0 and an
/// `invalid_formula` warning.
pub fn compile_source(
    change: &Change,
    substitutions: &SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> SourceValue {
    let value = match change.formula.evaluate(substitutions) {
        Ok(evaluation) => {
            warnings.extend(evaluation.warnings);
            evaluation.value
        }
        Err(err) => {
            tracing::debug!(origin_id = %change.origin.origin_id, error = %err, "Formula failed to evaluate");
            warnings.push(
                Warning::new(
                    WarningKind::InvalidFormula,
                    format!("Invalid formula in {}: {err}", display_name(change)),
                )
                .with_context("originId", &change.origin.origin_id),
            );
            0.0
        }
    };

    SourceValue {
        source_unique_id: change.origin.origin_id.clone(),
        source_name: display_name(change).to_string(),
        origin_type: change.origin.origin_type,
        bonus_type_id: change.bonus_type_id,
        value,
        relevant: true,
    }
}

/// Compiles every change in order.
pub fn compile_sources<'a>(
    changes: impl IntoIterator<Item = &'a Change>,
    substitutions: &SubstitutionTable,
    warnings: &mut Vec<Warning>,
) -> Vec<SourceValue> {
    changes
        .into_iter()
        .map(|change| compile_source(change, substitutions, warnings))
        .collect()
}

fn display_name(change: &Change) -> &str {
    if change.origin.name.is_empty() {
        &change.origin.origin_id
    } else {
        &change.origin.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeKind, ChangeOrigin};

    fn bab_change(expression: &str) -> Change {
        Change::new(ChangeKind::Bab, expression, BonusType::Morale).with_origin(
            ChangeOrigin::new(OriginType::Spell, "heroism", "Heroism"),
        )
    }

    #[test]
    fn compiles_value_and_keeps_provenance() {
        let mut subs = SubstitutionTable::new();
        subs.insert("level", 6.0);
        let mut warnings = Vec::new();

        let source = compile_source(&bab_change("floor(@level / 3)"), &subs, &mut warnings);

        assert_eq!(source.value, 2.0);
        assert_eq!(source.source_unique_id, "heroism");
        assert_eq!(source.source_name, "Heroism");
        assert_eq!(source.origin_type, OriginType::Spell);
        assert_eq!(source.bonus_type_id, BonusType::Morale);
        assert!(source.relevant);
        assert!(warnings.is_empty());
    }

    #[test]
    fn invalid_formula_becomes_zero_with_warning() {
        let mut warnings = Vec::new();
        let source = compile_source(&bab_change("2 +"), &SubstitutionTable::new(), &mut warnings);

        assert_eq!(source.value, 0.0);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::InvalidFormula);
        assert_eq!(warnings[0].context("originId"), Some("heroism"));
    }
}
