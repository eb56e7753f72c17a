//! Formula evaluation
//!
//! Two formula shapes arrive from content:
//! - normal: `{ "expression": "1d8 + @ability.strength.modifier" }`
//! - switch: a switch expression compared against ordered cases, first match
//!   wins, `defaultValue` otherwise.
//!
//! Evaluation is pure: the same formula and substitution table always give
//! the same value and the same warnings.

mod parser;

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::substitutions::SubstitutionTable;
use crate::warnings::Warning;

/// Placeholder namespace for custom variables.
pub const CUSTOM_VARIABLE_PREFIX: &str = "customVariable.";

/// Error when parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// The expression is empty or whitespace
    #[error("Empty expression")]
    Empty,
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Wrong number of arguments for {function}: {found}")]
    Arity { function: String, found: usize },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("Expression has more than {0} tokens")]
    TooLong(usize),
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    /// Unknown placeholders met along the way.
    pub warnings: Vec<Warning>,
}

/// Evaluates a single arithmetic expression.
pub fn evaluate(
    expression: &str,
    substitutions: &SubstitutionTable,
) -> Result<Evaluation, EvaluationError> {
    let expr = parser::parse(expression)?;
    let mut warnings = Vec::new();
    let value = expr.eval(substitutions, &mut warnings)?;
    Ok(Evaluation { value, warnings })
}

// =============================================================================
// Formula shapes
// =============================================================================

/// A content-supplied formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Formula {
    Switch(SwitchFormula),
    Normal(NormalFormula),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalFormula {
    pub expression: String,
}

/// Marker for the `"type": "switch"` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchTag {
    Switch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchFormula {
    #[serde(rename = "type")]
    pub tag: SwitchTag,
    pub switch_expression: String,
    #[serde(deserialize_with = "deserialize_cases")]
    pub cases: Vec<SwitchCase>,
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCase {
    pub case_value: String,
    #[serde(default)]
    pub operator: ComparisonOperator,
    pub result_expression: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl ComparisonOperator {
    fn compare_numbers(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Gt => lhs > rhs,
            Self::Le => lhs <= rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    /// Textual comparison only knows equality.
    fn compare_text(self, lhs: &str, rhs: &str) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            _ => false,
        }
    }
}

/// Entries of the older `{ "caseValue": "result" }` object, in file order.
struct LegacyCases(Vec<(String, String)>);

impl<'de> Deserialize<'de> for LegacyCases {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LegacyCasesVisitor;

        impl<'de> Visitor<'de> for LegacyCasesVisitor {
            type Value = LegacyCases;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of case values to result expressions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(LegacyCases(entries))
            }
        }

        deserializer.deserialize_map(LegacyCasesVisitor)
    }
}

/// Accepts the case list, or the older `{ "caseValue": "result" }` object
/// whose entries become `==` cases tried in the order they are written.
fn deserialize_cases<'de, D>(deserializer: D) -> Result<Vec<SwitchCase>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Cases {
        List(Vec<SwitchCase>),
        Legacy(LegacyCases),
    }

    Ok(match Cases::deserialize(deserializer)? {
        Cases::List(cases) => cases,
        Cases::Legacy(LegacyCases(entries)) => entries
            .into_iter()
            .map(|(case_value, result_expression)| SwitchCase {
                case_value,
                operator: ComparisonOperator::Eq,
                result_expression,
            })
            .collect(),
    })
}

impl Formula {
    /// Normal formula from an expression.
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Normal(NormalFormula {
            expression: expression.into(),
        })
    }

    pub fn evaluate(&self, substitutions: &SubstitutionTable) -> Result<Evaluation, EvaluationError> {
        match self {
            Self::Normal(normal) => evaluate(&normal.expression, substitutions),
            Self::Switch(switch) => switch.evaluate(substitutions),
        }
    }

    /// Every expression string this formula contains.
    pub fn parts(&self) -> Vec<&str> {
        match self {
            Self::Normal(normal) => vec![normal.expression.as_str()],
            Self::Switch(switch) => {
                let mut parts = vec![switch.switch_expression.as_str()];
                for case in &switch.cases {
                    parts.push(case.case_value.as_str());
                    parts.push(case.result_expression.as_str());
                }
                parts.push(switch.default_value.as_str());
                parts
            }
        }
    }

    /// Names referenced as `@customVariable.<name>` anywhere in the formula.
    pub fn custom_variable_dependencies(&self) -> BTreeSet<String> {
        self.parts()
            .into_iter()
            .flat_map(parser::scan_placeholders)
            .filter_map(|name| {
                name.strip_prefix(CUSTOM_VARIABLE_PREFIX)
                    .filter(|rest| !rest.is_empty())
                    .map(str::to_string)
            })
            .collect()
    }
}

impl Default for Formula {
    fn default() -> Self {
        Self::expression("0")
    }
}

impl From<&str> for Formula {
    fn from(expression: &str) -> Self {
        Self::expression(expression)
    }
}

impl From<String> for Formula {
    fn from(expression: String) -> Self {
        Self::expression(expression)
    }
}

impl SwitchFormula {
    fn evaluate(&self, substitutions: &SubstitutionTable) -> Result<Evaluation, EvaluationError> {
        let switch_value = evaluate(&self.switch_expression, substitutions).ok();
        let switch_text = parser::substitute_text(&self.switch_expression, substitutions);
        let mut warnings = Vec::new();

        for case in &self.cases {
            let matched = match (&switch_value, evaluate(&case.case_value, substitutions).ok()) {
                (Some(lhs), Some(rhs)) => case.operator.compare_numbers(lhs.value, rhs.value),
                _ => {
                    let case_text = parser::substitute_text(&case.case_value, substitutions);
                    case.operator.compare_text(&switch_text, &case_text)
                }
            };
            if matched {
                if let Some(lhs) = &switch_value {
                    warnings.extend(lhs.warnings.iter().cloned());
                }
                let mut result = evaluate(&case.result_expression, substitutions)?;
                warnings.append(&mut result.warnings);
                return Ok(Evaluation {
                    value: result.value,
                    warnings,
                });
            }
        }

        evaluate(&self.default_value, substitutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warnings::WarningKind;

    fn subs(entries: &[(&str, f64)]) -> SubstitutionTable {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn evaluates_placeholders() {
        let table = subs(&[("ability.strength.modifier", 3.0), ("level", 5.0)]);
        let result = evaluate("1d8 + @ability.strength.modifier", &table).unwrap();
        assert_eq!(result.value, 7.5);
        assert!(result.warnings.is_empty());

        let result = evaluate("@level-1", &table).unwrap();
        assert_eq!(result.value, 4.0);
    }

    #[test]
    fn unknown_placeholder_is_zero_with_warning() {
        let result = evaluate("@missing.value + 2", &SubstitutionTable::new()).unwrap();
        assert_eq!(result.value, 2.0);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::UnknownPlaceholder);
        assert_eq!(result.warnings[0].context("placeholder"), Some("missing.value"));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            evaluate("4 / (2 - 2)", &SubstitutionTable::new()),
            Err(EvaluationError::DivisionByZero)
        );
    }

    #[test]
    fn switch_takes_first_matching_case() {
        let json = serde_json::json!({
            "type": "switch",
            "switchExpression": "@level",
            "cases": [
                { "caseValue": "5", "operator": ">=", "resultExpression": "3" },
                { "caseValue": "1", "operator": ">=", "resultExpression": "1" }
            ],
            "defaultValue": "0"
        });
        let formula: Formula = serde_json::from_value(json).unwrap();

        assert_eq!(formula.evaluate(&subs(&[("level", 7.0)])).unwrap().value, 3.0);
        assert_eq!(formula.evaluate(&subs(&[("level", 3.0)])).unwrap().value, 1.0);
        assert_eq!(formula.evaluate(&subs(&[("level", 0.0)])).unwrap().value, 0.0);
    }

    #[test]
    fn legacy_cases_keep_written_order() {
        let json = r#"{
            "type": "switch",
            "switchExpression": "3",
            "cases": { "3": "30", "1 + 2": "12" },
            "defaultValue": "0"
        }"#;
        let formula: Formula = serde_json::from_str(json).unwrap();

        let Formula::Switch(switch) = &formula else {
            panic!("expected a switch formula");
        };
        let values: Vec<&str> = switch.cases.iter().map(|case| case.case_value.as_str()).collect();
        assert_eq!(values, ["3", "1 + 2"]);
        assert_eq!(formula.evaluate(&SubstitutionTable::new()).unwrap().value, 30.0);
    }

    #[test]
    fn switch_compares_text_when_not_numeric() {
        let json = serde_json::json!({
            "type": "switch",
            "switchExpression": "medium",
            "cases": { "small": "1d6", "medium": "1d8" },
            "defaultValue": "1d4"
        });
        let formula: Formula = serde_json::from_value(json).unwrap();
        assert_eq!(formula.evaluate(&SubstitutionTable::new()).unwrap().value, 4.5);
    }

    #[test]
    fn normal_formula_deserializes_without_type() {
        let formula: Formula =
            serde_json::from_value(serde_json::json!({ "expression": "2" })).unwrap();
        assert_eq!(formula, Formula::expression("2"));
    }

    #[test]
    fn extracts_custom_variable_dependencies_from_every_part() {
        let json = serde_json::json!({
            "type": "switch",
            "switchExpression": "@customVariable.tier",
            "cases": [
                { "caseValue": "@customVariable.threshold", "operator": ">=",
                  "resultExpression": "@customVariable.bonus + 1" }
            ],
            "defaultValue": "@customVariable.fallback."
        });
        let formula: Formula = serde_json::from_value(json).unwrap();
        let deps: Vec<String> = formula.custom_variable_dependencies().into_iter().collect();
        assert_eq!(deps, vec!["bonus", "fallback", "threshold", "tier"]);

        let plain = Formula::expression("@customVariable.sneakAttackDice * 2 + @level");
        assert_eq!(
            plain.custom_variable_dependencies().into_iter().collect::<Vec<_>>(),
            vec!["sneakAttackDice".to_string()]
        );
    }
}
