//! Result shapes of mutating operations.

use serde::{Deserialize, Serialize};

use crate::character::CharacterRecord;
use crate::warnings::Warning;

/// A new character record plus what happened along the way.
///
/// Operations never reject a player action; when nothing could be done the
/// record comes back unchanged with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    pub character: CharacterRecord,
    pub warnings: Vec<Warning>,
}

impl OperationOutcome {
    pub fn new(character: CharacterRecord) -> Self {
        Self {
            character,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(character: CharacterRecord, warnings: Vec<Warning>) -> Self {
        Self {
            character,
            warnings,
        }
    }

    /// The record as it was, with one warning.
    pub fn unchanged(record: &CharacterRecord, warning: Warning) -> Self {
        Self::with_warnings(record.clone(), vec![warning])
    }

    pub fn push_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }
}

/// Uniform result of every updater operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl UpdateResult {
    pub fn ok(warnings: Vec<Warning>) -> Self {
        Self {
            success: true,
            error: None,
            warnings,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            warnings: Vec::new(),
        }
    }

    pub fn failure_with_warnings(error: impl Into<String>, warnings: Vec<Warning>) -> Self {
        Self {
            warnings,
            ..Self::failure(error)
        }
    }
}
