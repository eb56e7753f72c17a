//! Use cases - User story orchestration.
//!
//! Each module contains use cases for a specific area. Use cases orchestrate
//! the domain crate and the infrastructure ports.

pub mod character_sheet;

pub use character_sheet::{
    ApplyResult, CharacterSheetError, CharacterSheetUseCases, CharacterSummary, SheetOperation,
};
