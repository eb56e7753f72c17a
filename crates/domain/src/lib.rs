//! Zukus Domain - character derivation and update rules.
//!
//! Pure, synchronous and I/O free. A [`CharacterRecord`] goes in, a
//! [`DerivedSheet`] comes out; mutations go through [`CharacterUpdater`] or
//! the record-to-record operations in [`cge`] and [`resources`].

pub mod cge;
pub mod changes;
pub mod character;
pub mod custom_variables;
pub mod derive;
pub mod error;
pub mod formula;
pub mod ids;
pub mod outcome;
pub mod resources;
pub mod sheet;
pub mod sources;
pub mod stacking;
pub mod substitutions;
pub mod updater;
pub mod warnings;

pub use changes::{
    Ability, BonusType, Change, ChangeKind, ChangeOrigin, ContextualChange, OriginType,
    SavingThrowTarget, SpecialChange,
};
pub use character::{
    BabProgression, Buff, CharacterRecord, ClassLevels, ClassSaves, HitPoints, Item,
    SaveProgression, SizeCategory, SkillRanks,
};
pub use custom_variables::{BaseSource, CustomVariable, CustomVariableDefinition};
pub use derive::{derive, derive_with, DeriveOptions};
pub use error::DomainError;
pub use formula::{evaluate, Evaluation, EvaluationError, Formula};
pub use ids::CharacterId;
pub use outcome::{OperationOutcome, UpdateResult};
pub use resources::{CalculatedResource, ResourceCurrentValue, ResourceDefinition};
pub use sheet::DerivedSheet;
pub use sources::SourceValue;
pub use stacking::{StackRule, StackedTotal, StackingPolicy};
pub use substitutions::SubstitutionTable;
pub use updater::CharacterUpdater;
pub use warnings::{Warning, WarningKind};
