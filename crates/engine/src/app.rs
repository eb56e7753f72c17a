//! Application state and composition.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::infrastructure::{
    clock::SystemClock,
    json_store::JsonCharacterRepo,
    ports::{CharacterRepo, ClockPort},
};
use crate::use_cases;

/// Main application state.
pub struct App {
    pub use_cases: UseCases,
}

/// Container for all use cases.
pub struct UseCases {
    pub character_sheet: use_cases::CharacterSheetUseCases,
}

impl App {
    /// Create a new App over the given ports.
    pub fn new(character_repo: Arc<dyn CharacterRepo>, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            use_cases: UseCases {
                character_sheet: use_cases::CharacterSheetUseCases::new(character_repo, clock),
            },
        }
    }

    /// JSON file storage and the system clock, as configured.
    pub fn from_config(config: &AppConfig) -> Self {
        tracing::info!(data_dir = %config.data_dir.display(), "Using JSON character storage");
        let character_repo: Arc<dyn CharacterRepo> =
            Arc::new(JsonCharacterRepo::new(&config.data_dir, config.pretty_json));
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        Self::new(character_repo, clock)
    }
}
