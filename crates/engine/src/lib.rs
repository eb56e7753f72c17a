//! Zukus Engine library.
//!
//! Hosts the domain crate: character storage, configuration and the use
//! cases behind the command-line entry point.
//!
//! ## Structure
//!
//! - `use_cases/` - Load, derive, mutate and persist characters
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `config` - Environment configuration
//! - `app` - Application composition

pub mod app;
pub mod config;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
pub use config::AppConfig;
