pub mod engine;
pub mod orchestrator;
pub mod planner;
pub mod settings;

pub use orchestrator::SearchOrchestrator;
pub use planner::CandidatePlanner;
pub use settings::{MatchSettings, MemorySettingsStore, SettingsStore};
