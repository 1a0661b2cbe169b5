// ABOUTME: Unattended component updates with automatic rollback.
// ABOUTME: A persisted phase machine driven by the orchestrator.

mod error;
mod orchestrator;
mod phase;
mod run;

pub use error::{UpdateError, UpdateErrorKind};
pub use orchestrator::{ComponentUpdate, UpdateOrchestrator, UpdateSettings};
pub use phase::Phase;
pub use run::{PhaseEntry, RunStore, UpdateRun, VersionChange};
