//! Forgeline Pipeline
//!
//! The stage orchestrator wiring recovery, generation, verification,
//! and the bounded repair loop together, plus the collaborator seams
//! the core depends on but does not implement.

pub mod collaborators;
pub mod docs;
pub mod events;
pub mod fakes;
mod generate;
pub mod normalize;
mod pipeline;

pub use collaborators::{
    ContentGenerator, DirPackager, DocsLookup, GenerateError, IntegrateError, Packager,
};
pub use docs::RegistryDocsLookup;
pub use events::{EventKind, RunEvent, RunLog};
pub use pipeline::{Pipeline, PipelineConfig, RunOutcome, DEFAULT_MAX_ITERATIONS};

/// Forgeline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
