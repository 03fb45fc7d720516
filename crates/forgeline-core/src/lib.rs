//! Forgeline Core Library
//!
//! Domain model, tolerant structured-text recovery, and the failure
//! classifier / repair policy for the Forgeline generation pipeline.

pub mod classify;
pub mod domain;
pub mod error;
pub mod mechanical;
pub mod recover;
pub mod telemetry;

pub use classify::{group_by_artifact, partition, ContinuationPolicy, Partition, GENERAL_BUCKET};
pub use domain::{
    infer_kind, ArtifactKind, ArtifactSet, ArtifactSpec, DependencyDecl, Diagnostic,
    DiagnosticKind, PatternKind, PipelineState, ProjectSpec, Severity, SourceLocation, Stage,
    VerificationReport, DEFAULT_ENTRY_POINT,
};
pub use error::{RecoverError, SpecError};
pub use recover::{decode_spec, extract_records, fallback_spec, recover_spec};
pub use telemetry::{init_tracing, LogFormat};

/// Forgeline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
