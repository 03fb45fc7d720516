//! Domain types for the generation pipeline.

pub mod artifact;
pub mod diagnostic;
pub mod report;
pub mod spec;
pub mod state;

pub use artifact::ArtifactSet;
pub use diagnostic::{Diagnostic, DiagnosticKind, PatternKind, Severity, SourceLocation};
pub use report::VerificationReport;
pub use spec::{
    infer_kind, ArtifactKind, ArtifactSpec, DependencyDecl, ProjectSpec, DEFAULT_ENTRY_POINT,
};
pub use state::{PipelineState, Stage};
