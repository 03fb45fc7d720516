//! Normalized verification diagnostics.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Tolerable; may persist into the final output.
    Advisory,
    /// Must be repaired or surfaced as a residual failure.
    Critical,
}

/// Latent-failure idioms recognized by the pattern scan.
///
/// Every variant has a deterministic mechanical rewrite; see
/// [`crate::mechanical`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Structured-data decoding with no surrounding recovery.
    BareDecode,
    /// Direct keyed-collection access with no safe-access form.
    UnguardedKeyAccess,
    /// External-call invocation with no failure handling.
    UnhandledExternalCall,
    /// Suspend-point usage outside a suspend-capable routine.
    AwaitOutsideAsync,
}

impl PatternKind {
    /// Human-readable description of the idiom.
    pub fn describe(&self) -> &'static str {
        match self {
            PatternKind::BareDecode => "structured-data decoding without error recovery",
            PatternKind::UnguardedKeyAccess => "direct keyed access without a safe-access form",
            PatternKind::UnhandledExternalCall => "external call without failure handling",
            PatternKind::AwaitOutsideAsync => "await used outside an async routine",
        }
    }

    /// Whether the idiom is unconditionally fatal at runtime.
    ///
    /// `await` outside an async routine fails at load time; the other
    /// idioms only fail on unlucky inputs.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PatternKind::AwaitOutsideAsync)
    }
}

/// Which check produced a diagnostic. Assigned once at creation and
/// dispatched on directly; never re-derived from message text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Static parse failure.
    Syntax,
    /// Compile-check failure.
    Compile,
    /// Dependency provisioning failure.
    Provisioning,
    /// Dry-run load/initialization failure.
    DryRun,
    /// Dry run exceeded its time budget; possible unbounded loop.
    DryRunTimeout,
    /// Latent-failure idiom match.
    Pattern(PatternKind),
    /// Anything not attributable to a single check.
    General,
}

impl DiagnosticKind {
    /// Whether this kind has a deterministic mechanical rewrite.
    pub fn is_mechanical(&self) -> bool {
        matches!(self, DiagnosticKind::Pattern(_))
    }

    /// Whether this kind is a syntax-class failure.
    pub fn is_syntax(&self) -> bool {
        matches!(self, DiagnosticKind::Syntax)
    }
}

/// Line/column position inside an artifact (1-indexed).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// One reported issue, tied to an artifact when one is resolvable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    /// Artifact path, when the issue is attributable to one.
    pub artifact: Option<String>,

    /// Severity level.
    pub severity: Severity,

    /// Which check produced this diagnostic.
    pub kind: DiagnosticKind,

    /// Human-readable message.
    pub message: String,

    /// Position inside the artifact, when known.
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    /// Create a critical diagnostic.
    pub fn critical(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            artifact: None,
            severity: Severity::Critical,
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Create an advisory diagnostic.
    pub fn advisory(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            artifact: None,
            severity: Severity::Advisory,
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Create a pattern diagnostic with severity derived from the
    /// idiom's fatality.
    pub fn pattern(kind: PatternKind, message: impl Into<String>) -> Self {
        let severity = if kind.is_fatal() {
            Severity::Critical
        } else {
            Severity::Advisory
        };
        Self {
            artifact: None,
            severity,
            kind: DiagnosticKind::Pattern(kind),
            message: message.into(),
            location: None,
        }
    }

    /// Attach the artifact path.
    pub fn for_artifact(mut self, path: impl Into<String>) -> Self {
        self.artifact = Some(path.into());
        self
    }

    /// Attach a source location.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation { line, column });
        self
    }

    /// Whether this diagnostic blocks a clean run.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Advisory < Severity::Critical);
    }

    #[test]
    fn test_pattern_severity_follows_fatality() {
        let diag = Diagnostic::pattern(PatternKind::BareDecode, "bare decode");
        assert_eq!(diag.severity, Severity::Advisory);

        let diag = Diagnostic::pattern(PatternKind::AwaitOutsideAsync, "await misuse");
        assert_eq!(diag.severity, Severity::Critical);
    }

    #[test]
    fn test_kind_predicates() {
        assert!(DiagnosticKind::Pattern(PatternKind::BareDecode).is_mechanical());
        assert!(!DiagnosticKind::Syntax.is_mechanical());
        assert!(DiagnosticKind::Syntax.is_syntax());
        assert!(!DiagnosticKind::Compile.is_syntax());
    }

    #[test]
    fn test_builder_chain() {
        let diag = Diagnostic::critical(DiagnosticKind::Syntax, "unexpected token")
            .for_artifact("main.py")
            .at(3, 7);
        assert_eq!(diag.artifact.as_deref(), Some("main.py"));
        assert_eq!(
            diag.location,
            Some(SourceLocation { line: 3, column: 7 })
        );
        assert!(diag.is_critical());
    }

    #[test]
    fn test_diagnostic_serde_roundtrip() {
        let diag = Diagnostic::pattern(PatternKind::UnguardedKeyAccess, "d['k'] access")
            .for_artifact("util.py")
            .at(12, 1);
        let json = serde_json::to_string(&diag).expect("serialize");
        let back: Diagnostic = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(diag, back);
    }
}
