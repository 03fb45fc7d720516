//! Verification report assembly and queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::diagnostic::{Diagnostic, DiagnosticKind};

/// The full result of one verification pass.
///
/// Rebuilt from scratch at every verify entry; diagnostics from prior
/// iterations never leak forward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationReport {
    /// Per-artifact well-formedness (parse-level).
    pub well_formed: BTreeMap<String, bool>,

    /// Ordered diagnostics: sorted by artifact path, then by order of
    /// detection within an artifact.
    pub diagnostics: Vec<Diagnostic>,

    /// When this report was produced.
    pub created_at: DateTime<Utc>,
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self {
            well_formed: BTreeMap::new(),
            diagnostics: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Record parse-level well-formedness for an artifact.
    pub fn record_well_formed(&mut self, path: impl Into<String>, ok: bool) {
        self.well_formed.insert(path.into(), ok);
    }

    /// Append a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Append a batch of diagnostics.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// Sort diagnostics by artifact path (unattributed entries last),
    /// preserving detection order within each artifact.
    pub fn finalize(&mut self) {
        self.diagnostics
            .sort_by_key(|d| d.artifact.clone().unwrap_or_else(|| "\u{10FFFF}".to_string()));
    }

    /// Whether any critical diagnostic remains.
    pub fn has_critical(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_critical)
    }

    /// Whether any syntax-class critical diagnostic remains.
    pub fn has_syntax_critical(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.is_critical() && d.kind.is_syntax())
    }

    /// Whether the report is free of diagnostics entirely.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Count of critical diagnostics.
    pub fn critical_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_critical()).count()
    }

    /// Diagnostics of a given kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diagnostic::PatternKind;

    #[test]
    fn test_empty_report_is_clean() {
        let report = VerificationReport::new();
        assert!(report.is_clean());
        assert!(!report.has_critical());
        assert_eq!(report.critical_count(), 0);
    }

    #[test]
    fn test_finalize_sorts_by_artifact_keeping_detection_order() {
        let mut report = VerificationReport::new();
        report.push(Diagnostic::critical(DiagnosticKind::Syntax, "first in b").for_artifact("b.py"));
        report.push(
            Diagnostic::advisory(DiagnosticKind::Pattern(PatternKind::BareDecode), "in a")
                .for_artifact("a.py"),
        );
        report.push(Diagnostic::critical(DiagnosticKind::Compile, "second in b").for_artifact("b.py"));
        report.push(Diagnostic::advisory(DiagnosticKind::General, "unattributed"));

        report.finalize();

        let order: Vec<Option<&str>> = report
            .diagnostics
            .iter()
            .map(|d| d.artifact.as_deref())
            .collect();
        assert_eq!(order, vec![Some("a.py"), Some("b.py"), Some("b.py"), None]);
        assert_eq!(report.diagnostics[1].message, "first in b");
        assert_eq!(report.diagnostics[2].message, "second in b");
    }

    #[test]
    fn test_syntax_critical_detection() {
        let mut report = VerificationReport::new();
        report.push(Diagnostic::advisory(
            DiagnosticKind::Pattern(PatternKind::BareDecode),
            "advisory",
        ));
        assert!(!report.has_syntax_critical());
        assert!(!report.has_critical());

        report.push(Diagnostic::critical(DiagnosticKind::Syntax, "bad token"));
        assert!(report.has_syntax_critical());
        assert!(report.has_critical());
    }

    #[test]
    fn test_well_formed_map() {
        let mut report = VerificationReport::new();
        report.record_well_formed("main.py", true);
        report.record_well_formed("bad.py", false);
        assert_eq!(report.well_formed.get("main.py"), Some(&true));
        assert_eq!(report.well_formed.get("bad.py"), Some(&false));
    }
}
