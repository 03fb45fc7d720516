//! Diagnostic grouping, repair partition, and continuation policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::diagnostic::Diagnostic;
use crate::domain::report::VerificationReport;

/// Synthetic bucket for diagnostics with no resolvable artifact.
pub const GENERAL_BUCKET: &str = "general";

/// Group diagnostics by artifact path; unattributed diagnostics land
/// in the synthetic [`GENERAL_BUCKET`].
pub fn group_by_artifact(diagnostics: &[Diagnostic]) -> BTreeMap<String, Vec<Diagnostic>> {
    let mut groups: BTreeMap<String, Vec<Diagnostic>> = BTreeMap::new();
    for diag in diagnostics {
        let key = diag
            .artifact
            .clone()
            .unwrap_or_else(|| GENERAL_BUCKET.to_string());
        groups.entry(key).or_default().push(diag.clone());
    }
    groups
}

/// Diagnostics split by how they can be repaired.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Known idioms with a deterministic textual rewrite.
    pub mechanical: Vec<Diagnostic>,

    /// Everything else, including all critical syntax diagnostics;
    /// requires regeneration.
    pub structural: Vec<Diagnostic>,
}

/// Partition one artifact's diagnostics into mechanical and structural.
pub fn partition(diagnostics: &[Diagnostic]) -> Partition {
    let mut split = Partition::default();
    for diag in diagnostics {
        if diag.kind.is_mechanical() {
            split.mechanical.push(diag.clone());
        } else {
            split.structural.push(diag.clone());
        }
    }
    split
}

/// When the repair loop keeps iterating.
///
/// `AnyUnresolved` is the authoritative default. `SyntaxOnly` is the
/// stricter configuration: it stops iterating once only non-syntax
/// diagnostics remain, tolerating advisory/pattern findings into the
/// final output.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationPolicy {
    #[default]
    AnyUnresolved,
    SyntaxOnly,
}

impl ContinuationPolicy {
    /// Whether the report still carries diagnostics that justify
    /// another iteration under this policy.
    pub fn unresolved(&self, report: &VerificationReport) -> bool {
        match self {
            ContinuationPolicy::AnyUnresolved => !report.is_clean(),
            ContinuationPolicy::SyntaxOnly => report.has_syntax_critical(),
        }
    }

    /// The continuation decision: iterate only while unresolved
    /// diagnostics remain and the iteration bound is not exhausted.
    pub fn should_continue(
        &self,
        report: &VerificationReport,
        iteration_count: u32,
        max_iterations: u32,
    ) -> bool {
        self.unresolved(report) && iteration_count < max_iterations
    }
}
