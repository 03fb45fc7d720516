//! The verification pass: materialize, check, report, tear down.

use futures::future::join_all;
use tracing::{debug, info};

use forgeline_core::domain::artifact::ArtifactSet;
use forgeline_core::domain::diagnostic::{Diagnostic, DiagnosticKind};
use forgeline_core::domain::report::VerificationReport;
use forgeline_core::domain::spec::{ArtifactKind, ProjectSpec};
use forgeline_core::mechanical;

use crate::checks;
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::workspace::{is_unsafe_path, Workspace};

/// Workspace name prefix for verification passes.
const WORKSPACE_PREFIX: &str = "forgeline-verify-";

/// Runs artifact sets through the sandbox and produces verification
/// reports.
///
/// Every pass acquires a fresh workspace and rebuilds the report from
/// scratch; nothing is retained across passes. Per-artifact failures
/// are recorded as diagnostics and never abort sibling checks — only
/// workspace acquisition can fail the pass itself.
#[derive(Debug, Default)]
pub struct Verifier {
    config: SandboxConfig,
}

impl Verifier {
    /// Create a verifier with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Sandbox configuration in use.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Verify an artifact set against its specification.
    pub async fn verify(
        &self,
        spec: &ProjectSpec,
        artifacts: &ArtifactSet,
    ) -> Result<VerificationReport> {
        let workspace = Workspace::acquire(WORKSPACE_PREFIX)?;
        let report = self.run_checks(&workspace, spec, artifacts).await;
        workspace.release().await;

        info!(
            artifacts = artifacts.len(),
            diagnostics = report.diagnostics.len(),
            criticals = report.critical_count(),
            "verification pass complete"
        );
        Ok(report)
    }

    async fn run_checks(
        &self,
        workspace: &Workspace,
        spec: &ProjectSpec,
        artifacts: &ArtifactSet,
    ) -> VerificationReport {
        let mut report = VerificationReport::new();

        // Materialize source and manifest artifacts, preserving
        // relative paths. Paths that would escape the workspace are
        // skipped with a diagnostic.
        let mut code_paths: Vec<&str> = Vec::new();
        let mut manifest: Option<&str> = None;
        for (path, content) in artifacts.iter() {
            let kind = spec.kind_for(path);
            if !matches!(kind, ArtifactKind::Code | ArtifactKind::Manifest) {
                continue;
            }
            if is_unsafe_path(path) {
                report.push(
                    Diagnostic::advisory(
                        DiagnosticKind::General,
                        "artifact path escapes the workspace; skipped",
                    )
                    .for_artifact(path),
                );
                continue;
            }
            if let Err(err) = workspace.materialize(path, content) {
                report.push(
                    Diagnostic::critical(
                        DiagnosticKind::General,
                        format!("could not materialize artifact: {err}"),
                    )
                    .for_artifact(path),
                );
                continue;
            }
            match kind {
                ArtifactKind::Code => code_paths.push(path),
                ArtifactKind::Manifest => manifest = manifest.or(Some(path)),
                _ => {}
            }
        }

        // Static well-formedness. A parse failure excludes the
        // artifact from the remaining checks; siblings proceed.
        let mut well_formed: Vec<&str> = Vec::new();
        for &path in &code_paths {
            let content = artifacts.get(path).unwrap_or_default();
            match checks::parse_check(path, content) {
                Some(diag) => {
                    debug!(artifact = path, "parse check failed");
                    report.record_well_formed(path, false);
                    report.push(diag);
                }
                None => {
                    report.record_well_formed(path, true);
                    well_formed.push(path);
                }
            }
        }

        // Dependency provisioning, bounded and non-fatal.
        if let Some(manifest_rel) = manifest {
            if let Some(diag) = checks::provision(&self.config, workspace.root(), manifest_rel).await
            {
                report.push(diag);
            }
        }

        // Compile checks run concurrently per artifact; join_all
        // preserves input order so the merge stays deterministic.
        let compile_results = join_all(
            well_formed
                .iter()
                .map(|path| checks::compile_check(&self.config, workspace.root(), path)),
        )
        .await;
        report.extend(compile_results.into_iter().flatten());

        // Latent-failure idiom scan over well-formed artifacts.
        for path in &well_formed {
            let content = artifacts.get(path).unwrap_or_default();
            for found in mechanical::scan(content) {
                let mut diag =
                    Diagnostic::pattern(found.kind, found.kind.describe()).for_artifact(*path);
                if let Some(line) = found.line {
                    diag = diag.at(line, 1);
                }
                report.push(diag);
            }
        }

        // Entry-point dry run, only when the entry artifact parsed.
        if self.config.enable_dry_run && well_formed.iter().any(|p| *p == spec.entry_point) {
            if let Some(diag) =
                checks::dry_run(&self.config, workspace.root(), &spec.entry_point).await
            {
                report.push(diag);
            }
        }

        report.finalize();
        report
    }
}
