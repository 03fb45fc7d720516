//! The pipeline orchestrator: Plan -> Generate -> Normalize -> Verify
//! -> (Repair -> Verify)* -> Integrate.
//!
//! One run owns one [`PipelineState`] and one [`RunLog`]; stages
//! execute strictly sequentially and every transition goes through
//! [`PipelineState::advance`]. The repair back-edge is bounded by
//! `max_iterations`, so Verify executes at most `max_iterations + 1`
//! times and the run always terminates.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use forgeline_core::classify::{group_by_artifact, partition, ContinuationPolicy, GENERAL_BUCKET};
use forgeline_core::domain::diagnostic::Diagnostic;
use forgeline_core::domain::state::{PipelineState, Stage};
use forgeline_core::{mechanical, recover};
use forgeline_sandbox::{SandboxConfig, Verifier};

use crate::collaborators::{ContentGenerator, DocsLookup, Packager};
use crate::events::{EventKind, RunEvent, RunLog};
use crate::generate::{derived_artifacts, generate_artifacts};
use crate::normalize::normalize_set;

/// Default repair cycle bound.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Repair cycle bound (>= 0).
    pub max_iterations: u32,

    /// Continuation policy consulted at the Verify decision point.
    pub continuation: ContinuationPolicy,

    /// Sandbox configuration for verification passes.
    pub sandbox: SandboxConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            continuation: ContinuationPolicy::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// What a completed run yields: an output locator, or the residual
/// diagnostics (and error) explaining why none was produced. Never a
/// silent empty result.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Run identity.
    pub run_id: Uuid,

    /// Output locator from the packager, when integration succeeded.
    pub output: Option<String>,

    /// Diagnostics remaining in the final verification report.
    pub residual: Vec<Diagnostic>,

    /// Repair cycles performed.
    pub iterations: u32,

    /// Run-level error, when the run short-circuited.
    pub error: Option<String>,

    /// Full event log for the run.
    pub events: Vec<RunEvent>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl RunOutcome {
    /// Whether the run produced an output locator.
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

/// The pipeline orchestrator.
pub struct Pipeline {
    generator: Arc<dyn ContentGenerator>,
    packager: Arc<dyn Packager>,
    docs: Option<Arc<dyn DocsLookup>>,
    verifier: Verifier,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline with the default configuration.
    pub fn new(generator: Arc<dyn ContentGenerator>, packager: Arc<dyn Packager>) -> Self {
        Self::with_config(generator, packager, PipelineConfig::default())
    }

    /// Create a pipeline with an explicit configuration.
    pub fn with_config(
        generator: Arc<dyn ContentGenerator>,
        packager: Arc<dyn Packager>,
        config: PipelineConfig,
    ) -> Self {
        let verifier = Verifier::new(config.sandbox.clone());
        Self {
            generator,
            packager,
            docs: None,
            verifier,
            config,
        }
    }

    /// Attach a documentation/version lookup collaborator.
    pub fn with_docs(mut self, docs: Arc<dyn DocsLookup>) -> Self {
        self.docs = Some(docs);
        self
    }

    /// Drive one request through the full pipeline.
    pub async fn run(&self, request: &str) -> RunOutcome {
        let start = Instant::now();
        let mut state = PipelineState::new(request, self.config.max_iterations);
        let mut log = RunLog::new(state.run_id);

        info!(run_id = %state.run_id, "starting pipeline run");

        while !state.is_terminal() {
            let stage = state.stage;
            tracing::debug!(stage = stage.name(), iteration = state.iteration_count, "entering stage");
            log.record(stage, EventKind::StageStarted, json!({}));
            state = match stage {
                Stage::Plan => self.plan(state, &mut log).await,
                Stage::Generate => self.generate(state, &mut log).await,
                Stage::Normalize => self.normalize(state, &mut log),
                Stage::Verify => self.verify(state, &mut log).await,
                Stage::Repair => self.repair(state, &mut log).await,
                Stage::Integrate => self.integrate(state, &mut log).await,
                Stage::Terminal => state,
            };
        }

        let residual = state
            .report
            .as_ref()
            .map(|r| r.diagnostics.clone())
            .unwrap_or_default();
        let mut error = state.error.clone();
        if state.output.is_none() && residual.is_empty() && error.is_none() {
            error = Some("run terminated without producing output".to_string());
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        log.record(
            Stage::Terminal,
            EventKind::RunFinished,
            json!({
                "output": state.output,
                "residual": residual.len(),
                "iterations": state.iteration_count,
                "duration_ms": duration_ms,
            }),
        );

        info!(
            run_id = %state.run_id,
            success = state.output.is_some(),
            iterations = state.iteration_count,
            "pipeline run finished"
        );

        RunOutcome {
            run_id: state.run_id,
            output: state.output.clone(),
            residual,
            iterations: state.iteration_count,
            error,
            events: log.into_events(),
            duration_ms,
        }
    }

    async fn plan(&self, mut state: PipelineState, log: &mut RunLog) -> PipelineState {
        let raw = match self.generator.plan(&state.request).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "plan generation failed; recovery will fall back");
                String::new()
            }
        };

        let spec = recover::recover_spec(&raw, &state.request);
        if let Err(err) = spec.validate() {
            log.record(
                Stage::Plan,
                EventKind::StageFailed,
                json!({"error": err.to_string()}),
            );
            return state.fail(format!("planning produced no usable specification: {err}"));
        }

        log.record(
            Stage::Plan,
            EventKind::StageCompleted,
            json!({"name": spec.name, "artifacts": spec.artifacts.len()}),
        );
        state.spec = Some(spec);
        state.advance(false)
    }

    async fn generate(&self, mut state: PipelineState, log: &mut RunLog) -> PipelineState {
        let Some(spec) = state.spec.clone() else {
            return state.fail("generate stage reached without a specification");
        };

        let generated = generate_artifacts(self.generator.as_ref(), &spec).await;
        state.artifacts.merge(generated.iter());

        let derived = derived_artifacts(&spec, self.docs.as_deref()).await;
        state.artifacts.merge(derived);

        log.record(
            Stage::Generate,
            EventKind::StageCompleted,
            json!({"artifacts": state.artifacts.len()}),
        );
        state.advance(false)
    }

    fn normalize(&self, mut state: PipelineState, log: &mut RunLog) -> PipelineState {
        let Some(spec) = state.spec.clone() else {
            return state.fail("normalize stage reached without a specification");
        };

        normalize_set(&spec, &mut state.artifacts);
        log.record(Stage::Normalize, EventKind::StageCompleted, json!({}));
        state.advance(false)
    }

    async fn verify(&self, mut state: PipelineState, log: &mut RunLog) -> PipelineState {
        let Some(spec) = state.spec.clone() else {
            return state.fail("verify stage reached without a specification");
        };

        match self.verifier.verify(&spec, &state.artifacts).await {
            Ok(report) => {
                let unresolved = self.config.continuation.unresolved(&report);
                log.record(
                    Stage::Verify,
                    EventKind::StageCompleted,
                    json!({
                        "diagnostics": report.diagnostics.len(),
                        "criticals": report.critical_count(),
                        "unresolved": unresolved,
                    }),
                );
                state.report = Some(report);
                state.advance(unresolved)
            }
            Err(err) => {
                log.record(
                    Stage::Verify,
                    EventKind::StageFailed,
                    json!({"error": err.to_string()}),
                );
                state.fail(format!("verification workspace unavailable: {err}"))
            }
        }
    }

    async fn repair(&self, mut state: PipelineState, log: &mut RunLog) -> PipelineState {
        let Some(spec) = state.spec.clone() else {
            return state.fail("repair stage reached without a specification");
        };
        let Some(report) = state.report.clone() else {
            return state.advance(false);
        };

        let mut mechanical_fixes = 0usize;
        let mut regenerated = 0usize;

        for (path, diagnostics) in group_by_artifact(&report.diagnostics) {
            if path == GENERAL_BUCKET {
                continue;
            }
            let Some(current) = state.artifacts.get(&path) else {
                continue;
            };

            let split = partition(&diagnostics);
            let mut content = current.to_string();

            if !split.mechanical.is_empty() {
                content = mechanical::apply(&content, &split.mechanical);
                mechanical_fixes += split.mechanical.len();
            }

            if !split.structural.is_empty() {
                match self
                    .generator
                    .regenerate(&path, &content, &split.structural, &spec)
                    .await
                {
                    Ok(new_content) => {
                        content = new_content;
                        regenerated += 1;
                    }
                    Err(err) => {
                        // Keep the prior content; the path is never dropped.
                        warn!(artifact = %path, error = %err, "regeneration failed");
                    }
                }
            }

            state.artifacts.insert(path, content);
        }

        log.record(
            Stage::Repair,
            EventKind::RepairApplied,
            json!({
                "iteration": state.iteration_count + 1,
                "mechanical_fixes": mechanical_fixes,
                "regenerated": regenerated,
            }),
        );
        state.advance(false)
    }

    async fn integrate(&self, mut state: PipelineState, log: &mut RunLog) -> PipelineState {
        let Some(spec) = state.spec.clone() else {
            return state.fail("integrate stage reached without a specification");
        };

        match self.packager.package(&spec, &state.artifacts).await {
            Ok(locator) => {
                log.record(
                    Stage::Integrate,
                    EventKind::StageCompleted,
                    json!({"output": locator}),
                );
                state.output = Some(locator);
                state.advance(false)
            }
            Err(err) => {
                log.record(
                    Stage::Integrate,
                    EventKind::StageFailed,
                    json!({"error": err.to_string()}),
                );
                state.fail(format!("integration failed: {err}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FailingPackager, RecordingPackager, ScriptedGenerator};
    use forgeline_sandbox::ToolCommand;

    fn offline_sandbox() -> SandboxConfig {
        SandboxConfig {
            compile: ToolCommand::new(&["true"]),
            provision: ToolCommand::new(&["true"]),
            interpreter: ToolCommand::new(&["true"]),
            enable_dry_run: false,
            ..Default::default()
        }
    }

    fn plan_json() -> &'static str {
        r#"{"name": "demo", "files": [{"path": "main.py", "kind": "code", "description": "entry"}], "entry_point": "main.py"}"#
    }

    #[tokio::test]
    async fn test_clean_run_produces_output() {
        let generator = Arc::new(
            ScriptedGenerator::new(plan_json()).respond("main.py", "def main():\n    return 0\n"),
        );
        let packager = Arc::new(RecordingPackager::new());
        let config = PipelineConfig {
            sandbox: offline_sandbox(),
            ..Default::default()
        };
        let pipeline = Pipeline::with_config(generator, packager.clone(), config);

        let outcome = pipeline.run("build a demo").await;
        assert!(outcome.succeeded(), "expected success: {:?}", outcome.error);
        assert!(outcome.residual.is_empty());
        assert_eq!(outcome.iterations, 0);

        // Derived artifacts flow into the packaged set alongside the
        // generated entry point.
        let packaged = packager.last_artifacts().expect("packaged set");
        assert!(packaged.contains("main.py"));
        assert!(packaged.contains("README.md"));
    }

    #[tokio::test]
    async fn test_plan_garbage_falls_back_and_still_runs() {
        let generator = Arc::new(
            ScriptedGenerator::new("not structured at all")
                .respond("main.py", "def main():\n    return 0\n"),
        );
        let packager = Arc::new(RecordingPackager::new());
        let config = PipelineConfig {
            sandbox: offline_sandbox(),
            ..Default::default()
        };
        let pipeline = Pipeline::with_config(generator, packager, config);

        let outcome = pipeline.run("make a widget counter").await;
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn test_integration_failure_is_fatal() {
        let generator = Arc::new(
            ScriptedGenerator::new(plan_json()).respond("main.py", "def main():\n    return 0\n"),
        );
        let config = PipelineConfig {
            sandbox: offline_sandbox(),
            ..Default::default()
        };
        let pipeline = Pipeline::with_config(generator, Arc::new(FailingPackager), config);

        let outcome = pipeline.run("build a demo").await;
        assert!(!outcome.succeeded());
        let error = outcome.error.expect("integration error surfaced");
        assert!(error.contains("integration failed"));
    }

    #[tokio::test]
    async fn test_outcome_is_never_silently_empty() {
        let generator = Arc::new(ScriptedGenerator::new(plan_json()));
        let config = PipelineConfig {
            sandbox: offline_sandbox(),
            ..Default::default()
        };
        let pipeline = Pipeline::with_config(generator, Arc::new(FailingPackager), config);

        let outcome = pipeline.run("build a demo").await;
        assert!(
            outcome.output.is_some() || !outcome.residual.is_empty() || outcome.error.is_some()
        );
    }

    #[tokio::test]
    async fn test_event_log_covers_stages_in_order() {
        let generator = Arc::new(
            ScriptedGenerator::new(plan_json()).respond("main.py", "def main():\n    return 0\n"),
        );
        let config = PipelineConfig {
            sandbox: offline_sandbox(),
            ..Default::default()
        };
        let pipeline = Pipeline::with_config(generator, Arc::new(RecordingPackager::new()), config);

        let outcome = pipeline.run("build a demo").await;
        let started: Vec<Stage> = outcome
            .events
            .iter()
            .filter(|e| e.kind == EventKind::StageStarted)
            .map(|e| e.stage)
            .collect();
        assert_eq!(
            started,
            vec![
                Stage::Plan,
                Stage::Generate,
                Stage::Normalize,
                Stage::Verify,
                Stage::Integrate
            ]
        );
        assert_eq!(
            outcome.events.last().map(|e| e.kind),
            Some(EventKind::RunFinished)
        );
    }
}
