//! Pipeline run state and the stage transition function.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::ArtifactSet;
use super::report::VerificationReport;
use super::spec::ProjectSpec;

/// Pipeline stages.
///
/// `Repair` is the only back-edge (to `Verify`); the iteration bound
/// guarantees it is taken at most `max_iterations` times, so every run
/// terminates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Plan,
    Generate,
    Normalize,
    Verify,
    Repair,
    Integrate,
    Terminal,
}

impl Stage {
    /// Stage name for logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Generate => "generate",
            Stage::Normalize => "normalize",
            Stage::Verify => "verify",
            Stage::Repair => "repair",
            Stage::Integrate => "integrate",
            Stage::Terminal => "terminal",
        }
    }
}

/// All state owned by one pipeline run.
///
/// Exclusively owned by the orchestrator for the duration of the run;
/// no other run shares it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Run identity.
    pub run_id: Uuid,

    /// The originating natural-language request.
    pub request: String,

    /// Decoded specification; set once at Plan, immutable after.
    pub spec: Option<ProjectSpec>,

    /// Generated artifact contents.
    pub artifacts: ArtifactSet,

    /// Latest verification report; fully replaced at every Verify.
    pub report: Option<VerificationReport>,

    /// Completed repair cycles; monotonically increasing.
    pub iteration_count: u32,

    /// Repair cycle bound.
    pub max_iterations: u32,

    /// Terminal output locator, when integration succeeded.
    pub output: Option<String>,

    /// Terminal error, when the run short-circuited.
    pub error: Option<String>,

    /// Current stage.
    pub stage: Stage,
}

impl PipelineState {
    /// Create the initial state for a run.
    pub fn new(request: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            request: request.into(),
            spec: None,
            artifacts: ArtifactSet::new(),
            report: None,
            iteration_count: 0,
            max_iterations,
            output: None,
            error: None,
            stage: Stage::Plan,
        }
    }

    /// Advance to the next stage.
    ///
    /// Pure transition per the table below; `unresolved` is the
    /// continuation decision computed from the current report by the
    /// classifier and only consulted at Verify.
    ///
    /// | From      | Guard                                       | To        |
    /// |-----------|---------------------------------------------|-----------|
    /// | Plan      | always                                      | Generate  |
    /// | Generate  | always                                      | Normalize |
    /// | Normalize | always                                      | Verify    |
    /// | Verify    | !unresolved or iterations >= bound          | Integrate |
    /// | Verify    | unresolved and iterations < bound           | Repair    |
    /// | Repair    | always (increments `iteration_count`)       | Verify    |
    /// | Integrate | always                                      | Terminal  |
    pub fn advance(mut self, unresolved: bool) -> Self {
        self.stage = match self.stage {
            Stage::Plan => Stage::Generate,
            Stage::Generate => Stage::Normalize,
            Stage::Normalize => Stage::Verify,
            Stage::Verify => {
                if unresolved && self.iteration_count < self.max_iterations {
                    Stage::Repair
                } else {
                    Stage::Integrate
                }
            }
            Stage::Repair => {
                self.iteration_count += 1;
                Stage::Verify
            }
            Stage::Integrate => Stage::Terminal,
            Stage::Terminal => Stage::Terminal,
        };
        self
    }

    /// Short-circuit to `Terminal` with an error and no output locator.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self.output = None;
        self.stage = Stage::Terminal;
        self
    }

    /// Whether the run has reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        self.stage == Stage::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_prefix() {
        let state = PipelineState::new("build a calculator", 3);
        assert_eq!(state.stage, Stage::Plan);
        let state = state.advance(false);
        assert_eq!(state.stage, Stage::Generate);
        let state = state.advance(false);
        assert_eq!(state.stage, Stage::Normalize);
        let state = state.advance(false);
        assert_eq!(state.stage, Stage::Verify);
    }

    #[test]
    fn test_clean_verify_goes_to_integrate() {
        let mut state = PipelineState::new("req", 3);
        state.stage = Stage::Verify;
        let state = state.advance(false);
        assert_eq!(state.stage, Stage::Integrate);
        let state = state.advance(false);
        assert_eq!(state.stage, Stage::Terminal);
    }

    #[test]
    fn test_unresolved_verify_goes_to_repair_and_back() {
        let mut state = PipelineState::new("req", 3);
        state.stage = Stage::Verify;
        let state = state.advance(true);
        assert_eq!(state.stage, Stage::Repair);
        let state = state.advance(true);
        assert_eq!(state.stage, Stage::Verify);
        assert_eq!(state.iteration_count, 1);
    }

    #[test]
    fn test_exhausted_bound_forces_integrate() {
        let mut state = PipelineState::new("req", 2);
        state.stage = Stage::Verify;
        state.iteration_count = 2;
        let state = state.advance(true);
        assert_eq!(state.stage, Stage::Integrate);
    }

    #[test]
    fn test_zero_bound_never_repairs() {
        let mut state = PipelineState::new("req", 0);
        state.stage = Stage::Verify;
        let state = state.advance(true);
        assert_eq!(state.stage, Stage::Integrate);
    }

    /// Termination: with everlasting unresolved diagnostics, Verify is
    /// visited at most `max_iterations + 1` times for any bound.
    #[test]
    fn test_verify_visit_bound() {
        for bound in 0..6u32 {
            let mut state = PipelineState::new("req", bound);
            let mut verify_visits = 0u32;
            let mut steps = 0u32;
            while !state.is_terminal() {
                if state.stage == Stage::Verify {
                    verify_visits += 1;
                }
                state = state.advance(true);
                steps += 1;
                assert!(steps < 100, "transition loop did not terminate");
            }
            assert_eq!(verify_visits, bound + 1);
        }
    }

    #[test]
    fn test_fail_short_circuits() {
        let state = PipelineState::new("req", 3);
        let state = state.fail("planning produced no specification");
        assert!(state.is_terminal());
        assert!(state.output.is_none());
        assert!(state.error.is_some());
    }

    #[test]
    fn test_terminal_is_absorbing() {
        let mut state = PipelineState::new("req", 3);
        state.stage = Stage::Terminal;
        let state = state.advance(true);
        assert_eq!(state.stage, Stage::Terminal);
    }
}
