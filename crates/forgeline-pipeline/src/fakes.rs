//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedGenerator`, `FailingGenerator`, a recording and a
//! failing packager, and `NullDocsLookup` that satisfy the trait
//! contracts without any external dependencies.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use forgeline_core::domain::artifact::ArtifactSet;
use forgeline_core::domain::diagnostic::Diagnostic;
use forgeline_core::domain::spec::{ArtifactSpec, ProjectSpec};

use crate::collaborators::{ContentGenerator, DocsLookup, GenerateError, IntegrateError, Packager};

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Generator scripted per artifact path.
///
/// `generate` and `regenerate` pop queued responses for the path; when
/// the queue is empty, `generate` falls back to a default body and
/// `regenerate` returns the content unchanged (a generator that never
/// manages to fix anything).
#[derive(Debug)]
pub struct ScriptedGenerator {
    plan_response: String,
    responses: Mutex<BTreeMap<String, VecDeque<String>>>,
    default_body: String,
    regenerate_calls: Mutex<u32>,
}

impl ScriptedGenerator {
    /// Create a generator whose `plan` returns the given raw text.
    pub fn new(plan_response: impl Into<String>) -> Self {
        Self {
            plan_response: plan_response.into(),
            responses: Mutex::new(BTreeMap::new()),
            default_body: "print('generated')\n".to_string(),
            regenerate_calls: Mutex::new(0),
        }
    }

    /// Queue a response for a path (used by generate, then regenerate,
    /// in order).
    pub fn respond(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.responses
            .lock()
            .expect("responses lock")
            .entry(path.into())
            .or_default()
            .push_back(content.into());
        self
    }

    /// Replace the default body returned when no response is queued.
    pub fn with_default_body(mut self, body: impl Into<String>) -> Self {
        self.default_body = body.into();
        self
    }

    /// How many times `regenerate` was invoked.
    pub fn regenerate_calls(&self) -> u32 {
        *self.regenerate_calls.lock().expect("counter lock")
    }

    fn pop(&self, path: &str) -> Option<String> {
        self.responses
            .lock()
            .expect("responses lock")
            .get_mut(path)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn plan(&self, _request: &str) -> Result<String, GenerateError> {
        Ok(self.plan_response.clone())
    }

    async fn generate(
        &self,
        artifact: &ArtifactSpec,
        _spec: &ProjectSpec,
    ) -> Result<String, GenerateError> {
        Ok(self
            .pop(&artifact.path)
            .unwrap_or_else(|| self.default_body.clone()))
    }

    async fn regenerate(
        &self,
        path: &str,
        content: &str,
        _diagnostics: &[Diagnostic],
        _spec: &ProjectSpec,
    ) -> Result<String, GenerateError> {
        *self.regenerate_calls.lock().expect("counter lock") += 1;
        Ok(self.pop(path).unwrap_or_else(|| content.to_string()))
    }
}

// ---------------------------------------------------------------------------
// FailingGenerator
// ---------------------------------------------------------------------------

/// Generator whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingGenerator;

#[async_trait]
impl ContentGenerator for FailingGenerator {
    async fn plan(&self, _request: &str) -> Result<String, GenerateError> {
        Err(GenerateError("plan unavailable".to_string()))
    }

    async fn generate(
        &self,
        _artifact: &ArtifactSpec,
        _spec: &ProjectSpec,
    ) -> Result<String, GenerateError> {
        Err(GenerateError("generation unavailable".to_string()))
    }

    async fn regenerate(
        &self,
        _path: &str,
        _content: &str,
        _diagnostics: &[Diagnostic],
        _spec: &ProjectSpec,
    ) -> Result<String, GenerateError> {
        Err(GenerateError("regeneration unavailable".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Packagers
// ---------------------------------------------------------------------------

/// Packager that records its input and returns an in-memory locator.
#[derive(Debug, Default)]
pub struct RecordingPackager {
    packaged: Mutex<Option<(ProjectSpec, ArtifactSet)>>,
}

impl RecordingPackager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact set from the last `package` call.
    pub fn last_artifacts(&self) -> Option<ArtifactSet> {
        self.packaged
            .lock()
            .expect("packaged lock")
            .as_ref()
            .map(|(_, artifacts)| artifacts.clone())
    }
}

#[async_trait]
impl Packager for RecordingPackager {
    async fn package(
        &self,
        spec: &ProjectSpec,
        artifacts: &ArtifactSet,
    ) -> Result<String, IntegrateError> {
        let locator = format!("memory://{}/{}", spec.name, artifacts.digest());
        *self.packaged.lock().expect("packaged lock") = Some((spec.clone(), artifacts.clone()));
        Ok(locator)
    }
}

/// Packager whose every call fails.
#[derive(Debug, Default)]
pub struct FailingPackager;

#[async_trait]
impl Packager for FailingPackager {
    async fn package(
        &self,
        _spec: &ProjectSpec,
        _artifacts: &ArtifactSet,
    ) -> Result<String, IntegrateError> {
        Err(IntegrateError::Failed("archive store offline".to_string()))
    }
}

// ---------------------------------------------------------------------------
// NullDocsLookup
// ---------------------------------------------------------------------------

/// Lookup that never finds anything.
#[derive(Debug, Default)]
pub struct NullDocsLookup;

#[async_trait]
impl DocsLookup for NullDocsLookup {
    async fn latest_version(&self, _package: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::recover::fallback_spec;

    #[tokio::test]
    async fn test_scripted_generator_pops_in_order() {
        let generator = ScriptedGenerator::new("{}")
            .respond("main.py", "v1")
            .respond("main.py", "v2");
        let spec = fallback_spec("demo");
        let artifact = ArtifactSpec::code("main.py", "entry");

        assert_eq!(generator.generate(&artifact, &spec).await.expect("gen"), "v1");
        assert_eq!(
            generator
                .regenerate("main.py", "old", &[], &spec)
                .await
                .expect("regen"),
            "v2"
        );
        // Queue drained: regenerate leaves content unchanged.
        assert_eq!(
            generator
                .regenerate("main.py", "old", &[], &spec)
                .await
                .expect("regen"),
            "old"
        );
        assert_eq!(generator.regenerate_calls(), 2);
    }

    #[tokio::test]
    async fn test_recording_packager_captures_artifacts() {
        let packager = RecordingPackager::new();
        let spec = fallback_spec("demo");
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("main.py", "x = 1\n");

        let locator = packager.package(&spec, &artifacts).await.expect("package");
        assert!(locator.starts_with("memory://"));
        assert_eq!(
            packager.last_artifacts().expect("recorded").get("main.py"),
            Some("x = 1\n")
        );
    }
}
