//! External collaborator contracts.
//!
//! The core depends on these seams but does not implement the
//! capabilities behind them: content generation may fail (the caller
//! substitutes placeholders or keeps prior content), documentation
//! lookup degrades to empty, and only packaging failure is fatal to a
//! run.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use forgeline_core::domain::artifact::ArtifactSet;
use forgeline_core::domain::diagnostic::Diagnostic;
use forgeline_core::domain::spec::{ArtifactSpec, ProjectSpec};

/// Content generation failure. Tolerated per stage rules; never aborts
/// a run by itself.
#[derive(Debug, thiserror::Error)]
#[error("content generation failed: {0}")]
pub struct GenerateError(pub String);

/// Packaging failure. Fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum IntegrateError {
    #[error("packaging failed: {0}")]
    Failed(String),

    #[error("packaging io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces text content from descriptions.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce the raw (possibly malformed) specification text for a
    /// request. The recovery subsystem decodes it.
    async fn plan(&self, request: &str) -> Result<String, GenerateError>;

    /// Produce content for one declared artifact.
    async fn generate(
        &self,
        artifact: &ArtifactSpec,
        spec: &ProjectSpec,
    ) -> Result<String, GenerateError>;

    /// Regenerate an artifact given its current content and the
    /// structural diagnostics against it.
    async fn regenerate(
        &self,
        path: &str,
        content: &str,
        diagnostics: &[Diagnostic],
        spec: &ProjectSpec,
    ) -> Result<String, GenerateError>;
}

/// Packages a finished artifact set into a distributable output and
/// returns its locator.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(
        &self,
        spec: &ProjectSpec,
        artifacts: &ArtifactSet,
    ) -> Result<String, IntegrateError>;
}

/// Best-effort, network-bound documentation/version lookup. Every
/// failure degrades to `None`.
#[async_trait]
pub trait DocsLookup: Send + Sync {
    async fn latest_version(&self, package: &str) -> Option<String>;
}

/// Default packager: writes the artifact set into a timestamped
/// directory under the output root and returns the directory path.
#[derive(Debug, Clone)]
pub struct DirPackager {
    output_dir: PathBuf,
}

impl DirPackager {
    /// Create a packager rooted at the given output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Packager for DirPackager {
    async fn package(
        &self,
        spec: &ProjectSpec,
        artifacts: &ArtifactSet,
    ) -> Result<String, IntegrateError> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let project_dir = self.output_dir.join(format!("{}_{}", spec.name, timestamp));
        std::fs::create_dir_all(&project_dir)?;

        for (path, content) in artifacts.iter() {
            let full = project_dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, content)?;
        }

        info!(output = %project_dir.display(), files = artifacts.len(), "packaged project");
        Ok(project_dir.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_core::recover::fallback_spec;

    #[tokio::test]
    async fn test_dir_packager_writes_all_artifacts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let packager = DirPackager::new(tmp.path());
        let spec = fallback_spec("demo");

        let mut artifacts = ArtifactSet::new();
        artifacts.insert("main.py", "print('hi')\n");
        artifacts.insert("pkg/util.py", "x = 1\n");

        let locator = packager
            .package(&spec, &artifacts)
            .await
            .expect("package");
        let root = PathBuf::from(&locator);
        assert!(root.starts_with(tmp.path()));
        assert!(root.join("main.py").is_file());
        assert!(root.join("pkg/util.py").is_file());
    }

    #[tokio::test]
    async fn test_dir_packager_fails_on_unwritable_root() {
        let packager = DirPackager::new("/proc/forgeline-cannot-write-here");
        let spec = fallback_spec("demo");
        let artifacts = ArtifactSet::new();
        assert!(packager.package(&spec, &artifacts).await.is_err());
    }
}
