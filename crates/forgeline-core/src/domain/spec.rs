//! Project specification types and invariant validation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Default entry point when the decoded record omits one.
pub const DEFAULT_ENTRY_POINT: &str = "main.py";

/// What a declared artifact is, decided at planning time.
///
/// Only `Code` artifacts are materialized and checked by the sandbox;
/// a `Manifest` artifact drives dependency provisioning.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Source code, subject to parse and compile checks.
    #[default]
    #[serde(
        alias = "python",
        alias = "source",
        alias = "javascript",
        alias = "sql",
        alias = "html",
        alias = "css"
    )]
    Code,

    /// Dependency manifest (e.g. requirements.txt).
    #[serde(alias = "requirements")]
    Manifest,

    /// Configuration file.
    #[serde(alias = "toml", alias = "yaml", alias = "json", alias = "env")]
    Config,

    /// Documentation.
    #[serde(alias = "markdown", alias = "text")]
    Doc,

    /// Anything else; materialized but never checked.
    Data,
}

/// One planned unit of generated content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactSpec {
    /// Path relative to the project root.
    pub path: String,

    /// What the artifact should contain.
    #[serde(default)]
    pub description: String,

    /// Artifact kind.
    #[serde(alias = "file_type", default)]
    pub kind: ArtifactKind,
}

impl ArtifactSpec {
    /// Create a code artifact spec.
    pub fn code(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            kind: ArtifactKind::Code,
        }
    }
}

/// One declared external dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyDecl {
    /// Package name.
    #[serde(alias = "package")]
    pub name: String,

    /// Optional version constraint.
    #[serde(alias = "version_constraint", default)]
    pub version: Option<String>,

    /// Why the project needs it.
    #[serde(default)]
    pub purpose: String,
}

/// The structured plan for one run: artifacts, dependencies, and
/// environment needs.
///
/// Created once at the planning stage and immutable thereafter; repair
/// only ever replaces artifact *content*, never plan structure.
///
/// Serde aliases accept the loose key vocabulary generators actually
/// emit (`project_name`, `files`, `package`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSpec {
    /// Project name.
    #[serde(alias = "project_name")]
    pub name: String,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Ordered artifact declarations; paths are unique.
    #[serde(alias = "files", default)]
    pub artifacts: Vec<ArtifactSpec>,

    /// External dependency declarations.
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,

    /// Environment variable name -> purpose.
    #[serde(alias = "env_variables", default)]
    pub env: BTreeMap<String, String>,

    /// Path of the artifact that starts the project.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Free-text test-case descriptions.
    #[serde(default)]
    pub test_cases: Vec<String>,

    /// Seed text for the generated README.
    #[serde(alias = "readme_content", default)]
    pub readme: String,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl ProjectSpec {
    /// Enforce the data-model invariants:
    /// at least one artifact, unique paths, resolvable entry point.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.artifacts.is_empty() {
            return Err(SpecError::NoArtifacts);
        }

        let mut seen = BTreeSet::new();
        for artifact in &self.artifacts {
            if !seen.insert(artifact.path.as_str()) {
                return Err(SpecError::DuplicatePath {
                    path: artifact.path.clone(),
                });
            }
        }

        if !seen.contains(self.entry_point.as_str()) {
            return Err(SpecError::UnresolvableEntryPoint {
                entry: self.entry_point.clone(),
            });
        }

        Ok(())
    }

    /// Look up the declared kind for a path, falling back to extension
    /// inference for artifacts added after planning (derived manifests,
    /// docs).
    pub fn kind_for(&self, path: &str) -> ArtifactKind {
        if let Some(artifact) = self.artifacts.iter().find(|a| a.path == path) {
            return artifact.kind;
        }
        infer_kind(path)
    }

    /// The declared artifact for the entry point, if any.
    pub fn entry_artifact(&self) -> Option<&ArtifactSpec> {
        self.artifacts.iter().find(|a| a.path == self.entry_point)
    }
}

/// Infer an artifact kind from its path.
pub fn infer_kind(path: &str) -> ArtifactKind {
    if path.ends_with(".py") {
        ArtifactKind::Code
    } else if path == "requirements.txt" || path.ends_with("/requirements.txt") {
        ArtifactKind::Manifest
    } else if path.ends_with(".md") {
        ArtifactKind::Doc
    } else if path.ends_with(".env") || path.ends_with(".env.example") || path.ends_with(".toml") {
        ArtifactKind::Config
    } else {
        ArtifactKind::Data
    }
}
