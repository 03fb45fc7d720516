//! Generate-stage helpers: per-artifact generation with placeholder
//! substitution, plus the derived artifacts that need no generator.

use tracing::warn;

use forgeline_core::domain::artifact::ArtifactSet;
use forgeline_core::domain::spec::{ArtifactSpec, ProjectSpec};

use crate::collaborators::{ContentGenerator, DocsLookup};

/// Generate content for every declared artifact.
///
/// A generation failure substitutes a clearly-marked placeholder for
/// that artifact instead of aborting the stage.
pub(crate) async fn generate_artifacts(
    generator: &dyn ContentGenerator,
    spec: &ProjectSpec,
) -> ArtifactSet {
    let mut artifacts = ArtifactSet::new();
    for artifact in &spec.artifacts {
        match generator.generate(artifact, spec).await {
            Ok(content) => artifacts.insert(&artifact.path, content),
            Err(err) => {
                warn!(artifact = %artifact.path, error = %err, "generation failed; using placeholder");
                artifacts.insert(&artifact.path, placeholder(artifact));
            }
        }
    }
    artifacts
}

/// Placeholder content for an artifact whose generation failed.
pub(crate) fn placeholder(artifact: &ArtifactSpec) -> String {
    format!(
        "# PLACEHOLDER: content generation failed\n# path: {}\n# intent: {}\n",
        artifact.path, artifact.description
    )
}

/// Derived artifacts produced without the generator: dependency
/// manifest, README, and environment template.
pub(crate) async fn derived_artifacts(
    spec: &ProjectSpec,
    docs: Option<&dyn DocsLookup>,
) -> Vec<(String, String)> {
    let mut derived = Vec::new();
    if !spec.dependencies.is_empty() {
        derived.push((
            "requirements.txt".to_string(),
            requirements_manifest(spec, docs).await,
        ));
    }
    derived.push(("README.md".to_string(), readme(spec)));
    if !spec.env.is_empty() {
        derived.push((".env.example".to_string(), env_example(spec)));
    }
    derived
}

/// Dependency manifest with versions pinned from the declarations,
/// falling back to a registry lookup when available.
async fn requirements_manifest(spec: &ProjectSpec, docs: Option<&dyn DocsLookup>) -> String {
    let mut lines = Vec::with_capacity(spec.dependencies.len());
    for dep in &spec.dependencies {
        let line = match &dep.version {
            Some(version) => format!("{}=={}", dep.name, version),
            None => {
                let looked_up = match docs {
                    Some(docs) => docs.latest_version(&dep.name).await,
                    None => None,
                };
                match looked_up {
                    Some(version) => format!("{}>={}", dep.name, version),
                    None => dep.name.clone(),
                }
            }
        };
        lines.push(line);
    }
    let mut manifest = lines.join("\n");
    manifest.push('\n');
    manifest
}

fn readme(spec: &ProjectSpec) -> String {
    if !spec.readme.trim().is_empty() {
        return spec.readme.clone();
    }
    format!(
        "# {}\n\n{}\n\n## Installation\n```bash\npip install -r requirements.txt\n```\n\n## Configuration\nCopy .env.example to .env and configure your environment variables.\n\n## Usage\n```bash\npython {}\n```\n",
        spec.name, spec.description, spec.entry_point
    )
}

fn env_example(spec: &ProjectSpec) -> String {
    let mut lines: Vec<String> = spec
        .env
        .keys()
        .map(|k| format!("{k}=your_{}_here", k.to_lowercase()))
        .collect();
    lines.sort();
    let mut out = lines.join("\n");
    out.push('\n');
    out
}
