//! Deterministic modernization of generated source.
//!
//! Regex rewrites for known-deprecated import paths and syntax forms,
//! applied before the first verification pass. No generator call; the
//! rewrite table's outputs never re-match their patterns, so the pass
//! is idempotent.

use std::sync::OnceLock;

use regex::Regex;

use forgeline_core::domain::artifact::ArtifactSet;
use forgeline_core::domain::spec::{ArtifactKind, ProjectSpec};

fn fix_table() -> &'static Vec<(Regex, &'static str)> {
    static FIXES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    FIXES.get_or_init(|| {
        [
            // Relocated imports
            (
                r"from langchain\.llms import OpenAI",
                "from langchain_openai import OpenAI",
            ),
            (
                r"from langchain\.chat_models import ChatOpenAI",
                "from langchain_openai import ChatOpenAI",
            ),
            (
                r"from langchain\.embeddings import OpenAIEmbeddings",
                "from langchain_openai import OpenAIEmbeddings",
            ),
            (
                r"from pydantic import BaseSettings",
                "from pydantic_settings import BaseSettings",
            ),
            // Legacy typing generics to builtin generics
            (r"from typing import List\n", ""),
            (r"from typing import Dict\n", ""),
            (r"from typing import Tuple\n", ""),
            (r": List\[", ": list["),
            (r": Dict\[", ": dict["),
            (r": Tuple\[", ": tuple["),
            (r"-> List\[", "-> list["),
            (r"-> Dict\[", "-> dict["),
            // Deprecated chain invocation style
            (r"\.run\(", ".invoke("),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("normalization pattern"),
                replacement,
            )
        })
        .collect()
    })
}

/// Apply the modernization table to one source file.
pub fn normalize_source(content: &str) -> String {
    let mut fixed = content.to_string();
    for (pattern, replacement) in fix_table() {
        fixed = pattern.replace_all(&fixed, *replacement).into_owned();
    }
    fixed
}

/// Normalize every code artifact in the set, in place.
pub fn normalize_set(spec: &ProjectSpec, artifacts: &mut ArtifactSet) {
    let code_paths: Vec<String> = artifacts
        .paths()
        .filter(|p| spec.kind_for(p) == ArtifactKind::Code)
        .map(str::to_string)
        .collect();

    for path in code_paths {
        if let Some(content) = artifacts.get(&path) {
            let fixed = normalize_source(content);
            artifacts.insert(path, fixed);
        }
    }
}
