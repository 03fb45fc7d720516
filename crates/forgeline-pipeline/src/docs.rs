//! Best-effort package registry lookup.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::collaborators::DocsLookup;

/// Default registry endpoint (PyPI JSON API).
const DEFAULT_REGISTRY_BASE: &str = "https://pypi.org/pypi";
/// Request timeout; lookups are glue, not a dependency of the run.
const LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Looks up the latest published version of a package from the
/// registry's JSON endpoint. Network-bound and best-effort: every
/// failure (connect, timeout, decode, missing field) degrades to
/// `None` and never propagates.
#[derive(Debug, Clone)]
pub struct RegistryDocsLookup {
    client: reqwest::Client,
    base: String,
}

impl RegistryDocsLookup {
    /// Lookup against the default public registry.
    pub fn new() -> Self {
        Self::with_base(DEFAULT_REGISTRY_BASE)
    }

    /// Lookup against a custom registry base URL.
    pub fn with_base(base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base: base.into(),
        }
    }

    fn package_url(&self, package: &str) -> String {
        format!("{}/{}/json", self.base.trim_end_matches('/'), package)
    }
}

impl Default for RegistryDocsLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocsLookup for RegistryDocsLookup {
    async fn latest_version(&self, package: &str) -> Option<String> {
        let url = self.package_url(package);
        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                debug!(package, error = %err, "registry lookup failed");
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        body.get("info")?
            .get("version")?
            .as_str()
            .map(str::to_string)
    }
}
