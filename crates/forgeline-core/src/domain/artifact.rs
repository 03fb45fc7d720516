//! The mutable set of generated artifact contents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Path -> textual content for every generated artifact.
///
/// The set grows monotonically across the generate and repair stages:
/// `insert` replaces content for a path, `merge` adds or replaces, and
/// nothing ever removes a path. Iteration order is stable (sorted by
/// path) so digests and reports are reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArtifactSet {
    entries: BTreeMap<String, String>,
}

impl ArtifactSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the content for a path.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(path.into(), content.into());
    }

    /// Merge another batch of artifacts in; existing paths are
    /// replaced, absent paths are added, no path is removed.
    pub fn merge<I, P, C>(&mut self, batch: I)
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        for (path, content) in batch {
            self.insert(path, content);
        }
    }

    /// Content for a path, if present.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// Whether a path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// All paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// (path, content) pairs, sorted by path.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable SHA-256 digest over paths and contents.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (path, content) in &self.entries {
            hasher.update(path.as_bytes());
            hasher.update(b"\0");
            hasher.update(content.as_bytes());
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut set = Self::new();
        set.merge(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_content() {
        let mut set = ArtifactSet::new();
        set.insert("main.py", "v1");
        set.insert("main.py", "v2");
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("main.py"), Some("v2"));
    }

    #[test]
    fn test_merge_never_removes_paths() {
        let mut set = ArtifactSet::new();
        set.insert("main.py", "entry");
        set.insert("util.py", "helpers");

        set.merge(vec![("main.py", "fixed entry")]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("main.py"), Some("fixed entry"));
        assert_eq!(set.get("util.py"), Some("helpers"));
    }

    #[test]
    fn test_paths_sorted() {
        let set: ArtifactSet =
            vec![("b.py", ""), ("a.py", ""), ("c.py", "")].into_iter().collect();
        let paths: Vec<&str> = set.paths().collect();
        assert_eq!(paths, vec!["a.py", "b.py", "c.py"]);
    }

    #[test]
    fn test_digest_deterministic_and_content_sensitive() {
        let set1: ArtifactSet = vec![("a.py", "x"), ("b.py", "y")].into_iter().collect();
        let set2: ArtifactSet = vec![("b.py", "y"), ("a.py", "x")].into_iter().collect();
        assert_eq!(set1.digest(), set2.digest());

        let set3: ArtifactSet = vec![("a.py", "x"), ("b.py", "z")].into_iter().collect();
        assert_ne!(set1.digest(), set3.digest());
    }

    #[test]
    fn test_serde_roundtrip() {
        let set: ArtifactSet = vec![("main.py", "print('hi')")].into_iter().collect();
        let json = serde_json::to_string(&set).expect("serialize");
        let back: ArtifactSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(set, back);
    }
}
