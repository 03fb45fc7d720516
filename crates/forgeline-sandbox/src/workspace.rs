//! Disposable workspace lifecycle.
//!
//! A workspace is a uniquely-named temp directory exclusively owned by
//! one verification pass. Release retries on transient errors with an
//! increasing backoff and escalates to a deferred best-effort cleanup
//! registry instead of ever propagating a failure: cleanup trouble is
//! never allowed to fail verification. Hosts that hold file handles
//! open past process exit (antivirus scanners, indexers) get their
//! leftovers swept on the next acquisition.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, SandboxError};

/// Release attempts before escalating to deferred cleanup.
const RELEASE_RETRIES: u32 = 5;
/// Base backoff between release attempts.
const RELEASE_BACKOFF_MS: u64 = 50;

fn deferred_registry() -> &'static Mutex<Vec<PathBuf>> {
    static DEFERRED: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
    DEFERRED.get_or_init(|| Mutex::new(Vec::new()))
}

/// A disposable, exclusively-owned filesystem area for one
/// verification pass.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    released: bool,
}

impl Workspace {
    /// Acquire a fresh uniquely-named workspace.
    ///
    /// The only fatal failure in the sandbox: without a workspace no
    /// checking can happen at all. Also sweeps any directories whose
    /// cleanup was deferred by earlier passes.
    pub fn acquire(prefix: &str) -> Result<Self> {
        sweep_deferred();

        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(SandboxError::Acquisition)?;
        let root = dir.into_path();
        debug!(workspace = %root.display(), "acquired verification workspace");

        Ok(Self {
            root,
            released: false,
        })
    }

    /// Workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one artifact under the workspace, creating parent
    /// directories as needed. Callers must reject unsafe paths first;
    /// see [`is_unsafe_path`].
    pub fn materialize(&self, rel_path: &str, content: &str) -> std::io::Result<PathBuf> {
        let full = self.root.join(rel_path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;
        Ok(full)
    }

    /// Release the workspace: bounded retry with increasing backoff,
    /// then deferred best-effort cleanup. Never fails.
    pub async fn release(mut self) {
        for attempt in 0..RELEASE_RETRIES {
            match std::fs::remove_dir_all(&self.root) {
                Ok(()) => {
                    self.released = true;
                    return;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    self.released = true;
                    return;
                }
                Err(err) => {
                    debug!(
                        workspace = %self.root.display(),
                        attempt,
                        error = %err,
                        "workspace release attempt failed"
                    );
                    let delay = RELEASE_BACKOFF_MS * u64::from(attempt + 1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }

        warn!(
            workspace = %self.root.display(),
            "workspace release exhausted retries; deferring cleanup"
        );
        defer_cleanup(self.root.clone());
        self.released = true;
    }
}

impl Drop for Workspace {
    // Backstop for early returns and panics; `release` is the normal
    // path.
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

fn defer_cleanup(path: PathBuf) {
    if let Ok(mut registry) = deferred_registry().lock() {
        registry.push(path);
    }
}

/// Retry every deferred cleanup once, best-effort. Paths that still
/// cannot be removed stay registered for the next sweep.
pub fn sweep_deferred() {
    let Ok(mut registry) = deferred_registry().lock() else {
        return;
    };
    registry.retain(|path| match std::fs::remove_dir_all(path) {
        Ok(()) => false,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "deferred cleanup still blocked");
            true
        }
    });
}

/// Whether a relative artifact path would escape the workspace.
pub fn is_unsafe_path(rel_path: &str) -> bool {
    let path = Path::new(rel_path);
    path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_creates_unique_roots() {
        let ws1 = Workspace::acquire("forgeline-test-").expect("acquire");
        let ws2 = Workspace::acquire("forgeline-test-").expect("acquire");
        assert_ne!(ws1.root(), ws2.root());
        assert!(ws1.root().is_dir());
        ws1.release().await;
        ws2.release().await;
    }

    #[tokio::test]
    async fn test_release_removes_directory() {
        let ws = Workspace::acquire("forgeline-test-").expect("acquire");
        let root = ws.root().to_path_buf();
        ws.materialize("pkg/main.py", "print('hi')").expect("write");
        assert!(root.join("pkg/main.py").is_file());

        ws.release().await;
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_release_tolerates_already_removed_root() {
        let ws = Workspace::acquire("forgeline-test-").expect("acquire");
        std::fs::remove_dir_all(ws.root()).expect("pre-remove");
        // Must not retry forever or panic.
        ws.release().await;
    }

    #[test]
    fn test_drop_backstop_removes_directory() {
        let root = {
            let ws = Workspace::acquire("forgeline-test-").expect("acquire");
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn test_materialize_preserves_relative_paths() {
        let ws = Workspace::acquire("forgeline-test-").expect("acquire");
        let written = ws
            .materialize("nested/dir/util.py", "x = 1\n")
            .expect("write");
        assert!(written.starts_with(ws.root()));
        assert_eq!(
            std::fs::read_to_string(&written).expect("read back"),
            "x = 1\n"
        );
    }

    #[test]
    fn test_unsafe_path_detection() {
        assert!(is_unsafe_path("../escape.py"));
        assert!(is_unsafe_path("a/../../b.py"));
        assert!(is_unsafe_path("/etc/passwd"));
        assert!(!is_unsafe_path("main.py"));
        assert!(!is_unsafe_path("pkg/sub/mod.py"));
    }

    #[test]
    fn test_sweep_deferred_drops_missing_paths() {
        defer_cleanup(PathBuf::from("/nonexistent/forgeline-test-gone"));
        sweep_deferred();
        let registry = deferred_registry().lock().expect("lock");
        assert!(!registry
            .iter()
            .any(|p| p.ends_with("forgeline-test-gone")));
    }
}
