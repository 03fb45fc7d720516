//! Forgeline Verification Sandbox
//!
//! Builds a disposable workspace, statically checks artifacts,
//! provisions declared dependencies, runs a mocked dry run, and
//! guarantees workspace teardown on every exit path.

mod checks;
pub mod config;
pub mod error;
pub mod verifier;
pub mod workspace;

pub use config::{SandboxConfig, ToolCommand};
pub use error::SandboxError;
pub use verifier::Verifier;
pub use workspace::{is_unsafe_path, sweep_deferred, Workspace};

/// Forgeline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
