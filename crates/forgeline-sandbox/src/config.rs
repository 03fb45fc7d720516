//! Sandbox configuration: tool commands and timeout budgets.

use serde::{Deserialize, Serialize};

/// Default per-artifact compile-check timeout (30 seconds).
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 30_000;
/// Default dependency provisioning timeout (60 seconds).
pub const DEFAULT_PROVISION_TIMEOUT_MS: u64 = 60_000;
/// Default dry-run timeout (10 seconds).
pub const DEFAULT_DRY_RUN_TIMEOUT_MS: u64 = 10_000;
/// Captured tool error text is truncated to this many bytes.
pub const DEFAULT_STDERR_LIMIT: usize = 600;

/// An external tool invocation (first element is the executable);
/// per-operation operands are appended at call time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Build a command from its parts.
    pub fn new(parts: &[&str]) -> Self {
        assert!(!parts.is_empty(), "tool command cannot be empty");
        Self {
            program: parts[0].to_string(),
            args: parts[1..].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Configuration for one verification pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Compile-check command; the artifact path is appended.
    pub compile: ToolCommand,

    /// Provisioning command; the manifest path is appended.
    pub provision: ToolCommand,

    /// Interpreter used to execute the dry-run harness.
    pub interpreter: ToolCommand,

    /// Per-artifact compile-check timeout in milliseconds.
    pub compile_timeout_ms: u64,

    /// Provisioning timeout in milliseconds.
    pub provision_timeout_ms: u64,

    /// Dry-run timeout in milliseconds.
    pub dry_run_timeout_ms: u64,

    /// When true, provisioning failures are critical instead of
    /// advisory.
    pub provisioning_mandatory: bool,

    /// Whether to attempt the entry-point dry run.
    pub enable_dry_run: bool,

    /// Truncation bound for captured tool error text.
    pub stderr_limit: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            compile: ToolCommand::new(&["python3", "-m", "py_compile"]),
            provision: ToolCommand::new(&[
                "python3",
                "-m",
                "pip",
                "install",
                "--quiet",
                "--disable-pip-version-check",
                "-r",
            ]),
            interpreter: ToolCommand::new(&["python3"]),
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            provision_timeout_ms: DEFAULT_PROVISION_TIMEOUT_MS,
            dry_run_timeout_ms: DEFAULT_DRY_RUN_TIMEOUT_MS,
            provisioning_mandatory: false,
            enable_dry_run: true,
            stderr_limit: DEFAULT_STDERR_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.compile.program, "python3");
        assert_eq!(cfg.compile_timeout_ms, DEFAULT_COMPILE_TIMEOUT_MS);
        assert!(!cfg.provisioning_mandatory);
        assert!(cfg.enable_dry_run);
    }

    #[test]
    fn test_tool_command_split() {
        let cmd = ToolCommand::new(&["echo", "hello"]);
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["hello".to_string()]);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let cfg = SandboxConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: SandboxConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, back);
    }
}
