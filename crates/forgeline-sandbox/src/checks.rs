//! Individual sandbox checks: static parse, compile-check, dependency
//! provisioning, and the mocked dry run.

use std::cell::RefCell;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tree_sitter::{Node, Parser};

use forgeline_core::domain::diagnostic::{Diagnostic, DiagnosticKind, Severity};

use crate::config::{SandboxConfig, ToolCommand};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignored here; a failed grammar load surfaces at parse time.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Static well-formedness check for one source artifact.
///
/// Returns a critical syntax diagnostic carrying the first error
/// position, or `None` when the artifact parses.
pub(crate) fn parse_check(path: &str, content: &str) -> Option<Diagnostic> {
    let tree = PYTHON_PARSER.with(|p| p.borrow_mut().parse(content, None));
    let Some(tree) = tree else {
        return Some(
            Diagnostic::critical(DiagnosticKind::Syntax, "parser unavailable for artifact")
                .for_artifact(path),
        );
    };

    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }

    let (row, column) = first_error_position(root).unwrap_or((0, 0));
    Some(
        Diagnostic::critical(
            DiagnosticKind::Syntax,
            format!("syntax error at line {}", row + 1),
        )
        .for_artifact(path)
        .at(row as u32 + 1, column as u32 + 1),
    )
}

/// Depth-first search for the first error or missing node.
fn first_error_position(node: Node<'_>) -> Option<(usize, usize)> {
    if node.is_error() || node.is_missing() {
        let pos = node.start_position();
        return Some((pos.row, pos.column));
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error_position(child) {
            return Some(found);
        }
    }
    let pos = node.start_position();
    Some((pos.row, pos.column))
}

/// Outcome of one bounded tool invocation.
#[derive(Debug)]
pub(crate) enum ToolOutcome {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut,
    SpawnFailed(String),
}

/// Run an external tool with a hard timeout, capturing output.
///
/// The child is killed when the timeout elapses, so a hung tool
/// cancels only its own check.
pub(crate) async fn run_tool(
    cmd: &ToolCommand,
    operands: &[&str],
    cwd: &Path,
    timeout_ms: u64,
) -> ToolOutcome {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .args(operands)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(err) => return ToolOutcome::SpawnFailed(err.to_string()),
    };

    match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await {
        Ok(Ok(output)) => ToolOutcome::Completed {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        Ok(Err(err)) => ToolOutcome::SpawnFailed(err.to_string()),
        Err(_elapsed) => ToolOutcome::TimedOut,
    }
}

/// Compile-check one well-formed artifact. Non-zero exit, timeout, and
/// spawn failure each yield a step-local critical diagnostic.
pub(crate) async fn compile_check(
    config: &SandboxConfig,
    workspace: &Path,
    rel_path: &str,
) -> Option<Diagnostic> {
    match run_tool(
        &config.compile,
        &[rel_path],
        workspace,
        config.compile_timeout_ms,
    )
    .await
    {
        ToolOutcome::Completed { exit_code: 0, .. } => None,
        ToolOutcome::Completed {
            exit_code,
            stdout,
            stderr,
        } => {
            let detail = if stderr.trim().is_empty() { stdout } else { stderr };
            Some(
                Diagnostic::critical(
                    DiagnosticKind::Compile,
                    format!(
                        "compile check exited with code {exit_code}: {}",
                        truncate(detail.trim(), config.stderr_limit)
                    ),
                )
                .for_artifact(rel_path),
            )
        }
        ToolOutcome::TimedOut => Some(
            Diagnostic::critical(
                DiagnosticKind::Compile,
                format!(
                    "compile check timed out after {}ms",
                    config.compile_timeout_ms
                ),
            )
            .for_artifact(rel_path),
        ),
        ToolOutcome::SpawnFailed(err) => Some(
            Diagnostic::critical(
                DiagnosticKind::Compile,
                format!("compile tool failed to start: {err}"),
            )
            .for_artifact(rel_path),
        ),
    }
}

/// Provision declared dependencies from a manifest artifact.
///
/// Non-fatal to the run: failures are advisory unless provisioning is
/// declared mandatory.
pub(crate) async fn provision(
    config: &SandboxConfig,
    workspace: &Path,
    manifest_rel: &str,
) -> Option<Diagnostic> {
    let severity = if config.provisioning_mandatory {
        Severity::Critical
    } else {
        Severity::Advisory
    };

    let message = match run_tool(
        &config.provision,
        &[manifest_rel],
        workspace,
        config.provision_timeout_ms,
    )
    .await
    {
        ToolOutcome::Completed { exit_code: 0, .. } => return None,
        ToolOutcome::Completed {
            exit_code, stderr, ..
        } => format!(
            "dependency provisioning exited with code {exit_code}: {}",
            truncate(stderr.trim(), config.stderr_limit)
        ),
        ToolOutcome::TimedOut => format!(
            "dependency provisioning timed out after {}ms",
            config.provision_timeout_ms
        ),
        ToolOutcome::SpawnFailed(err) => {
            format!("provisioning tool failed to start: {err}")
        }
    };

    Some(Diagnostic {
        artifact: Some(manifest_rel.to_string()),
        severity,
        kind: DiagnosticKind::Provisioning,
        message,
        location: None,
    })
}

/// Harness file name written into the workspace for the dry run.
const DRY_RUN_HARNESS: &str = "__forgeline_dryrun__.py";

/// External-service modules replaced with deterministic stand-ins
/// before the entry module is loaded.
const STUBBED_MODULES: &[&str] = &["openai", "anthropic"];

/// Module path for an entry-point artifact.
pub(crate) fn entry_module(entry_point: &str) -> String {
    entry_point
        .strip_suffix(".py")
        .unwrap_or(entry_point)
        .replace('/', ".")
}

fn harness_source(entry_point: &str) -> String {
    let stubs = STUBBED_MODULES
        .iter()
        .map(|m| format!("sys.modules[\"{m}\"] = MagicMock()"))
        .collect::<Vec<_>>()
        .join("\n");
    let module = entry_module(entry_point);
    format!(
        "import importlib\nimport sys\nfrom unittest.mock import MagicMock\n\n{stubs}\n\ntry:\n    importlib.import_module(\"{module}\")\nexcept Exception as exc:\n    print(f\"LOAD_ERROR: {{exc}}\")\n    sys.exit(1)\nprint(\"LOAD_OK\")\n"
    )
}

/// Execute the entry point with external calls replaced by stand-ins.
///
/// A load failure is critical; a timeout is tagged distinctly as a
/// possible unbounded loop.
pub(crate) async fn dry_run(
    config: &SandboxConfig,
    workspace: &Path,
    entry_point: &str,
) -> Option<Diagnostic> {
    let harness = harness_source(entry_point);
    if let Err(err) = std::fs::write(workspace.join(DRY_RUN_HARNESS), harness) {
        return Some(
            Diagnostic::critical(
                DiagnosticKind::DryRun,
                format!("could not write dry-run harness: {err}"),
            )
            .for_artifact(entry_point),
        );
    }

    match run_tool(
        &config.interpreter,
        &[DRY_RUN_HARNESS],
        workspace,
        config.dry_run_timeout_ms,
    )
    .await
    {
        ToolOutcome::Completed { exit_code: 0, .. } => None,
        ToolOutcome::Completed { stdout, stderr, .. } => {
            let detail = stdout
                .lines()
                .find_map(|l| l.strip_prefix("LOAD_ERROR: "))
                .map(str::to_string)
                .unwrap_or_else(|| truncate(stderr.trim(), config.stderr_limit));
            Some(
                Diagnostic::critical(
                    DiagnosticKind::DryRun,
                    format!("entry point failed to load: {detail}"),
                )
                .for_artifact(entry_point),
            )
        }
        ToolOutcome::TimedOut => Some(
            Diagnostic::critical(
                DiagnosticKind::DryRunTimeout,
                format!(
                    "dry run timed out after {}ms; possible unbounded loop",
                    config.dry_run_timeout_ms
                ),
            )
            .for_artifact(entry_point),
        ),
        ToolOutcome::SpawnFailed(err) => Some(
            Diagnostic::critical(
                DiagnosticKind::DryRun,
                format!("dry-run interpreter failed to start: {err}"),
            )
            .for_artifact(entry_point),
        ),
    }
}

/// Bound captured tool output, keeping a valid char boundary.
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
