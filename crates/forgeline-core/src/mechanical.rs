//! Latent-failure idiom detection and deterministic rewrites.
//!
//! Detection ([`scan`]) and repair ([`apply`]) share one predicate per
//! idiom: a rewrite fires only while its scan predicate holds, so
//! applying the rewrites a second time is always a no-op and a fixed
//! artifact re-verifies clean for that pattern.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::domain::diagnostic::{Diagnostic, DiagnosticKind, PatternKind};

/// One idiom occurrence inside an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    /// 1-indexed line of the first occurrence, when resolvable.
    pub line: Option<u32>,
}

fn decode_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*)((?:\w+[ \t]*=[ \t]*)?)json\.(loads?)\((.*)\)[ \t]*$")
            .expect("decode call regex")
    })
}

fn key_access_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)\[['"](\w+)['"]\]"#).expect("key access regex"))
}

fn external_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"requests\.(get|post|put|delete|head|request)\s*\(")
            .expect("external call regex")
    })
}

/// Scan content for latent-failure idioms. At most one match per idiom
/// is reported, anchored at its first occurrence.
pub fn scan(content: &str) -> Vec<PatternMatch> {
    let mut matches = Vec::new();

    if needs_decode_guard(content) {
        let line = content
            .find("json.load")
            .map(|pos| line_of(content, pos));
        matches.push(PatternMatch {
            kind: PatternKind::BareDecode,
            line,
        });
    }

    if needs_key_guard(content) {
        let line = first_unguarded_access(content).map(|pos| line_of(content, pos));
        matches.push(PatternMatch {
            kind: PatternKind::UnguardedKeyAccess,
            line,
        });
    }

    if needs_external_call_guard(content) {
        let line = external_call_re()
            .find(content)
            .map(|m| line_of(content, m.start()));
        matches.push(PatternMatch {
            kind: PatternKind::UnhandledExternalCall,
            line,
        });
    }

    if let Some(line) = first_await_outside_async(content) {
        matches.push(PatternMatch {
            kind: PatternKind::AwaitOutsideAsync,
            line: Some(line),
        });
    }

    matches
}

/// Apply every rewrite whose idiom appears among the diagnostics.
/// Deterministic; requires no generator call; idempotent.
pub fn apply(content: &str, diagnostics: &[Diagnostic]) -> String {
    let kinds: BTreeSet<PatternKind> = diagnostics
        .iter()
        .filter_map(|d| match d.kind {
            DiagnosticKind::Pattern(kind) => Some(kind),
            _ => None,
        })
        .collect();

    let mut fixed = content.to_string();
    for kind in kinds {
        fixed = match kind {
            PatternKind::BareDecode => wrap_bare_decode(&fixed),
            PatternKind::UnguardedKeyAccess => guard_key_access(&fixed),
            PatternKind::UnhandledExternalCall => add_external_call_handling(&fixed),
            PatternKind::AwaitOutsideAsync => promote_async(&fixed),
        };
    }
    fixed
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn needs_decode_guard(content: &str) -> bool {
    (content.contains("json.loads(") || content.contains("json.load("))
        && (!content.contains("try:") || !content.contains("JSONDecodeError"))
}

fn needs_key_guard(content: &str) -> bool {
    !content.contains(".get(")
        && !content.contains("KeyError")
        && first_unguarded_access(content).is_some()
}

fn needs_external_call_guard(content: &str) -> bool {
    external_call_re().is_match(content)
        && (!content.contains("try:") || !content.contains("requests.exceptions"))
}

/// Byte offset of the first keyed access that is a read, not an
/// assignment target (plain or augmented).
fn first_unguarded_access(content: &str) -> Option<usize> {
    for m in key_access_re().find_iter(content) {
        if !is_assignment_target(content, m.end()) {
            return Some(m.start());
        }
    }
    None
}

/// Whether the text after a subscript is `= ...` or `+= ...` style.
fn is_assignment_target(content: &str, after: usize) -> bool {
    let rest = content[after..].trim_start_matches([' ', '\t']);
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some('='), Some('=')) => false,
        (Some('='), _) => true,
        (Some(op), Some('=')) if "+-*/%&|^".contains(op) => true,
        _ => false,
    }
}

/// 1-indexed line of a line with `await` and no `async def` within the
/// ten preceding lines.
fn first_await_outside_async(content: &str) -> Option<u32> {
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if !line.contains("await ") {
            continue;
        }
        let from = i.saturating_sub(10);
        let guarded = lines[from..i].iter().any(|l| l.contains("async def"));
        if !guarded {
            return Some(i as u32 + 1);
        }
    }
    None
}

fn line_of(content: &str, byte_pos: usize) -> u32 {
    content[..byte_pos].bytes().filter(|b| *b == b'\n').count() as u32 + 1
}

// ---------------------------------------------------------------------------
// Rewrites
// ---------------------------------------------------------------------------

/// Wrap statement-level `json.loads`/`json.load` calls in a recovery
/// block that falls back to an empty record.
pub fn wrap_bare_decode(content: &str) -> String {
    if !needs_decode_guard(content) {
        return content.to_string();
    }

    decode_call_re()
        .replace_all(content, |caps: &Captures| {
            let indent = &caps[1];
            let assign = &caps[2];
            let method = &caps[3];
            let args = &caps[4];
            let target = if assign.is_empty() {
                "result"
            } else {
                assign.split('=').next().unwrap_or("result").trim_end()
            };
            format!(
                "{indent}try:\n{indent}    {assign}json.{method}({args})\n{indent}except json.JSONDecodeError:\n{indent}    {target} = {{}}"
            )
        })
        .into_owned()
}

/// Replace read-side `d['key']` subscripts with `d.get('key')`,
/// leaving assignment targets untouched.
pub fn guard_key_access(content: &str) -> String {
    if !needs_key_guard(content) {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len());
    let mut last = 0usize;
    for caps in key_access_re().captures_iter(content) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&content[last..m.start()]);
        if is_assignment_target(content, m.end()) {
            out.push_str(m.as_str());
        } else {
            out.push_str(&format!("{}.get('{}')", &caps[1], &caps[2]));
        }
        last = m.end();
    }
    out.push_str(&content[last..]);
    out
}

/// Insert the failure-handling import next to the bare `requests`
/// import.
pub fn add_external_call_handling(content: &str) -> String {
    if !needs_external_call_guard(content) || !content.contains("import requests") {
        return content.to_string();
    }
    if content.contains("from requests.exceptions import") {
        return content.to_string();
    }
    content.replacen(
        "import requests",
        "import requests\nfrom requests.exceptions import RequestException, Timeout",
        1,
    )
}

/// Promote routines that contain a suspend point to `async def`.
pub fn promote_async(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if line.contains("def ") && !line.contains("async def") {
            let end = (i + 20).min(lines.len());
            let has_await = lines[i + 1..end].iter().any(|l| l.contains("await "));
            if has_await {
                out.push(line.replacen("def ", "async def ", 1));
                continue;
            }
        }
        out.push(line.to_string());
    }

    let mut fixed = out.join("\n");
    if content.ends_with('\n') {
        fixed.push('\n');
    }
    fixed
}
