//! Tolerant recovery of one structured record from untrusted text.
//!
//! Generator responses are free-form: the JSON payload may be wrapped
//! in markdown fences, surrounded by prose, or syntactically mangled.
//! [`decode_spec`] extracts the record, tries a direct decode, and only
//! then runs a deterministic repair pass; [`recover_spec`] is the total
//! wrapper that substitutes the minimal fallback record when even
//! repair fails. Already-valid input decodes on the direct path and is
//! never rewritten.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::domain::spec::{ArtifactSpec, DependencyDecl, ProjectSpec};
use crate::error::RecoverError;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json)?\s*").expect("fence regex"))
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[}\]])").expect("trailing comma regex"))
}

fn string_newline_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("\"\\s*\n\\s*\"").expect("newline gap regex"))
}

fn string_inline_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([^\\])"[ \t]+""#).expect("inline gap regex"))
}

fn composite_gap_res() -> &'static [(Regex, &'static str); 3] {
    static RES: OnceLock<[(Regex, &'static str); 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            (Regex::new(r"\}\s*\{").expect("brace gap"), "},{"),
            (Regex::new(r"\]\s*\{").expect("bracket-brace gap"), "],{"),
            (Regex::new(r"\}\s*\[").expect("brace-bracket gap"), "},["),
        ]
    })
}

fn bare_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // No lookbehind in the regex crate: anchor on the preceding
    // `{` or `,` instead, which also skips already-quoted keys.
    RE.get_or_init(|| {
        Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:").expect("bare key regex")
    })
}

/// Decode a project specification from raw generator text.
///
/// Deterministic and total: the same input always produces the same
/// result, and the function always returns. Validation failures on a
/// structurally-decodable record are reported as
/// [`RecoverError::Invalid`]; repair is only attempted when the direct
/// decode fails.
pub fn decode_spec(raw: &str) -> Result<ProjectSpec, RecoverError> {
    let stripped = strip_decorations(raw);
    let record = extract_record(&stripped)?;

    match serde_json::from_str::<ProjectSpec>(record) {
        Ok(spec) => {
            spec.validate()?;
            Ok(spec)
        }
        Err(direct_err) => {
            let repaired = repair_text(record);
            let spec: ProjectSpec =
                serde_json::from_str(&repaired).map_err(|repair_err| RecoverError::Undecodable {
                    reason: format!("{direct_err}; after repair: {repair_err}"),
                })?;
            spec.validate()?;
            Ok(spec)
        }
    }
}

/// Total recovery: decode, or fall back to the minimal record.
///
/// Never fails past the caller; the returned record always satisfies
/// the specification invariants.
pub fn recover_spec(raw: &str, request: &str) -> ProjectSpec {
    match decode_spec(raw) {
        Ok(spec) => spec,
        Err(err) => {
            warn!(error = %err, "specification recovery failed; using fallback record");
            fallback_spec(request)
        }
    }
}

/// The deterministic minimal fallback record: one generic entry point
/// and one advisory dependency.
pub fn fallback_spec(request: &str) -> ProjectSpec {
    let name: String = request
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !w.is_empty() && w.chars().all(char::is_alphanumeric))
        .take(3)
        .collect::<Vec<_>>()
        .join("_");
    let name = if name.is_empty() {
        "generated_project".to_string()
    } else {
        name
    };

    ProjectSpec {
        name,
        description: format!("Project based on: {request}"),
        artifacts: vec![ArtifactSpec::code("main.py", "Generic entry point")],
        dependencies: vec![DependencyDecl {
            name: "python-dotenv".to_string(),
            version: None,
            purpose: "environment variable management".to_string(),
        }],
        env: Default::default(),
        entry_point: "main.py".to_string(),
        test_cases: Vec::new(),
        readme: String::new(),
    }
}

/// Extract every decodable top-level object from a blob, repairing
/// individually where needed. Used when a generator response carries
/// multiple records.
pub fn extract_records(text: &str) -> Vec<serde_json::Value> {
    let stripped = strip_decorations(text);
    let mut records = Vec::new();
    let mut depth = 0i32;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in stripped.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        let candidate = &stripped[s..=i];
                        if let Ok(value) = serde_json::from_str(candidate) {
                            records.push(value);
                        } else if let Ok(value) =
                            serde_json::from_str::<serde_json::Value>(&repair_text(candidate))
                        {
                            records.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    records
}

/// Strip markdown fence decorations around the payload.
fn strip_decorations(text: &str) -> String {
    fence_re().replace_all(text, "").into_owned()
}

/// Bound the record: first opening brace to the position where nesting
/// depth returns to zero, tracked string-aware so braces inside quoted
/// values never end the record early. When depth never returns to
/// zero, the last closing brace in the text bounds the record instead.
fn extract_record(text: &str) -> Result<&str, RecoverError> {
    let start = text.find('{').ok_or(RecoverError::NoPayload)?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    // Truncated record: bound at the last closer we can find.
    match text.rfind('}') {
        Some(end) if end > start => Ok(&text[start..=end]),
        _ => Ok(&text[start..]),
    }
}

/// The ordered repair pass. Only reached after a direct decode failed,
/// so valid input is never rewritten.
fn repair_text(record: &str) -> String {
    let mut text = strip_line_comments(record);
    text = block_comment_re().replace_all(&text, "").into_owned();
    text = trailing_comma_re().replace_all(&text, "$1").into_owned();
    text = insert_missing_separators(&text);
    text = bare_key_re().replace_all(&text, "${1}\"${2}\":").into_owned();
    text = normalize_quote_delimiters(&text);
    balance_brackets(&text)
}

/// Remove `//` line comments, string-aware so URLs inside values
/// survive.
fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = line.len();
        let mut prev_slash: Option<usize> = None;

        for (i, c) in line.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                prev_slash = None;
                continue;
            }
            match c {
                '"' => {
                    in_string = true;
                    prev_slash = None;
                }
                '/' => {
                    if let Some(p) = prev_slash {
                        cut = p;
                        break;
                    }
                    prev_slash = Some(i);
                }
                _ => prev_slash = None,
            }
        }

        let kept = &line[..cut];
        out.push_str(kept);
        if cut < line.len() && line.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Insert missing separators between adjacent quoted strings and
/// between adjacent composite closers/openers.
fn insert_missing_separators(text: &str) -> String {
    let mut fixed = string_newline_gap_re()
        .replace_all(text, "\",\n\"")
        .into_owned();
    fixed = string_inline_gap_re()
        .replace_all(&fixed, "${1}\", \"")
        .into_owned();
    for (re, replacement) in composite_gap_res() {
        fixed = re.replace_all(&fixed, *replacement).into_owned();
    }
    fixed
}

/// Normalize single-quote string delimiters to `"` only on lines that
/// contain a key/value separator, so prose contractions in surrounding
/// text are left alone.
fn normalize_quote_delimiters(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.contains(':') {
                line.replace('\'', "\"")
            } else {
                line.to_string()
            }
        })
        .collect()
}

/// Balance brackets and braces: trim stray closers from the end, then
/// append the closers still open in nesting order.
fn balance_brackets(text: &str) -> String {
    let (_, stray_braces, stray_brackets) = scan_brackets(text);

    let mut fixed = text.to_string();
    for _ in 0..stray_braces {
        if let Some(pos) = fixed.rfind('}') {
            fixed.remove(pos);
        }
    }
    for _ in 0..stray_brackets {
        if let Some(pos) = fixed.rfind(']') {
            fixed.remove(pos);
        }
    }

    let (open_stack, _, _) = scan_brackets(&fixed);
    for opener in open_stack.into_iter().rev() {
        fixed.push(if opener == '{' { '}' } else { ']' });
    }
    fixed
}

/// String-aware bracket scan: the stack of unclosed openers plus the
/// count of closers with no matching opener, per type.
fn scan_brackets(text: &str) -> (Vec<char>, usize, usize) {
    let mut stack = Vec::new();
    let mut stray_braces = 0usize;
    let mut stray_brackets = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                } else {
                    stray_braces += 1;
                }
            }
            ']' => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                } else {
                    stray_brackets += 1;
                }
            }
            _ => {}
        }
    }

    (stack, stray_braces, stray_brackets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::spec::ArtifactKind;

    #[test]
    fn test_direct_decode_is_untouched() {
        let spec = fallback_spec("demo tool");
        let json = serde_json::to_string(&spec).expect("serialize");
        let decoded = decode_spec(&json).expect("decode");
        assert_eq!(decoded, spec);
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_record() {
        let json = r#"{"name": "demo", "description": "emits {json} blobs",
                       "files": [{"path": "main.py"}]}"#;
        let decoded = decode_spec(json).expect("decode");
        assert_eq!(decoded.description, "emits {json} blobs");
    }

    #[test]
    fn test_missing_separator_between_strings_recovered() {
        // Missing comma before "kind".
        let raw = r#"{"name": "calc", "files": [{"path": "main.py" "kind": "code"}]}"#;
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.name, "calc");
        assert_eq!(spec.artifacts.len(), 1);
        assert_eq!(spec.artifacts[0].path, "main.py");
        assert_eq!(spec.artifacts[0].kind, ArtifactKind::Code);
    }

    #[test]
    fn test_markdown_fences_stripped() {
        let raw = "Here is the plan:\n```json\n{\"name\": \"demo\", \"files\": [{\"path\": \"main.py\"}]}\n```\nDone.";
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.name, "demo");
    }

    #[test]
    fn test_trailing_commas_removed() {
        let raw = r#"{"name": "demo", "files": [{"path": "main.py"},],}"#;
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.artifacts.len(), 1);
    }

    #[test]
    fn test_comments_removed_but_urls_kept() {
        let raw = "{\n  // planner notes\n  \"name\": \"demo\",\n  \"description\": \"see https://example.com/docs\",\n  \"files\": [{\"path\": \"main.py\"}]\n}";
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.description, "see https://example.com/docs");
    }

    #[test]
    fn test_bare_keys_quoted() {
        let raw = r#"{name: "demo", files: [{path: "main.py"}]}"#;
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.artifacts[0].path, "main.py");
    }

    #[test]
    fn test_single_quotes_normalized_on_separator_lines() {
        let raw = "{\"name\": 'demo', \"files\": [{\"path\": 'main.py'}]}";
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.name, "demo");
    }

    #[test]
    fn test_truncated_record_closed() {
        // Generator output cut off mid-record: array and object never closed.
        let raw = r#"{"name": "demo", "files": [{"path": "main.py"}"#;
        let spec = decode_spec(raw).expect("decode");
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.artifacts.len(), 1);
    }

    #[test]
    fn test_balance_appends_exactly_missing_closers() {
        let text = r#"{"a": [1, 2"#;
        let balanced = balance_brackets(text);
        assert_eq!(balanced, r#"{"a": [1, 2]}"#);

        let text = r#"{"a": {"b": {"c": 1"#;
        let balanced = balance_brackets(text);
        assert_eq!(balanced, r#"{"a": {"b": {"c": 1}}}"#);

        let (stack, strays_b, strays_k) = scan_brackets(&balanced);
        assert!(stack.is_empty());
        assert_eq!(strays_b + strays_k, 0);
    }

    #[test]
    fn test_balance_trims_excess_closers() {
        let text = r#"{"a": 1}}}"#;
        let balanced = balance_brackets(text);
        assert_eq!(balanced, r#"{"a": 1}"#);
    }

    #[test]
    fn test_invalid_record_reports_spec_error() {
        let raw = r#"{"name": "demo", "files": []}"#;
        assert!(matches!(
            decode_spec(raw),
            Err(RecoverError::Invalid(_))
        ));
    }

    #[test]
    fn test_recover_spec_total_on_garbage() {
        let spec = recover_spec("no structure here at all", "build a weather cli");
        assert_eq!(spec.name, "build_a_weather");
        assert_eq!(spec.artifacts.len(), 1);
        assert_eq!(spec.artifacts[0].path, "main.py");
        assert_eq!(spec.dependencies.len(), 1);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_recover_spec_deterministic() {
        let a = recover_spec("garbage", "make a thing");
        let b = recover_spec("garbage", "make a thing");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_name_skips_punctuated_words() {
        let spec = fallback_spec("build an http-server quickly");
        assert_eq!(spec.name, "build_an_quickly");
    }

    #[test]
    fn test_fallback_name_defaults_when_empty() {
        let spec = fallback_spec("!!! ???");
        assert_eq!(spec.name, "generated_project");
    }

    #[test]
    fn test_extract_records_finds_all_objects() {
        let text = r#"first: {"a": 1} then {"b": [2, 3]} and noise } {"#;
        let records = extract_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], 1);
        assert_eq!(records[1]["b"][0], 2);
    }

    #[test]
    fn test_extract_records_repairs_individual_objects() {
        let text = r#"{"a": 1,} {"b": 2}"#;
        let records = extract_records(text);
        assert_eq!(records.len(), 2);
    }
}
