//! # Semantic Validator
//!
//! Line-addressed diagnostics over raw text, for editor integration. The
//! validator never parses the document into a model and never fails: feeding
//! it anything returns a (possibly empty) diagnostic list, so an editor can
//! re-run it on every keystroke without guarding against panics.
//!
//! Detected issues: missing `---` delimiter, missing `format`/`version`
//! header keys, measures before any `@track` directive, malformed measure
//! lines, bracket imbalance inside measure content, malformed duration and
//! note tokens, unrecognized body lines.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::lexer;
use crate::parser::{find_comment_start, find_last_pipe};

static MEASURE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*m\d+:\s*\|.*\|\s*(#.*)?$").unwrap());

/// Severity of a diagnostic. The current rules only emit `Error`; `Warning`
/// is reserved for future rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A diagnostic with a 1-based line and a `[start_col, end_col)` span.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub severity: Severity,
}

impl Diagnostic {
    fn error(message: impl Into<String>, line: usize, start_col: usize, end_col: usize) -> Self {
        Diagnostic {
            message: message.into(),
            line,
            start_col,
            end_col,
            severity: Severity::Error,
        }
    }
}

/// Check OpenTab source text and return every detected issue.
pub fn check(source: &str) -> Vec<Diagnostic> {
    let source = source.replace("\r\n", "\n");
    let lines: Vec<&str> = source.split('\n').collect();
    let mut diagnostics = Vec::new();

    let delimiter = lines.iter().position(|l| l.trim() == "---");
    let header_end = match delimiter {
        Some(pos) => pos,
        None => {
            diagnostics.push(Diagnostic::error(
                "Missing '---' delimiter between header and body",
                1,
                1,
                1,
            ));
            lines.len()
        }
    };

    check_header(&lines[..header_end], &mut diagnostics);
    if let Some(pos) = delimiter {
        check_body(&lines[pos + 1..], pos + 1, &mut diagnostics);
    }
    diagnostics
}

fn check_header(lines: &[&str], diagnostics: &mut Vec<Diagnostic>) {
    let has_key = |key: &str| {
        lines.iter().any(|l| {
            let trimmed = l.trim_start();
            trimmed
                .strip_prefix(key)
                .map(|rest| rest.trim_start().starts_with('='))
                .unwrap_or(false)
        })
    };
    if !has_key("format") {
        diagnostics.push(Diagnostic::error(
            "Header is missing required key 'format'",
            1,
            1,
            1,
        ));
    }
    if !has_key("version") {
        diagnostics.push(Diagnostic::error(
            "Header is missing required key 'version'",
            1,
            1,
            1,
        ));
    }
}

fn check_body(lines: &[&str], line_offset: usize, diagnostics: &mut Vec<Diagnostic>) {
    let mut directive_seen = false;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = line_offset + i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let start_col = raw.len() - raw.trim_start().len() + 1;
        let end_col = raw.trim_end().len() + 1;

        if trimmed == "@track"
            || trimmed
                .strip_prefix("@track")
                .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        {
            directive_seen = true;
            continue;
        }
        if trimmed.starts_with('@') {
            diagnostics.push(Diagnostic::error(
                format!(
                    "Unknown directive '{}'",
                    trimmed.split_whitespace().next().unwrap_or(trimmed)
                ),
                line_no,
                start_col,
                end_col,
            ));
            continue;
        }

        if looks_like_measure(trimmed) {
            if !directive_seen {
                diagnostics.push(Diagnostic::error(
                    "Measure defined before selecting track/voice",
                    line_no,
                    start_col,
                    end_col,
                ));
            }
            check_measure_line(raw, line_no, start_col, end_col, diagnostics);
            continue;
        }

        diagnostics.push(Diagnostic::error(
            format!("Unrecognized body line '{}'", trimmed),
            line_no,
            start_col,
            end_col,
        ));
    }
}

fn looks_like_measure(trimmed: &str) -> bool {
    trimmed
        .strip_prefix('m')
        .and_then(|rest| rest.chars().next())
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
}

fn check_measure_line(
    raw: &str,
    line_no: usize,
    start_col: usize,
    end_col: usize,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let line = raw.trim_end();
    if !MEASURE_SHAPE.is_match(line) {
        diagnostics.push(Diagnostic::error(
            "Malformed measure line, expected 'mN: | tokens |'",
            line_no,
            start_col,
            end_col,
        ));
        return;
    }

    let effective = &line[..find_comment_start(line).unwrap_or(line.len())];
    let opener = match effective.find('|') {
        Some(p) => p,
        None => return,
    };
    let closer = match find_last_pipe(effective) {
        Some(p) if p > opener => p,
        _ => return,
    };
    let content = &effective[opener + 1..closer];

    if !lexer::brackets_balanced(content) {
        diagnostics.push(Diagnostic::error(
            "Unbalanced brackets in measure content",
            line_no,
            opener + 2,
            closer + 1,
        ));
        return;
    }

    for token in lexer::split_tokens(content, opener + 2) {
        let span_end = token.column + token.text.chars().count();
        if let Err(e) = lexer::parse_token(&token, line_no) {
            let message = match e {
                crate::OpenTabError::Parse { message, .. } => message,
                other => other.to_string(),
            };
            diagnostics.push(Diagnostic::error(message, line_no, token.column, span_end));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"format="opentab"
version="0.1"

[[tracks]]
id="gtr1"
---
@track gtr1
m1: | q (6:3) (5:5) |
"#;

    #[test]
    fn test_valid_source_is_clean() {
        assert!(check(VALID).is_empty());
    }

    #[test]
    fn test_never_fails_on_garbage() {
        let diagnostics = check("\u{1F3B8} total garbage ][ }{");
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_missing_delimiter() {
        let diagnostics = check("format=\"opentab\"\nversion=\"0.1\"\n");
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("Missing '---'")));
    }

    #[test]
    fn test_missing_format_and_version() {
        let diagnostics = check("title=\"x\"\n---\n");
        assert!(diagnostics.iter().any(|d| d.message.contains("'format'")));
        assert!(diagnostics.iter().any(|d| d.message.contains("'version'")));
    }

    #[test]
    fn test_measure_before_directive() {
        let source = "format=\"opentab\"\nversion=\"0.1\"\n---\nm1: | q (6:3) |\n";
        let diagnostics = check(source);
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Measure defined before selecting track/voice"));
    }

    #[test]
    fn test_unbalanced_brackets() {
        let source = VALID.replace("m1: | q (6:3) (5:5) |", "m1: | q (6:3 ] |");
        let diagnostics = check(&source);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("Unbalanced brackets")));
    }

    #[test]
    fn test_malformed_measure_line() {
        let source = VALID.replace("m1: | q (6:3) (5:5) |", "m1: q (6:3)");
        let diagnostics = check(&source);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("Malformed measure line")));
    }

    #[test]
    fn test_malformed_tokens_are_spanned() {
        let source = VALID.replace("m1: | q (6:3) (5:5) |", "m1: | q (6:x) zebra |");
        let diagnostics = check(&source);
        assert_eq!(diagnostics.len(), 2);
        for d in &diagnostics {
            assert!(d.start_col > 0);
            assert!(d.end_col > d.start_col);
            assert_eq!(d.severity, Severity::Error);
        }
    }

    #[test]
    fn test_diagnostics_serialize() {
        let source = VALID.replace("m1: | q (6:3) (5:5) |", "m1: | q (6:3 ] |");
        let json = serde_json::to_string(&check(&source)).unwrap();
        assert!(json.contains("\"severity\":\"error\""));
    }
}
