//! # Formatter
//!
//! Model-preserving pretty-printer operating on text, not the model.
//!
//! Contract: idempotent (`format(format(x)) == format(x)`); if the input
//! parses, the output parses to the same document (modulo whitespace and
//! duration-carry expansion); comments and unknown header keys survive
//! verbatim.
//!
//! Formatting never fails. Lines the formatter does not recognize pass
//! through with trailing whitespace trimmed, so broken input comes back no
//! more broken than it went in.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lexer;
use crate::parser::{find_comment_start, find_last_pipe};

static MEASURE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*m(\d+):\s*\|.*\|\s*(#.*)?$").unwrap());

/// Format OpenTab source text.
pub fn format(source: &str) -> String {
    let source = source.replace("\r\n", "\n");
    let lines: Vec<&str> = source.split('\n').collect();

    let delimiter = match lines.iter().position(|l| l.trim() == "---") {
        Some(pos) => pos,
        None => {
            // Nothing to restructure without the delimiter.
            let mut out: Vec<&str> = lines.iter().map(|l| l.trim_end()).collect();
            while out.last() == Some(&"") {
                out.pop();
            }
            return out.join("\n") + "\n";
        }
    };

    let mut header: Vec<&str> = lines[..delimiter].iter().map(|l| l.trim_end()).collect();
    while header.first() == Some(&"") {
        header.remove(0);
    }
    while header.last() == Some(&"") {
        header.pop();
    }

    let mut body: Vec<String> = lines[delimiter + 1..]
        .iter()
        .map(|l| format_body_line(l))
        .collect();
    while body.first().map(String::as_str) == Some("") {
        body.remove(0);
    }
    while body.last().map(String::as_str) == Some("") {
        body.pop();
    }

    let mut out = String::new();
    for line in &header {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("\n---\n\n");
    for line in &body {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Canonicalize one body line. Measure lines are re-tokenized and re-emitted
/// with explicit durations and single spaces; everything else only loses
/// trailing whitespace.
fn format_body_line(line: &str) -> String {
    let trimmed_end = line.trim_end();
    let captures = match MEASURE_LINE.captures(trimmed_end) {
        Some(c) => c,
        None => return trimmed_end.to_string(),
    };
    let index = &captures[1];

    let comment_start = find_comment_start(trimmed_end);
    let effective = &trimmed_end[..comment_start.unwrap_or(trimmed_end.len())];
    let comment = comment_start.map(|p| trimmed_end[p..].trim_end());

    let opener = match effective.find('|') {
        Some(p) => p,
        None => return trimmed_end.to_string(),
    };
    let closer = match find_last_pipe(effective) {
        Some(p) if p > opener => p,
        _ => return trimmed_end.to_string(),
    };

    let tokens = lexer::split_tokens(&effective[opener + 1..closer], 1);
    let expanded = expand_duration_carry(&tokens);

    let mut out = format!("m{}: |", index);
    for token in &expanded {
        out.push(' ');
        out.push_str(token);
    }
    out.push_str(" |");
    if let Some(comment) = comment {
        out.push(' ');
        out.push_str(comment);
    }
    out
}

/// Re-emit tokens so every event token is immediately preceded by a duration
/// token, repeating the carried duration where the source relied on carry.
fn expand_duration_carry(tokens: &[lexer::RawToken]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut current: Option<&str> = None;
    let mut pending = false;
    for token in tokens {
        if lexer::is_duration_token(&token.text) {
            out.push(token.text.clone());
            current = Some(&token.text);
            pending = true;
        } else {
            match current {
                Some(duration) if !pending => {
                    out.push(duration.to_string());
                    out.push(token.text.clone());
                }
                _ => {
                    out.push(token.text.clone());
                    pending = false;
                }
            }
        }
    }
    out
}
