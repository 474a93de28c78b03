//! Measure tokenization for the OpenTab body grammar.
//!
//! A measure line's content between the pipes is split into
//! whitespace-separated tokens with bracket-depth awareness: `[`, `(` and `{`
//! open, matching closers close, and whitespace inside any open bracket does
//! not split. Each raw token is then classified as a duration, rest, note, or
//! chord token.

use crate::error::{OpenTabError, ParseErrorKind};
use crate::model::{Annotations, Base, Duration, NoteRef, SlideDirection, Technique, Value};

/// A raw measure token with its 1-based column in the source line.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToken {
    pub text: String,
    pub column: usize,
}

/// A classified measure token. A bare duration sets the carry state and emits
/// no event; the other three consume it.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasureToken {
    Duration(Duration),
    Rest {
        annotations: Annotations,
    },
    Note {
        note: NoteRef,
        annotations: Annotations,
    },
    Chord {
        notes: Vec<NoteRef>,
        annotations: Annotations,
    },
}

fn opens(c: char) -> bool {
    matches!(c, '[' | '(' | '{')
}

fn closes(c: char) -> bool {
    matches!(c, ']' | ')' | '}')
}

/// True when every bracket in `s` is matched, honoring quoted strings.
pub fn brackets_balanced(s: &str) -> bool {
    let mut stack = Vec::new();
    let mut chars = s.chars();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '(' => stack.push(')'),
            '{' => stack.push('}'),
            c if closes(c) => {
                if stack.pop() != Some(c) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty() && !in_string
}

/// Split measure content into raw tokens. `column_offset` is the 1-based
/// column of `content`'s first character within its source line, so reported
/// token columns point into the original line.
pub fn split_tokens(content: &str, column_offset: usize) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut start_col = 0usize;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in content.chars().enumerate() {
        if in_string {
            current.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c.is_whitespace() && depth == 0 {
            if !current.is_empty() {
                tokens.push(RawToken {
                    text: std::mem::take(&mut current),
                    column: column_offset + start_col,
                });
            }
            continue;
        }
        if current.is_empty() {
            start_col = i;
        }
        if c == '"' {
            in_string = true;
        } else if opens(c) {
            depth += 1;
        } else if closes(c) {
            depth -= 1;
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(RawToken {
            text: current,
            column: column_offset + start_col,
        });
    }
    tokens
}

/// True when `text` is a well-formed duration token (`[whqest](\.{1,2})?(/\d+)?`).
pub fn is_duration_token(text: &str) -> bool {
    parse_duration_token(text).is_some()
}

/// Parse a duration token, or `None` when `text` is not one.
pub fn parse_duration_token(text: &str) -> Option<Duration> {
    let mut chars = text.chars().peekable();
    let base = Base::from_letter(chars.next()?)?;
    let mut dots = 0u8;
    while chars.peek() == Some(&'.') {
        chars.next();
        dots += 1;
        if dots > 2 {
            return None;
        }
    }
    let tuplet = if chars.peek() == Some(&'/') {
        chars.next();
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return None;
        }
        Some(digits.parse::<u32>().ok()?)
    } else {
        None
    };
    if chars.next().is_some() {
        return None;
    }
    Some(Duration { base, dots, tuplet })
}

/// Classify one raw token.
pub fn parse_token(raw: &RawToken, line: usize) -> Result<MeasureToken, OpenTabError> {
    let text = raw.text.as_str();
    if let Some(duration) = parse_duration_token(text) {
        return Ok(MeasureToken::Duration(duration));
    }
    if text == "r" || text.starts_with("r{") {
        let annotations = if text.len() > 1 {
            parse_annotations(&text[1..], line, raw.column + 1)?
        } else {
            Annotations::new()
        };
        return Ok(MeasureToken::Rest { annotations });
    }
    if text.starts_with('(') {
        let (note, rest) = parse_note_ref(text, line, raw.column)?;
        let annotations = if rest.is_empty() {
            Annotations::new()
        } else {
            parse_annotations(rest, line, raw.column + (text.len() - rest.len()))?
        };
        return Ok(MeasureToken::Note { note, annotations });
    }
    if text.starts_with('[') {
        return parse_chord(text, line, raw.column);
    }
    Err(OpenTabError::parse(
        line,
        raw.column,
        ParseErrorKind::UnknownToken,
        format!("Unknown token '{}'", text),
    ))
}

/// Parse a parenthesized note ref `(S:F[chain])` at the start of `text`.
/// Returns the note and the unconsumed suffix (e.g. an annotation block).
fn parse_note_ref<'a>(
    text: &'a str,
    line: usize,
    column: usize,
) -> Result<(NoteRef, &'a str), OpenTabError> {
    let err = |msg: String| OpenTabError::parse(line, column, ParseErrorKind::UnknownToken, msg);

    let close = text
        .find(')')
        .ok_or_else(|| err(format!("Unterminated note token '{}'", text)))?;
    let inner = &text[1..close];
    let rest = &text[close + 1..];

    let colon = inner
        .find(':')
        .ok_or_else(|| err(format!("Note token '{}' is missing ':'", text)))?;
    let string: u32 = inner[..colon]
        .parse()
        .map_err(|_| err(format!("Invalid string number in '{}'", text)))?;

    let after = &inner[colon + 1..];
    let fret_len = after.chars().take_while(|c| c.is_ascii_digit()).count();
    if fret_len == 0 {
        return Err(err(format!("Invalid fret number in '{}'", text)));
    }
    let fret: u32 = after[..fret_len]
        .parse()
        .map_err(|_| err(format!("Invalid fret number in '{}'", text)))?;

    let mut note = NoteRef::new(string, fret);
    let mut current_fret = fret;
    let mut chain = after[fret_len..].chars().peekable();
    while let Some(c) = chain.next() {
        if c == '~' {
            note.techniques.push(Technique::Vibrato);
            continue;
        }
        let digits: String = {
            let mut d = String::new();
            while let Some(n) = chain.peek() {
                if n.is_ascii_digit() {
                    d.push(*n);
                    chain.next();
                } else {
                    break;
                }
            }
            d
        };
        let to_fret: u32 = digits
            .parse()
            .map_err(|_| err(format!("Technique '{}' needs a target fret in '{}'", c, text)))?;
        let technique = match c {
            'h' => Technique::HammerOn {
                from_fret: current_fret,
                to_fret,
            },
            'p' => Technique::PullOff {
                from_fret: current_fret,
                to_fret,
            },
            '/' => Technique::Slide {
                direction: SlideDirection::Up,
                from_fret: current_fret,
                to_fret,
            },
            '\\' => Technique::Slide {
                direction: SlideDirection::Down,
                from_fret: current_fret,
                to_fret,
            },
            other => {
                return Err(err(format!("Unknown technique '{}' in '{}'", other, text)));
            }
        };
        note.techniques.push(technique);
        current_fret = to_fret;
    }

    Ok((note, rest))
}

/// Parse a chord token `[ (S:F) (S:F) ... ]{annotations}`.
fn parse_chord(text: &str, line: usize, column: usize) -> Result<MeasureToken, OpenTabError> {
    let err = |msg: String| OpenTabError::parse(line, column, ParseErrorKind::UnknownToken, msg);

    let close = matching_delim(text, '[', ']')
        .ok_or_else(|| err(format!("Unterminated chord token '{}'", text)))?;
    let inner = &text[1..close];
    let suffix = &text[close + 1..];

    let mut notes = Vec::new();
    let mut rest = inner.trim_start();
    while !rest.is_empty() {
        if !rest.starts_with('(') {
            return Err(err(format!("Expected '(' in chord, found '{}'", rest)));
        }
        let consumed = inner.len() - rest.len();
        let (mut note, after) = parse_note_ref(rest, line, column + 1 + consumed)?;
        // A `{...}` directly after the note inside the chord annotates that
        // note, not the chord event.
        let after = if after.starts_with('{') {
            let end = matching_delim(after, '{', '}')
                .ok_or_else(|| err(format!("Unterminated annotation in chord '{}'", text)))?;
            note.annotations =
                parse_annotations(&after[..=end], line, column + 1 + (inner.len() - after.len()))?;
            &after[end + 1..]
        } else {
            after
        };
        notes.push(note);
        rest = after.trim_start();
    }

    if notes.is_empty() {
        return Err(OpenTabError::parse(
            line,
            column,
            ParseErrorKind::MalformedMeasure,
            "Chord must contain at least one note".to_string(),
        ));
    }

    let annotations = if suffix.is_empty() {
        Annotations::new()
    } else {
        parse_annotations(suffix, line, column + close + 1)?
    };
    Ok(MeasureToken::Chord { notes, annotations })
}

/// Index of the `close` matching the `open` at position 0, honoring quoted
/// strings.
fn matching_delim(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Parse an `{key=value, ...}` annotation block.
///
/// Values are quoted strings, booleans, or numbers; a bare identifier is
/// treated as a string literal. Commas inside quoted strings do not split.
pub fn parse_annotations(
    text: &str,
    line: usize,
    column: usize,
) -> Result<Annotations, OpenTabError> {
    let err = |msg: String| OpenTabError::parse(line, column, ParseErrorKind::UnknownToken, msg);

    let text = text.trim();
    if !text.starts_with('{') || !text.ends_with('}') {
        return Err(err(format!("Malformed annotation block '{}'", text)));
    }
    let inner = &text[1..text.len() - 1];

    let mut annotations = Annotations::new();
    for entry in split_commas(inner) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let eq = entry
            .find('=')
            .ok_or_else(|| err(format!("Annotation entry '{}' is missing '='", entry)))?;
        let key = entry[..eq].trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(err(format!("Invalid annotation key '{}'", key)));
        }
        let value = parse_scalar(entry[eq + 1..].trim())
            .ok_or_else(|| err(format!("Invalid annotation value in '{}'", entry)))?;
        annotations.set(key, value);
    }
    Ok(annotations)
}

/// Split on commas that are not inside quoted strings. Also used by the
/// header grammar for array values.
pub(crate) fn split_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (i, c) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parse a scalar value: quoted string, boolean, integer, float, or bare
/// identifier (kept as a string). Shared with the header value grammar.
pub fn parse_scalar(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.starts_with('"') {
        if !s.ends_with('"') || s.len() < 2 {
            return None;
        }
        return Some(Value::String(unescape(&s[1..s.len() - 1])));
    }
    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Int(n));
    }
    if let Ok(n) = s.parse::<f64>() {
        return Some(Value::Float(n));
    }
    if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Some(Value::String(s.to_string()));
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> MeasureToken {
        let raw = RawToken {
            text: text.to_string(),
            column: 1,
        };
        parse_token(&raw, 1).unwrap()
    }

    #[test]
    fn test_split_respects_brackets() {
        let tokens = split_tokens("q [ (4:2) (3:2) ] r", 1);
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q", "[ (4:2) (3:2) ]", "r"]);
    }

    #[test]
    fn test_split_reports_columns() {
        let tokens = split_tokens("q (6:3)", 8);
        assert_eq!(tokens[0].column, 8);
        assert_eq!(tokens[1].column, 10);
    }

    #[test]
    fn test_split_ignores_commas_in_strings() {
        let tokens = split_tokens("r{text=\"a, b c\"}", 1);
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_duration_tokens() {
        assert_eq!(parse_duration_token("q"), Some(Duration::new(Base::Quarter)));
        assert_eq!(
            parse_duration_token("e./3"),
            Some(Duration {
                base: Base::Eighth,
                dots: 1,
                tuplet: Some(3)
            })
        );
        assert_eq!(
            parse_duration_token("h.."),
            Some(Duration {
                base: Base::Half,
                dots: 2,
                tuplet: None
            })
        );
        assert_eq!(parse_duration_token("x"), None);
        assert_eq!(parse_duration_token("q..."), None);
        assert_eq!(parse_duration_token("q/"), None);
        assert_eq!(parse_duration_token("q4"), None);
    }

    #[test]
    fn test_note_token() {
        match parse_one("(6:3)") {
            MeasureToken::Note { note, annotations } => {
                assert_eq!(note.string, 6);
                assert_eq!(note.fret, 3);
                assert!(note.techniques.is_empty());
                assert!(annotations.is_empty());
            }
            other => panic!("expected note, got {:?}", other),
        }
    }

    #[test]
    fn test_technique_chain_is_left_associative() {
        match parse_one("(3:2h4p2~)") {
            MeasureToken::Note { note, .. } => {
                assert_eq!(note.fret, 2);
                assert_eq!(
                    note.techniques,
                    vec![
                        Technique::HammerOn {
                            from_fret: 2,
                            to_fret: 4
                        },
                        Technique::PullOff {
                            from_fret: 4,
                            to_fret: 2
                        },
                        Technique::Vibrato,
                    ]
                );
            }
            other => panic!("expected note, got {:?}", other),
        }
    }

    #[test]
    fn test_slide_directions() {
        match parse_one("(5:5/7)") {
            MeasureToken::Note { note, .. } => {
                assert_eq!(
                    note.techniques,
                    vec![Technique::Slide {
                        direction: SlideDirection::Up,
                        from_fret: 5,
                        to_fret: 7
                    }]
                );
            }
            other => panic!("expected note, got {:?}", other),
        }
        match parse_one("(5:7\\5)") {
            MeasureToken::Note { note, .. } => {
                assert_eq!(
                    note.techniques,
                    vec![Technique::Slide {
                        direction: SlideDirection::Down,
                        from_fret: 7,
                        to_fret: 5
                    }]
                );
            }
            other => panic!("expected note, got {:?}", other),
        }
    }

    #[test]
    fn test_chord_token() {
        match parse_one("[ (4:2) (3:2) (2:3) ]") {
            MeasureToken::Chord { notes, .. } => {
                assert_eq!(notes.len(), 3);
                assert_eq!(notes[0].string, 4);
                assert_eq!(notes[2].fret, 3);
            }
            other => panic!("expected chord, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_chord_rejected() {
        let raw = RawToken {
            text: "[ ]".to_string(),
            column: 1,
        };
        assert!(parse_token(&raw, 1).is_err());
    }

    #[test]
    fn test_rest_with_annotations() {
        match parse_one("r{fermata=true}") {
            MeasureToken::Rest { annotations } => {
                assert_eq!(annotations.get("fermata"), Some(&Value::Bool(true)));
            }
            other => panic!("expected rest, got {:?}", other),
        }
    }

    #[test]
    fn test_event_annotations() {
        match parse_one("(6:3){palm_mute=true, text=\"let ring, please\"}") {
            MeasureToken::Note { annotations, .. } => {
                assert_eq!(annotations.get("palm_mute"), Some(&Value::Bool(true)));
                assert_eq!(
                    annotations.get("text"),
                    Some(&Value::String("let ring, please".to_string()))
                );
            }
            other => panic!("expected note, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_identifier_annotation_value() {
        match parse_one("(6:3){rhythm=unknown}") {
            MeasureToken::Note { annotations, .. } => {
                assert_eq!(
                    annotations.get("rhythm"),
                    Some(&Value::String("unknown".to_string()))
                );
            }
            other => panic!("expected note, got {:?}", other),
        }
    }

    #[test]
    fn test_chord_note_annotations_stay_on_note() {
        match parse_one("[ (4:2){ghost=true} (3:2) ]{strum=\"down\"}") {
            MeasureToken::Chord { notes, annotations } => {
                assert_eq!(notes[0].annotations.get("ghost"), Some(&Value::Bool(true)));
                assert!(notes[1].annotations.is_empty());
                assert_eq!(
                    annotations.get("strum"),
                    Some(&Value::String("down".to_string()))
                );
            }
            other => panic!("expected chord, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_token_is_an_error() {
        let raw = RawToken {
            text: "banjo".to_string(),
            column: 5,
        };
        match parse_token(&raw, 3) {
            Err(OpenTabError::Parse { line, column, kind, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(column, 5);
                assert_eq!(kind, ParseErrorKind::UnknownToken);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_brackets_balanced() {
        assert!(brackets_balanced("q (6:3) [ (4:2) ]"));
        assert!(!brackets_balanced("q (6:3 ]"));
        assert!(!brackets_balanced("q {a=1"));
        assert!(brackets_balanced("r{text=\"[(\"}"));
    }
}
