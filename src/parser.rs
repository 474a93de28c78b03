//! # Parser
//!
//! Text → [`Document`]. The parser runs in two stages, mirroring the file
//! layout: header lines before the first `---` delimiter (key-value pairs and
//! `[[tracks]]` array tables in a TOML-like subset), then body lines
//! (directives and measure lines).
//!
//! The duration-carry rule lives here and only here: inside one measure line,
//! a bare duration token sets the current duration and emits no event; every
//! event token consumes the current duration. The carry never crosses a
//! measure boundary and never reaches the model.
//!
//! The parser is strict (§ error policy): any grammar violation fails with a
//! positioned [`OpenTabError::Parse`]. Semantic niceties (string ranges,
//! duplicate ids) belong to the schema validator.

use crate::error::{OpenTabError, ParseErrorKind};
use crate::lexer::{self, MeasureToken};
use crate::model::{
    Document, Event, Header, Measure, Swing, TimeSignature, Track, Value, FORMAT, VERSION,
};

/// Denominators the time-signature grammar accepts.
const VALID_DENOMINATORS: [u32; 6] = [1, 2, 4, 8, 16, 32];

/// Parse OpenTab source into a document.
///
/// Line endings are normalized to LF on entry. Measures are sorted by index
/// on exit; tracks keep header declaration order.
pub fn parse(source: &str) -> Result<Document, OpenTabError> {
    let source = source.replace("\r\n", "\n");
    let lines: Vec<&str> = source.split('\n').collect();

    let delimiter = lines
        .iter()
        .position(|l| l.trim() == "---")
        .ok_or_else(|| {
            OpenTabError::parse(
                1,
                1,
                ParseErrorKind::MissingDelimiter,
                "Missing '---' delimiter between header and body",
            )
        })?;

    let (header, tracks) = parse_header(&lines[..delimiter])?;
    let mut doc = Document {
        header,
        tracks,
        measures: Vec::new(),
    };
    parse_body(&lines[delimiter + 1..], delimiter + 1, &mut doc)?;

    doc.measures.sort_by_key(|m| m.index);
    Ok(doc)
}

/// A parsed header value: scalar or flat array.
enum HeaderValue {
    Scalar(Value),
    Array(Vec<Value>),
}

fn parse_header(lines: &[&str]) -> Result<(Header, Vec<Track>), OpenTabError> {
    let mut header = Header::default();
    let mut tracks: Vec<Track> = Vec::new();
    let mut in_tracks = false;
    let mut format: Option<(String, usize)> = None;
    let mut version: Option<(String, usize)> = None;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let column = raw.len() - raw.trim_start().len() + 1;

        if line.starts_with('@') {
            return Err(OpenTabError::parse(
                line_no,
                column,
                ParseErrorKind::DirectiveOutsideBody,
                "Directive before the '---' header delimiter",
            ));
        }

        if line.starts_with("[[") {
            if line != "[[tracks]]" {
                return Err(OpenTabError::parse(
                    line_no,
                    column,
                    ParseErrorKind::InvalidHeaderValue,
                    format!("Unsupported table '{}'", line),
                ));
            }
            if let Some(last) = tracks.last() {
                if last.id.is_empty() {
                    return Err(OpenTabError::parse(
                        line_no,
                        column,
                        ParseErrorKind::InvalidHeaderValue,
                        "Track is missing required key 'id'",
                    ));
                }
            }
            tracks.push(Track::new(""));
            in_tracks = true;
            continue;
        }

        let (key, value) = parse_key_value(line, line_no, column)?;

        if in_tracks {
            let track = tracks.last_mut().unwrap();
            assign_track_key(track, &key, value, line_no, column)?;
        } else {
            match key.as_str() {
                "format" => format = Some((expect_string(&key, value, line_no, column)?, line_no)),
                "version" => version = Some((expect_string(&key, value, line_no, column)?, line_no)),
                _ => assign_header_key(&mut header, &key, value, line_no, column)?,
            }
        }
    }

    if let Some(last) = tracks.last() {
        if last.id.is_empty() {
            return Err(OpenTabError::parse(
                lines.len().max(1),
                1,
                ParseErrorKind::InvalidHeaderValue,
                "Track is missing required key 'id'",
            ));
        }
    }

    match format {
        None => {
            return Err(OpenTabError::parse(
                1,
                1,
                ParseErrorKind::UnsupportedFormat,
                "Missing required header key 'format'",
            ))
        }
        Some((value, line)) if value != FORMAT => {
            return Err(OpenTabError::parse(
                line,
                1,
                ParseErrorKind::UnsupportedFormat,
                format!("Unsupported format '{}', expected '{}'", value, FORMAT),
            ))
        }
        _ => {}
    }
    match version {
        None => {
            return Err(OpenTabError::parse(
                1,
                1,
                ParseErrorKind::UnsupportedFormat,
                "Missing required header key 'version'",
            ))
        }
        Some((value, line)) if value != VERSION => {
            return Err(OpenTabError::parse(
                line,
                1,
                ParseErrorKind::UnsupportedFormat,
                format!("Unsupported version '{}', expected '{}'", value, VERSION),
            ))
        }
        _ => {}
    }

    Ok((header, tracks))
}

/// Split a header line on the first `=` outside quotes and parse the value.
fn parse_key_value(
    line: &str,
    line_no: usize,
    column: usize,
) -> Result<(String, HeaderValue), OpenTabError> {
    let err = |msg: String| {
        OpenTabError::parse(line_no, column, ParseErrorKind::InvalidHeaderValue, msg)
    };

    let eq = line
        .find('=')
        .ok_or_else(|| err(format!("Header line '{}' is not 'key = value'", line)))?;
    let key = line[..eq].trim();
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(err(format!("Invalid header key '{}'", key)));
    }

    let raw_value = line[eq + 1..].trim();
    let value = if raw_value.starts_with('[') {
        if !raw_value.ends_with(']') {
            return Err(err(format!("Unterminated array for key '{}'", key)));
        }
        let inner = &raw_value[1..raw_value.len() - 1];
        let mut items = Vec::new();
        for item in lexer::split_commas(inner) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let scalar = lexer::parse_scalar(item)
                .ok_or_else(|| err(format!("Invalid array element '{}'", item)))?;
            items.push(scalar);
        }
        HeaderValue::Array(items)
    } else {
        HeaderValue::Scalar(
            lexer::parse_scalar(raw_value)
                .ok_or_else(|| err(format!("Invalid value for key '{}'", key)))?,
        )
    };

    Ok((key.to_string(), value))
}

fn expect_string(
    key: &str,
    value: HeaderValue,
    line_no: usize,
    column: usize,
) -> Result<String, OpenTabError> {
    match value {
        HeaderValue::Scalar(Value::String(s)) => Ok(s),
        _ => Err(OpenTabError::parse(
            line_no,
            column,
            ParseErrorKind::InvalidHeaderValue,
            format!("Key '{}' requires a string value", key),
        )),
    }
}

fn expect_non_negative_int(
    key: &str,
    value: HeaderValue,
    line_no: usize,
    column: usize,
) -> Result<u32, OpenTabError> {
    match value {
        HeaderValue::Scalar(Value::Int(n)) if n >= 0 => Ok(n as u32),
        _ => Err(OpenTabError::parse(
            line_no,
            column,
            ParseErrorKind::InvalidHeaderValue,
            format!("Key '{}' requires a non-negative integer", key),
        )),
    }
}

fn assign_header_key(
    header: &mut Header,
    key: &str,
    value: HeaderValue,
    line_no: usize,
    column: usize,
) -> Result<(), OpenTabError> {
    let err = |msg: String| {
        OpenTabError::parse(line_no, column, ParseErrorKind::InvalidHeaderValue, msg)
    };
    match key {
        "title" => header.title = Some(expect_string(key, value, line_no, column)?),
        "artist" => header.artist = Some(expect_string(key, value, line_no, column)?),
        "album" => header.album = Some(expect_string(key, value, line_no, column)?),
        "composer" => header.composer = Some(expect_string(key, value, line_no, column)?),
        "source" => header.source = Some(expect_string(key, value, line_no, column)?),
        "copyright" => header.copyright = Some(expect_string(key, value, line_no, column)?),
        "tempo_bpm" => {
            let bpm = expect_non_negative_int(key, value, line_no, column)?;
            if bpm == 0 {
                return Err(err("tempo_bpm must be positive".to_string()));
            }
            header.tempo_bpm = Some(bpm);
        }
        "time_signature" => {
            let raw = expect_string(key, value, line_no, column)?;
            header.time_signature = Some(
                parse_time_signature(&raw)
                    .ok_or_else(|| err(format!("Invalid time signature '{}'", raw)))?,
            );
        }
        "swing" => {
            let raw = expect_string(key, value, line_no, column)?;
            header.swing = Some(match raw.as_str() {
                "none" => Swing::None,
                "eighth" => Swing::Eighth,
                _ => return Err(err(format!("Invalid swing '{}'", raw))),
            });
        }
        _ => {
            // Unknown keys pass through untouched.
            match value {
                HeaderValue::Scalar(v) => header.extra.set(key, v),
                HeaderValue::Array(_) => {
                    return Err(err(format!("Key '{}' does not accept an array", key)))
                }
            }
        }
    }
    Ok(())
}

fn assign_track_key(
    track: &mut Track,
    key: &str,
    value: HeaderValue,
    line_no: usize,
    column: usize,
) -> Result<(), OpenTabError> {
    let err = |msg: String| {
        OpenTabError::parse(line_no, column, ParseErrorKind::InvalidHeaderValue, msg)
    };
    match key {
        "id" => {
            let id = expect_string(key, value, line_no, column)?;
            if id.is_empty() {
                return Err(err("Track id must be non-empty".to_string()));
            }
            track.id = id;
        }
        "name" => track.name = Some(expect_string(key, value, line_no, column)?),
        "instrument" => track.instrument = Some(expect_string(key, value, line_no, column)?),
        "tuning" => match value {
            HeaderValue::Array(items) => {
                let mut tuning = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(s) => tuning.push(s),
                        _ => return Err(err("tuning must be an array of strings".to_string())),
                    }
                }
                track.tuning = Some(tuning);
            }
            _ => return Err(err("tuning must be an array of strings".to_string())),
        },
        "capo" => track.capo = expect_non_negative_int(key, value, line_no, column)?,
        _ => match value {
            HeaderValue::Scalar(v) => track.extra.set(key, v),
            HeaderValue::Array(_) => {
                return Err(err(format!("Key '{}' does not accept an array", key)))
            }
        },
    }
    Ok(())
}

fn parse_time_signature(s: &str) -> Option<TimeSignature> {
    let (num, den) = s.split_once('/')?;
    let numerator: u32 = num.trim().parse().ok()?;
    let denominator: u32 = den.trim().parse().ok()?;
    if numerator < 1 || !VALID_DENOMINATORS.contains(&denominator) {
        return None;
    }
    Some(TimeSignature {
        numerator,
        denominator,
    })
}

fn parse_body(
    lines: &[&str],
    line_offset: usize,
    doc: &mut Document,
) -> Result<(), OpenTabError> {
    let mut active: Option<(String, String)> = None;

    for (i, raw) in lines.iter().enumerate() {
        let line_no = line_offset + i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let column = raw.len() - raw.trim_start().len() + 1;

        if let Some(rest) = line.strip_prefix("@track") {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                active = Some(parse_track_directive(rest, doc, line_no, column)?);
                continue;
            }
        }
        if line.starts_with('@') {
            return Err(OpenTabError::parse(
                line_no,
                column,
                ParseErrorKind::UnknownLine,
                format!("Unknown directive '{}'", line.split_whitespace().next().unwrap_or(line)),
            ));
        }

        if looks_like_measure(line) {
            let (track, voice) = active.clone().ok_or_else(|| {
                OpenTabError::parse(
                    line_no,
                    column,
                    ParseErrorKind::MissingTrackDirective,
                    "Measure defined before selecting track/voice",
                )
            })?;
            parse_measure_line(raw, line_no, doc, &track, &voice)?;
            continue;
        }

        return Err(OpenTabError::parse(
            line_no,
            column,
            ParseErrorKind::UnknownLine,
            format!("Unknown body line '{}'", line),
        ));
    }
    Ok(())
}

/// `@track T` or `@track T voice V`. Unknown track ids get an implicit track
/// appended after the declared ones so fragments and importer output parse.
fn parse_track_directive(
    rest: &str,
    doc: &mut Document,
    line_no: usize,
    column: usize,
) -> Result<(String, String), OpenTabError> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let (track_id, voice_id) = match parts.as_slice() {
        [id] => (id.to_string(), "v1".to_string()),
        [id, "voice", voice] => (id.to_string(), voice.to_string()),
        _ => {
            return Err(OpenTabError::parse(
                line_no,
                column,
                ParseErrorKind::UnknownLine,
                "Malformed @track directive, expected '@track ID' or '@track ID voice V'",
            ))
        }
    };
    if doc.track(&track_id).is_none() {
        log::debug!("synthesizing implicit track '{}'", track_id);
        doc.tracks.push(Track::new(track_id.clone()));
    }
    Ok((track_id, voice_id))
}

fn looks_like_measure(line: &str) -> bool {
    let rest = match line.strip_prefix('m') {
        Some(rest) => rest,
        None => return false,
    };
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Parse one `mN: | tokens | # comment` line and merge it into the document.
///
/// Multiple lines with the same index but different (track, voice) pairs
/// merge into one measure; within the same (track, voice) a later line
/// replaces the earlier one.
fn parse_measure_line(
    raw: &str,
    line_no: usize,
    doc: &mut Document,
    track: &str,
    voice: &str,
) -> Result<(), OpenTabError> {
    let column = raw.len() - raw.trim_start().len() + 1;
    let err = |col: usize, msg: String| {
        OpenTabError::parse(line_no, col, ParseErrorKind::MalformedMeasure, msg)
    };

    let line = raw.trim_end();
    let (index, after_colon_at) = parse_measure_prefix(line.trim_start())
        .ok_or_else(|| err(column, format!("Malformed measure line '{}'", line.trim())))?;
    let prefix_len = (column - 1) + after_colon_at;

    // Comments start at the first '#' outside quoted strings.
    let effective_end = find_comment_start(line).unwrap_or(line.len());
    let effective = &line[..effective_end];

    let opener = match effective[prefix_len..].find('|') {
        Some(rel) if effective[prefix_len..prefix_len + rel].trim().is_empty() => {
            prefix_len + rel
        }
        _ => {
            return Err(err(
                prefix_len + 1,
                "Expected '|' after measure index".to_string(),
            ))
        }
    };
    let closer = find_last_pipe(effective).filter(|&p| p > opener).ok_or_else(|| {
        err(
            effective.len(),
            "Measure line is missing its closing '|'".to_string(),
        )
    })?;
    if !effective[closer + 1..].trim().is_empty() {
        return Err(err(
            closer + 2,
            "Unexpected content after closing '|'".to_string(),
        ));
    }

    let content = &effective[opener + 1..closer];
    let tokens = lexer::split_tokens(content, opener + 2);

    let mut events: Vec<Event> = Vec::new();
    let mut current: Option<crate::model::Duration> = None;
    for raw_token in &tokens {
        match lexer::parse_token(raw_token, line_no)? {
            MeasureToken::Duration(d) => current = Some(d),
            token => {
                let duration = current.ok_or_else(|| {
                    err(
                        raw_token.column,
                        "Event token before any duration in this measure".to_string(),
                    )
                })?;
                events.push(match token {
                    MeasureToken::Rest { annotations } => Event::Rest {
                        duration,
                        annotations,
                    },
                    MeasureToken::Note { note, annotations } => Event::Note {
                        duration,
                        note,
                        annotations,
                    },
                    MeasureToken::Chord { notes, annotations } => Event::Chord {
                        duration,
                        notes,
                        annotations,
                    },
                    MeasureToken::Duration(_) => unreachable!(),
                });
            }
        }
    }

    let measure = match doc.measures.iter_mut().find(|m| m.index == index) {
        Some(measure) => measure,
        None => {
            doc.measures.push(Measure::new(index));
            doc.measures.last_mut().unwrap()
        }
    };
    let slot = measure.track_mut(track).voice_mut(voice);
    slot.events = events;
    Ok(())
}

/// Parse `m<digits>:` at the start of a trimmed line. Returns the index and
/// the offset just past the colon.
fn parse_measure_prefix(line: &str) -> Option<(u32, usize)> {
    let rest = line.strip_prefix('m')?;
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let index: u32 = rest[..digits].parse().ok()?;
    if index == 0 {
        return None;
    }
    if !rest[digits..].starts_with(':') {
        return None;
    }
    Some((index, 1 + digits + 1))
}

pub(crate) fn find_comment_start(line: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escape = false;
    for (i, c) in line.char_indices() {
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
            '#' => return Some(i),
            _ => {}
        }
    }
    None
}

pub(crate) fn find_last_pipe(s: &str) -> Option<usize> {
    let mut last = None;
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
            '|' => last = Some(i),
            _ => {}
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Base, Value};

    const MINIMAL: &str = r#"format="opentab"
version="0.1"
tempo_bpm=100
time_signature="4/4"

[[tracks]]
id="gtr1"
tuning=["E2","A2","D3","G3","B3","E4"]
---
@track gtr1
m1: | q (6:3) (5:5) (4:5) (3:3) |
"#;

    #[test]
    fn test_minimal_document() {
        let doc = parse(MINIMAL).unwrap();
        assert_eq!(doc.header.tempo_bpm, Some(100));
        assert_eq!(doc.header.tempo(), 100);
        assert_eq!(doc.tracks.len(), 1);
        assert_eq!(doc.tracks[0].id, "gtr1");
        assert_eq!(doc.measures.len(), 1);
        let voice = doc.measures[0].track("gtr1").unwrap().voice("v1").unwrap();
        assert_eq!(voice.events.len(), 4);
        for event in &voice.events {
            assert_eq!(event.duration().base, Base::Quarter);
        }
    }

    #[test]
    fn test_duration_carry_within_measure() {
        let source = MINIMAL.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | e (3:2h4) (2:3) q [ (4:2) (3:2) (2:3) ] q r |",
        );
        let doc = parse(&source).unwrap();
        let voice = doc.measures[0].track("gtr1").unwrap().voice("v1").unwrap();
        assert_eq!(voice.events.len(), 4);
        assert_eq!(voice.events[0].duration().base, Base::Eighth);
        assert_eq!(voice.events[1].duration().base, Base::Eighth);
        assert_eq!(voice.events[2].duration().base, Base::Quarter);
        assert!(matches!(voice.events[2], Event::Chord { .. }));
        assert!(matches!(voice.events[3], Event::Rest { .. }));
    }

    #[test]
    fn test_event_before_duration_fails() {
        let source = MINIMAL.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | (6:3) |",
        );
        let result = parse(&source);
        assert!(result.is_err());
    }

    #[test]
    fn test_carry_does_not_cross_measures() {
        let source = MINIMAL.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | q (6:3) |\nm2: | (6:3) |",
        );
        assert!(parse(&source).is_err());
    }

    #[test]
    fn test_measure_before_directive_fails() {
        let source = r#"format="opentab"
version="0.1"
---
m1: | q (6:3) |
"#;
        match parse(source) {
            Err(OpenTabError::Parse { kind, message, .. }) => {
                assert_eq!(kind, ParseErrorKind::MissingTrackDirective);
                assert_eq!(message, "Measure defined before selecting track/voice");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_delimiter() {
        match parse("format=\"opentab\"\nversion=\"0.1\"\n") {
            Err(OpenTabError::Parse { kind, .. }) => {
                assert_eq!(kind, ParseErrorKind::MissingDelimiter);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_version() {
        let source = MINIMAL.replace("version=\"0.1\"", "version=\"9.9\"");
        match parse(&source) {
            Err(OpenTabError::Parse { kind, .. }) => {
                assert_eq!(kind, ParseErrorKind::UnsupportedFormat);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_time_signature_denominator() {
        let source = MINIMAL.replace("time_signature=\"4/4\"", "time_signature=\"4/3\"");
        match parse(&source) {
            Err(OpenTabError::Parse { kind, .. }) => {
                assert_eq!(kind, ParseErrorKind::InvalidHeaderValue);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_header_keys_preserved() {
        let source = MINIMAL.replace(
            "tempo_bpm=100",
            "tempo_bpm=100\nimported_from=\"ascii\"\nimport_warnings=3",
        );
        let doc = parse(&source).unwrap();
        assert_eq!(
            doc.header.extra.get("imported_from"),
            Some(&Value::String("ascii".to_string()))
        );
        assert_eq!(doc.header.extra.get("import_warnings"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_directive_in_header_fails() {
        let source = "format=\"opentab\"\nversion=\"0.1\"\n@track gtr1\n---\n";
        match parse(source) {
            Err(OpenTabError::Parse { kind, .. }) => {
                assert_eq!(kind, ParseErrorKind::DirectiveOutsideBody);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_body_line_fails() {
        let source = MINIMAL.to_string() + "this is not a tab line\n";
        match parse(&source) {
            Err(OpenTabError::Parse { kind, .. }) => {
                assert_eq!(kind, ParseErrorKind::UnknownLine);
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_implicit_track_synthesized() {
        let source = r#"format="opentab"
version="0.1"
---
@track mystery
m1: | q (6:0) |
"#;
        let doc = parse(source).unwrap();
        assert_eq!(doc.tracks.len(), 1);
        assert_eq!(doc.tracks[0].id, "mystery");
        assert!(doc.tracks[0].tuning.is_none());
    }

    #[test]
    fn test_multi_track_measure_merge() {
        let source = r#"format="opentab"
version="0.1"

[[tracks]]
id="gtr1"

[[tracks]]
id="bass1"
---
@track gtr1
m1: | q (6:3) |
@track bass1
m1: | q (4:5) |
"#;
        let doc = parse(source).unwrap();
        assert_eq!(doc.measures.len(), 1);
        assert!(doc.measures[0].track("gtr1").is_some());
        assert!(doc.measures[0].track("bass1").is_some());
    }

    #[test]
    fn test_same_track_voice_last_writer_wins() {
        let source = r#"format="opentab"
version="0.1"

[[tracks]]
id="gtr1"
---
@track gtr1
m1: | q (6:3) (5:5) |
m1: | h (6:1) |
"#;
        let doc = parse(source).unwrap();
        let voice = doc.measures[0].track("gtr1").unwrap().voice("v1").unwrap();
        assert_eq!(voice.events.len(), 1);
        assert_eq!(voice.events[0].duration().base, Base::Half);
    }

    #[test]
    fn test_voice_directive() {
        let source = r#"format="opentab"
version="0.1"

[[tracks]]
id="gtr1"
---
@track gtr1 voice v2
m1: | q (6:3) |
"#;
        let doc = parse(source).unwrap();
        let tm = doc.measures[0].track("gtr1").unwrap();
        assert!(tm.voice("v2").is_some());
        assert!(tm.voice("v1").is_none());
    }

    #[test]
    fn test_measures_sorted_by_index() {
        let source = r#"format="opentab"
version="0.1"

[[tracks]]
id="gtr1"
---
@track gtr1
m3: | q (6:3) |
m1: | q (6:1) |
"#;
        let doc = parse(source).unwrap();
        let indices: Vec<u32> = doc.measures.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_trailing_comment_preserved_through_parse() {
        let source = MINIMAL.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | q (6:3) | # pickup",
        );
        let doc = parse(&source).unwrap();
        assert_eq!(doc.measures.len(), 1);
    }

    #[test]
    fn test_crlf_input() {
        let source = MINIMAL.replace('\n', "\r\n");
        assert!(parse(&source).is_ok());
    }
}
