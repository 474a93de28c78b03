//! Integration tests for the OpenTab toolchain.
//!
//! Exercises the full pipeline through the public API: parse, format,
//! validate, encode, and import.

use pretty_assertions::assert_eq;

use opentab::{
    check, format, import_ascii, parse, to_ascii, to_midi, to_musicxml, validate,
    write_document, Event, OpenTabError, ParseErrorKind, RhythmStrategy, PPQ,
};

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
fn test_minimal_scenario_parses() {
    let doc = parse(MINIMAL).unwrap();
    assert_eq!(doc.tracks.len(), 1);
    assert_eq!(doc.measures.len(), 1);
    let voice = doc.measures[0].track("gtr1").unwrap().voice("v1").unwrap();
    assert_eq!(voice.events.len(), 4);
}

#[test]
fn test_minimal_scenario_formats_with_explicit_durations() {
    let formatted = format(MINIMAL);
    assert!(formatted.contains("m1: | q (6:3) q (5:5) q (4:5) q (3:3) |"));
}

#[test]
fn test_parse_format_idempotence() {
    let once = format(MINIMAL);
    assert!(parse(&once).is_ok());
    assert_eq!(format(&once), once);
}

#[test]
fn test_round_trip_through_serializer() {
    let doc = parse(MINIMAL).unwrap();
    assert_eq!(format(&write_document(&doc)), format(MINIMAL));
}

#[test]
fn test_duration_expansion_property() {
    let source = MINIMAL.replace(
        "m1: | q (6:3) (5:5) (4:5) (3:3) |",
        "m1: | e (3:2h4) (2:3) q [ (4:2) (3:2) (2:3) ] q r |",
    );
    let formatted = format(&source);
    let measure_line = formatted
        .lines()
        .find(|l| l.starts_with("m1:"))
        .expect("measure line survives formatting");
    let inner = measure_line
        .trim_start_matches("m1:")
        .trim()
        .trim_matches('|')
        .trim();
    // Every event token must be immediately preceded by a duration token.
    let tokens: Vec<&str> = split_top_level(inner);
    for pair in tokens.chunks(2) {
        assert_eq!(pair.len(), 2, "odd token in {:?}", tokens);
        assert!(
            pair[0].len() <= 4 && "whqest".contains(&pair[0][..1]),
            "expected duration token, got '{}'",
            pair[0]
        );
    }
}

/// Minimal bracket-aware splitter for assertions on formatted output.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut start = None;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth -= 1,
            _ => {}
        }
        if c.is_whitespace() && depth == 0 {
            if let Some(s0) = start.take() {
                tokens.push(&s[s0..i]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s0) = start {
        tokens.push(&s[s0..]);
    }
    tokens
}

#[test]
fn test_chord_and_rest_scenario() {
    let source = MINIMAL.replace(
        "m1: | q (6:3) (5:5) (4:5) (3:3) |",
        "m1: | e (3:2h4) (2:3) q [ (4:2) (3:2) (2:3) ] q r |",
    );
    let doc = parse(&source).unwrap();
    let voice = doc.measures[0].track("gtr1").unwrap().voice("v1").unwrap();
    assert_eq!(voice.events.len(), 4);
    assert!(matches!(voice.events[0], Event::Note { ref note, .. } if !note.techniques.is_empty()));
    assert!(matches!(voice.events[1], Event::Note { .. }));
    assert!(matches!(voice.events[2], Event::Chord { ref notes, .. } if notes.len() == 3));
    assert!(matches!(voice.events[3], Event::Rest { .. }));
}

#[test]
fn test_missing_directive_scenario() {
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
fn test_ascii_encode_scenario() {
    let ascii = to_ascii(&parse(MINIMAL).unwrap());
    let rows: Vec<&str> = ascii.lines().collect();
    assert_eq!(rows[2], "E4 |-------|");
    assert_eq!(rows[7], "E2 |3------|");
}

#[test]
fn test_midi_header_property() {
    let bytes = to_midi(&parse(MINIMAL).unwrap()).unwrap();
    assert_eq!(&bytes[0..4], &[0x4D, 0x54, 0x68, 0x64]);
    assert_eq!(&bytes[12..14], &[0x01, 0xE0]);
    assert_eq!(PPQ, 480);
}

#[test]
fn test_midi_encode_scenario() {
    // Format 0, four note-on/note-off pairs, one per quarter.
    let bytes = to_midi(&parse(MINIMAL).unwrap()).unwrap();
    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.header.format, midly::Format::SingleTrack);
    assert_eq!(smf.tracks.len(), 1);

    let mut tick = 0u64;
    let mut ons = Vec::new();
    let mut offs = Vec::new();
    for event in &smf.tracks[0] {
        tick += u64::from(event.delta.as_int());
        match event.kind {
            midly::TrackEventKind::Midi {
                message: midly::MidiMessage::NoteOn { key, .. },
                ..
            } => ons.push((tick, key.as_int())),
            midly::TrackEventKind::Midi {
                message: midly::MidiMessage::NoteOff { key, .. },
                ..
            } => offs.push((tick, key.as_int())),
            _ => {}
        }
    }
    assert_eq!(ons, vec![(0, 43), (480, 50), (960, 55), (1440, 58)]);
    assert_eq!(offs, vec![(480, 43), (960, 50), (1440, 55), (1920, 58)]);
}

#[test]
fn test_measure_tick_length_property() {
    // Three 4/4 measures, none overfull: track length is 3 * 1920 ticks.
    let source = MINIMAL.replace(
        "m1: | q (6:3) (5:5) (4:5) (3:3) |",
        "m1: | w (6:0) |\nm2: | h (6:0) h (6:0) |\nm3: | q (6:0) |",
    );
    let bytes = to_midi(&parse(&source).unwrap()).unwrap();
    let smf = midly::Smf::parse(&bytes).unwrap();
    let mut tick = 0u64;
    let mut last_off = 0u64;
    for event in &smf.tracks[0] {
        tick += u64::from(event.delta.as_int());
        if let midly::TrackEventKind::Midi {
            message: midly::MidiMessage::NoteOff { .. },
            ..
        } = event.kind
        {
            last_off = tick;
        }
    }
    // The final note starts at measure 3 (tick 3840) and lasts a quarter.
    assert_eq!(last_off, 2 * 1920 + 480);
}

#[test]
fn test_musicxml_prologue_and_tab_clef() {
    let xml = to_musicxml(&parse(MINIMAL).unwrap());
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<score-partwise version=\"3.1\">"));
    assert!(xml.contains("<sign>TAB</sign>"));
    assert!(xml.contains("<divisions>480</divisions>"));
}

#[test]
fn test_bracket_balance_diagnostic() {
    let source = MINIMAL.replace("m1: | q (6:3) (5:5) (4:5) (3:3) |", "m1: | q (6:3 ] |");
    let diagnostics = check(&source);
    assert!(diagnostics
        .iter()
        .any(|d| d.message.contains("Unbalanced brackets")));
}

#[test]
fn test_schema_trip_on_samples() {
    let chord_rest = MINIMAL.replace(
        "m1: | q (6:3) (5:5) (4:5) (3:3) |",
        "m1: | e (3:2h4) (2:3) q [ (4:2) (3:2) (2:3) ] q r |",
    );
    for sample in [MINIMAL.to_string(), chord_rest] {
        let doc = parse(&sample).unwrap();
        let report = validate(&doc);
        assert!(report.ok, "schema errors: {:?}", report.errors);
    }
}

#[test]
fn test_importer_scenario() {
    let tab = r#"[Chorus]
e|-----------------|
B|-----------------|
G|-----------------|
D|-----------------|
A|-5-5---5---------|
E|-3-3---3---------|
"#;
    let import = import_ascii(tab, RhythmStrategy::Unknown);
    assert!(import.source.contains("# [Chorus]"));
    assert!(import.source.contains("rhythm=\"unknown\""));

    let doc = parse(&import.source).unwrap();
    assert!(validate(&doc).ok);
    assert_eq!(doc.tracks[0].id, "gtr1");
}

#[test]
fn test_format_file_in_place() {
    // The fmt --write flow: read, format, overwrite, re-read.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("riff.otab");
    std::fs::write(&path, MINIMAL).unwrap();

    let formatted = format(&std::fs::read_to_string(&path).unwrap());
    std::fs::write(&path, &formatted).unwrap();

    let reread = std::fs::read_to_string(&path).unwrap();
    assert_eq!(reread, formatted);
    assert_eq!(parse(&reread).unwrap(), parse(MINIMAL).unwrap());
}

#[test]
fn test_import_then_reformat_is_stable() {
    let tab = "e|--3--5--|\nB|--------|\nG|--------|\nD|--------|\nA|--------|\nE|--------|\n";
    let import = import_ascii(tab, RhythmStrategy::FixedEighth);
    assert_eq!(format(&import.source), import.source);
}
