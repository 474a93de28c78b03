//! # MusicXML Generator
//!
//! Generates partwise MusicXML 3.1 from a document: one `<score-part>` per
//! track, a TAB clef with `<staff-tuning>` derived from the track tuning, and
//! `<technical><string><fret>` notations on every note so tablature readers
//! reconstruct the fingering.
//!
//! Durations are expressed in divisions equal to the MIDI resolution (480 per
//! quarter), computed by the same algorithm as the MIDI encoder. Multi-voice
//! measures use `<backup>` so each voice starts at measure offset zero, and
//! short voices are padded with a trailing rest to the full measure length.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use crate::midi::resolve_pitch;
use crate::model::{Document, Duration, Event as TabEvent, Measure, NoteRef, Track, Voice, PPQ};
use crate::pitch::midi_to_step_alter_octave;

/// Convert a document to MusicXML.
pub fn to_musicxml(doc: &Document) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .unwrap();

    let mut root = BytesStart::new("score-partwise");
    root.push_attribute(("version", "3.1"));
    writer.write_event(Event::Start(root)).unwrap();

    if let Some(title) = &doc.header.title {
        writer
            .write_event(Event::Start(BytesStart::new("work")))
            .unwrap();
        write_text_element(&mut writer, "work-title", title);
        writer
            .write_event(Event::End(BytesEnd::new("work")))
            .unwrap();
    }

    if let Some(composer) = &doc.header.composer {
        writer
            .write_event(Event::Start(BytesStart::new("identification")))
            .unwrap();
        let mut creator = BytesStart::new("creator");
        creator.push_attribute(("type", "composer"));
        writer.write_event(Event::Start(creator)).unwrap();
        writer
            .write_event(Event::Text(BytesText::new(composer)))
            .unwrap();
        writer
            .write_event(Event::End(BytesEnd::new("creator")))
            .unwrap();
        writer
            .write_event(Event::End(BytesEnd::new("identification")))
            .unwrap();
    }

    writer
        .write_event(Event::Start(BytesStart::new("part-list")))
        .unwrap();
    for (i, track) in doc.tracks.iter().enumerate() {
        let mut score_part = BytesStart::new("score-part");
        score_part.push_attribute(("id", format!("P{}", i + 1).as_str()));
        writer.write_event(Event::Start(score_part)).unwrap();
        write_text_element(
            &mut writer,
            "part-name",
            track.name.as_deref().unwrap_or(&track.id),
        );
        writer
            .write_event(Event::End(BytesEnd::new("score-part")))
            .unwrap();
    }
    writer
        .write_event(Event::End(BytesEnd::new("part-list")))
        .unwrap();

    for (i, track) in doc.tracks.iter().enumerate() {
        write_part(&mut writer, doc, track, i);
    }

    writer
        .write_event(Event::End(BytesEnd::new("score-partwise")))
        .unwrap();

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).unwrap()
}

fn write_part<W: std::io::Write>(
    writer: &mut Writer<W>,
    doc: &Document,
    track: &Track,
    track_index: usize,
) {
    let mut part = BytesStart::new("part");
    part.push_attribute(("id", format!("P{}", track_index + 1).as_str()));
    writer.write_event(Event::Start(part)).unwrap();

    let expected_ticks = doc.header.time().measure_ticks(PPQ);
    for (i, measure) in doc.measures.iter().enumerate() {
        write_measure(writer, doc, track, measure, i == 0, expected_ticks);
    }

    writer
        .write_event(Event::End(BytesEnd::new("part")))
        .unwrap();
}

fn write_measure<W: std::io::Write>(
    writer: &mut Writer<W>,
    doc: &Document,
    track: &Track,
    measure: &Measure,
    first: bool,
    expected_ticks: u64,
) {
    let mut element = BytesStart::new("measure");
    element.push_attribute(("number", measure.index.to_string().as_str()));
    writer.write_event(Event::Start(element)).unwrap();

    if first {
        write_attributes(writer, doc, track);
    }

    let voices: &[Voice] = measure
        .track(&track.id)
        .map(|tm| tm.voices.as_slice())
        .unwrap_or(&[]);

    let longest_voice = voices
        .iter()
        .map(|v| v.events.iter().map(|e| e.duration().ticks(PPQ)).sum::<u64>())
        .max()
        .unwrap_or(0);
    let span = expected_ticks.max(longest_voice);

    if voices.is_empty() {
        write_padding_rest(writer, span, 1);
    }
    for (vi, voice) in voices.iter().enumerate() {
        let voice_number = vi + 1;
        if vi > 0 {
            writer
                .write_event(Event::Start(BytesStart::new("backup")))
                .unwrap();
            write_text_element(writer, "duration", &span.to_string());
            writer
                .write_event(Event::End(BytesEnd::new("backup")))
                .unwrap();
        }
        let mut cursor = 0u64;
        for event in &voice.events {
            let ticks = event.duration().ticks(PPQ);
            match event {
                TabEvent::Note { duration, note, .. } => {
                    write_note(writer, track, note, duration, ticks, voice_number, false);
                }
                TabEvent::Chord {
                    duration, notes, ..
                } => {
                    for (ni, note) in notes.iter().enumerate() {
                        write_note(writer, track, note, duration, ticks, voice_number, ni > 0);
                    }
                }
                TabEvent::Rest { duration, .. } => {
                    write_rest(writer, duration, ticks, voice_number);
                }
            }
            cursor += ticks;
        }
        if cursor < span {
            write_padding_rest(writer, span - cursor, voice_number);
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new("measure")))
        .unwrap();
}

fn write_attributes<W: std::io::Write>(writer: &mut Writer<W>, doc: &Document, track: &Track) {
    writer
        .write_event(Event::Start(BytesStart::new("attributes")))
        .unwrap();
    write_text_element(writer, "divisions", &PPQ.to_string());

    writer
        .write_event(Event::Start(BytesStart::new("key")))
        .unwrap();
    write_text_element(writer, "fifths", "0");
    writer
        .write_event(Event::End(BytesEnd::new("key")))
        .unwrap();

    let time = doc.header.time();
    writer
        .write_event(Event::Start(BytesStart::new("time")))
        .unwrap();
    write_text_element(writer, "beats", &time.numerator.to_string());
    write_text_element(writer, "beat-type", &time.denominator.to_string());
    writer
        .write_event(Event::End(BytesEnd::new("time")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("clef")))
        .unwrap();
    write_text_element(writer, "sign", "TAB");
    write_text_element(writer, "line", "5");
    writer
        .write_event(Event::End(BytesEnd::new("clef")))
        .unwrap();

    let string_count = doc.string_count(&track.id);
    writer
        .write_event(Event::Start(BytesStart::new("staff-details")))
        .unwrap();
    write_text_element(writer, "staff-lines", &string_count.to_string());
    if let Some(tuning) = &track.tuning {
        // Staff line 1 is the bottom line, i.e. the lowest string.
        for (i, pitch) in tuning.iter().enumerate() {
            if let Some(midi) = crate::pitch::pitch_to_midi(pitch) {
                let (step, alter, octave) = midi_to_step_alter_octave(midi);
                let mut tuning_el = BytesStart::new("staff-tuning");
                tuning_el.push_attribute(("line", (i + 1).to_string().as_str()));
                writer.write_event(Event::Start(tuning_el)).unwrap();
                write_text_element(writer, "tuning-step", step);
                if alter != 0 {
                    write_text_element(writer, "tuning-alter", &alter.to_string());
                }
                write_text_element(writer, "tuning-octave", &octave.to_string());
                writer
                    .write_event(Event::End(BytesEnd::new("staff-tuning")))
                    .unwrap();
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new("staff-details")))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("attributes")))
        .unwrap();
}

fn write_note<W: std::io::Write>(
    writer: &mut Writer<W>,
    track: &Track,
    note: &NoteRef,
    duration: &Duration,
    ticks: u64,
    voice_number: usize,
    chord_member: bool,
) {
    let pitch = match resolve_pitch(track, note) {
        Some(pitch) => pitch,
        None => {
            // Unresolvable pitch degrades to a rest so the voice keeps time.
            if !chord_member {
                write_rest(writer, duration, ticks, voice_number);
            }
            return;
        }
    };

    writer
        .write_event(Event::Start(BytesStart::new("note")))
        .unwrap();
    if chord_member {
        writer
            .write_event(Event::Empty(BytesStart::new("chord")))
            .unwrap();
    }

    let (step, alter, octave) = midi_to_step_alter_octave(pitch as i32);
    writer
        .write_event(Event::Start(BytesStart::new("pitch")))
        .unwrap();
    write_text_element(writer, "step", step);
    if alter != 0 {
        write_text_element(writer, "alter", &alter.to_string());
    }
    write_text_element(writer, "octave", &octave.to_string());
    writer
        .write_event(Event::End(BytesEnd::new("pitch")))
        .unwrap();

    write_text_element(writer, "duration", &ticks.to_string());
    write_text_element(writer, "type", duration.base.musicxml_type());
    for _ in 0..duration.dots {
        writer
            .write_event(Event::Empty(BytesStart::new("dot")))
            .unwrap();
    }
    if let Some(tuplet) = duration.tuplet {
        writer
            .write_event(Event::Start(BytesStart::new("time-modification")))
            .unwrap();
        write_text_element(writer, "actual-notes", &tuplet.to_string());
        write_text_element(writer, "normal-notes", "2");
        writer
            .write_event(Event::End(BytesEnd::new("time-modification")))
            .unwrap();
    }
    write_text_element(writer, "voice", &voice_number.to_string());
    write_text_element(writer, "staff", "1");

    writer
        .write_event(Event::Start(BytesStart::new("notations")))
        .unwrap();
    writer
        .write_event(Event::Start(BytesStart::new("technical")))
        .unwrap();
    write_text_element(writer, "string", &note.string.to_string());
    write_text_element(writer, "fret", &note.fret.to_string());
    writer
        .write_event(Event::End(BytesEnd::new("technical")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("notations")))
        .unwrap();

    writer
        .write_event(Event::End(BytesEnd::new("note")))
        .unwrap();
}

fn write_rest<W: std::io::Write>(
    writer: &mut Writer<W>,
    duration: &Duration,
    ticks: u64,
    voice_number: usize,
) {
    writer
        .write_event(Event::Start(BytesStart::new("note")))
        .unwrap();
    writer
        .write_event(Event::Empty(BytesStart::new("rest")))
        .unwrap();
    write_text_element(writer, "duration", &ticks.to_string());
    write_text_element(writer, "type", duration.base.musicxml_type());
    for _ in 0..duration.dots {
        writer
            .write_event(Event::Empty(BytesStart::new("dot")))
            .unwrap();
    }
    write_text_element(writer, "voice", &voice_number.to_string());
    write_text_element(writer, "staff", "1");
    writer
        .write_event(Event::End(BytesEnd::new("note")))
        .unwrap();
}

/// A typeless rest used to pad a voice (or an empty measure) to full length.
fn write_padding_rest<W: std::io::Write>(writer: &mut Writer<W>, ticks: u64, voice_number: usize) {
    writer
        .write_event(Event::Start(BytesStart::new("note")))
        .unwrap();
    writer
        .write_event(Event::Empty(BytesStart::new("rest")))
        .unwrap();
    write_text_element(writer, "duration", &ticks.to_string());
    write_text_element(writer, "voice", &voice_number.to_string());
    write_text_element(writer, "staff", "1");
    writer
        .write_event(Event::End(BytesEnd::new("note")))
        .unwrap();
}

/// Helper to write a simple text element.
fn write_text_element<W: std::io::Write>(writer: &mut Writer<W>, name: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const SAMPLE: &str = r#"format="opentab"
version="0.1"
title="Riff & Co"
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
    fn test_partwise_skeleton() {
        let xml = to_musicxml(&parse(SAMPLE).unwrap());
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<score-partwise version=\"3.1\">"));
        assert!(xml.contains("<score-part id=\"P1\">"));
        assert!(xml.contains("<part id=\"P1\">"));
        assert!(xml.contains("<measure number=\"1\">"));
    }

    #[test]
    fn test_tab_clef_and_staff_tuning() {
        let xml = to_musicxml(&parse(SAMPLE).unwrap());
        assert!(xml.contains("<sign>TAB</sign>"));
        assert!(xml.contains("<line>5</line>"));
        assert!(xml.contains("<staff-lines>6</staff-lines>"));
        assert!(xml.contains("<staff-tuning line=\"1\"><tuning-step>E</tuning-step><tuning-octave>2</tuning-octave></staff-tuning>"));
        assert!(xml.contains("<staff-tuning line=\"6\"><tuning-step>E</tuning-step><tuning-octave>4</tuning-octave></staff-tuning>"));
    }

    #[test]
    fn test_divisions_and_durations() {
        let xml = to_musicxml(&parse(SAMPLE).unwrap());
        assert!(xml.contains("<divisions>480</divisions>"));
        assert!(xml.contains("<duration>480</duration>"));
        assert!(xml.contains("<type>quarter</type>"));
    }

    #[test]
    fn test_technical_string_fret() {
        let xml = to_musicxml(&parse(SAMPLE).unwrap());
        assert!(xml.contains("<technical><string>6</string><fret>3</fret></technical>"));
    }

    #[test]
    fn test_title_is_escaped() {
        let xml = to_musicxml(&parse(SAMPLE).unwrap());
        assert!(xml.contains("<work-title>Riff &amp; Co</work-title>"));
    }

    #[test]
    fn test_chord_members_marked() {
        let source = SAMPLE.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | q [ (4:2) (3:2) (2:3) ] q r |",
        );
        let xml = to_musicxml(&parse(&source).unwrap());
        assert_eq!(xml.matches("<chord/>").count(), 2);
        assert!(xml.contains("<rest/>"));
    }

    #[test]
    fn test_tuplet_time_modification() {
        let source = SAMPLE.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | q/3 (6:3) (6:5) (6:7) q (6:0) q (6:0) q (6:0) |",
        );
        let xml = to_musicxml(&parse(&source).unwrap());
        assert!(xml.contains("<actual-notes>3</actual-notes>"));
        assert!(xml.contains("<normal-notes>2</normal-notes>"));
    }

    #[test]
    fn test_short_voice_padded_with_rest() {
        let source = SAMPLE.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | h (6:0) |",
        );
        let xml = to_musicxml(&parse(&source).unwrap());
        assert!(xml.contains("<rest/><duration>960</duration>"));
    }

    #[test]
    fn test_multi_voice_backup() {
        let source = SAMPLE.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | w (6:0) |",
        ) + "@track gtr1 voice v2\nm1: | h (1:0) h (1:3) |\n";
        let xml = to_musicxml(&parse(&source).unwrap());
        assert!(xml.contains("<backup><duration>1920</duration></backup>"));
        assert!(xml.contains("<voice>2</voice>"));
    }
}
