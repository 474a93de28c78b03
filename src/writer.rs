//! # Canonical Writer
//!
//! Serializes a [`Document`] back to OpenTab text in formatter-canonical
//! form: explicit duration token before every event, single spaces, measures
//! in index order, tracks and header keys in declaration order. Both
//! importers build their output through this writer.

use crate::model::{Annotations, Document, Event, Header, NoteRef, Technique, Track, Value};
use crate::model::{FORMAT, VERSION};

/// Serialize a document to OpenTab source text.
pub fn write_document(doc: &Document) -> String {
    let mut out = String::new();
    write_header(&mut out, &doc.header);
    for track in &doc.tracks {
        write_track(&mut out, track);
    }
    out.push_str("\n---\n\n");
    write_body(&mut out, doc);
    out
}

fn push_kv(out: &mut String, key: &str, value: &Value) {
    out.push_str(key);
    out.push('=');
    out.push_str(&value.to_token());
    out.push('\n');
}

fn push_string_kv(out: &mut String, key: &str, value: &str) {
    push_kv(out, key, &Value::String(value.to_string()));
}

fn write_header(out: &mut String, header: &Header) {
    push_string_kv(out, "format", FORMAT);
    push_string_kv(out, "version", VERSION);
    if let Some(title) = &header.title {
        push_string_kv(out, "title", title);
    }
    if let Some(artist) = &header.artist {
        push_string_kv(out, "artist", artist);
    }
    if let Some(album) = &header.album {
        push_string_kv(out, "album", album);
    }
    if let Some(composer) = &header.composer {
        push_string_kv(out, "composer", composer);
    }
    if let Some(source) = &header.source {
        push_string_kv(out, "source", source);
    }
    if let Some(copyright) = &header.copyright {
        push_string_kv(out, "copyright", copyright);
    }
    if let Some(bpm) = header.tempo_bpm {
        push_kv(out, "tempo_bpm", &Value::Int(bpm as i64));
    }
    if let Some(ts) = header.time_signature {
        push_string_kv(
            out,
            "time_signature",
            &format!("{}/{}", ts.numerator, ts.denominator),
        );
    }
    if let Some(swing) = header.swing {
        let name = match swing {
            crate::model::Swing::None => "none",
            crate::model::Swing::Eighth => "eighth",
        };
        push_string_kv(out, "swing", name);
    }
    for (key, value) in header.extra.iter() {
        push_kv(out, key, value);
    }
}

fn write_track(out: &mut String, track: &Track) {
    out.push_str("\n[[tracks]]\n");
    push_string_kv(out, "id", &track.id);
    if let Some(name) = &track.name {
        push_string_kv(out, "name", name);
    }
    if let Some(instrument) = &track.instrument {
        push_string_kv(out, "instrument", instrument);
    }
    if let Some(tuning) = &track.tuning {
        let items: Vec<String> = tuning
            .iter()
            .map(|s| Value::String(s.clone()).to_token())
            .collect();
        out.push_str("tuning=[");
        out.push_str(&items.join(","));
        out.push_str("]\n");
    }
    if track.capo > 0 {
        push_kv(out, "capo", &Value::Int(track.capo as i64));
    }
    for (key, value) in track.extra.iter() {
        push_kv(out, key, value);
    }
}

fn write_body(out: &mut String, doc: &Document) {
    for track in &doc.tracks {
        for voice_id in voice_ids(doc, &track.id) {
            if voice_id == "v1" {
                out.push_str(&format!("@track {}\n", track.id));
            } else {
                out.push_str(&format!("@track {} voice {}\n", track.id, voice_id));
            }
            for measure in &doc.measures {
                let events = measure
                    .track(&track.id)
                    .and_then(|tm| tm.voice(&voice_id))
                    .map(|v| v.events.as_slice());
                if let Some(events) = events {
                    out.push_str(&write_measure_line(measure.index, events));
                    out.push('\n');
                }
            }
        }
    }
}

/// Voice ids used by a track, in first-seen order across sorted measures.
fn voice_ids(doc: &Document, track_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for measure in &doc.measures {
        if let Some(tm) = measure.track(track_id) {
            for voice in &tm.voices {
                if !ids.contains(&voice.id) {
                    ids.push(voice.id.clone());
                }
            }
        }
    }
    ids
}

/// Render one canonical measure line. The ASCII importer reuses this when it
/// assembles its output around comment lines the document model cannot hold.
pub(crate) fn write_measure_line(index: u32, events: &[Event]) -> String {
    let mut out = format!("m{}: |", index);
    for event in events {
        out.push(' ');
        out.push_str(&event.duration().token());
        out.push(' ');
        out.push_str(&write_event(event));
    }
    out.push_str(" |");
    out
}

fn write_event(event: &Event) -> String {
    match event {
        Event::Rest { annotations, .. } => {
            let mut out = String::from("r");
            out.push_str(&write_annotations(annotations));
            out
        }
        Event::Note {
            note, annotations, ..
        } => {
            let mut out = write_note_ref(note);
            // The standalone-note grammar has a single annotation slot; the
            // parser fills the event bag, so prefer it when present.
            if !annotations.is_empty() {
                out.push_str(&write_annotations(annotations));
            } else {
                out.push_str(&write_annotations(&note.annotations));
            }
            out
        }
        Event::Chord {
            notes, annotations, ..
        } => {
            let mut out = String::from("[");
            for note in notes {
                out.push(' ');
                out.push_str(&write_note_ref(note));
                out.push_str(&write_annotations(&note.annotations));
            }
            out.push_str(" ]");
            out.push_str(&write_annotations(annotations));
            out
        }
    }
}

fn write_note_ref(note: &NoteRef) -> String {
    let mut out = format!("({}:{}", note.string, note.fret);
    for technique in &note.techniques {
        match technique {
            Technique::HammerOn { to_fret, .. } => out.push_str(&format!("h{}", to_fret)),
            Technique::PullOff { to_fret, .. } => out.push_str(&format!("p{}", to_fret)),
            Technique::Slide {
                direction, to_fret, ..
            } => match direction {
                crate::model::SlideDirection::Up => out.push_str(&format!("/{}", to_fret)),
                crate::model::SlideDirection::Down => out.push_str(&format!("\\{}", to_fret)),
            },
            Technique::Vibrato => out.push('~'),
        }
    }
    out.push(')');
    out
}

fn write_annotations(annotations: &Annotations) -> String {
    if annotations.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = annotations
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.to_token()))
        .collect();
    format!("{{{}}}", entries.join(", "))
}
