//! # Schema Validator
//!
//! Pure structural check over the model: required fields present, enums in
//! range, integers in range, tuning strings well-formed. Grammar checks are
//! the parser's job and are not re-run here; a document that parsed is
//! trusted to be grammatically sound.
//!
//! The report is the boundary artifact: any document crossing a package
//! boundary is expected to pass [`validate`] first.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::model::{Document, Event, NoteRef};

static TUNING_PITCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Ga-g][#b]?-?\d+$").unwrap());

/// One structural finding, addressed by a dotted path into the document.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaError {
    pub path: String,
    pub message: String,
}

/// Validation outcome. Serializes to `{"ok":…,"errors":[…]}`.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub ok: bool,
    pub errors: Vec<SchemaError>,
}

impl SchemaReport {
    fn from_errors(errors: Vec<SchemaError>) -> Self {
        SchemaReport {
            ok: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a document against the fixed schema.
pub fn validate(doc: &Document) -> SchemaReport {
    let mut errors = Vec::new();
    check_header(doc, &mut errors);
    check_tracks(doc, &mut errors);
    check_measures(doc, &mut errors);
    SchemaReport::from_errors(errors)
}

fn push(errors: &mut Vec<SchemaError>, path: impl Into<String>, message: impl Into<String>) {
    errors.push(SchemaError {
        path: path.into(),
        message: message.into(),
    });
}

fn check_header(doc: &Document, errors: &mut Vec<SchemaError>) {
    if let Some(bpm) = doc.header.tempo_bpm {
        if bpm == 0 {
            push(errors, "header.tempo_bpm", "must be a positive integer");
        }
    }
    if let Some(ts) = doc.header.time_signature {
        if ts.numerator < 1 {
            push(errors, "header.time_signature", "numerator must be >= 1");
        }
        if ![1, 2, 4, 8, 16, 32].contains(&ts.denominator) {
            push(
                errors,
                "header.time_signature",
                "denominator must be one of 1, 2, 4, 8, 16, 32",
            );
        }
    }
}

fn check_tracks(doc: &Document, errors: &mut Vec<SchemaError>) {
    for (i, track) in doc.tracks.iter().enumerate() {
        let path = format!("tracks[{}]", i);
        if track.id.is_empty() {
            push(errors, format!("{}.id", path), "id must be non-empty");
        }
        if doc.tracks[..i].iter().any(|t| t.id == track.id) {
            push(
                errors,
                format!("{}.id", path),
                format!("duplicate track id '{}'", track.id),
            );
        }
        if let Some(tuning) = &track.tuning {
            for (j, pitch) in tuning.iter().enumerate() {
                if !TUNING_PITCH.is_match(pitch) {
                    push(
                        errors,
                        format!("{}.tuning[{}]", path, j),
                        format!("'{}' is not a scientific pitch", pitch),
                    );
                }
            }
        }
    }
}

fn check_measures(doc: &Document, errors: &mut Vec<SchemaError>) {
    for (i, measure) in doc.measures.iter().enumerate() {
        let path = format!("measures[{}]", i);
        if measure.index == 0 {
            push(errors, format!("{}.index", path), "index must be >= 1");
        }
        if doc.measures[..i].iter().any(|m| m.index == measure.index) {
            push(
                errors,
                format!("{}.index", path),
                format!("duplicate measure index {}", measure.index),
            );
        }
        for (track_id, tm) in &measure.tracks {
            let string_limit = doc
                .track(track_id)
                .and_then(|t| t.tuning.as_ref())
                .map(|t| t.len() as u32);
            for voice in &tm.voices {
                for (k, event) in voice.events.iter().enumerate() {
                    let event_path =
                        format!("{}.{}.{}.events[{}]", path, track_id, voice.id, k);
                    check_event(event, &event_path, string_limit, errors);
                }
            }
        }
    }
}

fn check_event(
    event: &Event,
    path: &str,
    string_limit: Option<u32>,
    errors: &mut Vec<SchemaError>,
) {
    let duration = event.duration();
    if duration.dots > 2 {
        push(
            errors,
            format!("{}.duration", path),
            "at most two dots are allowed",
        );
    }
    if duration.tuplet == Some(0) {
        push(
            errors,
            format!("{}.duration", path),
            "tuplet denominator must be >= 1",
        );
    }
    match event {
        Event::Note { note, .. } => {
            check_note_ref(note, &format!("{}.note", path), string_limit, errors);
        }
        Event::Chord { notes, .. } => {
            if notes.is_empty() {
                push(errors, format!("{}.chord", path), "chord must be non-empty");
            }
            for (j, note) in notes.iter().enumerate() {
                check_note_ref(
                    note,
                    &format!("{}.chord[{}]", path, j),
                    string_limit,
                    errors,
                );
            }
        }
        Event::Rest { .. } => {}
    }
}

fn check_note_ref(
    note: &NoteRef,
    path: &str,
    string_limit: Option<u32>,
    errors: &mut Vec<SchemaError>,
) {
    if note.string < 1 {
        push(errors, format!("{}.string", path), "string must be >= 1");
    }
    if let Some(limit) = string_limit {
        if note.string > limit {
            push(
                errors,
                format!("{}.string", path),
                format!("string {} exceeds the declared tuning of {}", note.string, limit),
            );
        }
    }
}
