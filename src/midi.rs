//! # MIDI Encoder
//!
//! Document → Standard MIDI File bytes. Format 0 for single-track documents,
//! Format 1 for multi-track, 480 ticks per quarter note.
//!
//! Events are collected with absolute ticks, sorted, then converted to delta
//! times before writing. At equal ticks the order is meta events, then
//! note-offs, then note-ons, so a note ending exactly where another starts
//! does not swallow the new one.
//!
//! The encoder is permissive: notes it cannot resolve to a pitch (missing
//! tuning, string outside the tuning, result outside 0..=127) are dropped.

use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::error::OpenTabError;
use crate::model::{Document, Event, NoteRef, Track, PPQ};
use crate::pitch::pitch_to_midi;

const VELOCITY: u8 = 64;

/// Event ordering classes at equal tick.
const CLASS_META: u8 = 0;
const CLASS_NOTE_OFF: u8 = 1;
const CLASS_NOTE_ON: u8 = 2;

/// Encode a document as SMF bytes.
pub fn to_midi(doc: &Document) -> Result<Vec<u8>, OpenTabError> {
    let mut tracks = Vec::new();
    for (i, track) in doc.tracks.iter().enumerate() {
        tracks.push(build_track(doc, track, i));
    }

    let format = if tracks.len() <= 1 {
        Format::SingleTrack
    } else {
        Format::Parallel
    };
    let smf = Smf {
        header: Header {
            format,
            timing: Timing::Metrical((PPQ as u16).into()),
        },
        tracks,
    };

    let mut out = Vec::new();
    smf.write(&mut out)
        .map_err(|e| OpenTabError::Midi(e.to_string()))?;
    Ok(out)
}

fn build_track<'a>(doc: &'a Document, track: &'a Track, track_index: usize) -> Vec<TrackEvent<'a>> {
    let channel = (track_index % 16) as u8;
    let mut events: Vec<(u64, u8, TrackEventKind<'a>)> = Vec::new();

    let name = track.name.as_deref().unwrap_or(&track.id);
    events.push((
        0,
        CLASS_META,
        TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
    ));

    let micros_per_beat = (60_000_000.0 / doc.header.tempo() as f64).round() as u32;
    events.push((
        0,
        CLASS_META,
        TrackEventKind::Meta(MetaMessage::Tempo(micros_per_beat.into())),
    ));

    let time = doc.header.time();
    events.push((
        0,
        CLASS_META,
        TrackEventKind::Meta(MetaMessage::TimeSignature(
            time.numerator as u8,
            denominator_power(time.denominator),
            24,
            8,
        )),
    ));

    let expected_ticks = time.measure_ticks(PPQ);
    let mut measure_start = 0u64;
    for measure in &doc.measures {
        let mut longest_voice = 0u64;
        if let Some(tm) = measure.track(&track.id) {
            for voice in &tm.voices {
                let mut cursor = measure_start;
                for event in &voice.events {
                    let duration = event.duration().ticks(PPQ);
                    match event {
                        Event::Note { note, .. } => {
                            push_note(&mut events, track, note, channel, cursor, duration);
                        }
                        Event::Chord { notes, .. } => {
                            for note in notes {
                                push_note(&mut events, track, note, channel, cursor, duration);
                            }
                        }
                        Event::Rest { .. } => {}
                    }
                    cursor += duration;
                }
                longest_voice = longest_voice.max(cursor - measure_start);
            }
        }
        measure_start += expected_ticks.max(longest_voice);
    }

    events.sort_by_key(|(tick, class, _)| (*tick, *class));

    let mut track_events = Vec::with_capacity(events.len() + 1);
    let mut prev_tick = 0u64;
    for (tick, _, kind) in events {
        let delta = (tick - prev_tick) as u32;
        prev_tick = tick;
        track_events.push(TrackEvent {
            delta: delta.into(),
            kind,
        });
    }
    track_events.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track_events
}

fn push_note<'a>(
    events: &mut Vec<(u64, u8, TrackEventKind<'a>)>,
    track: &Track,
    note: &NoteRef,
    channel: u8,
    start: u64,
    duration: u64,
) {
    let pitch = match resolve_pitch(track, note) {
        Some(pitch) => pitch,
        None => {
            log::debug!(
                "dropping unresolvable note (string {}, fret {}) on track '{}'",
                note.string,
                note.fret,
                track.id
            );
            return;
        }
    };
    events.push((
        start,
        CLASS_NOTE_ON,
        TrackEventKind::Midi {
            channel: channel.into(),
            message: MidiMessage::NoteOn {
                key: pitch.into(),
                vel: VELOCITY.into(),
            },
        },
    ));
    events.push((
        start + duration,
        CLASS_NOTE_OFF,
        TrackEventKind::Midi {
            channel: channel.into(),
            message: MidiMessage::NoteOff {
                key: pitch.into(),
                vel: 0.into(),
            },
        },
    ));
}

/// `(string, fret)` → MIDI number. String 1 is the highest-pitched string, so
/// the open pitch lives at `tuning[len - string]`.
pub(crate) fn resolve_pitch(track: &Track, note: &NoteRef) -> Option<u8> {
    let tuning = track.tuning.as_ref()?;
    if note.string == 0 || note.string as usize > tuning.len() {
        return None;
    }
    let open = pitch_to_midi(&tuning[tuning.len() - note.string as usize])?;
    let pitch = open + note.fret as i32 + track.capo as i32;
    if (0..=127).contains(&pitch) {
        Some(pitch as u8)
    } else {
        None
    }
}

/// MIDI time-signature denominators are powers of two.
fn denominator_power(denominator: u32) -> u8 {
    denominator.trailing_zeros() as u8
}
