//! # Document Model
//!
//! Typed document tree for OpenTab sources.
//!
//! ## Type Hierarchy
//! ```text
//! Document
//!   ├── Header (title, tempo, time signature, swing, unknown keys)
//!   ├── Vec<Track> (id, name, instrument, tuning, capo)
//!   └── Vec<Measure>
//!         ├── index: u32 (1-based, sparse allowed)
//!         └── Vec<(track id, TrackMeasure)>
//!               └── Vec<Voice> (id, Vec<Event>)
//!
//! Event (enum)
//!   ├── Note  { duration, note: NoteRef, annotations }
//!   ├── Chord { duration, notes: Vec<NoteRef>, annotations }
//!   └── Rest  { duration, annotations }
//! ```
//!
//! Every event carries a fully-resolved [`Duration`]; the duration-carry rule
//! is positional state local to the parser and never appears in the model.
//! Pitch is likewise an encoder concern: a [`NoteRef`] stores only the
//! `(string, fret)` pair.
//!
//! Documents are constructed by the parser or an importer, validated, then
//! consumed by an encoder. No component mutates a document after construction.

use serde::{Deserialize, Serialize};

/// The only format identifier the toolchain accepts.
pub const FORMAT: &str = "opentab";
/// The only format version the toolchain accepts.
pub const VERSION: &str = "0.1";

/// Pulses per quarter note used by the MIDI encoder and as MusicXML divisions.
pub const PPQ: u32 = 480;

/// An annotation value: quoted string, number, or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    /// Canonical token spelling, as the writer and formatter emit it.
    pub fn to_token(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }
}

/// An open, ordered key-value bag.
///
/// Unknown keys are preserved; a later duplicate overwrites the earlier value
/// in place so declaration order survives a parse/serialize round trip.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(Vec<(String, Value)>);

impl Annotations {
    pub fn new() -> Self {
        Annotations(Vec::new())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }
}

/// Base note value, whole through 32nd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Base {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl Base {
    /// The grammar letter for this base (`w h q e s t`).
    pub fn letter(&self) -> char {
        match self {
            Base::Whole => 'w',
            Base::Half => 'h',
            Base::Quarter => 'q',
            Base::Eighth => 'e',
            Base::Sixteenth => 's',
            Base::ThirtySecond => 't',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'w' => Some(Base::Whole),
            'h' => Some(Base::Half),
            'q' => Some(Base::Quarter),
            'e' => Some(Base::Eighth),
            's' => Some(Base::Sixteenth),
            't' => Some(Base::ThirtySecond),
            _ => None,
        }
    }

    /// MusicXML `<type>` name.
    pub fn musicxml_type(&self) -> &'static str {
        match self {
            Base::Whole => "whole",
            Base::Half => "half",
            Base::Quarter => "quarter",
            Base::Eighth => "eighth",
            Base::Sixteenth => "16th",
            Base::ThirtySecond => "32nd",
        }
    }

    /// Ticks at a given resolution, before dot and tuplet modifiers.
    pub fn ticks(&self, ppq: u32) -> u64 {
        let ppq = ppq as u64;
        match self {
            Base::Whole => 4 * ppq,
            Base::Half => 2 * ppq,
            Base::Quarter => ppq,
            Base::Eighth => ppq / 2,
            Base::Sixteenth => ppq / 4,
            Base::ThirtySecond => ppq / 8,
        }
    }
}

/// A resolved note duration: base value, dots, optional tuplet denominator.
///
/// The tuplet value is the actual-in-the-time-of-2 denominator (3 for
/// triplets, 5 for quintuplets in the time of 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Duration {
    pub base: Base,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dots: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuplet: Option<u32>,
}

fn is_zero(n: &u8) -> bool {
    *n == 0
}

impl Duration {
    pub fn new(base: Base) -> Self {
        Duration {
            base,
            dots: 0,
            tuplet: None,
        }
    }

    /// Duration in ticks: base ticks, times the dotted factor
    /// `1 + 1/2 + 1/4 + ...`, times `2/tuplet`. Rounded to nearest, never 0.
    pub fn ticks(&self, ppq: u32) -> u64 {
        let mut value = self.base.ticks(ppq) as f64;
        let mut dot_add = 0.5;
        for _ in 0..self.dots {
            value += self.base.ticks(ppq) as f64 * dot_add;
            dot_add /= 2.0;
        }
        if let Some(tuplet) = self.tuplet {
            if tuplet > 0 {
                value *= 2.0 / tuplet as f64;
            }
        }
        (value.round() as u64).max(1)
    }

    /// The grammar token for this duration, e.g. `q.`, `e/3`.
    pub fn token(&self) -> String {
        let mut out = String::new();
        out.push(self.base.letter());
        for _ in 0..self.dots {
            out.push('.');
        }
        if let Some(tuplet) = self.tuplet {
            out.push('/');
            out.push_str(&tuplet.to_string());
        }
        out
    }
}

/// Direction of an inline slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideDirection {
    Up,
    Down,
}

/// An inline technique attached to a note's fret chain.
///
/// Chains are linear and left-associative: in `(3:2h4p2)` the stored base
/// fret is 2 and the chain is hammer 2→4 then pull 4→2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "technique", rename_all = "snake_case")]
pub enum Technique {
    HammerOn { from_fret: u32, to_fret: u32 },
    PullOff { from_fret: u32, to_fret: u32 },
    Slide {
        direction: SlideDirection,
        from_fret: u32,
        to_fret: u32,
    },
    Vibrato,
}

/// A `(string, fret)` reference; strings are numbered 1-based, low to high,
/// matching the track tuning order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRef {
    pub string: u32,
    pub fret: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub techniques: Vec<Technique>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

impl NoteRef {
    pub fn new(string: u32, fret: u32) -> Self {
        NoteRef {
            string,
            fret,
            techniques: Vec::new(),
            annotations: Annotations::new(),
        }
    }
}

/// A timed event inside one voice of one measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Note {
        duration: Duration,
        note: NoteRef,
        #[serde(default, skip_serializing_if = "Annotations::is_empty")]
        annotations: Annotations,
    },
    Chord {
        duration: Duration,
        notes: Vec<NoteRef>,
        #[serde(default, skip_serializing_if = "Annotations::is_empty")]
        annotations: Annotations,
    },
    Rest {
        duration: Duration,
        #[serde(default, skip_serializing_if = "Annotations::is_empty")]
        annotations: Annotations,
    },
}

impl Event {
    pub fn duration(&self) -> &Duration {
        match self {
            Event::Note { duration, .. }
            | Event::Chord { duration, .. }
            | Event::Rest { duration, .. } => duration,
        }
    }
}

/// One voice's event stream within a track measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub events: Vec<Event>,
}

/// Per-track content of a measure, keyed by voice id (default `v1`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMeasure {
    pub voices: Vec<Voice>,
}

impl TrackMeasure {
    /// Fetch or create the voice with the given id, preserving first-seen
    /// order.
    pub fn voice_mut(&mut self, id: &str) -> &mut Voice {
        if let Some(pos) = self.voices.iter().position(|v| v.id == id) {
            return &mut self.voices[pos];
        }
        self.voices.push(Voice {
            id: id.to_string(),
            events: Vec::new(),
        });
        self.voices.last_mut().unwrap()
    }

    pub fn voice(&self, id: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id == id)
    }
}

/// One unit of musical time between bar lines, indexed `m1`, `m2`, ...
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub index: u32,
    /// Mapping track id → content, in first-seen order.
    pub tracks: Vec<(String, TrackMeasure)>,
}

impl Measure {
    pub fn new(index: u32) -> Self {
        Measure {
            index,
            tracks: Vec::new(),
        }
    }

    pub fn track(&self, id: &str) -> Option<&TrackMeasure> {
        self.tracks.iter().find(|(k, _)| k == id).map(|(_, m)| m)
    }

    pub fn track_mut(&mut self, id: &str) -> &mut TrackMeasure {
        if let Some(pos) = self.tracks.iter().position(|(k, _)| k == id) {
            return &mut self.tracks[pos].1;
        }
        self.tracks.push((id.to_string(), TrackMeasure::default()));
        &mut self.tracks.last_mut().unwrap().1
    }
}

/// A declared instrument track. Tracks live for the lifetime of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    /// Ordered low to high, e.g. `["E2","A2","D3","G3","B3","E4"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuning: Option<Vec<String>>,
    /// Capo position in semitones.
    #[serde(default)]
    pub capo: u32,
    /// Unknown track keys, in declaration order.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub extra: Annotations,
}

impl Track {
    pub fn new(id: impl Into<String>) -> Self {
        Track {
            id: id.into(),
            name: None,
            instrument: None,
            tuning: None,
            capo: 0,
            extra: Annotations::new(),
        }
    }
}

/// Time signature; denominator restricted to {1,2,4,8,16,32} by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    /// Expected measure length in ticks: `ppq * numerator * (4 / denominator)`.
    pub fn measure_ticks(&self, ppq: u32) -> u64 {
        (ppq as u64 * self.numerator as u64 * 4) / self.denominator as u64
    }
}

/// Swing feel declared in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Swing {
    #[default]
    None,
    Eighth,
}

/// Document header: known keys typed, unknown keys preserved in `extra`.
///
/// `tempo_bpm`, `time_signature` and `swing` keep their declared/absent
/// distinction so the canonical writer does not invent keys; consumers use
/// [`Header::tempo`] and [`Header::time`] for the defaulted values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<TimeSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing: Option<Swing>,
    /// Unknown header keys, in declaration order.
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub extra: Annotations,
}

impl Header {
    /// Tempo with the documented default of 120 BPM.
    pub fn tempo(&self) -> u32 {
        self.tempo_bpm.unwrap_or(120)
    }

    /// Time signature with the documented default of 4/4.
    pub fn time(&self) -> TimeSignature {
        self.time_signature.unwrap_or_default()
    }
}

/// A complete OpenTab document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub header: Header,
    pub tracks: Vec<Track>,
    /// Measures sorted by index; indices may be sparse.
    pub measures: Vec<Measure>,
}

impl Document {
    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// String count for a track: declared tuning length, else the highest
    /// string index observed in any of its measures, else 6.
    pub fn string_count(&self, track_id: &str) -> usize {
        if let Some(track) = self.track(track_id) {
            if let Some(tuning) = &track.tuning {
                return tuning.len();
            }
        }
        let mut max_string = 0u32;
        for measure in &self.measures {
            if let Some(tm) = measure.track(track_id) {
                for voice in &tm.voices {
                    for event in &voice.events {
                        match event {
                            Event::Note { note, .. } => max_string = max_string.max(note.string),
                            Event::Chord { notes, .. } => {
                                for n in notes {
                                    max_string = max_string.max(n.string);
                                }
                            }
                            Event::Rest { .. } => {}
                        }
                    }
                }
            }
        }
        if max_string == 0 {
            6
        } else {
            max_string as usize
        }
    }
}
