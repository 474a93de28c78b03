//! # GPX Importer
//!
//! Reads the GPIF XML document out of a Guitar Pro `.gpx` archive and
//! converts it to OpenTab source. The GPIF format references top-level
//! collections by id, so the walk builds four id → node maps up front and
//! follows refs lazily: MasterBars list bar ids per track, bars list voices,
//! voices list beats, beats list notes.
//!
//! Playing effects are recognized but ignored with a warning; only string,
//! fret, duration and tuning survive the trip.

use std::collections::{BTreeSet, HashMap};
use std::io::{Cursor, Read};

use roxmltree::Node;

use crate::error::OpenTabError;
use crate::import::Import;
use crate::model::{
    Base, Document, Duration, Event, Header, NoteRef, TimeSignature, Track,
};
use crate::pitch::midi_to_name;
use crate::writer::write_document;

/// Import a `.gpx` archive.
pub fn import_gpx(bytes: &[u8]) -> Result<Import, OpenTabError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| OpenTabError::Import(format!("not a readable archive: {}", e)))?;

    let gpif_index = (0..archive.len())
        .find(|&i| {
            archive
                .by_index(i)
                .map(|f| f.name().ends_with(".gpif"))
                .unwrap_or(false)
        })
        .ok_or_else(|| OpenTabError::Import("no .gpif entry in archive".to_string()))?;

    let mut xml = String::new();
    archive
        .by_index(gpif_index)
        .map_err(|e| OpenTabError::Import(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| OpenTabError::Import(format!("unreadable .gpif entry: {}", e)))?;

    parse_gpif(&xml)
}

/// Convert a GPIF document to OpenTab source. Split out of [`import_gpx`] so
/// the XML walk is testable without building archives.
pub(crate) fn parse_gpif(xml: &str) -> Result<Import, OpenTabError> {
    let tree = roxmltree::Document::parse(xml)
        .map_err(|e| OpenTabError::Import(format!("invalid GPIF XML: {}", e)))?;
    let root = tree.root_element();
    let mut warnings = Vec::new();

    let mut header = Header::default();
    header.title = find_path(root, &["Score", "Title"])
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    header.tempo_bpm = read_tempo(root);
    header.time_signature = read_time_signature(root);

    // Id → node maps for the four referenced collections.
    let bars = collect_by_id(root, "Bars", "Bar");
    let voices = collect_by_id(root, "Voices", "Voice");
    let beats = collect_by_id(root, "Beats", "Beat");
    let notes = collect_by_id(root, "Notes", "Note");

    let mut doc = Document::default();
    doc.header = header;

    let track_nodes: Vec<Node> = child(root, "Tracks")
        .map(|t| t.children().filter(|n| n.has_tag_name("Track")).collect())
        .unwrap_or_default();
    for (i, node) in track_nodes.iter().enumerate() {
        let mut track = Track::new(format!("trk{}", i + 1));
        track.name = child(*node, "Name")
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        track.tuning = read_tuning(*node);
        track.capo = read_capo(*node).unwrap_or(0);
        doc.tracks.push(track);
    }

    let master_bars: Vec<Node> = child(root, "MasterBars")
        .map(|t| {
            t.children()
                .filter(|n| n.has_tag_name("MasterBar"))
                .collect()
        })
        .unwrap_or_default();

    let mut ignored_effects = BTreeSet::new();
    for (bar_index, master_bar) in master_bars.iter().enumerate() {
        let measure_index = (bar_index + 1) as u32;
        let bar_ids = id_list(child(*master_bar, "Bars"));
        let measure = {
            doc.measures.push(crate::model::Measure::new(measure_index));
            doc.measures.last_mut().unwrap()
        };
        for (track_index, bar_id) in bar_ids.iter().enumerate() {
            let track_id = match doc.tracks.get(track_index) {
                Some(track) => track.id.clone(),
                None => continue,
            };
            let string_count = doc.tracks[track_index]
                .tuning
                .as_ref()
                .map(|t| t.len() as u32)
                .unwrap_or(6);
            let bar = match bars.get(bar_id) {
                Some(bar) => *bar,
                None => continue,
            };
            let voice_ids: Vec<i64> = id_list(child(bar, "Voices"))
                .into_iter()
                .filter(|&v| v >= 0)
                .collect();
            for (vi, voice_id) in voice_ids.iter().enumerate() {
                let voice_node = match voices.get(voice_id) {
                    Some(v) => *v,
                    None => continue,
                };
                let events = read_voice_events(
                    voice_node,
                    &beats,
                    &notes,
                    string_count,
                    &mut ignored_effects,
                );
                if events.is_empty() {
                    continue;
                }
                let slot = measure
                    .track_mut(&track_id)
                    .voice_mut(&format!("v{}", vi + 1));
                slot.events = events;
            }
        }
    }
    doc.measures.retain(|m| !m.tracks.is_empty());

    for effect in ignored_effects {
        warnings.push(format!("ignoring effect '{}'", effect));
        log::warn!("gpx import: ignoring effect '{}'", effect);
    }

    Ok(Import {
        source: write_document(&doc),
        warnings,
    })
}

fn read_voice_events(
    voice: Node,
    beats: &HashMap<i64, Node>,
    notes: &HashMap<i64, Node>,
    string_count: u32,
    ignored_effects: &mut BTreeSet<String>,
) -> Vec<Event> {
    let mut events = Vec::new();
    for beat_id in id_list(child(voice, "Beats")) {
        let beat = match beats.get(&beat_id) {
            Some(beat) => *beat,
            None => continue,
        };
        let duration = read_duration(beat).unwrap_or(Duration::new(Base::Quarter));

        let mut refs = Vec::new();
        for note_id in id_list(child(beat, "Notes")) {
            let note_node = match notes.get(&note_id) {
                Some(n) => *n,
                None => continue,
            };
            if let Some(note_ref) = read_note(note_node, string_count, ignored_effects) {
                refs.push(note_ref);
            }
        }

        let event = match refs.len() {
            0 => Event::Rest {
                duration,
                annotations: Default::default(),
            },
            1 => Event::Note {
                duration,
                note: refs.remove(0),
                annotations: Default::default(),
            },
            _ => Event::Chord {
                duration,
                notes: refs,
                annotations: Default::default(),
            },
        };
        events.push(event);
    }
    events
}

/// A beat's `Duration`: `Value` 1..32 plus optional `Dots`/`Tuplet`, as
/// attributes or child elements.
fn read_duration(beat: Node) -> Option<Duration> {
    let duration = child(beat, "Duration")?;
    let value = read_field(duration, "Value")?;
    let base = match value {
        1 => Base::Whole,
        2 => Base::Half,
        4 => Base::Quarter,
        8 => Base::Eighth,
        16 => Base::Sixteenth,
        32 => Base::ThirtySecond,
        _ => return None,
    };
    let dots = read_field(duration, "Dots").unwrap_or(0).clamp(0, 2) as u8;
    let tuplet = read_field(duration, "Tuplet").filter(|&t| t > 1).map(|t| t as u32);
    Some(Duration { base, dots, tuplet })
}

fn read_note(
    node: Node,
    string_count: u32,
    ignored_effects: &mut BTreeSet<String>,
) -> Option<NoteRef> {
    let mut string = None;
    let mut fret = None;
    for property in node.descendants().filter(|n| n.has_tag_name("Property")) {
        match property.attribute("name") {
            Some("String") => string = number_text(property),
            Some("Fret") => fret = number_text(property),
            Some(other) => {
                ignored_effects.insert(other.to_string());
            }
            None => {}
        }
    }
    // Bare <String>/<Fret> children, without the Properties wrapper.
    if string.is_none() {
        string = child(node, "String").and_then(|n| n.text()).and_then(|t| t.trim().parse().ok());
    }
    if fret.is_none() {
        fret = child(node, "Fret").and_then(|n| n.text()).and_then(|t| t.trim().parse().ok());
    }

    let gpif_string: i64 = string?;
    let fret: i64 = fret?;
    if gpif_string < 0 || fret < 0 || gpif_string as u32 >= string_count {
        return None;
    }
    // GPIF numbers strings from the lowest; the model numbers from the
    // highest, so string 0 maps to the bottom row.
    Some(NoteRef::new(string_count - gpif_string as u32, fret as u32))
}

fn read_tempo(root: Node) -> Option<u32> {
    let automations = find_path(root, &["MasterTrack", "Automations"])?;
    for automation in automations
        .children()
        .filter(|n| n.has_tag_name("Automation"))
    {
        let is_tempo = child(automation, "Type")
            .and_then(|n| n.text())
            .map(|t| t.trim() == "Tempo")
            .unwrap_or(false);
        if !is_tempo {
            continue;
        }
        let value = child(automation, "Value").and_then(|n| n.text())?;
        let bpm: f64 = value.split_whitespace().next()?.parse().ok()?;
        if bpm >= 1.0 {
            return Some(bpm.round() as u32);
        }
    }
    None
}

fn read_time_signature(root: Node) -> Option<TimeSignature> {
    let master_bars = child(root, "MasterBars")?;
    let first = master_bars
        .children()
        .find(|n| n.has_tag_name("MasterBar"))?;
    let time = child(first, "Time")?.text()?;
    let (num, den) = time.trim().split_once('/')?;
    let numerator = num.parse().ok()?;
    let denominator = den.parse().ok()?;
    if numerator >= 1 && [1, 2, 4, 8, 16, 32].contains(&denominator) {
        Some(TimeSignature {
            numerator,
            denominator,
        })
    } else {
        None
    }
}

/// `Property name="Tuning"` → `<Pitches>` of space-separated MIDI numbers,
/// low string first.
fn read_tuning(track: Node) -> Option<Vec<String>> {
    for property in track.descendants().filter(|n| n.has_tag_name("Property")) {
        if property.attribute("name") == Some("Tuning") {
            let pitches = child(property, "Pitches")?.text()?;
            let midi: Vec<i32> = pitches
                .split_whitespace()
                .filter_map(|t| t.parse().ok())
                .collect();
            if midi.is_empty() {
                return None;
            }
            return Some(midi.into_iter().map(midi_to_name).collect());
        }
    }
    None
}

fn read_capo(track: Node) -> Option<u32> {
    for property in track.descendants().filter(|n| n.has_tag_name("Property")) {
        if property.attribute("name") == Some("Capo")
            || property.attribute("name") == Some("CapoFret")
        {
            return number_text(property).and_then(|n| u32::try_from(n).ok());
        }
    }
    None
}

/// First numeric child text under a property (`<String>5</String>`,
/// `<Fret>3</Fret>`, `<Fret>` under `CapoFret`, ...).
fn number_text(property: Node) -> Option<i64> {
    property
        .children()
        .filter(|n| n.is_element())
        .find_map(|n| n.text().and_then(|t| t.trim().parse().ok()))
}

/// Attribute or child element with a numeric value.
fn read_field(node: Node, name: &str) -> Option<i64> {
    if let Some(value) = node.attribute(name) {
        return value.trim().parse().ok();
    }
    child(node, name)?.text()?.trim().parse().ok()
}

/// Space-separated id list in a node's text (`<Bars>0 1</Bars>`).
fn id_list(node: Option<Node>) -> Vec<i64> {
    node.and_then(|n| n.text())
        .map(|t| t.split_whitespace().filter_map(|v| v.parse().ok()).collect())
        .unwrap_or_default()
}

fn child<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn find_path<'a>(node: Node<'a, 'a>, path: &[&str]) -> Option<Node<'a, 'a>> {
    let mut current = node;
    for name in path {
        current = child(current, name)?;
    }
    Some(current)
}

fn collect_by_id<'a>(
    root: Node<'a, 'a>,
    collection: &str,
    element: &str,
) -> HashMap<i64, Node<'a, 'a>> {
    let mut map = HashMap::new();
    if let Some(parent) = child(root, collection) {
        for node in parent.children().filter(|n| n.has_tag_name(element)) {
            if let Some(id) = node.attribute("id").and_then(|v| v.parse().ok()) {
                map.insert(id, node);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use std::io::Write;

    const GPIF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<GPIF>
  <Score><Title>Test Song</Title></Score>
  <MasterTrack>
    <Automations>
      <Automation><Type>Tempo</Type><Value>90 2</Value></Automation>
    </Automations>
  </MasterTrack>
  <MasterBars>
    <MasterBar><Time>3/4</Time><Bars>0</Bars></MasterBar>
    <MasterBar><Time>3/4</Time><Bars>1</Bars></MasterBar>
  </MasterBars>
  <Tracks>
    <Track id="0">
      <Name>Lead</Name>
      <Staves><Staff><Properties>
        <Property name="Tuning"><Pitches>40 45 50 55 59 64</Pitches></Property>
      </Properties></Staff></Staves>
    </Track>
  </Tracks>
  <Bars>
    <Bar id="0"><Voices>0 -1</Voices></Bar>
    <Bar id="1"><Voices>1 -1</Voices></Bar>
  </Bars>
  <Voices>
    <Voice id="0"><Beats>0 1</Beats></Voice>
    <Voice id="1"><Beats>2</Beats></Voice>
  </Voices>
  <Beats>
    <Beat id="0"><Duration><Value>4</Value></Duration><Notes>0</Notes></Beat>
    <Beat id="1"><Duration><Value>8</Value><Dots>1</Dots></Duration><Notes>1 2</Notes></Beat>
    <Beat id="2"><Duration><Value>2</Value></Duration></Beat>
  </Beats>
  <Notes>
    <Note id="0"><Properties>
      <Property name="String"><String>5</String></Property>
      <Property name="Fret"><Fret>3</Fret></Property>
    </Properties></Note>
    <Note id="1"><Properties>
      <Property name="String"><String>0</String></Property>
      <Property name="Fret"><Fret>0</Fret></Property>
      <Property name="PalmMuted"><Enable/></Property>
    </Properties></Note>
    <Note id="2"><Properties>
      <Property name="String"><String>1</String></Property>
      <Property name="Fret"><Fret>2</Fret></Property>
    </Properties></Note>
  </Notes>
</GPIF>
"#;

    #[test]
    fn test_gpif_walk() {
        let import = parse_gpif(GPIF).unwrap();
        let doc = parse(&import.source).unwrap();
        assert_eq!(doc.header.title.as_deref(), Some("Test Song"));
        assert_eq!(doc.header.tempo_bpm, Some(90));
        assert_eq!(
            doc.header.time_signature,
            Some(TimeSignature {
                numerator: 3,
                denominator: 4
            })
        );
        assert_eq!(doc.tracks[0].name.as_deref(), Some("Lead"));
        assert_eq!(
            doc.tracks[0].tuning.as_deref(),
            Some(["E2", "A2", "D3", "G3", "B3", "E4"].map(String::from).as_slice())
        );
        assert_eq!(doc.measures.len(), 2);
    }

    #[test]
    fn test_string_ref_mapping_and_durations() {
        let import = parse_gpif(GPIF).unwrap();
        let doc = parse(&import.source).unwrap();
        let voice = &doc.measures[0].track("trk1").unwrap().voices[0];
        // GPIF string 5 of 6 is the highest string -> model string 1.
        match &voice.events[0] {
            Event::Note { note, duration, .. } => {
                assert_eq!(note.string, 1);
                assert_eq!(note.fret, 3);
                assert_eq!(duration.base, Base::Quarter);
            }
            other => panic!("expected note, got {:?}", other),
        }
        match &voice.events[1] {
            Event::Chord { notes, duration, .. } => {
                assert_eq!(notes.len(), 2);
                assert_eq!(duration.base, Base::Eighth);
                assert_eq!(duration.dots, 1);
                // GPIF string 0 is the lowest string -> model string 6.
                assert!(notes.iter().any(|n| n.string == 6));
            }
            other => panic!("expected chord, got {:?}", other),
        }
    }

    #[test]
    fn test_beat_without_notes_is_rest() {
        let import = parse_gpif(GPIF).unwrap();
        let doc = parse(&import.source).unwrap();
        let voice = &doc.measures[1].track("trk1").unwrap().voices[0];
        assert!(matches!(voice.events[0], Event::Rest { .. }));
    }

    #[test]
    fn test_effects_warn_once() {
        let import = parse_gpif(GPIF).unwrap();
        assert_eq!(
            import.warnings,
            vec!["ignoring effect 'PalmMuted'".to_string()]
        );
    }

    #[test]
    fn test_archive_round_trip() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("score.gpif", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(GPIF.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let import = import_gpx(&bytes).unwrap();
        assert!(parse(&import.source).is_ok());
    }

    #[test]
    fn test_missing_gpif_entry_is_an_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        match import_gpx(&bytes) {
            Err(OpenTabError::Import(message)) => {
                assert!(message.contains(".gpif"));
            }
            other => panic!("expected import error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_bytes_are_an_error() {
        assert!(import_gpx(b"not a zip").is_err());
    }
}
