//! # ASCII Encoder
//!
//! Renders a document as fixed-width, multi-line monospaced tab text, one
//! block per track. Rhythm is lost in this view by design; the column layout
//! only preserves event order and fret placement.

use crate::model::{Document, Event, NoteRef, Track};

/// Render every track of a document as ASCII tab.
pub fn to_ascii(doc: &Document) -> String {
    let mut blocks = Vec::new();
    for track in &doc.tracks {
        blocks.push(render_track(doc, track));
    }
    blocks.join("\n")
}

fn render_track(doc: &Document, track: &Track) -> String {
    let string_count = doc.string_count(&track.id);
    let labels = string_labels(track, string_count);
    let label_width = labels.iter().map(|l| l.len()).max().unwrap_or(2);

    let mut out = String::new();
    out.push_str(&format!(
        "# Track: {}\n",
        track.name.as_deref().unwrap_or(&track.id)
    ));

    for measure in &doc.measures {
        let events = match measure.track(&track.id).and_then(|tm| tm.voices.first()) {
            Some(voice) if !voice.events.is_empty() => &voice.events,
            _ => continue,
        };

        let mut rows = vec![String::new(); string_count];
        for (i, event) in events.iter().enumerate() {
            let width = column_width(event);
            for (row, cell) in rows.iter_mut().enumerate() {
                // Rows run high string first; row r holds string r + 1.
                let string_number = (row + 1) as u32;
                cell.push_str(&render_cell(event, string_number, width));
            }
            if i + 1 < events.len() {
                for cell in rows.iter_mut() {
                    cell.push('-');
                }
            }
        }

        out.push_str(&format!("// m{}\n", measure.index));
        for (label, row) in labels.iter().zip(rows.iter()) {
            out.push_str(&format!("{:<width$} |{}|\n", label, row, width = label_width));
        }
    }
    out
}

/// Labels top to bottom: reversed tuning (high string first), or `S1..SN`.
fn string_labels(track: &Track, string_count: usize) -> Vec<String> {
    match &track.tuning {
        Some(tuning) if tuning.len() == string_count => {
            tuning.iter().rev().cloned().collect()
        }
        _ => (1..=string_count).map(|n| format!("S{}", n)).collect(),
    }
}

/// Column width is the widest fret rendering among the event's notes.
fn column_width(event: &Event) -> usize {
    match event {
        Event::Note { note, .. } => note.fret.to_string().len(),
        Event::Chord { notes, .. } => notes
            .iter()
            .map(|n| n.fret.to_string().len())
            .max()
            .unwrap_or(1),
        Event::Rest { .. } => 1,
    }
}

fn render_cell(event: &Event, string_number: u32, width: usize) -> String {
    let fret = match event {
        Event::Note { note, .. } => fret_on_string(note, string_number),
        Event::Chord { notes, .. } => notes
            .iter()
            .find_map(|n| fret_on_string(n, string_number)),
        Event::Rest { .. } => None,
    };
    match fret {
        Some(fret) => format!("{:-<width$}", fret, width = width),
        None => "-".repeat(width),
    }
}

fn fret_on_string(note: &NoteRef, string_number: u32) -> Option<u32> {
    (note.string == string_number).then_some(note.fret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const SAMPLE: &str = r#"format="opentab"
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
    fn test_row_layout_for_quarter_line() {
        let ascii = to_ascii(&parse(SAMPLE).unwrap());
        let lines: Vec<&str> = ascii.lines().collect();
        assert_eq!(lines[0], "# Track: gtr1");
        assert_eq!(lines[1], "// m1");
        assert_eq!(lines[2], "E4 |-------|");
        assert_eq!(lines[3], "B3 |-------|");
        assert_eq!(lines[4], "G3 |------3|");
        assert_eq!(lines[5], "D3 |----5--|");
        assert_eq!(lines[6], "A2 |--5----|");
        assert_eq!(lines[7], "E2 |3------|");
    }

    #[test]
    fn test_wide_frets_pad_all_rows() {
        let source = SAMPLE.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | q (1:12) (2:3) |",
        );
        let ascii = to_ascii(&parse(&source).unwrap());
        assert!(ascii.contains("E4 |12--|"));
        assert!(ascii.contains("B3 |---3|"));
    }

    #[test]
    fn test_chord_column() {
        let source = SAMPLE.replace(
            "m1: | q (6:3) (5:5) (4:5) (3:3) |",
            "m1: | q [ (4:2) (3:2) (2:3) ] q r |",
        );
        let ascii = to_ascii(&parse(&source).unwrap());
        assert!(ascii.contains("B3 |3--|"));
        assert!(ascii.contains("G3 |2--|"));
        assert!(ascii.contains("D3 |2--|"));
        assert!(ascii.contains("E2 |---|"));
    }

    #[test]
    fn test_label_fallback_without_tuning() {
        let source = r#"format="opentab"
version="0.1"

[[tracks]]
id="gtr1"
---
@track gtr1
m1: | q (4:5) |
"#;
        let ascii = to_ascii(&parse(source).unwrap());
        assert!(ascii.contains("S1 |-|"));
        assert!(ascii.contains("S4 |5|"));
    }

    #[test]
    fn test_empty_measures_skipped() {
        let source = SAMPLE.to_string() + "m3: | q (6:0) |\n";
        let ascii = to_ascii(&parse(&source).unwrap());
        assert!(ascii.contains("// m1"));
        assert!(!ascii.contains("// m2"));
        assert!(ascii.contains("// m3"));
    }
}
