//! # ASCII Tab Importer
//!
//! Best-effort recovery of structure from free-form "internet tab" text.
//! The importer never fails: everything it cannot interpret becomes a
//! warning, and the result is always parseable OpenTab source.
//!
//! Pipeline: metadata scan → section/chord-line detection → tab block
//! detection → bar splitting against the longest row → per-row note scan →
//! column-based chord grouping → rhythm assignment → emit + format.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::formatter;
use crate::import::Import;
use crate::model::{
    Annotations, Base, Duration, Event, NoteRef, SlideDirection, Technique, Value,
};
use crate::writer::write_measure_line;

static TAB_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Ga-g][#b]?\d?)?\s*\|(.*)$").unwrap());
static SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\[([^\]]+)\]\s*$").unwrap());
static CHORD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-G][#b]?(m|maj|min|dim|aug|sus|add)?\d*$").unwrap());
static SCIENTIFIC_PITCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Ga-g][#b]?\d+$").unwrap());

const STANDARD_TUNING: [&str; 6] = ["E2", "A2", "D3", "G3", "B3", "E4"];

/// How the importer assigns durations to recovered events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RhythmStrategy {
    /// Every event becomes an eighth annotated `rhythm="unknown"`.
    #[default]
    Unknown,
    /// Every event becomes an eighth, no annotation.
    FixedEighth,
    /// Durations are inferred from the column grid; approximate.
    ColumnGrid,
}

impl std::str::FromStr for RhythmStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(RhythmStrategy::Unknown),
            "fixed-eighth" => Ok(RhythmStrategy::FixedEighth),
            "column-grid" => Ok(RhythmStrategy::ColumnGrid),
            other => Err(format!(
                "unknown rhythm strategy '{}', expected unknown, fixed-eighth, or column-grid",
                other
            )),
        }
    }
}

/// Metadata recovered from the lines before the first tab block.
#[derive(Debug, Default)]
struct Metadata {
    title: Option<String>,
    title_fallback: Option<String>,
    tuning_raw: Option<String>,
    capo: Option<u32>,
    key: Option<String>,
}

/// One run of consecutive tab rows, with the labels that preceded it.
#[derive(Debug)]
struct Block {
    section: Option<String>,
    chord_line: Option<String>,
    /// Row content after the first `|`, top row first.
    rows: Vec<String>,
    start_line: usize,
}

/// A note recovered from a row, positioned by its column in the measure.
#[derive(Debug)]
struct ScannedNote {
    col: usize,
    note: NoteRef,
}

/// Import free-form ASCII tab text.
pub fn import_ascii(text: &str, rhythm: RhythmStrategy) -> Import {
    let text = text.replace("\r\n", "\n");
    let lines: Vec<&str> = text.split('\n').collect();
    let mut warnings = Vec::new();

    let (metadata, blocks) = scan(&lines, &mut warnings);
    if blocks.is_empty() {
        warnings.push("no tab blocks found in input".to_string());
    }

    let tuning = infer_tuning(&metadata, &blocks, &mut warnings);

    let mut body = String::new();
    body.push_str("@track gtr1\n");
    let mut measure_index = 0u32;
    for block in &blocks {
        if let Some(section) = &block.section {
            body.push_str(&format!("# [{}]\n", section));
        }
        if let Some(chords) = &block.chord_line {
            body.push_str(&format!("# {}\n", chords));
        }
        for events in block_measures(block, rhythm, &mut warnings) {
            measure_index += 1;
            body.push_str(&write_measure_line(measure_index, &events));
            body.push('\n');
        }
    }

    if rhythm == RhythmStrategy::ColumnGrid && measure_index > 0 {
        warnings.push("column-grid rhythm inference is approximate".to_string());
    }
    log::debug!(
        "ascii import: {} measures, {} warnings",
        measure_index,
        warnings.len()
    );

    let mut source = String::new();
    source.push_str("format=\"opentab\"\nversion=\"0.1\"\n");
    if let Some(title) = metadata.title.or(metadata.title_fallback) {
        source.push_str(&format!("title={}\n", Value::String(title).to_token()));
    }
    if let Some(key) = &metadata.key {
        source.push_str(&format!("key={}\n", Value::String(key.clone()).to_token()));
    }
    source.push_str("imported_from=\"ascii\"\n");
    source.push_str(&format!("import_warnings={}\n", warnings.len()));
    source.push_str("\n[[tracks]]\nid=\"gtr1\"\n");
    if let Some(tuning) = &tuning {
        let items: Vec<String> = tuning
            .iter()
            .map(|p| Value::String(p.to_string()).to_token())
            .collect();
        source.push_str(&format!("tuning=[{}]\n", items.join(",")));
    }
    if let Some(capo) = metadata.capo {
        if capo > 0 {
            source.push_str(&format!("capo={}\n", capo));
        }
    }
    source.push_str("\n---\n\n");
    source.push_str(&body);

    Import {
        source: formatter::format(&source),
        warnings,
    }
}

/// Classify every line: metadata before the first block, section headers and
/// chord lines between blocks, consecutive tab rows into blocks.
fn scan(lines: &[&str], warnings: &mut Vec<String>) -> (Metadata, Vec<Block>) {
    let mut metadata = Metadata::default();
    let mut blocks: Vec<Block> = Vec::new();
    let mut section: Option<String> = None;
    let mut chord_line: Option<String> = None;
    let mut current: Option<Block> = None;
    let mut seen_block = false;

    for (i, line) in lines.iter().enumerate() {
        if is_tab_row(line) {
            seen_block = true;
            let content = line[line.find('|').unwrap() + 1..].trim_end().to_string();
            match &mut current {
                Some(block) => block.rows.push(content),
                None => {
                    current = Some(Block {
                        section: section.clone(),
                        chord_line: chord_line.take(),
                        rows: vec![content],
                        start_line: i + 1,
                    });
                }
            }
            continue;
        }

        if let Some(block) = current.take() {
            blocks.push(block);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(captures) = SECTION.captures(trimmed) {
            section = Some(captures[1].to_string());
            continue;
        }
        if is_chord_line(trimmed) {
            chord_line = Some(trimmed.to_string());
            continue;
        }
        if !seen_block {
            scan_metadata_line(trimmed, &mut metadata);
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }

    for block in &blocks {
        if block.rows.len() != 6 {
            warnings.push(format!(
                "tab block at line {} has {} strings (expected 6)",
                block.start_line,
                block.rows.len()
            ));
        }
    }
    (metadata, blocks)
}

fn is_tab_row(line: &str) -> bool {
    match TAB_ROW.captures(line) {
        Some(captures) => captures
            .get(2)
            .map(|m| m.as_str().contains('-'))
            .unwrap_or(false),
        None => false,
    }
}

fn is_chord_line(trimmed: &str) -> bool {
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    !tokens.is_empty() && tokens.iter().all(|t| CHORD_TOKEN.is_match(t))
}

fn scan_metadata_line(trimmed: &str, metadata: &mut Metadata) {
    let lower = trimmed.to_lowercase();
    if let Some(rest) = strip_directive(&lower, trimmed, "title:") {
        metadata.title = Some(rest);
    } else if let Some(rest) = strip_directive(&lower, trimmed, "tuning:") {
        metadata.tuning_raw = Some(rest);
    } else if let Some(rest) = strip_directive(&lower, trimmed, "capo:") {
        metadata.capo = Some(parse_capo(&rest));
    } else if let Some(rest) = strip_directive(&lower, trimmed, "key:") {
        metadata.key = Some(rest);
    } else if metadata.title_fallback.is_none() && !trimmed.contains(':') {
        metadata.title_fallback = Some(trimmed.to_string());
    }
}

fn strip_directive(lower: &str, original: &str, prefix: &str) -> Option<String> {
    if lower.starts_with(prefix) {
        Some(original[prefix.len()..].trim().to_string())
    } else {
        None
    }
}

/// `Capo: 3`, `Capo: 3rd fret`, `Capo: No capo`.
fn parse_capo(rest: &str) -> u32 {
    if rest.to_lowercase().contains("no") {
        return 0;
    }
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Tuning from metadata when it parses, else standard tuning for 6-row
/// blocks, else none.
fn infer_tuning(
    metadata: &Metadata,
    blocks: &[Block],
    warnings: &mut Vec<String>,
) -> Option<Vec<String>> {
    if let Some(raw) = &metadata.tuning_raw {
        let tokens: Vec<&str> = raw
            .split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')')
            .filter(|t| !t.is_empty())
            .collect();
        let pitched: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|t| SCIENTIFIC_PITCH.is_match(t))
            .collect();
        if !pitched.is_empty() {
            return Some(pitched.iter().map(|p| p.to_string()).collect());
        }
        let letters: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|t| t.len() <= 2 && t.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
            .collect();
        if letters.len() == 6
            && letters
                .iter()
                .zip(["E", "A", "D", "G", "B", "E"])
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
        {
            return Some(STANDARD_TUNING.iter().map(|p| p.to_string()).collect());
        }
        warnings.push(format!("unrecognized tuning '{}'", raw));
    }
    let six_rows = blocks.iter().any(|b| b.rows.len() == 6);
    if six_rows {
        Some(STANDARD_TUNING.iter().map(|p| p.to_string()).collect())
    } else if !blocks.is_empty() {
        warnings.push("missing tuning, none inferred".to_string());
        None
    } else {
        None
    }
}

/// Split a block into measures and recover the events of each.
fn block_measures(
    block: &Block,
    rhythm: RhythmStrategy,
    warnings: &mut Vec<String>,
) -> Vec<Vec<Event>> {
    let reference = match block.rows.iter().max_by_key(|r| r.len()) {
        Some(row) => row.clone(),
        None => return Vec::new(),
    };
    let bars: Vec<usize> = reference
        .char_indices()
        .filter(|(_, c)| *c == '|')
        .map(|(i, _)| i)
        .collect();

    let mut misaligned = false;
    let mut unequal = false;
    for row in &block.rows {
        let row_bars: Vec<usize> = row
            .char_indices()
            .filter(|(_, c)| *c == '|')
            .map(|(i, _)| i)
            .collect();
        if row_bars != bars {
            misaligned = true;
        }
        if row.len() != reference.len() {
            unequal = true;
        }
    }
    if misaligned {
        warnings.push(format!(
            "misaligned bar lines in tab block at line {}",
            block.start_line
        ));
    }
    if unequal {
        warnings.push(format!(
            "unequal row lengths in tab block at line {}",
            block.start_line
        ));
    }

    let mut boundaries = Vec::new();
    let mut start = 0usize;
    for &bar in &bars {
        boundaries.push((start, bar));
        start = bar + 1;
    }
    boundaries.push((start, reference.len()));

    let mut measures = Vec::new();
    for (seg_start, seg_end) in boundaries {
        if seg_start >= seg_end {
            continue;
        }
        let width = seg_end - seg_start;
        let mut notes = Vec::new();
        for (row_index, row) in block.rows.iter().enumerate() {
            // Top row is the highest-pitched string, string number 1.
            let string_number = (row_index + 1) as u32;
            let slice_end = seg_end.min(row.len());
            if seg_start >= slice_end {
                continue;
            }
            notes.extend(scan_row(&row[seg_start..slice_end], string_number));
        }
        notes.sort_by_key(|n| n.col);
        measures.push(build_events(notes, width, rhythm));
    }
    measures
}

/// Walk one row slice, turning digit runs into notes and attaching the
/// technique characters that join or follow them.
fn scan_row(slice: &str, string_number: u32) -> Vec<ScannedNote> {
    let chars: Vec<char> = slice.chars().collect();
    let mut notes = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let ghost = c == '(' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
        if ghost {
            i += 1;
        }
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let col = i;
        let fret = read_number(&chars, &mut i);
        let mut note = NoteRef::new(string_number, fret);
        if ghost {
            note.annotations.set("ghost", Value::Bool(true));
            if i < chars.len() && chars[i] == ')' {
                i += 1;
            }
        }

        // Techniques chain onto the note just scanned.
        let mut current_fret = fret;
        loop {
            match chars.get(i) {
                Some('~') => {
                    note.techniques.push(Technique::Vibrato);
                    i += 1;
                }
                Some('h') | Some('p') | Some('/') | Some('\\')
                    if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) =>
                {
                    let kind = chars[i];
                    i += 1;
                    let to_fret = read_number(&chars, &mut i);
                    let technique = match kind {
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
                        _ => Technique::Slide {
                            direction: SlideDirection::Down,
                            from_fret: current_fret,
                            to_fret,
                        },
                    };
                    note.techniques.push(technique);
                    current_fret = to_fret;
                }
                Some('b') => {
                    i += 1;
                    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                        let target = read_number(&chars, &mut i);
                        note.annotations.set("bend_to", Value::Int(target as i64));
                    } else {
                        note.annotations.set("bend", Value::Bool(true));
                    }
                }
                _ => break,
            }
        }

        notes.push(ScannedNote { col, note });
    }
    notes
}

fn read_number(chars: &[char], i: &mut usize) -> u32 {
    let mut value = 0u32;
    while let Some(c) = chars.get(*i) {
        if let Some(d) = c.to_digit(10) {
            value = value * 10 + d;
            *i += 1;
        } else {
            break;
        }
    }
    value
}

/// Group notes into chords by column adjacency and assign durations.
fn build_events(notes: Vec<ScannedNote>, width: usize, rhythm: RhythmStrategy) -> Vec<Event> {
    let mut groups: Vec<(usize, Vec<NoteRef>)> = Vec::new();
    for scanned in notes {
        match groups.last_mut() {
            Some((col, members)) if scanned.col <= *col + 1 => {
                members.push(scanned.note);
            }
            _ => groups.push((scanned.col, vec![scanned.note])),
        }
    }

    let columns: Vec<usize> = groups.iter().map(|(col, _)| *col).collect();
    let mut events = Vec::new();
    for (i, (col, mut members)) in groups.into_iter().enumerate() {
        let duration = match rhythm {
            RhythmStrategy::Unknown | RhythmStrategy::FixedEighth => Duration::new(Base::Eighth),
            RhythmStrategy::ColumnGrid => {
                let next = columns.get(i + 1).copied().unwrap_or(width);
                grid_duration(col, next, width)
            }
        };
        let mut annotations = Annotations::new();
        if rhythm == RhythmStrategy::Unknown {
            annotations.set("rhythm", Value::String("unknown".to_string()));
        }

        let event = if members.len() == 1 {
            let mut note = members.remove(0);
            // The standalone-note grammar has a single annotation slot, so
            // note-level findings ride on the event bag.
            for (key, value) in note.annotations.iter() {
                annotations.set(key.clone(), value.clone());
            }
            note.annotations = Annotations::new();
            Event::Note {
                duration,
                note,
                annotations,
            }
        } else {
            members.sort_by(|a, b| b.string.cmp(&a.string));
            Event::Chord {
                duration,
                notes: members,
                annotations,
            }
        };
        events.push(event);
    }
    events
}

/// Pick the grid count nearest the measure width, then map each event's step
/// span to the closest base duration (measure taken as one whole note).
fn grid_duration(col: usize, next_col: usize, width: usize) -> Duration {
    const COUNTS: [usize; 4] = [4, 8, 16, 32];
    let count = COUNTS
        .iter()
        .copied()
        .min_by_key(|c| width.abs_diff(*c))
        .unwrap_or(8);
    let step = width as f64 / count as f64;
    let span = (next_col - col) as f64;
    let steps = (span / step).round().max(1.0);
    let fraction = steps / count as f64;

    const BASES: [(Base, f64); 6] = [
        (Base::Whole, 1.0),
        (Base::Half, 0.5),
        (Base::Quarter, 0.25),
        (Base::Eighth, 0.125),
        (Base::Sixteenth, 0.0625),
        (Base::ThirtySecond, 0.03125),
    ];
    let base = BASES
        .iter()
        .min_by(|a, b| {
            (a.1 - fraction)
                .abs()
                .partial_cmp(&(b.1 - fraction).abs())
                .unwrap()
        })
        .map(|(b, _)| *b)
        .unwrap_or(Base::Eighth);
    Duration::new(base)
}
