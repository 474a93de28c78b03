//! Scientific pitch parsing shared by the MIDI and MusicXML encoders.
//!
//! Tuning strings use scientific pitch notation (`E2`, `A2`, `C#4`, `Bb3`,
//! `C-1`). The model never resolves pitch; encoders combine a parsed tuning
//! pitch with `fret + capo` at the point of emission.

/// Semitone offset of a note letter within an octave (C = 0).
fn letter_semitone(c: char) -> Option<i32> {
    match c.to_ascii_uppercase() {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Parse a scientific pitch string into a MIDI note number (C4 = 60).
///
/// Accepts `[A-Ga-g][#b]?-?\d+`. Returns `None` for anything else. The result
/// is unclamped so callers can range-check after adding fret and capo.
pub fn pitch_to_midi(s: &str) -> Option<i32> {
    let mut chars = s.chars();
    let base = letter_semitone(chars.next()?)?;

    let rest: String = chars.collect();
    let (alter, octave_str) = match rest.chars().next() {
        Some('#') => (1, &rest[1..]),
        Some('b') => (-1, &rest[1..]),
        _ => (0, rest.as_str()),
    };

    let octave: i32 = octave_str.parse().ok()?;
    // MIDI note 0 = C-1, so C4 (middle C) = 60.
    Some((octave + 1) * 12 + base + alter)
}

/// Split a MIDI note number into MusicXML `(step, alter, octave)`.
///
/// Sharps are preferred for the black keys, matching tablature convention.
pub fn midi_to_step_alter_octave(midi: i32) -> (&'static str, i32, i32) {
    const STEPS: [(&str, i32); 12] = [
        ("C", 0),
        ("C", 1),
        ("D", 0),
        ("D", 1),
        ("E", 0),
        ("F", 0),
        ("F", 1),
        ("G", 0),
        ("G", 1),
        ("A", 0),
        ("A", 1),
        ("B", 0),
    ];
    let (step, alter) = STEPS[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    (step, alter, octave)
}

/// Render a MIDI note number as a scientific pitch name, preferring sharps.
pub fn midi_to_name(midi: i32) -> String {
    let (step, alter, octave) = midi_to_step_alter_octave(midi);
    let accidental = if alter > 0 { "#" } else { "" };
    format!("{}{}{}", step, accidental, octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tuning() {
        assert_eq!(pitch_to_midi("E2"), Some(40));
        assert_eq!(pitch_to_midi("A2"), Some(45));
        assert_eq!(pitch_to_midi("D3"), Some(50));
        assert_eq!(pitch_to_midi("G3"), Some(55));
        assert_eq!(pitch_to_midi("B3"), Some(59));
        assert_eq!(pitch_to_midi("E4"), Some(64));
    }

    #[test]
    fn test_accidentals_and_case() {
        assert_eq!(pitch_to_midi("C#4"), Some(61));
        assert_eq!(pitch_to_midi("Db4"), Some(61));
        assert_eq!(pitch_to_midi("e2"), Some(40));
    }

    #[test]
    fn test_negative_octave() {
        assert_eq!(pitch_to_midi("C-1"), Some(0));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(pitch_to_midi(""), None);
        assert_eq!(pitch_to_midi("H2"), None);
        assert_eq!(pitch_to_midi("E"), None);
        assert_eq!(pitch_to_midi("E#x"), None);
    }

    #[test]
    fn test_midi_to_step_alter_octave() {
        assert_eq!(midi_to_step_alter_octave(60), ("C", 0, 4));
        assert_eq!(midi_to_step_alter_octave(61), ("C", 1, 4));
        assert_eq!(midi_to_step_alter_octave(40), ("E", 0, 2));
        assert_eq!(midi_to_step_alter_octave(66), ("F", 1, 4));
    }

    #[test]
    fn test_midi_to_name_round_trips() {
        for midi in [40, 45, 50, 55, 59, 64, 61] {
            assert_eq!(pitch_to_midi(&midi_to_name(midi)), Some(midi));
        }
        assert_eq!(midi_to_name(61), "C#4");
    }
}
