//! # Public API
//!
//! Convenience entry points combining the pipeline stages, for callers that
//! hold source text and want an external format in one step.
//!
//! ```rust
//! use opentab::compile_musicxml;
//!
//! let source = r#"format="opentab"
//! version="0.1"
//!
//! [[tracks]]
//! id="gtr1"
//! tuning=["E2","A2","D3","G3","B3","E4"]
//! ---
//! @track gtr1
//! m1: | q (6:3) (5:5) (4:5) (3:3) |
//! "#;
//!
//! let xml = compile_musicxml(source)?;
//! assert!(xml.contains("<sign>TAB</sign>"));
//! # Ok::<(), opentab::OpenTabError>(())
//! ```

use crate::error::OpenTabError;
use crate::{ascii, midi, musicxml, parser, svg};

/// Parse and render as ASCII tab.
pub fn compile_ascii(source: &str) -> Result<String, OpenTabError> {
    let doc = parser::parse(source)?;
    Ok(ascii::to_ascii(&doc))
}

/// Parse and encode as Standard MIDI File bytes.
pub fn compile_midi(source: &str) -> Result<Vec<u8>, OpenTabError> {
    let doc = parser::parse(source)?;
    midi::to_midi(&doc)
}

/// Parse and generate MusicXML.
pub fn compile_musicxml(source: &str) -> Result<String, OpenTabError> {
    let doc = parser::parse(source)?;
    Ok(musicxml::to_musicxml(&doc))
}

/// Parse and render as SVG.
pub fn compile_svg(source: &str) -> Result<String, OpenTabError> {
    let doc = parser::parse(source)?;
    Ok(svg::to_svg(&doc))
}

/// Parse and serialize the document model as pretty JSON.
pub fn parse_json(source: &str) -> Result<String, OpenTabError> {
    let doc = parser::parse(source)?;
    Ok(serde_json::to_string_pretty(&doc).expect("model serialization is infallible"))
}
