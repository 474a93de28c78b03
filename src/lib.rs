//! # OpenTab Toolchain
//!
//! A parser, formatter, validator, and codec family for OpenTab: a
//! plain-text, line-oriented notation for guitar tablature that treats tab as
//! structured musical data rather than ASCII art.
//!
//! ## Pipeline
//!
//! ```text
//! .otab source → Parser → Document → ASCII / MIDI / MusicXML / SVG
//!                   ↑
//!    ASCII tab / .gpx → Importers → OpenTab source → Formatter
//! ```
//!
//! - **Parser** ([`parser`]) - header (key-value pairs and `[[tracks]]`
//!   tables) and body (directives and measure lines) into a typed [`Document`]
//! - **Formatter** ([`formatter`]) - idempotent pretty-printer over text,
//!   expanding the duration-carry rule into explicit duration tokens
//! - **Schema validator** ([`schema`]) - structural conformance over the model
//! - **Semantic validator** ([`semantic`]) - line-addressed diagnostics over
//!   raw text for editor integration; never fails
//! - **Encoders** ([`ascii`], [`midi`], [`musicxml`], [`svg`]) - permissive
//!   renderings into external formats
//! - **Importers** ([`import`]) - best-effort recovery from free-form ASCII
//!   tab and Guitar Pro `.gpx` archives
//!
//! ## Quick Start
//!
//! ```rust
//! use opentab::{parse, format, to_midi};
//!
//! let source = r#"format="opentab"
//! version="0.1"
//! tempo_bpm=100
//!
//! [[tracks]]
//! id="gtr1"
//! tuning=["E2","A2","D3","G3","B3","E4"]
//! ---
//! @track gtr1
//! m1: | q (6:3) (5:5) (4:5) (3:3) |
//! "#;
//!
//! let doc = parse(source)?;
//! let midi = to_midi(&doc)?;
//! assert_eq!(&midi[0..4], b"MThd");
//!
//! // Formatting makes every carried duration explicit.
//! assert!(format(source).contains("m1: | q (6:3) q (5:5) q (4:5) q (3:3) |"));
//! # Ok::<(), opentab::OpenTabError>(())
//! ```
//!
//! ## Error Policy
//!
//! The parser is strict: grammar violations fail with a positioned
//! [`OpenTabError::Parse`]. Encoders are permissive: notes they cannot render
//! are dropped. Importers are maximally permissive and record every ambiguity
//! in their warnings list. Unknown annotation and header keys are never an
//! error anywhere.

// Core modules
pub mod error;
pub mod model;
pub mod pitch;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod writer;
pub mod formatter;
pub mod semantic;
pub mod ascii;
pub mod midi;
pub mod musicxml;
pub mod svg;
pub mod import;

// Public API
pub mod api;

// Re-export core types
pub use error::{OpenTabError, ParseErrorKind};
pub use model::*;

// Re-export pipeline functions
pub use ascii::to_ascii;
pub use formatter::format;
pub use import::ascii::{import_ascii, RhythmStrategy};
pub use import::gpx::import_gpx;
pub use import::Import;
pub use midi::to_midi;
pub use musicxml::to_musicxml;
pub use parser::parse;
pub use schema::{validate, SchemaError, SchemaReport};
pub use semantic::{check, Diagnostic, Severity};
pub use svg::to_svg;
pub use writer::write_document;

// Re-export API conveniences
pub use api::{compile_ascii, compile_midi, compile_musicxml, compile_svg, parse_json};
