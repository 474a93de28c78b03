//! # Error Types
//!
//! This module defines all error types for the OpenTab toolchain.
//!
//! The parser is strict and fails with a positioned [`OpenTabError::Parse`];
//! encoders are permissive and only fail on unrenderable output buffers.
//! Importers collect recoverable ambiguities as warnings on their result and
//! reserve errors for unusable input (e.g. a `.gpx` archive with no GPIF
//! entry).
//!
//! ## Usage
//! ```rust
//! use opentab::{parse, OpenTabError};
//!
//! match parse("not an opentab file") {
//!     Ok(doc) => println!("{} tracks", doc.tracks.len()),
//!     Err(OpenTabError::Parse { line, column, message, .. }) => {
//!         eprintln!("error at {}:{}: {}", line, column, message);
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! ```

use thiserror::Error;

/// Classification of grammar violations reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// No `---` delimiter line between header and body.
    MissingDelimiter,
    /// A body line that is not a comment, directive, or measure.
    UnknownLine,
    /// A measure line that does not match `mN: | ... |`.
    MalformedMeasure,
    /// A token inside a measure that matches no token kind.
    UnknownToken,
    /// A `@track` directive found in the header section.
    DirectiveOutsideBody,
    /// A header value that does not fit the key's value grammar.
    InvalidHeaderValue,
    /// `format` or `version` is missing or unsupported.
    UnsupportedFormat,
    /// A measure line before any `@track` directive.
    MissingTrackDirective,
}

#[derive(Error, Debug)]
pub enum OpenTabError {
    /// Grammar violation in `.otab` source, with 1-based position.
    ///
    /// # Example
    /// ```
    /// # use opentab::{OpenTabError, ParseErrorKind};
    /// let err = OpenTabError::Parse {
    ///     line: 5,
    ///     column: 10,
    ///     kind: ParseErrorKind::UnknownToken,
    ///     message: "Unknown token 'x'".to_string(),
    /// };
    /// assert_eq!(err.to_string(), "Parse error at line 5, column 10: Unknown token 'x'");
    /// ```
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        kind: ParseErrorKind,
        message: String,
    },

    /// An importer could not recover anything from its input.
    #[error("Import error: {0}")]
    Import(String),

    /// The MIDI encoder failed to serialize the event stream.
    #[error("MIDI write error: {0}")]
    Midi(String),
}

impl OpenTabError {
    /// Shorthand constructor for positioned parse errors.
    pub fn parse(
        line: usize,
        column: usize,
        kind: ParseErrorKind,
        message: impl Into<String>,
    ) -> Self {
        OpenTabError::Parse {
            line,
            column,
            kind,
            message: message.into(),
        }
    }
}
