//! SVG rendering: the monospaced ASCII tab wrapped in an `<svg>` document,
//! one `<text>` row per line. Layout math assumes a monospaced glyph grid.

use crate::ascii::to_ascii;
use crate::model::Document;

const CHAR_WIDTH: usize = 8;
const LINE_HEIGHT: usize = 16;
const PADDING: usize = 10;

/// Render a document as an SVG wrapping its ASCII tab view.
pub fn to_svg(doc: &Document) -> String {
    let ascii = to_ascii(doc);
    let lines: Vec<&str> = ascii.lines().collect();
    let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let width = columns * CHAR_WIDTH + 2 * PADDING;
    let height = lines.len() * LINE_HEIGHT + 2 * PADDING;

    let mut out = String::new();
    out.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">\n",
        width, height, width, height
    ));
    out.push_str("<style>text { font-family: monospace; font-size: 13px; white-space: pre; }</style>\n");
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!(
            "<text xml:space=\"preserve\" x=\"{}\" y=\"{}\">{}</text>\n",
            PADDING,
            PADDING + (i + 1) * LINE_HEIGHT - 4,
            escape(line)
        ));
    }
    out.push_str("</svg>\n");
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
