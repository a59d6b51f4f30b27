//! Diagram synthesis and filtering over the line-oriented flowchart text.
//!
//! The synthesizer and the filter share one wire format; the filter never
//! sees the graph a document was rendered from.

mod escape;
mod filter;
mod synthesizer;

pub use escape::{decode_entities, escape_label, sanitize_id, tag_of, tag_suffix, unescape_label};
pub use filter::DiagramFilter;
pub use synthesizer::DiagramSynthesizer;

use std::fmt;

/// Indentation of the lines inside the directive
pub(crate) const INDENT: &str = "    ";

/// A rendered diagram: one direction directive, cluster blocks, edges and
/// style lines, in that order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramDocument {
    lines: Vec<String>,
}

impl DiagramDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn to_text(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for DiagramDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
