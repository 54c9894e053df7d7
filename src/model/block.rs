//! Block-level content.

use super::inline::{self, Inline};
use super::{BibliographyEntry, Table};
use serde::{Deserialize, Serialize};

/// Deepest heading level the model represents.
pub const MAX_HEADING_LEVEL: u8 = 6;

/// A block-level element in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Section heading
    Heading(Heading),
    /// Text paragraph
    Paragraph(Paragraph),
    /// Table
    Table(Table),
    /// Image reference
    Image(Image),
    /// Extracted bibliography entry
    BibliographyEntry(BibliographyEntry),
}

impl Block {
    /// Create a heading block.
    pub fn heading(level: u8, content: Vec<Inline>) -> Self {
        Block::Heading(Heading::new(level, content))
    }

    /// Create a paragraph block.
    pub fn paragraph(content: Vec<Inline>) -> Self {
        Block::Paragraph(Paragraph::new(content))
    }

    /// Create an image block without caption.
    pub fn image(source: impl Into<String>) -> Self {
        Block::Image(Image::new(source))
    }

    /// Get plain text representation.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading(h) => inline::plain_text(&h.content),
            Block::Paragraph(p) => p.plain_text(),
            Block::Table(t) => t.plain_text(),
            Block::Image(img) => img
                .caption
                .as_deref()
                .map(inline::plain_text)
                .unwrap_or_default(),
            Block::BibliographyEntry(e) => e.render_text(),
        }
    }

    /// Check if this is a heading.
    pub fn is_heading(&self) -> bool {
        matches!(self, Block::Heading(_))
    }

    /// Check if this is a bibliography entry.
    pub fn is_bibliography_entry(&self) -> bool {
        matches!(self, Block::BibliographyEntry(_))
    }
}

/// A section heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Level from 1 (top) to 6
    pub level: u8,
    /// Heading text
    pub content: Vec<Inline>,
}

impl Heading {
    /// Create a heading; the level is clamped into 1..=6.
    pub fn new(level: u8, content: Vec<Inline>) -> Self {
        Self {
            level: level.clamp(1, MAX_HEADING_LEVEL),
            content,
        }
    }

    /// Get plain text of the heading.
    pub fn plain_text(&self) -> String {
        inline::plain_text(&self.content)
    }
}

/// A paragraph of inline content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Inline content
    pub content: Vec<Inline>,
}

impl Paragraph {
    /// Create a paragraph.
    pub fn new(content: Vec<Inline>) -> Self {
        Self { content }
    }

    /// Create a paragraph holding plain text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![Inline::text(text)])
    }

    /// Get plain text of the paragraph.
    pub fn plain_text(&self) -> String {
        inline::plain_text(&self.content)
    }

    /// Check if the paragraph has no visible content.
    pub fn is_blank(&self) -> bool {
        inline::is_blank(&self.content)
    }
}

/// An image reference with optional caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Path, package part or URL the image came from
    pub source: String,
    /// Caption content
    pub caption: Option<Vec<Inline>>,
}

impl Image {
    /// Create an image reference.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            caption: None,
        }
    }

    /// Set caption.
    pub fn with_caption(mut self, caption: Vec<Inline>) -> Self {
        self.caption = Some(caption);
        self
    }

    /// Check if the source is a remote URL.
    pub fn is_external(&self) -> bool {
        let lower = self.source.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}
