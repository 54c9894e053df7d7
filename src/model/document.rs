//! Document-level types.

use super::block::MAX_HEADING_LEVEL;
use super::inline;
use super::visit::{walk_blocks, Visitor};
use super::{BibliographyEntry, Block, Inline, Resource};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A format-neutral document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document metadata (title, author, etc.)
    pub metadata: Metadata,

    /// Blocks in document order
    pub blocks: Vec<Block>,

    /// Embedded image bytes keyed by image source
    pub resources: HashMap<String, Resource>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document from blocks.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            ..Self::default()
        }
    }

    /// Append a block.
    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Add a resource to the document.
    pub fn add_resource(&mut self, source: impl Into<String>, resource: Resource) {
        self.resources.insert(source.into(), resource);
    }

    /// Get a resource by image source.
    pub fn get_resource(&self, source: &str) -> Option<&Resource> {
        self.resources.get(source)
    }

    /// Check if the document has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over the bibliography entries.
    pub fn bibliography(&self) -> impl Iterator<Item = &BibliographyEntry> {
        self.blocks.iter().filter_map(|b| match b {
            Block::BibliographyEntry(e) => Some(e),
            _ => None,
        })
    }

    /// Check if a citation key resolves to an entry.
    pub fn has_entry(&self, key: &str) -> bool {
        self.bibliography().any(|e| e.key == key)
    }

    /// Collect cited keys in order of first appearance.
    pub fn citation_keys(&self) -> Vec<String> {
        #[derive(Default)]
        struct Keys(Vec<String>);

        impl Visitor for Keys {
            fn visit_inline(&mut self, inline: &Inline) {
                if let Inline::CitationRef(key) = inline {
                    if !self.0.contains(key) {
                        self.0.push(key.clone());
                    }
                }
            }
        }

        let mut keys = Keys::default();
        self.accept(&mut keys);
        keys.0
    }

    /// Walk every block and inline with a visitor.
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        walk_blocks(visitor, &self.blocks);
    }

    /// Get plain text content of the entire document.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::plain_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Bring the document into canonical form.
    ///
    /// Clamps heading levels, pads ragged tables and flattens inline
    /// emphasis. Empty captions become `None`.
    pub fn normalize(&mut self) {
        normalize_blocks(&mut self.blocks);
    }

    /// Check the model invariants.
    ///
    /// Heading levels must be within 1..=6, tables rectangular and never
    /// nested, and bibliography keys unique.
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        validate_blocks(&self.blocks, false, &mut keys)
    }

    /// Apply `f` to every text value: inline text, bibliography fields and
    /// metadata strings.
    pub fn map_text<F: FnMut(&mut String)>(&mut self, mut f: F) {
        for value in [
            &mut self.metadata.title,
            &mut self.metadata.author,
            &mut self.metadata.date,
        ]
        .into_iter()
        .flatten()
        {
            f(value);
        }
        map_blocks_text(&mut self.blocks, &mut f);
    }
}

fn normalize_blocks(blocks: &mut [Block]) {
    for block in blocks {
        match block {
            Block::Heading(h) => {
                h.level = h.level.clamp(1, MAX_HEADING_LEVEL);
                h.content = inline::normalize(&h.content);
            }
            Block::Paragraph(p) => p.content = inline::normalize(&p.content),
            Block::Table(t) => {
                t.pad();
                for cell in t.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                    normalize_blocks(&mut cell.blocks);
                }
            }
            Block::Image(img) => {
                img.caption = img
                    .caption
                    .take()
                    .map(|c| inline::normalize(&c))
                    .filter(|c| !c.is_empty());
            }
            Block::BibliographyEntry(_) => {}
        }
    }
}

fn validate_blocks<'a>(
    blocks: &'a [Block],
    in_cell: bool,
    keys: &mut HashSet<&'a str>,
) -> Result<()> {
    for block in blocks {
        match block {
            Block::Heading(h) if !(1..=MAX_HEADING_LEVEL).contains(&h.level) => {
                return Err(Error::Structural(format!(
                    "heading level {} outside 1..={}",
                    h.level, MAX_HEADING_LEVEL
                )));
            }
            Block::Table(t) => {
                if in_cell {
                    return Err(Error::Structural(
                        "table nested inside a table cell".to_string(),
                    ));
                }
                if !t.is_rectangular() {
                    return Err(Error::Structural(format!(
                        "ragged table: rows must all have {} cells",
                        t.column_count()
                    )));
                }
                for cell in t.rows.iter().flat_map(|r| &r.cells) {
                    validate_blocks(&cell.blocks, true, keys)?;
                }
            }
            Block::BibliographyEntry(e) => {
                if !keys.insert(e.key.as_str()) {
                    return Err(Error::Structural(format!(
                        "duplicate bibliography key `{}`",
                        e.key
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn map_blocks_text<F: FnMut(&mut String)>(blocks: &mut [Block], f: &mut F) {
    for block in blocks {
        match block {
            Block::Heading(h) => map_inlines_text(&mut h.content, f),
            Block::Paragraph(p) => map_inlines_text(&mut p.content, f),
            Block::Table(t) => {
                for cell in t.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                    map_blocks_text(&mut cell.blocks, f);
                }
            }
            Block::Image(img) => {
                if let Some(caption) = img.caption.as_mut() {
                    map_inlines_text(caption, f);
                }
            }
            Block::BibliographyEntry(e) => e.fields.values_mut().for_each(|v| f(v)),
        }
    }
}

fn map_inlines_text<F: FnMut(&mut String)>(inlines: &mut [Inline], f: &mut F) {
    for inline in inlines {
        match inline {
            Inline::Text(t) => f(t),
            Inline::Bold(c) | Inline::Italic(c) | Inline::BoldItalic(c) => {
                map_inlines_text(c, f)
            }
            Inline::CitationRef(_) => {}
        }
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    pub title: Option<String>,

    /// Document author
    pub author: Option<String>,

    /// Free-form date line (LaTeX `\date`)
    pub date: Option<String>,

    /// Creation date
    pub created: Option<DateTime<Utc>>,

    /// Last modification date
    pub modified: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Create metadata with a title.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Check if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.date.is_none()
            && self.created.is_none()
            && self.modified.is_none()
    }
}
