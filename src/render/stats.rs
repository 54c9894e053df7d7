//! Document statistics.

use crate::model::{inline, Block, Document, Inline, Visitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Counts collected from a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Number of headings
    pub heading_count: u32,

    /// Number of paragraphs, including those in table cells
    pub paragraph_count: u32,

    /// Number of tables
    pub table_count: u32,

    /// Number of table cells
    pub cell_count: u32,

    /// Number of images
    pub image_count: u32,

    /// Number of in-text citations
    pub citation_count: u32,

    /// Number of bibliography entries
    pub bibliography_count: u32,

    /// Citations whose key has no bibliography entry
    pub dangling_citation_count: u32,

    /// Approximate word count (whitespace-separated tokens)
    pub word_count: u32,

    /// Character count (excluding whitespace)
    pub char_count: u32,
}

impl DocumentStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect statistics for a document.
    pub fn collect(doc: &Document) -> Self {
        let mut collector = Collector {
            stats: Self::default(),
            citations: Vec::new(),
        };
        doc.accept(&mut collector);

        let mut stats = collector.stats;
        let entries: HashSet<&str> = doc.bibliography().map(|e| e.key.as_str()).collect();
        stats.dangling_citation_count = collector
            .citations
            .iter()
            .filter(|key| !entries.contains(key.as_str()))
            .count() as u32;
        stats
    }

    /// Add word and character counts from text.
    pub fn count_text(&mut self, text: &str) {
        self.word_count += text.split_whitespace().count() as u32;
        self.char_count += text.chars().filter(|c| !c.is_whitespace()).count() as u32;
    }

    /// Merge another stats instance into this one.
    pub fn merge(&mut self, other: &DocumentStats) {
        self.heading_count += other.heading_count;
        self.paragraph_count += other.paragraph_count;
        self.table_count += other.table_count;
        self.cell_count += other.cell_count;
        self.image_count += other.image_count;
        self.citation_count += other.citation_count;
        self.bibliography_count += other.bibliography_count;
        self.dangling_citation_count += other.dangling_citation_count;
        self.word_count += other.word_count;
        self.char_count += other.char_count;
    }
}

struct Collector {
    stats: DocumentStats,
    citations: Vec<String>,
}

impl Visitor for Collector {
    fn visit_block(&mut self, block: &Block) {
        let stats = &mut self.stats;
        match block {
            Block::Heading(h) => {
                stats.heading_count += 1;
                stats.count_text(&inline::plain_text(&h.content));
            }
            Block::Paragraph(p) => {
                stats.paragraph_count += 1;
                stats.count_text(&inline::plain_text(&p.content));
            }
            Block::Table(t) => {
                stats.table_count += 1;
                stats.cell_count += t.rows.iter().map(|r| r.cells.len() as u32).sum::<u32>();
            }
            Block::Image(img) => {
                stats.image_count += 1;
                if let Some(caption) = &img.caption {
                    stats.count_text(&inline::plain_text(caption));
                }
            }
            Block::BibliographyEntry(entry) => {
                stats.bibliography_count += 1;
                stats.count_text(&entry.render_text());
            }
        }
    }

    fn visit_inline(&mut self, inline: &Inline) {
        if let Inline::CitationRef(key) = inline {
            self.stats.citation_count += 1;
            self.citations.push(key.clone());
        }
    }
}
