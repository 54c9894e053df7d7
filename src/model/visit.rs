//! Read-only traversal over the document model.
//!
//! Encoders use visitors for pre-passes (which packages a LaTeX preamble
//! needs, which images a DOCX package must embed) and the statistics
//! collector is a visitor as well.
//!
//! # Example
//!
//! ```
//! use texbridge::model::{walk_blocks, Block, Inline, Visitor};
//!
//! #[derive(Default)]
//! struct CitationCounter(usize);
//!
//! impl Visitor for CitationCounter {
//!     fn visit_inline(&mut self, inline: &Inline) {
//!         if matches!(inline, Inline::CitationRef(_)) {
//!             self.0 += 1;
//!         }
//!     }
//! }
//!
//! let blocks = vec![Block::paragraph(vec![Inline::cite("doe2020")])];
//! let mut counter = CitationCounter::default();
//! walk_blocks(&mut counter, &blocks);
//! assert_eq!(counter.0, 1);
//! ```

use super::{Block, Inline};

/// Callbacks invoked for every block and inline in document order.
///
/// Both methods default to doing nothing.
pub trait Visitor {
    /// Called for each block, before its children.
    fn visit_block(&mut self, block: &Block) {
        let _ = block;
    }

    /// Called for each inline, before its children.
    fn visit_inline(&mut self, inline: &Inline) {
        let _ = inline;
    }
}

/// Visit blocks and everything nested in them.
pub fn walk_blocks<V: Visitor + ?Sized>(visitor: &mut V, blocks: &[Block]) {
    for block in blocks {
        visitor.visit_block(block);
        match block {
            Block::Heading(h) => walk_inlines(visitor, &h.content),
            Block::Paragraph(p) => walk_inlines(visitor, &p.content),
            Block::Table(t) => {
                for cell in t.rows.iter().flat_map(|r| &r.cells) {
                    walk_blocks(visitor, &cell.blocks);
                }
            }
            Block::Image(img) => {
                if let Some(caption) = &img.caption {
                    walk_inlines(visitor, caption);
                }
            }
            Block::BibliographyEntry(_) => {}
        }
    }
}

/// Visit inlines and their emphasis children.
pub fn walk_inlines<V: Visitor + ?Sized>(visitor: &mut V, inlines: &[Inline]) {
    for inline in inlines {
        visitor.visit_inline(inline);
        if let Some(children) = inline.children() {
            walk_inlines(visitor, children);
        }
    }
}
