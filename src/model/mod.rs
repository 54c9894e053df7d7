//! Document model shared by every decoder and encoder.
//!
//! This module defines the intermediate representation that bridges the
//! DOCX and LaTeX front ends. It covers the intersection of what both
//! formats can express: headings, paragraphs with flat emphasis, tables,
//! images and bibliography entries.

mod bibliography;
mod block;
mod document;
pub mod inline;
mod resource;
mod table;
mod visit;

pub use bibliography::{BibliographyEntry, Confidence, RAW_FIELD};
pub use block::{Block, Heading, Image, Paragraph, MAX_HEADING_LEVEL};
pub use document::{Document, Metadata};
pub use inline::{Emphasis, Inline, Span};
pub use resource::{image_dimensions, Resource};
pub use table::{Table, TableCell, TableRow};
pub use visit::{walk_blocks, walk_inlines, Visitor};
