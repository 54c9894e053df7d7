//! Decoders from DOCX and LaTeX into the document model.

mod bibliography;
mod docx;
mod latex;
mod options;
pub(crate) mod xml;

pub use bibliography::{is_bibliography_heading, link_citations, parse_fields, ReferenceExtractor};
pub use docx::DocxParser;
pub use latex::LatexParser;
pub use options::{ErrorMode, ParseOptions};

use crate::model::Document;
use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Final pass shared by both decoders.
pub(crate) fn finish_document(doc: &mut Document, options: &ParseOptions) {
    if options.normalize_unicode {
        doc.map_text(|text| {
            if !is_nfc(text) {
                *text = text.nfc().collect();
            }
        });
    }
    doc.normalize();
}
