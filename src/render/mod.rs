//! Encoders from the document model into DOCX, LaTeX and JSON.

mod docx;
mod docx_parts;
mod json;
mod latex;
mod options;
mod stats;

pub use docx::{to_docx, DocxRenderer};
pub use json::{to_json, JsonFormat};
pub use latex::{escape as escape_latex, to_latex, LatexRenderer};
pub use options::{DocumentClass, FontSize, LineSpacing, Margins, RenderOptions};
pub use stats::DocumentStats;
