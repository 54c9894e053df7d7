//! # texbridge
//!
//! Bidirectional DOCX and LaTeX conversion through a shared document model.
//!
//! Both formats decode into the same [`Document`]: headings, paragraphs with
//! bold and italic text, tables, images with captions, in-text citations and
//! bibliography entries. Encoders write the model back out as a DOCX package
//! or LaTeX source. Anything outside the model is kept in a simpler form or
//! dropped, and every such loss is reported as a [`Warning`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use texbridge::{convert_file, Format};
//!
//! fn main() -> texbridge::Result<()> {
//!     let output = convert_file("paper.tex", Format::Docx)?;
//!     std::fs::write("paper.docx", &output.content)?;
//!     for warning in &output.warnings {
//!         eprintln!("{}", warning);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Round trips**: heading levels, emphasis, table shapes and citation
//!   keys survive DOCX -> LaTeX -> DOCX
//! - **Reference extraction**: free-text bibliographies become structured
//!   entries, and `[key]` or `(Author, Year)` text becomes citations
//! - **Image handling**: embedded DOCX media is written next to LaTeX output;
//!   LaTeX image paths resolve against the input's own directory
//! - **Parallel batches**: independent pipelines per file on the rayon pool

pub mod context;
pub mod convert;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;
pub mod render;
pub mod resolve;

// Re-export commonly used types
pub use context::{CancelToken, Context, Warning, WarningKind};
pub use convert::{ConvertOptions, ConvertOutput, Converter};
pub use detect::Format;
pub use error::{Error, Result};
pub use model::{
    BibliographyEntry, Block, Confidence, Document, Heading, Image, Inline, Metadata, Paragraph,
    Resource, Table, TableCell, TableRow,
};
pub use parser::{DocxParser, ErrorMode, LatexParser, ParseOptions};
pub use render::{
    DocumentClass, DocumentStats, FontSize, JsonFormat, LineSpacing, Margins, RenderOptions,
};
pub use resolve::{DirectoryResolver, ImageResolver, MemoryResolver, NullResolver};

use std::path::Path;

/// Convert bytes between formats with default options.
///
/// # Example
///
/// ```
/// use texbridge::{convert, Format, NullResolver};
///
/// let output = convert(b"\\section{Intro}\nHello", Format::Latex, Format::Latex, &NullResolver)?;
/// assert!(output.as_text().unwrap().contains("\\section{Intro}"));
/// # Ok::<(), texbridge::Error>(())
/// ```
pub fn convert(
    input: &[u8],
    source: Format,
    target: Format,
    resolver: &dyn ImageResolver,
) -> Result<ConvertOutput> {
    Converter::new().convert(input, source, target, resolver)
}

/// Convert a file with default options.
///
/// The source format comes from the file extension; images resolve against
/// the file's directory.
///
/// # Example
///
/// ```no_run
/// use texbridge::{convert_file, Format};
///
/// let output = convert_file("report.docx", Format::Latex).unwrap();
/// output.write_resources(std::path::Path::new("out")).unwrap();
/// std::fs::write("out/report.tex", &output.content).unwrap();
/// ```
pub fn convert_file<P: AsRef<Path>>(path: P, target: Format) -> Result<ConvertOutput> {
    Converter::new().convert_file(path, target)
}

/// Convert several files in parallel, each to its counterpart format.
pub fn convert_files<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<Result<ConvertOutput>> {
    Converter::new().convert_files(paths, None)
}

/// Decode bytes into a document with default options.
///
/// Warnings are logged and discarded; use [`Converter::decode`] with a
/// [`Context`] to keep them.
pub fn decode(input: &[u8], format: Format) -> Result<Document> {
    let mut ctx = Context::new();
    let doc = Converter::new().decode(input, format, &mut ctx)?;
    doc.validate()?;
    Ok(doc)
}

/// Decode a file into a document with default options.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<Document> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let input = std::fs::read(path)?;
    decode(&input, format)
}

/// Encode a document with the given options.
///
/// Images not embedded in the document are not resolved.
pub fn encode(doc: &Document, format: Format, options: &RenderOptions) -> Result<Vec<u8>> {
    let converter = Converter::with_options(ConvertOptions::new().with_render_options(options.clone()));
    let mut ctx = Context::new();
    converter.encode(doc, format, &mut ctx)
}

/// Decode a file and render its document model as JSON.
///
/// # Example
///
/// ```no_run
/// use texbridge::{to_json, JsonFormat};
///
/// let json = to_json("paper.tex", JsonFormat::Pretty).unwrap();
/// println!("{}", json);
/// ```
pub fn to_json<P: AsRef<Path>>(path: P, format: JsonFormat) -> Result<String> {
    let doc = decode_file(path)?;
    render::to_json(&doc, format)
}
