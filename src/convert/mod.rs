//! Conversion pipeline: decode, validate, encode.
//!
//! A [`Converter`] holds the options and an optional cancellation token and
//! runs one independent pipeline per call. Every call owns its document and
//! [`Context`], so a converter can be shared across threads.
//!
//! # Example
//!
//! ```no_run
//! use texbridge::convert::{ConvertOptions, Converter};
//! use texbridge::{Format, NullResolver};
//!
//! fn main() -> texbridge::Result<()> {
//!     let source = std::fs::read("paper.tex")?;
//!     let output = Converter::new().convert(&source, Format::Latex, Format::Docx, &NullResolver)?;
//!     std::fs::write("paper.docx", &output.content)?;
//!     for warning in &output.warnings {
//!         eprintln!("{}", warning);
//!     }
//!     Ok(())
//! }
//! ```

use crate::context::{CancelToken, Context, Warning};
use crate::detect::Format;
use crate::error::Result;
use crate::model::{Block, Document, Metadata, Resource, Visitor};
use crate::parser::{DocxParser, LatexParser, ParseOptions};
use crate::render::{to_docx, to_latex, DocumentStats, RenderOptions};
use crate::resolve::{DirectoryResolver, ImageResolver};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Options for a conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Decoder options
    pub parse: ParseOptions,

    /// Encoder options
    pub render: RenderOptions,
}

impl ConvertOptions {
    /// Create new conversion options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set decoder options.
    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse = options;
        self
    }

    /// Set encoder options.
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render = options;
        self
    }

    /// Check that the options are consistent.
    pub fn validate(&self) -> Result<()> {
        self.render.validate()
    }
}

/// Result of a conversion.
#[derive(Debug, Clone)]
pub struct ConvertOutput {
    /// Encoded document
    pub content: Vec<u8>,

    /// Format of `content`
    pub format: Format,

    /// Non-fatal problems, in the order they were found
    pub warnings: Vec<Warning>,

    /// Images to write next to a LaTeX output, keyed by the path the
    /// LaTeX source refers to
    pub resources: BTreeMap<String, Resource>,

    /// Metadata of the decoded document
    pub metadata: Metadata,

    /// Statistics of the decoded document
    pub stats: DocumentStats,
}

impl ConvertOutput {
    /// Content as text, for text formats.
    pub fn as_text(&self) -> Option<&str> {
        if self.format.is_text() {
            std::str::from_utf8(&self.content).ok()
        } else {
            None
        }
    }

    /// Get content length in bytes.
    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// Write the embedded images below `dir`.
    ///
    /// Keys that would escape `dir` are skipped.
    pub fn write_resources(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (source, resource) in &self.resources {
            let relative = Path::new(source);
            let safe = relative
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
            if !safe {
                log::warn!("not writing image outside the output directory: {}", source);
                continue;
            }
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &resource.data)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Runs conversions with fixed options.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
    cancel: Option<CancelToken>,
}

impl Converter {
    /// Create a converter with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a converter with the given options.
    pub fn with_options(options: ConvertOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// Attach a cancellation token checked between blocks.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Get the conversion options.
    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    fn context<'r>(&self, resolver: &'r dyn ImageResolver) -> Context<'r> {
        let ctx = Context::with_resolver(resolver);
        match &self.cancel {
            Some(token) => ctx.with_cancel_token(token.clone()),
            None => ctx,
        }
    }

    /// Decode bytes into a document.
    pub fn decode(&self, input: &[u8], format: Format, ctx: &mut Context) -> Result<Document> {
        let options = self.options.parse.clone();
        match format {
            Format::Docx => DocxParser::from_bytes_with_options(input, options)?.parse(ctx),
            Format::Latex => LatexParser::from_bytes(input, options)?.parse(ctx),
        }
    }

    /// Encode a document.
    pub fn encode(&self, doc: &Document, format: Format, ctx: &mut Context) -> Result<Vec<u8>> {
        match format {
            Format::Docx => to_docx(doc, &self.options.render, ctx),
            Format::Latex => to_latex(doc, &self.options.render, ctx).map(String::into_bytes),
        }
    }

    /// Convert `input` from `source` to `target`.
    ///
    /// Decode and structural errors abort with no output. Images the
    /// encoder cannot find become warnings.
    pub fn convert(
        &self,
        input: &[u8],
        source: Format,
        target: Format,
        resolver: &dyn ImageResolver,
    ) -> Result<ConvertOutput> {
        self.options.validate()?;
        let mut ctx = self.context(resolver);

        let doc = self.decode(input, source, &mut ctx)?;
        doc.validate()?;
        log::debug!(
            "decoded {} input: {} blocks, {} resources",
            source,
            doc.blocks.len(),
            doc.resources.len()
        );

        let content = self.encode(&doc, target, &mut ctx)?;
        let resources = match target {
            Format::Latex => referenced_resources(&doc),
            Format::Docx => BTreeMap::new(),
        };
        log::debug!(
            "encoded {} output: {} bytes, {} warnings",
            target,
            content.len(),
            ctx.warnings().len()
        );

        Ok(ConvertOutput {
            content,
            format: target,
            warnings: ctx.into_warnings(),
            resources,
            stats: DocumentStats::collect(&doc),
            metadata: doc.metadata,
        })
    }

    /// Convert a file; the source format comes from its extension and images
    /// resolve against its directory.
    pub fn convert_file<P: AsRef<Path>>(&self, path: P, target: Format) -> Result<ConvertOutput> {
        let path = path.as_ref();
        let source = Format::from_path(path)?;
        let input = std::fs::read(path)?;
        let resolver = DirectoryResolver::for_file(path);
        self.convert(&input, source, target, &resolver)
    }

    /// Convert several files in parallel, each to its counterpart format
    /// unless `target` is given.
    ///
    /// Results come back in input order.
    pub fn convert_files<P: AsRef<Path> + Sync>(
        &self,
        paths: &[P],
        target: Option<Format>,
    ) -> Vec<Result<ConvertOutput>> {
        paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                let target = match target {
                    Some(target) => target,
                    None => Format::from_path(path)?.counterpart(),
                };
                self.convert_file(path, target)
            })
            .collect()
    }
}

/// Embedded images referenced by image blocks, in source order of key.
fn referenced_resources(doc: &Document) -> BTreeMap<String, Resource> {
    struct Sources<'d> {
        doc: &'d Document,
        found: BTreeMap<String, Resource>,
    }

    impl Visitor for Sources<'_> {
        fn visit_block(&mut self, block: &Block) {
            if let Block::Image(image) = block {
                if let Some(resource) = self.doc.get_resource(&image.source) {
                    self.found
                        .entry(image.source.clone())
                        .or_insert_with(|| resource.clone());
                }
            }
        }
    }

    let mut sources = Sources {
        doc,
        found: BTreeMap::new(),
    };
    doc.accept(&mut sources);
    sources.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WarningKind;
    use crate::error::Error;
    use crate::resolve::{MemoryResolver, NullResolver};

    const PAPER: &str = "\\documentclass{article}\n\\title{Paper}\n\\begin{document}\n\\section{Intro}\nSee \\cite{doe2020} and \\includegraphics{plot.png}.\n\\end{document}\n";

    #[test]
    fn test_convert_options_validate() {
        let options = ConvertOptions::new()
            .with_parse_options(ParseOptions::new().lenient())
            .with_render_options(RenderOptions::new().with_uniform_margin(9.0));
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
        assert!(ConvertOptions::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_options_fail_before_decoding() {
        let converter = Converter::with_options(
            ConvertOptions::new().with_render_options(RenderOptions::new().with_font_name("")),
        );
        let result = converter.convert(b"\\bad{", Format::Latex, Format::Docx, &NullResolver);
        assert!(matches!(result, Err(Error::InvalidOptions(_))));
    }

    #[test]
    fn test_latex_to_latex() {
        let output = Converter::new()
            .convert(PAPER.as_bytes(), Format::Latex, Format::Latex, &NullResolver)
            .unwrap();
        let text = output.as_text().unwrap();
        assert!(text.contains("\\section{Intro}"));
        assert!(text.contains("\\cite{doe2020}"));
        assert_eq!(output.metadata.title.as_deref(), Some("Paper"));
        assert_eq!(output.stats.heading_count, 1);
        assert!(output
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::Resource));
    }

    #[test]
    fn test_resolved_image_embedded_in_docx() {
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0, 0, 0, 13]);
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 3, 8, 2, 0, 0, 0]);
        let resolver = MemoryResolver::new().with_image("plot.png", png);

        let output = Converter::new()
            .convert(PAPER.as_bytes(), Format::Latex, Format::Docx, &resolver)
            .unwrap();
        assert_eq!(output.format, Format::Docx);
        assert!(output.as_text().is_none());
        assert!(output.warnings.iter().all(|w| w.kind != WarningKind::Resource));
        assert!(output.resources.is_empty());
    }

    #[test]
    fn test_decode_error_gives_no_output() {
        let result = Converter::new().convert(
            b"\\begin{tabular}{ll}\na & b \\\\\n",
            Format::Latex,
            Format::Docx,
            &NullResolver,
        );
        assert!(matches!(result, Err(Error::Decode { format: Format::Latex, .. })));
    }

    #[test]
    fn test_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let result = Converter::new().with_cancel_token(token).convert(
            PAPER.as_bytes(),
            Format::Latex,
            Format::Docx,
            &NullResolver,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_write_resources_skips_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = BTreeMap::new();
        resources.insert("media/a.png".to_string(), Resource::png(vec![1]));
        resources.insert("../evil.png".to_string(), Resource::png(vec![2]));
        let output = ConvertOutput {
            content: Vec::new(),
            format: Format::Latex,
            warnings: Vec::new(),
            resources,
            metadata: Metadata::default(),
            stats: DocumentStats::default(),
        };
        let written = output.write_resources(dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("media/a.png")]);
        assert_eq!(std::fs::read(dir.path().join("media/a.png")).unwrap(), vec![1]);
    }
}
