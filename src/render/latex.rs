//! LaTeX encoder.

use super::{DocumentClass, RenderOptions};
use crate::context::{Context, WarningKind};
use crate::error::Result;
use crate::model::{walk_blocks, BibliographyEntry, Block, Document, Image, Inline, Table, Visitor};

/// Convert a document to LaTeX source.
pub fn to_latex(doc: &Document, options: &RenderOptions, ctx: &mut Context) -> Result<String> {
    LatexRenderer::new(options.clone()).render(doc, ctx)
}

/// Escape text for use in LaTeX paragraphs.
///
/// Newlines and tabs become spaces; a non-breaking space becomes `~`.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '{' | '}' | '&' | '%' | '$' | '#' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '\u{a0}' => out.push('~'),
            '\n' | '\t' | '\r' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

/// Sectioning command for a heading level.
fn sectioning_command(level: u8) -> &'static str {
    match level {
        0 | 1 => "section",
        2 => "subsection",
        3 => "subsubsection",
        4 => "paragraph",
        5 => "subparagraph",
        _ => "subsubparagraph",
    }
}

/// Which optional packages the body needs.
#[derive(Debug, Default)]
struct Features {
    images: bool,
    tables: bool,
    deep_headings: bool,
}

impl Visitor for Features {
    fn visit_block(&mut self, block: &Block) {
        match block {
            Block::Image(_) => self.images = true,
            Block::Table(_) => self.tables = true,
            Block::Heading(h) if h.level >= 6 => self.deep_headings = true,
            _ => {}
        }
    }
}

/// LaTeX renderer.
pub struct LatexRenderer {
    options: RenderOptions,
}

impl LatexRenderer {
    /// Create a new LaTeX renderer.
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Render a document to LaTeX.
    pub fn render(&self, doc: &Document, ctx: &mut Context) -> Result<String> {
        self.options.validate()?;

        let mut features = Features::default();
        walk_blocks(&mut features, &doc.blocks);

        let mut out = String::new();
        if self.options.standalone {
            self.render_preamble(&mut out, doc, &features);
        }

        let mut entries: Vec<&BibliographyEntry> = Vec::new();
        for block in &doc.blocks {
            ctx.checkpoint()?;
            match block {
                Block::BibliographyEntry(entry) => entries.push(entry),
                block => self.render_block(&mut out, block, doc, ctx),
            }
        }
        if !entries.is_empty() {
            self.render_bibliography(&mut out, &entries);
        }

        if self.options.standalone {
            out.push_str("\\end{document}\n");
        }
        Ok(out)
    }

    fn render_preamble(&self, out: &mut String, doc: &Document, features: &Features) {
        let options = &self.options;
        out.push_str(&format!(
            "\\documentclass[{}]{{{}}}\n",
            options.font_size.class_option(),
            options.document_class.name()
        ));
        if options.unicode_support {
            out.push_str("\\usepackage[T1]{fontenc}\n");
            out.push_str("\\usepackage[utf8]{inputenc}\n");
        }
        out.push_str(&format!(
            "\\usepackage[{}]{{geometry}}\n",
            options.margins.geometry()
        ));
        if features.images {
            out.push_str("\\usepackage{graphicx}\n");
        }
        if features.tables {
            out.push_str("\\usepackage{booktabs}\n");
        }
        if options.line_spacing.latex_command().is_some() {
            out.push_str("\\usepackage{setspace}\n");
        }
        if options.bibliography_style.is_some() && doc.bibliography().next().is_some() {
            out.push_str("\\usepackage[numbers]{natbib}\n");
        }
        for package in &options.custom_packages {
            out.push_str(&format!("\\usepackage{{{}}}\n", package));
        }
        out.push_str("\\usepackage{hyperref}\n");
        if let Some(command) = options.line_spacing.latex_command() {
            out.push_str(command);
            out.push('\n');
        }
        if features.deep_headings {
            out.push_str(
                "\\providecommand{\\subsubparagraph}[1]{\\par\\noindent\\textbf{#1}\\quad}\n",
            );
        }

        let metadata = &doc.metadata;
        if let Some(title) = &metadata.title {
            out.push_str(&format!("\\title{{{}}}\n", escape(title)));
        }
        if let Some(author) = &metadata.author {
            out.push_str(&format!("\\author{{{}}}\n", escape(author)));
        }
        if let Some(date) = &metadata.date {
            out.push_str(&format!("\\date{{{}}}\n", escape(date)));
        }
        out.push_str("\n\\begin{document}\n\n");
        if metadata.title.is_some() {
            out.push_str("\\maketitle\n\n");
        }
    }

    fn render_block(&self, out: &mut String, block: &Block, doc: &Document, ctx: &mut Context) {
        match block {
            Block::Heading(h) => {
                out.push_str(&format!("\\{}{{", sectioning_command(h.level)));
                render_inlines(out, &h.content);
                out.push_str("}\n\n");
            }
            Block::Paragraph(p) => {
                if p.is_blank() {
                    return;
                }
                render_inlines(out, &p.content);
                out.push_str("\n\n");
            }
            Block::Table(table) => self.render_table(out, table, doc, ctx),
            Block::Image(image) => {
                self.check_image(image, doc, ctx);
                out.push_str("\\begin{figure}[h]\n\\centering\n");
                out.push_str(&format!(
                    "\\includegraphics[width={}]{{{}}}\n",
                    self.options.image_width, image.source
                ));
                if let Some(caption) = &image.caption {
                    out.push_str("\\caption{");
                    render_inlines(out, caption);
                    out.push_str("}\n");
                }
                out.push_str("\\end{figure}\n\n");
            }
            Block::BibliographyEntry(entry) => {
                out.push_str(&escape(&entry.render_text()));
                out.push_str("\n\n");
            }
        }
    }

    fn render_table(&self, out: &mut String, table: &Table, doc: &Document, ctx: &mut Context) {
        let columns = table.column_count();
        if table.is_empty() || columns == 0 {
            ctx.warn(WarningKind::DroppedObject, "empty table omitted");
            return;
        }

        out.push_str("\\begin{table}[h]\n\\centering\n");
        out.push_str(&format!("\\begin{{tabular}}{{{}}}\n", "l".repeat(columns)));
        out.push_str("\\toprule\n");
        for (i, row) in table.rows.iter().enumerate() {
            let cells: Vec<String> = (0..columns)
                .map(|c| match row.cells.get(c) {
                    Some(cell) => self.render_cell(&cell.blocks, doc, ctx),
                    None => String::new(),
                })
                .collect();
            out.push_str(&cells.join(" & "));
            out.push_str(" \\\\\n");
            if i == 0 && table.rows.len() > 1 {
                out.push_str("\\midrule\n");
            }
        }
        out.push_str("\\bottomrule\n\\end{tabular}\n\\end{table}\n\n");
    }

    /// Cell content on one line; blocks are separated by `\newline`.
    fn render_cell(&self, blocks: &[Block], doc: &Document, ctx: &mut Context) -> String {
        let mut parts = Vec::new();
        for block in blocks {
            let mut part = String::new();
            match block {
                Block::Paragraph(p) => render_inlines(&mut part, &p.content),
                Block::Heading(h) => {
                    ctx.warn(
                        WarningKind::Degraded,
                        "heading inside a table cell rendered as bold text",
                    );
                    part.push_str("\\textbf{");
                    render_inlines(&mut part, &h.content);
                    part.push('}');
                }
                Block::Image(image) => {
                    self.check_image(image, doc, ctx);
                    part.push_str(&format!(
                        "\\includegraphics[width=\\linewidth]{{{}}}",
                        image.source
                    ));
                    if let Some(caption) = &image.caption {
                        ctx.warn(
                            WarningKind::Degraded,
                            "caption of an image inside a table cell kept as text",
                        );
                        parts.push(part);
                        part = String::new();
                        render_inlines(&mut part, caption);
                    }
                }
                Block::Table(inner) => {
                    ctx.warn(
                        WarningKind::Degraded,
                        "nested table flattened into its enclosing cell",
                    );
                    let nested: Vec<&Block> = inner
                        .rows
                        .iter()
                        .flat_map(|r| &r.cells)
                        .flat_map(|c| &c.blocks)
                        .collect();
                    let nested: Vec<Block> = nested.into_iter().cloned().collect();
                    part = self.render_cell(&nested, doc, ctx);
                }
                Block::BibliographyEntry(entry) => part.push_str(&escape(&entry.render_text())),
            }
            if !part.trim().is_empty() {
                parts.push(part);
            }
        }

        let mut cell = parts.join(" \\newline ");
        // A leading `[` or `*` would be read as an argument of the preceding `\\`.
        if cell.starts_with('[') || cell.starts_with('*') {
            let mut chars = cell.chars();
            if let Some(first) = chars.next() {
                cell = format!("{{{}}}{}", first, chars.as_str());
            }
        }
        cell
    }

    fn check_image(&self, image: &Image, doc: &Document, ctx: &mut Context) {
        if image.is_external() {
            ctx.warn(
                WarningKind::Resource,
                format!(
                    "external image `{}` cannot be included by LaTeX; reference kept",
                    image.source
                ),
            );
        } else if doc.get_resource(&image.source).is_none()
            && ctx.resolve_image(&image.source).is_none()
        {
            ctx.warn(
                WarningKind::Resource,
                format!("image `{}` could not be resolved; reference kept", image.source),
            );
        }
    }

    fn render_bibliography(&self, out: &mut String, entries: &[&BibliographyEntry]) {
        // `report` and `book` default to "Bibliography".
        let class = self.options.document_class;
        if self.options.bibliography_title != "References" || class != DocumentClass::Article {
            out.push_str(&format!(
                "\\renewcommand{{{}}}{{{}}}\n",
                class.bibliography_macro(),
                escape(&self.options.bibliography_title)
            ));
        }
        if let Some(style) = &self.options.bibliography_style {
            out.push_str(&format!("\\bibliographystyle{{{}}}\n", style));
        }
        let widest = entries.len().to_string().len();
        out.push_str(&format!(
            "\\begin{{thebibliography}}{{{}}}\n",
            "9".repeat(widest.max(1))
        ));
        for entry in entries {
            out.push_str(&format!(
                "\\bibitem{{{}}} {}\n",
                entry.key,
                escape(&entry.render_text())
            ));
        }
        out.push_str("\\end{thebibliography}\n\n");
    }
}

fn render_inlines(out: &mut String, inlines: &[Inline]) {
    for inline in inlines {
        match inline {
            Inline::Text(t) => out.push_str(&escape(t)),
            Inline::Bold(children) => wrap(out, "\\textbf{", children, "}"),
            Inline::Italic(children) => wrap(out, "\\textit{", children, "}"),
            Inline::BoldItalic(children) => wrap(out, "\\textbf{\\textit{", children, "}}"),
            Inline::CitationRef(key) => out.push_str(&format!("\\cite{{{}}}", key)),
        }
    }
}

fn wrap(out: &mut String, open: &str, children: &[Inline], close: &str) {
    out.push_str(open);
    render_inlines(out, children);
    out.push_str(close);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metadata, Resource, TableCell, TableRow};

    fn render(doc: &Document, options: &RenderOptions) -> (String, Vec<crate::context::Warning>) {
        let mut ctx = Context::new();
        let out = to_latex(doc, options, &mut ctx).unwrap();
        (out, ctx.into_warnings())
    }

    fn fragment() -> RenderOptions {
        RenderOptions::new().with_standalone(false)
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("50% & $5 #1 a_b {x}"), "50\\% \\& \\$5 \\#1 a\\_b \\{x\\}");
        assert_eq!(
            escape("a\\b~c^d"),
            "a\\textbackslash{}b\\textasciitilde{}c\\textasciicircum{}d"
        );
        assert_eq!(escape("x\u{a0}y\nz\tw"), "x~y z w");
    }

    #[test]
    fn test_heading_and_emphasis() {
        let doc = Document::from_blocks(vec![
            Block::heading(1, vec![Inline::text("Intro")]),
            Block::paragraph(vec![
                Inline::bold("Hello"),
                Inline::text(" "),
                Inline::italic("world"),
                Inline::text(" "),
                Inline::BoldItalic(vec![Inline::text("both")]),
            ]),
            Block::heading(6, vec![Inline::text("Deep")]),
        ]);
        let (out, _) = render(&doc, &fragment());
        assert!(out.contains("\\section{Intro}"));
        assert!(out.contains("\\textbf{Hello} \\textit{world} \\textbf{\\textit{both}}"));
        assert!(out.contains("\\subsubparagraph{Deep}"));
        assert!(!out.contains("\\documentclass"));
    }

    #[test]
    fn test_preamble() {
        let mut doc = Document::from_blocks(vec![
            Block::heading(6, vec![Inline::text("Deep")]),
            Block::Table(Table::from_rows(vec![TableRow::from_strings(["a"])])),
        ]);
        doc.metadata = Metadata::with_title("Paper & Notes");
        let options = RenderOptions::new()
            .with_package("amsmath")
            .with_line_spacing(crate::render::LineSpacing::OneHalf);
        let (out, _) = render(&doc, &options);
        assert!(out.starts_with("\\documentclass[11pt]{article}\n"));
        assert!(out.contains("\\usepackage[utf8]{inputenc}"));
        assert!(out.contains("\\usepackage{booktabs}"));
        assert!(!out.contains("graphicx"));
        assert!(out.contains("\\usepackage{amsmath}"));
        assert!(out.contains("\\onehalfspacing"));
        assert!(out.contains("\\providecommand{\\subsubparagraph}"));
        assert!(out.contains("\\title{Paper \\& Notes}"));
        assert!(out.contains("\\maketitle"));
        assert!(out.trim_end().ends_with("\\end{document}"));
    }

    #[test]
    fn test_table() {
        let table = Table::from_rows(vec![
            TableRow::from_strings(["Name", "Value"]),
            TableRow::new(vec![TableCell::text("[x]"), TableCell::empty()]),
        ]);
        let doc = Document::from_blocks(vec![Block::Table(table)]);
        let (out, _) = render(&doc, &fragment());
        assert!(out.contains("\\begin{tabular}{ll}"));
        assert!(out.contains("Name & Value \\\\\n\\midrule\n"));
        assert!(out.contains("{[}x] &  \\\\"));
    }

    #[test]
    fn test_citation_kept_when_dangling() {
        let doc = Document::from_blocks(vec![Block::paragraph(vec![
            Inline::text("See "),
            Inline::cite("missing"),
        ])]);
        let (out, warnings) = render(&doc, &fragment());
        assert!(out.contains("See \\cite{missing}"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unresolved_image_warns() {
        let doc = Document::from_blocks(vec![Block::Image(
            Image::new("figs/missing.png").with_caption(vec![Inline::text("Plot")]),
        )]);
        let (out, warnings) = render(&doc, &fragment());
        assert!(out.contains("\\includegraphics[width=0.8\\textwidth]{figs/missing.png}"));
        assert!(out.contains("\\caption{Plot}"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::Resource);
    }

    #[test]
    fn test_embedded_image_no_warning() {
        let mut doc = Document::from_blocks(vec![Block::image("media/image1.png")]);
        doc.add_resource("media/image1.png", Resource::png(vec![0x89, b'P', b'N', b'G']));
        let (_, warnings) = render(&doc, &fragment());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_bibliography() {
        let doc = Document::from_blocks(vec![
            Block::paragraph(vec![Inline::cite("doe2020")]),
            Block::BibliographyEntry(
                BibliographyEntry::raw("doe2020", "Doe, J. (2020). Title."),
            ),
        ]);
        let (out, _) = render(&doc, &fragment());
        assert!(out.contains("\\begin{thebibliography}{9}\n\\bibitem{doe2020} Doe, J. (2020). Title.\n"));
        assert!(!out.contains("renewcommand"));

        let options = fragment().with_bibliography_title("Sources");
        let (out, _) = render(&doc, &options);
        assert!(out.contains("\\renewcommand{\\refname}{Sources}"));
    }

    #[test]
    fn test_bibliography_style() {
        let doc = Document::from_blocks(vec![
            Block::paragraph(vec![Inline::cite("doe2020")]),
            Block::BibliographyEntry(BibliographyEntry::raw("doe2020", "Doe (2020). Title.")),
        ]);
        let (out, _) = render(&doc, &RenderOptions::new().with_bibliography_style("unsrt"));
        assert!(out.contains("\\usepackage[numbers]{natbib}\n"));
        assert!(out.contains("\\bibliographystyle{unsrt}\n\\begin{thebibliography}{9}"));

        let plain = Document::from_blocks(vec![Block::paragraph(vec![Inline::text("x")])]);
        let (out, _) = render(&plain, &RenderOptions::new().with_bibliography_style("unsrt"));
        assert!(!out.contains("natbib"));
        assert!(!out.contains("bibliographystyle"));

        let (out, _) = render(&doc, &RenderOptions::default());
        assert!(!out.contains("natbib"));
    }
}
