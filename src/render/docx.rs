//! DOCX encoder.
//!
//! Writes a minimal WordprocessingML package: content types, package and
//! document relationships, `word/document.xml`, `word/styles.xml`,
//! `docProps/core.xml` and one `word/media` part per embedded image. Entries
//! carry a fixed timestamp so the same document always yields the same bytes.

use super::docx_parts::{
    self, invalid_xml_chars, xml_escape, PartRelationship, NS_A, NS_PIC, NS_R, NS_W, NS_WP,
    REL_IMAGE,
};
use super::RenderOptions;
use crate::context::{Context, WarningKind};
use crate::detect::Format;
use crate::error::{Error, Result};
use crate::model::inline::{self, Emphasis, Span};
use crate::model::{
    image_dimensions, BibliographyEntry, Block, Document, Image, Inline, Resource, Table,
    MAX_HEADING_LEVEL,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const EMU_PER_INCH: u64 = 914_400;
const EMU_PER_PIXEL: u64 = 9_525;

/// Size used when the pixel size of an image is unknown: 4 x 3 inches.
const FALLBACK_EXTENT: (u64, u64) = (4 * EMU_PER_INCH, 3 * EMU_PER_INCH);

/// Convert a document to DOCX bytes.
pub fn to_docx(doc: &Document, options: &RenderOptions, ctx: &mut Context) -> Result<Vec<u8>> {
    DocxRenderer::new(options.clone()).render(doc, ctx)
}

/// DOCX renderer.
pub struct DocxRenderer {
    options: RenderOptions,
}

/// An image part queued for the package.
struct MediaPart {
    path: String,
    data: Vec<u8>,
}

/// Body writer state.
struct BodyWriter<'d> {
    doc: &'d Document,
    /// Keys of the bibliography entries, for citation lookup.
    entry_keys: HashSet<&'d str>,
    max_width_emu: u64,
    out: String,
    rels: Vec<PartRelationship>,
    media: Vec<MediaPart>,
    /// Relationship id per image source, so repeated images share a part.
    by_source: HashMap<String, String>,
    used_paths: BTreeSet<String>,
    drawing_id: u32,
    /// Characters dropped because XML cannot carry them.
    dropped_chars: usize,
}

impl DocxRenderer {
    /// Create a new DOCX renderer.
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Render a document to DOCX bytes.
    pub fn render(&self, doc: &Document, ctx: &mut Context) -> Result<Vec<u8>> {
        self.options.validate()?;

        let mut body = BodyWriter {
            doc,
            entry_keys: doc.bibliography().map(|e| e.key.as_str()).collect(),
            max_width_emu: (self.options.docx_image_max_width_in as f64 * EMU_PER_INCH as f64)
                as u64,
            out: String::new(),
            rels: Vec::new(),
            media: Vec::new(),
            by_source: HashMap::new(),
            used_paths: BTreeSet::new(),
            drawing_id: 0,
            dropped_chars: 0,
        };

        if let Some(title) = &doc.metadata.title {
            body.styled_paragraph("Title", &[Inline::text(title.as_str())]);
        }

        let mut entries: Vec<&BibliographyEntry> = Vec::new();
        for block in &doc.blocks {
            ctx.checkpoint()?;
            match block {
                Block::BibliographyEntry(entry) => entries.push(entry),
                block => body.block(block, ctx),
            }
        }
        if !entries.is_empty() {
            body.styled_paragraph(
                "Heading1",
                &[Inline::text(self.options.bibliography_title.as_str())],
            );
            for entry in entries {
                body.bibliography_entry(entry);
            }
        }

        let dropped = body.dropped_chars
            + doc
                .metadata
                .author
                .as_deref()
                .map_or(0, invalid_xml_chars);
        if dropped > 0 {
            ctx.warn(
                WarningKind::Degraded,
                format!("dropped {} control character(s) that DOCX cannot store", dropped),
            );
        }

        let document_xml = format!(
            "{}<w:document xmlns:w=\"{}\" xmlns:r=\"{}\" xmlns:wp=\"{}\" xmlns:a=\"{}\" xmlns:pic=\"{}\"><w:body>{}<w:sectPr>{}</w:sectPr></w:body></w:document>",
            docx_parts::XML_DECLARATION,
            NS_W,
            NS_R,
            NS_WP,
            NS_A,
            NS_PIC,
            body.out,
            self.section_properties()
        );

        let extensions: BTreeSet<String> = body
            .media
            .iter()
            .filter_map(|m| m.path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
            .collect();

        let mut parts: Vec<(String, Vec<u8>)> = vec![
            (
                "[Content_Types].xml".to_string(),
                docx_parts::content_types(&extensions).into_bytes(),
            ),
            (
                "_rels/.rels".to_string(),
                docx_parts::package_relationships().into_bytes(),
            ),
            ("word/document.xml".to_string(), document_xml.into_bytes()),
            (
                "word/styles.xml".to_string(),
                docx_parts::styles(&self.options).into_bytes(),
            ),
            (
                "word/_rels/document.xml.rels".to_string(),
                docx_parts::document_relationships(&body.rels).into_bytes(),
            ),
            (
                "docProps/core.xml".to_string(),
                docx_parts::core_properties(&doc.metadata).into_bytes(),
            ),
        ];
        parts.extend(
            body.media
                .into_iter()
                .map(|m| (format!("word/{}", m.path), m.data)),
        );

        log::debug!("writing DOCX package with {} parts", parts.len());
        write_package(parts)
    }

    /// Page size (US Letter) and margins in twentieths of a point.
    fn section_properties(&self) -> String {
        let twips = |inches: f32| (inches * 1440.0).round() as i64;
        let m = &self.options.margins;
        format!(
            "<w:pgSz w:w=\"12240\" w:h=\"15840\"/><w:pgMar w:top=\"{}\" w:right=\"{}\" w:bottom=\"{}\" w:left=\"{}\" w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/>",
            twips(m.top),
            twips(m.right),
            twips(m.bottom),
            twips(m.left)
        )
    }
}

fn write_package(parts: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    let encode_err = |e: &dyn std::fmt::Display| Error::encode(Format::Docx, e.to_string());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in parts {
        zip.start_file(name.as_str(), options)
            .map_err(|e| encode_err(&e))?;
        zip.write_all(&data).map_err(|e| encode_err(&e))?;
    }
    let cursor = zip.finish().map_err(|e| encode_err(&e))?;
    Ok(cursor.into_inner())
}

impl<'d> BodyWriter<'d> {
    fn block(&mut self, block: &Block, ctx: &mut Context) {
        match block {
            Block::Heading(h) => {
                let level = h.level.clamp(1, MAX_HEADING_LEVEL);
                self.styled_paragraph(&format!("Heading{}", level), &h.content);
            }
            Block::Paragraph(p) => {
                self.out.push_str("<w:p>");
                self.runs(&p.content);
                self.out.push_str("</w:p>");
            }
            Block::Table(table) => self.table(table, ctx),
            Block::Image(image) => self.image(image, ctx),
            Block::BibliographyEntry(entry) => self.bibliography_entry(entry),
        }
    }

    fn styled_paragraph(&mut self, style: &str, content: &[Inline]) {
        self.out.push_str(&format!(
            "<w:p><w:pPr><w:pStyle w:val=\"{}\"/></w:pPr>",
            style
        ));
        self.runs(content);
        self.out.push_str("</w:p>");
    }

    fn bibliography_entry(&mut self, entry: &BibliographyEntry) {
        let text = format!("[{}] {}", entry.key, entry.render_text());
        self.out.push_str("<w:p>");
        self.text_run(&text, false, false);
        self.out.push_str("</w:p>");
    }

    fn runs(&mut self, content: &[Inline]) {
        let spans = inline::flatten(content);
        let mut i = 0;
        while i < spans.len() {
            match &spans[i] {
                Span::Text(text, emphasis) => {
                    self.text_run(text, emphasis.bold, emphasis.italic);
                    i += 1;
                }
                Span::Citation(..) => {
                    let end = spans[i..]
                        .iter()
                        .position(|s| matches!(s, Span::Text(..)))
                        .map_or(spans.len(), |n| i + n);
                    self.citations(&spans[i..end]);
                    i = end;
                }
            }
        }
    }

    /// Adjacent citations. Keys with an entry share one `[a, b]` marker so
    /// they link again on decode; other keys are listed as `a, b`.
    fn citations(&mut self, spans: &[Span]) {
        let mut groups: Vec<(bool, Emphasis, Vec<&str>)> = Vec::new();
        for span in spans {
            let Span::Citation(key, emphasis) = span else {
                continue;
            };
            let resolved = self.entry_keys.contains(key.as_str());
            if let Some((r, e, keys)) = groups.last_mut() {
                if *r == resolved && *e == *emphasis {
                    keys.push(key.as_str());
                    continue;
                }
            }
            groups.push((resolved, *emphasis, vec![key.as_str()]));
        }

        for (n, (resolved, emphasis, keys)) in groups.iter().enumerate() {
            if n > 0 {
                self.text_run(", ", emphasis.bold, emphasis.italic);
            }
            let list = keys.join(", ");
            let text = if *resolved { format!("[{}]", list) } else { list };
            self.text_run(&text, emphasis.bold, emphasis.italic);
        }
    }

    /// One run; line breaks and tabs become `w:br` and `w:tab`.
    fn text_run(&mut self, text: &str, bold: bool, italic: bool) {
        if text.is_empty() {
            return;
        }
        self.out.push_str("<w:r>");
        if bold || italic {
            self.out.push_str("<w:rPr>");
            if bold {
                self.out.push_str("<w:b/>");
            }
            if italic {
                self.out.push_str("<w:i/>");
            }
            self.out.push_str("</w:rPr>");
        }
        let mut segment = String::new();
        for c in text.chars() {
            match c {
                '\n' | '\t' => {
                    self.flush_text(&mut segment);
                    self.out
                        .push_str(if c == '\n' { "<w:br/>" } else { "<w:tab/>" });
                }
                '\r' => {}
                c => segment.push(c),
            }
        }
        self.flush_text(&mut segment);
        self.out.push_str("</w:r>");
    }

    fn flush_text(&mut self, segment: &mut String) {
        if segment.is_empty() {
            return;
        }
        self.dropped_chars += invalid_xml_chars(segment);
        let text = xml_escape(segment.as_str());
        if !text.is_empty() {
            self.out
                .push_str(&format!("<w:t xml:space=\"preserve\">{}</w:t>", text));
        }
        segment.clear();
    }

    fn table(&mut self, table: &Table, ctx: &mut Context) {
        let columns = table.column_count();
        if table.is_empty() || columns == 0 {
            ctx.warn(WarningKind::DroppedObject, "empty table omitted");
            return;
        }

        self.out.push_str(
            "<w:tbl><w:tblPr><w:tblStyle w:val=\"TableGrid\"/><w:tblW w:w=\"0\" w:type=\"auto\"/></w:tblPr><w:tblGrid>",
        );
        for _ in 0..columns {
            self.out.push_str("<w:gridCol/>");
        }
        self.out.push_str("</w:tblGrid>");
        for row in &table.rows {
            self.out.push_str("<w:tr>");
            for c in 0..columns {
                self.out
                    .push_str("<w:tc><w:tcPr><w:tcW w:w=\"0\" w:type=\"auto\"/></w:tcPr>");
                let blocks = row.cells.get(c).map(|cell| cell.blocks.as_slice()).unwrap_or(&[]);
                for block in blocks {
                    self.block(block, ctx);
                }
                // A cell must end with a paragraph.
                if !matches!(blocks.last(), Some(Block::Paragraph(_) | Block::Heading(_))) {
                    self.out.push_str("<w:p/>");
                }
                self.out.push_str("</w:tc>");
            }
            self.out.push_str("</w:tr>");
        }
        self.out.push_str("</w:tbl>");
    }

    fn image(&mut self, image: &Image, ctx: &mut Context) {
        match self.image_relationship(image, ctx) {
            Some((rel_id, (cx, cy))) => {
                self.drawing_id += 1;
                let id = self.drawing_id;
                let link = if image.is_external() { "r:link" } else { "r:embed" };
                self.out.push_str(&format!(
                    "<w:p><w:r><w:drawing><wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\">\
                     <wp:extent cx=\"{cx}\" cy=\"{cy}\"/><wp:docPr id=\"{id}\" name=\"Picture {id}\"/>\
                     <wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect=\"1\"/></wp:cNvGraphicFramePr>\
                     <a:graphic><a:graphicData uri=\"{pic}\"><pic:pic><pic:nvPicPr><pic:cNvPr id=\"{id}\" name=\"Picture {id}\"/><pic:cNvPicPr/></pic:nvPicPr>\
                     <pic:blipFill><a:blip {link}=\"{rel}\"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>\
                     <pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm><a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>\
                     </pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>",
                    cx = cx,
                    cy = cy,
                    id = id,
                    pic = NS_PIC,
                    link = link,
                    rel = rel_id
                ));
            }
            None => {
                let placeholder = format!("[Image not found: {}]", image.source);
                self.out.push_str("<w:p>");
                self.text_run(&placeholder, false, false);
                self.out.push_str("</w:p>");
            }
        }
        if let Some(caption) = &image.caption {
            self.styled_paragraph("Caption", caption);
        }
    }

    /// Relationship id and extent for an image, or `None` when it has no bytes.
    fn image_relationship(
        &mut self,
        image: &Image,
        ctx: &mut Context,
    ) -> Option<(String, (u64, u64))> {
        if image.is_external() {
            let id = self.relationship_for(&image.source, || PartRelationship {
                id: String::new(),
                kind: REL_IMAGE,
                target: image.source.clone(),
                external: true,
            });
            return Some((id, FALLBACK_EXTENT));
        }

        let resource = match self.doc.get_resource(&image.source) {
            Some(resource) => resource.clone(),
            None => match ctx.resolve_image(&image.source) {
                Some(data) => Resource::from_data(data),
                None => {
                    ctx.warn(
                        WarningKind::Resource,
                        format!("image `{}` could not be resolved", image.source),
                    );
                    return None;
                }
            },
        };

        let extent = self.extent(&resource);
        if let Some(id) = self.by_source.get(&image.source) {
            return Some((id.clone(), extent));
        }

        let path = self.media_path(&image.source, &resource);
        let target = path.clone();
        let id = self.relationship_for(&image.source, || PartRelationship {
            id: String::new(),
            kind: REL_IMAGE,
            target,
            external: false,
        });
        self.media.push(MediaPart {
            path,
            data: resource.data,
        });
        Some((id, extent))
    }

    fn relationship_for(
        &mut self,
        source: &str,
        make: impl FnOnce() -> PartRelationship,
    ) -> String {
        if let Some(id) = self.by_source.get(source) {
            return id.clone();
        }
        // rId1 is the styles part.
        let id = format!("rId{}", self.rels.len() + 2);
        let mut rel = make();
        rel.id = id.clone();
        self.rels.push(rel);
        self.by_source.insert(source.to_string(), id.clone());
        id
    }

    /// Path under `word/` for an image part.
    ///
    /// Sources already of the form `media/<name>` keep their name.
    fn media_path(&mut self, source: &str, resource: &Resource) -> String {
        let keep = source
            .strip_prefix("media/")
            .filter(|name| !name.is_empty() && !name.contains('/') && name.contains('.'));
        let mut path = match keep {
            Some(_) => source.to_string(),
            None => format!("media/image{}.{}", self.media.len() + 1, self.extension(source, resource)),
        };
        let mut n = self.media.len() + 1;
        while self.used_paths.contains(&path) {
            n += 1;
            path = format!("media/image{}.{}", n, self.extension(source, resource));
        }
        self.used_paths.insert(path.clone());
        path
    }

    fn extension(&self, source: &str, resource: &Resource) -> String {
        match resource.extension() {
            "bin" => source
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or_else(|| "bin".to_string()),
            ext => ext.to_string(),
        }
    }

    /// Extent in EMU at 96 dpi, scaled down to the maximum width.
    fn extent(&self, resource: &Resource) -> (u64, u64) {
        let pixels = match (resource.width, resource.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => image_dimensions(&resource.data),
        };
        let Some((w, h)) = pixels.filter(|(w, h)| *w > 0 && *h > 0) else {
            return FALLBACK_EXTENT;
        };
        let cx = w as u64 * EMU_PER_PIXEL;
        let cy = h as u64 * EMU_PER_PIXEL;
        if cx > self.max_width_emu && self.max_width_emu > 0 {
            let scaled = (cy as f64 * self.max_width_emu as f64 / cx as f64).round() as u64;
            (self.max_width_emu, scaled.max(1))
        } else {
            (cx, cy)
        }
    }
}
