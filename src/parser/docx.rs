//! DOCX decoder.
//!
//! Reads the package parts with `zip`, builds element trees with the
//! [`xml`](super::xml) helper and walks `w:body` in document order.

use super::bibliography::{link_citations, ReferenceExtractor};
use super::options::ParseOptions;
use super::xml::{self, XmlElement};
use crate::context::{Context, WarningKind};
use crate::detect::Format;
use crate::error::{Error, Result};
use crate::model::inline::{self, Emphasis, Span};
use crate::model::{
    Block, Document, Metadata, Resource, Table, TableCell, TableRow, MAX_HEADING_LEVEL,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
const CORE_PART: &str = "docProps/core.xml";

/// DOCX decoder.
pub struct DocxParser {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    options: ParseOptions,
}

impl DocxParser {
    /// Open a DOCX package from bytes with default options.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    /// Open a DOCX package from bytes.
    pub fn from_bytes_with_options(data: &[u8], options: ParseOptions) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(data.to_vec())).map_err(|e| {
            Error::decode(Format::Docx, format!("not a DOCX container: {}", e))
        })?;
        Ok(Self { archive, options })
    }

    /// Decode the package into a document.
    pub fn parse(mut self, ctx: &mut Context) -> Result<Document> {
        let document_xml = self.read_part(DOCUMENT_PART)?.ok_or_else(|| {
            Error::decode(Format::Docx, format!("missing part {}", DOCUMENT_PART))
        })?;

        let styles = match self.read_part(STYLES_PART)? {
            Some(content) => StyleMap::parse(&content).unwrap_or_else(|e| {
                ctx.warn(
                    WarningKind::Degraded,
                    format!("{} is malformed ({}); paragraph styles ignored", STYLES_PART, e),
                );
                StyleMap::default()
            }),
            None => StyleMap::default(),
        };
        let rels = match self.read_part(RELS_PART)? {
            Some(content) => parse_relationships(&content)
                .map_err(|e| Error::decode(Format::Docx, format!("{}: {}", RELS_PART, e)))?,
            None => HashMap::new(),
        };

        let mut doc = Document::new();
        if let Some(content) = self.read_part(CORE_PART)? {
            read_core_properties(&content, &mut doc.metadata);
        }

        let root = xml::parse(&document_xml)
            .map_err(|e| Error::decode(Format::Docx, format!("{}: {}", DOCUMENT_PART, e)))?;
        let body = root
            .child("w:body")
            .ok_or_else(|| Error::decode(Format::Docx, "document has no w:body"))?;

        let mut walker = BodyWalker::new(&styles, &rels);
        walker.walk_container(body, &mut doc.blocks, false, ctx)?;
        if let Some(title) = walker.title {
            doc.metadata.title = Some(title);
        }

        if self.options.extract_resources {
            for (source, part) in walker.images {
                match self.read_binary(&part)? {
                    Some(data) => {
                        let filename = part.rsplit('/').next().unwrap_or(&part).to_string();
                        doc.add_resource(source, Resource::from_data(data).with_filename(filename));
                    }
                    None => ctx.warn(
                        WarningKind::Resource,
                        format!("image part {} is missing from the package", part),
                    ),
                }
            }
        }

        if self.options.extract_bibliography {
            let entries = ReferenceExtractor::new().extract_section(&mut doc.blocks, ctx);
            if self.options.link_citations {
                let linked = link_citations(&mut doc.blocks, &entries);
                log::debug!("linked {} in-text citations", linked);
            }
            doc.blocks
                .extend(entries.into_iter().map(Block::BibliographyEntry));
        }

        super::finish_document(&mut doc, &self.options);
        Ok(doc)
    }

    fn read_part(&mut self, name: &str) -> Result<Option<String>> {
        let Some(data) = self.read_binary(name)? else {
            return Ok(None);
        };
        String::from_utf8(data)
            .map(Some)
            .map_err(|_| Error::decode(Format::Docx, format!("{} is not valid UTF-8", name)))
    }

    fn read_binary(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(Error::decode(Format::Docx, format!("{}: {}", name, e))),
        };
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| Error::decode(Format::Docx, format!("{}: {}", name, e)))?;
        Ok(Some(data))
    }
}

/// A package relationship.
#[derive(Debug, Clone)]
struct Relationship {
    target: String,
    external: bool,
}

fn parse_relationships(content: &str) -> std::result::Result<HashMap<String, Relationship>, String> {
    let root = xml::parse(content)?;
    Ok(root
        .children_named("Relationship")
        .filter_map(|rel| {
            let id = rel.attr("Id")?;
            let target = rel.attr("Target")?;
            Some((
                id.to_string(),
                Relationship {
                    target: target.to_string(),
                    external: rel.attr("TargetMode") == Some("External"),
                },
            ))
        })
        .collect())
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_part_path(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{}/{}", base_dir, target),
    };
    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn read_core_properties(content: &str, metadata: &mut Metadata) {
    let root = match xml::parse(content) {
        Ok(root) => root,
        Err(e) => {
            log::debug!("ignoring malformed {}: {}", CORE_PART, e);
            return;
        }
    };
    let text = |name: &str| {
        root.child(name)
            .map(|e| e.text().trim().to_string())
            .filter(|t| !t.is_empty())
    };
    let date = |name: &str| {
        text(name).and_then(|t| match DateTime::parse_from_rfc3339(&t) {
            Ok(d) => Some(d.with_timezone(&Utc)),
            Err(e) => {
                log::debug!("ignoring unparseable {} `{}`: {}", name, t, e);
                None
            }
        })
    };
    metadata.title = text("dc:title");
    metadata.author = text("dc:creator");
    metadata.created = date("dcterms:created");
    metadata.modified = date("dcterms:modified");
}

/// Role a paragraph style plays in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParagraphKind {
    Heading(u8),
    Title,
    Caption,
    Body,
}

#[derive(Debug, Clone)]
struct StyleInfo {
    name: String,
    emphasis: Emphasis,
}

/// Style id to name and character formatting, from `word/styles.xml`.
#[derive(Debug, Default)]
struct StyleMap {
    styles: HashMap<String, StyleInfo>,
}

impl StyleMap {
    fn parse(content: &str) -> std::result::Result<Self, String> {
        let root = xml::parse(content)?;
        let styles = root
            .children_named("w:style")
            .filter_map(|style| {
                let id = style.attr("w:styleId")?;
                let name = style
                    .child("w:name")
                    .and_then(|n| n.attr("w:val"))
                    .unwrap_or(id)
                    .to_lowercase();
                let emphasis = style
                    .child("w:rPr")
                    .map(|rpr| run_properties(rpr, Emphasis::NONE))
                    .unwrap_or_default();
                Some((id.to_string(), StyleInfo { name, emphasis }))
            })
            .collect();
        Ok(Self { styles })
    }

    fn paragraph_kind(&self, id: Option<&str>) -> ParagraphKind {
        let Some(id) = id else {
            return ParagraphKind::Body;
        };
        let name = self
            .styles
            .get(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.to_lowercase());
        if let Some(level) = heading_level(&name).or_else(|| heading_level(id)) {
            return ParagraphKind::Heading(level);
        }
        match name.as_str() {
            "title" => ParagraphKind::Title,
            "caption" => ParagraphKind::Caption,
            _ => ParagraphKind::Body,
        }
    }

    fn character_emphasis(&self, id: &str) -> Emphasis {
        match self.styles.get(id) {
            Some(info) if !info.emphasis.is_plain() => info.emphasis,
            Some(info) => emphasis_for_style_name(&info.name),
            None => emphasis_for_style_name(&id.to_lowercase()),
        }
    }
}

fn emphasis_for_style_name(name: &str) -> Emphasis {
    match name {
        "strong" => Emphasis::NONE.with_bold(true),
        "emphasis" | "subtle emphasis" => Emphasis::NONE.with_italic(true),
        "intense emphasis" => Emphasis::NONE.with_bold(true).with_italic(true),
        _ => Emphasis::NONE,
    }
}

/// Heading level from a style name or id such as `heading 2` or `Heading2`.
fn heading_level(name: &str) -> Option<u8> {
    let lower = name.trim().to_ascii_lowercase();
    let level: u8 = lower.strip_prefix("heading")?.trim().parse().ok()?;
    (level >= 1).then(|| level.min(MAX_HEADING_LEVEL))
}

/// Toggle properties are on unless `w:val` says otherwise.
fn is_on(element: &XmlElement) -> bool {
    !matches!(
        element.attr("w:val"),
        Some("0" | "false" | "off" | "none")
    )
}

fn run_properties(rpr: &XmlElement, base: Emphasis) -> Emphasis {
    let mut emphasis = base;
    if let Some(b) = rpr.child("w:b") {
        emphasis.bold = is_on(b);
    }
    if let Some(i) = rpr.child("w:i") {
        emphasis.italic = is_on(i);
    }
    emphasis
}

/// Inline content of a paragraph before it is split around images.
enum Piece {
    Span(Span),
    Image(String),
}

struct BodyWalker<'a> {
    styles: &'a StyleMap,
    rels: &'a HashMap<String, Relationship>,
    /// Image source to package part, in first-use order by name
    images: BTreeMap<String, String>,
    title: Option<String>,
    warned_lists: bool,
    warned_nested: bool,
}

impl<'a> BodyWalker<'a> {
    fn new(styles: &'a StyleMap, rels: &'a HashMap<String, Relationship>) -> Self {
        Self {
            styles,
            rels,
            images: BTreeMap::new(),
            title: None,
            warned_lists: false,
            warned_nested: false,
        }
    }

    fn walk_container(
        &mut self,
        container: &XmlElement,
        out: &mut Vec<Block>,
        in_cell: bool,
        ctx: &mut Context,
    ) -> Result<()> {
        for child in container.elements() {
            if !in_cell {
                ctx.checkpoint()?;
            }
            match child.name.as_str() {
                "w:p" => self.walk_paragraph(child, out, ctx),
                "w:tbl" => self.walk_table(child, out, in_cell, ctx)?,
                "w:sdt" => {
                    if let Some(content) = child.child("w:sdtContent") {
                        self.walk_container(content, out, in_cell, ctx)?;
                    }
                }
                "w:customXml" | "w:ins" | "w:moveTo" => {
                    self.walk_container(child, out, in_cell, ctx)?
                }
                "w:altChunk" => ctx.warn(
                    WarningKind::DroppedObject,
                    "imported document chunk (w:altChunk) dropped",
                ),
                _ => {}
            }
        }
        Ok(())
    }

    fn walk_paragraph(&mut self, p: &XmlElement, out: &mut Vec<Block>, ctx: &mut Context) {
        let props = p.child("w:pPr");
        let style = props
            .and_then(|pr| pr.child("w:pStyle"))
            .and_then(|s| s.attr("w:val"));
        let kind = self.styles.paragraph_kind(style);

        if props.and_then(|pr| pr.child("w:numPr")).is_some() && !self.warned_lists {
            ctx.warn(
                WarningKind::Degraded,
                "list formatting is not represented; list items kept as paragraphs",
            );
            self.warned_lists = true;
        }

        let mut pieces = Vec::new();
        self.collect_inline(p, &mut pieces, ctx);

        let (spans, images): (Vec<Span>, Vec<String>) = match kind {
            ParagraphKind::Body => {
                self.emit_body(pieces, out);
                return;
            }
            _ => split_pieces(pieces),
        };

        let blank = inline::spans_are_blank(&spans);
        match kind {
            ParagraphKind::Heading(level) if !blank => {
                out.push(Block::heading(level, inline::group(spans)));
            }
            ParagraphKind::Title if !blank => {
                let title = inline::group(spans);
                self.title = Some(inline::plain_text(&title).trim().to_string());
            }
            ParagraphKind::Caption if !blank => match out.last_mut() {
                Some(Block::Image(img)) if img.caption.is_none() => {
                    img.caption = Some(inline::group(spans));
                }
                _ => out.push(Block::paragraph(inline::group(spans))),
            },
            _ => {}
        }
        out.extend(images.into_iter().map(Block::image));
    }

    /// Split a body paragraph into paragraph and image blocks.
    fn emit_body(&mut self, pieces: Vec<Piece>, out: &mut Vec<Block>) {
        let mut spans = Vec::new();
        for piece in pieces {
            match piece {
                Piece::Span(span) => spans.push(span),
                Piece::Image(source) => {
                    flush_spans(&mut spans, out);
                    out.push(Block::image(source));
                }
            }
        }
        flush_spans(&mut spans, out);
    }

    fn collect_inline(&mut self, element: &XmlElement, pieces: &mut Vec<Piece>, ctx: &mut Context) {
        for child in element.elements() {
            match child.name.as_str() {
                "w:r" => self.collect_run(child, pieces, ctx),
                "w:hyperlink" | "w:smartTag" | "w:ins" | "w:moveTo" | "w:fldSimple"
                | "w:customXml" | "w:bdo" | "w:dir" => self.collect_inline(child, pieces, ctx),
                "w:sdt" => {
                    if let Some(content) = child.child("w:sdtContent") {
                        self.collect_inline(content, pieces, ctx);
                    }
                }
                "m:oMath" | "m:oMathPara" => {
                    ctx.warn(
                        WarningKind::UnsupportedConstruct,
                        "equation kept as plain text",
                    );
                    pieces.push(Piece::Span(Span::Text(child.text(), Emphasis::NONE)));
                }
                // Deletions, bookmarks, proofing marks and paragraph properties
                // carry no content.
                _ => {}
            }
        }
    }

    fn collect_run(&mut self, run: &XmlElement, pieces: &mut Vec<Piece>, ctx: &mut Context) {
        let emphasis = self.run_emphasis(run);
        let push_text = |pieces: &mut Vec<Piece>, text: String| {
            pieces.push(Piece::Span(Span::Text(text, emphasis)));
        };

        for child in run.elements() {
            match child.name.as_str() {
                "w:t" => push_text(pieces, child.text()),
                "w:tab" | "w:ptab" => push_text(pieces, "\t".to_string()),
                "w:br" => {
                    if !matches!(child.attr("w:type"), Some("page" | "column")) {
                        push_text(pieces, "\n".to_string());
                    }
                }
                "w:cr" => push_text(pieces, "\n".to_string()),
                "w:noBreakHyphen" => push_text(pieces, "-".to_string()),
                "w:drawing" => self.collect_drawing(child, pieces, ctx),
                "w:pict" => self.collect_vml(child, pieces, ctx),
                "mc:AlternateContent" => self.collect_alternate(child, pieces, ctx),
                "w:object" => ctx.warn(
                    WarningKind::DroppedObject,
                    "embedded OLE object dropped",
                ),
                "w:footnoteReference" | "w:endnoteReference" => ctx.warn(
                    WarningKind::DroppedObject,
                    "footnote reference dropped",
                ),
                _ => {}
            }
        }
    }

    fn run_emphasis(&self, run: &XmlElement) -> Emphasis {
        let Some(rpr) = run.child("w:rPr") else {
            return Emphasis::NONE;
        };
        let base = rpr
            .child("w:rStyle")
            .and_then(|s| s.attr("w:val"))
            .map(|id| self.styles.character_emphasis(id))
            .unwrap_or_default();
        run_properties(rpr, base)
    }

    fn collect_drawing(&mut self, drawing: &XmlElement, pieces: &mut Vec<Piece>, ctx: &mut Context) {
        let rel_id = drawing
            .find("a:blip")
            .and_then(|blip| blip.attr("r:embed").or_else(|| blip.attr("r:link")));
        match rel_id {
            Some(id) => {
                if let Some(source) = self.image_source(id, ctx) {
                    pieces.push(Piece::Image(source));
                }
            }
            None => ctx.warn(
                WarningKind::DroppedObject,
                "drawing without a picture (shape or chart) dropped",
            ),
        }
    }

    fn collect_vml(&mut self, pict: &XmlElement, pieces: &mut Vec<Piece>, ctx: &mut Context) {
        match pict.find("v:imagedata").and_then(|d| d.attr("r:id")) {
            Some(id) => {
                if let Some(source) = self.image_source(id, ctx) {
                    pieces.push(Piece::Image(source));
                }
            }
            None => ctx.warn(WarningKind::DroppedObject, "VML shape dropped"),
        }
    }

    fn collect_alternate(&mut self, alt: &XmlElement, pieces: &mut Vec<Piece>, ctx: &mut Context) {
        if let Some(choice) = alt.child("mc:Choice").filter(|c| c.find("a:blip").is_some()) {
            self.collect_drawing(choice, pieces, ctx);
        } else if let Some(fallback) = alt.child("mc:Fallback") {
            self.collect_vml(fallback, pieces, ctx);
        } else {
            ctx.warn(WarningKind::DroppedObject, "alternate content dropped");
        }
    }

    /// Map a relationship id to an image source handle.
    fn image_source(&mut self, id: &str, ctx: &mut Context) -> Option<String> {
        let Some(rel) = self.rels.get(id) else {
            ctx.warn(
                WarningKind::Resource,
                format!("image relationship `{}` not found", id),
            );
            return None;
        };
        if rel.external {
            return Some(rel.target.clone());
        }
        let part = resolve_part_path("word", &rel.target);
        let source = part.strip_prefix("word/").unwrap_or(&part).to_string();
        self.images.insert(source.clone(), part);
        Some(source)
    }

    fn walk_table(
        &mut self,
        tbl: &XmlElement,
        out: &mut Vec<Block>,
        in_cell: bool,
        ctx: &mut Context,
    ) -> Result<()> {
        if in_cell {
            if !self.warned_nested {
                ctx.warn(
                    WarningKind::Degraded,
                    "nested table flattened into its enclosing cell",
                );
                self.warned_nested = true;
            }
            for tc in tbl.children_named("w:tr").flat_map(|tr| tr.children_named("w:tc")) {
                self.walk_container(tc, out, true, ctx)?;
            }
            return Ok(());
        }

        let mut table = Table::new();
        for tr in tbl.children_named("w:tr") {
            let mut row = TableRow::default();
            for tc in tr.children_named("w:tc") {
                let mut blocks = Vec::new();
                self.walk_container(tc, &mut blocks, true, ctx)?;
                row.cells.push(TableCell::new(blocks));

                let span = tc
                    .child("w:tcPr")
                    .and_then(|pr| pr.child("w:gridSpan"))
                    .and_then(|g| g.attr("w:val"))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(1);
                row.cells
                    .extend((1..span).map(|_| TableCell::empty()));
            }
            table.add_row(row);
        }
        if !table.is_empty() {
            table.pad();
            out.push(Block::Table(table));
        }
        Ok(())
    }
}

fn split_pieces(pieces: Vec<Piece>) -> (Vec<Span>, Vec<String>) {
    let mut spans = Vec::new();
    let mut images = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Span(span) => spans.push(span),
            Piece::Image(source) => images.push(source),
        }
    }
    (spans, images)
}

fn flush_spans(spans: &mut Vec<Span>, out: &mut Vec<Block>) {
    if spans.is_empty() {
        return;
    }
    let taken = std::mem::take(spans);
    if !inline::spans_are_blank(&taken) {
        out.push(Block::paragraph(inline::group(taken)));
    }
}
