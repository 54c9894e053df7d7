//! LaTeX decoder.
//!
//! A recursive-descent parser over the [`lexer`] token stream. Content is
//! collected into frames: the current frame holds finished blocks and the
//! spans of the paragraph being built. Floats, table cells and command
//! arguments push a fresh frame and pop it when they close.

mod lexer;

use self::lexer::{tokenize, Token, TokenKind};
use super::bibliography::{link_citations, ReferenceExtractor};
use super::options::ParseOptions;
use crate::context::{Context, WarningKind};
use crate::detect::Format;
use crate::error::{Error, Result};
use crate::model::inline::{self, Emphasis, Span};
use crate::model::{BibliographyEntry, Block, Document, Inline, Metadata, Table, TableCell, TableRow};
use std::mem;
use std::ops::Range;

/// Deepest nesting of groups, environments and command arguments. Each
/// level recurses through the parser, so deeper input is refused (or
/// flattened to literal source in lenient mode).
pub const MAX_NESTING: usize = 64;

/// LaTeX decoder.
pub struct LatexParser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    options: ParseOptions,
    current: Frame,
    stack: Vec<Frame>,
    floats: Vec<Float>,
    cell_depth: usize,
    depth: usize,
    depth_warned: bool,
    metadata: Metadata,
    extractor: ReferenceExtractor,
    entries: Vec<BibliographyEntry>,
    in_preamble: bool,
    finished: bool,
    list_warned: bool,
}

#[derive(Debug, Default)]
struct Frame {
    blocks: Vec<Block>,
    spans: Vec<Span>,
}

impl Frame {
    fn is_blank(&self) -> bool {
        self.blocks.is_empty() && inline::spans_are_blank(&self.spans)
    }
}

#[derive(Debug, Default)]
struct Float {
    caption: Option<Vec<Inline>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FloatKind {
    Figure,
    Table,
}

/// What closes the construct being parsed.
#[derive(Debug, Clone, Copy)]
enum Until<'e> {
    Eof,
    Group(usize),
    Env(&'e str, usize),
}

impl<'a> LatexParser<'a> {
    /// Create a parser with default options.
    pub fn new(source: &'a str) -> Result<Self> {
        Self::with_options(source, ParseOptions::default())
    }

    /// Create a parser.
    ///
    /// Tokenizing happens here, so unterminated math is reported before
    /// parsing starts.
    pub fn with_options(source: &'a str, options: ParseOptions) -> Result<Self> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        let tokens = tokenize(source, options.is_lenient()).map_err(|e| {
            Error::decode(Format::Latex, format!("line {}: {}", e.line, e.message))
        })?;
        log::debug!("tokenized {} bytes into {} tokens", source.len(), tokens.len());

        Ok(Self {
            source,
            tokens,
            pos: 0,
            options,
            current: Frame::default(),
            stack: Vec::new(),
            floats: Vec::new(),
            cell_depth: 0,
            depth: 0,
            depth_warned: false,
            metadata: Metadata::default(),
            extractor: ReferenceExtractor::new(),
            entries: Vec::new(),
            in_preamble: false,
            finished: false,
            list_warned: false,
        })
    }

    /// Create a parser from UTF-8 bytes.
    pub fn from_bytes(data: &'a [u8], options: ParseOptions) -> Result<Self> {
        let source = std::str::from_utf8(data).map_err(|e| {
            Error::decode(Format::Latex, format!("input is not valid UTF-8: {}", e))
        })?;
        Self::with_options(source, options)
    }

    /// Decode the source into a document.
    pub fn parse(mut self, ctx: &mut Context) -> Result<Document> {
        self.in_preamble = self.has_document_environment();
        self.parse_until(Until::Eof, Emphasis::NONE, ctx)?;
        self.flush_paragraph();

        let mut doc = Document::new();
        doc.metadata = mem::take(&mut self.metadata);
        doc.blocks = mem::take(&mut self.current.blocks);

        if self.options.extract_bibliography {
            let mut entries = mem::take(&mut self.entries);
            if entries.is_empty() {
                entries = self.extractor.extract_section(&mut doc.blocks, ctx);
            }
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

    fn has_document_environment(&self) -> bool {
        self.tokens.windows(4).any(|w| {
            matches!(&w[0].kind, TokenKind::Command(c) if c == "begin")
                && w[1].kind == TokenKind::BeginGroup
                && matches!(&w[2].kind, TokenKind::Text(t) if t == "document")
                && w[3].kind == TokenKind::EndGroup
        })
    }

    // ---- main loop ----

    fn parse_until(&mut self, until: Until<'_>, style: Emphasis, ctx: &mut Context) -> Result<()> {
        let mut style = style;
        while let Some(Token { kind, span, line }) = self.next_token() {
            ctx.checkpoint()?;
            match kind {
                TokenKind::EndGroup => match until {
                    Until::Group(_) => return Ok(()),
                    _ => self.stray_close(line, ctx)?,
                },
                TokenKind::Command(name) if name == "end" => {
                    let env = self.environment_name(line, ctx)?;
                    match until {
                        Until::Env(open, _) if open == env => return Ok(()),
                        Until::Eof if env == "document" => {
                            self.finished = true;
                            return Ok(());
                        }
                        _ => self.mismatched_end(&env, line, ctx)?,
                    }
                }
                kind => self.dispatch(Token { kind, span, line }, &mut style, ctx)?,
            }
            if self.finished {
                return Ok(());
            }
        }

        match until {
            Until::Eof => Ok(()),
            Until::Group(line) => self.unterminated("group", line, ctx),
            Until::Env(name, line) => {
                self.unterminated(&format!("environment `{}`", name), line, ctx)
            }
        }
    }

    fn dispatch(&mut self, token: Token, style: &mut Emphasis, ctx: &mut Context) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return self.too_deep(token, *style, ctx);
        }
        self.depth += 1;
        let result = self.dispatch_token(token, style, ctx);
        self.depth -= 1;
        result
    }

    fn dispatch_token(
        &mut self,
        token: Token,
        style: &mut Emphasis,
        ctx: &mut Context,
    ) -> Result<()> {
        match token.kind {
            TokenKind::Command(name) => self.command(&name, token.span, token.line, style, ctx)?,
            TokenKind::Symbol(c) => self.symbol(c, *style, ctx)?,
            TokenKind::BeginGroup => self.parse_until(Until::Group(token.line), *style, ctx)?,
            TokenKind::EndGroup => self.stray_close(token.line, ctx)?,
            TokenKind::Text(text) if text == "\\" => {
                self.note(
                    ctx,
                    WarningKind::Degraded,
                    format!("line {}: trailing `\\` kept as text", token.line),
                );
                self.push_text(&text, *style);
            }
            TokenKind::Text(text) => self.push_text(&text, *style),
            TokenKind::Space => self.push_space(*style),
            TokenKind::ParBreak => self.flush_paragraph(),
            TokenKind::Tie => self.push_text("\u{a0}", *style),
            TokenKind::Alignment => {
                self.note(ctx, WarningKind::UnsupportedConstruct, "`&` outside a table kept as text");
                self.push_text("&", *style);
            }
            TokenKind::Math(raw) => {
                let raw = literal(&raw);
                self.note(
                    ctx,
                    WarningKind::UnsupportedConstruct,
                    format!("math `{}` kept as literal source", raw),
                );
                self.push_text(&raw, *style);
            }
        }
        Ok(())
    }

    /// Handle a token past [`MAX_NESTING`] without recursing further.
    fn too_deep(&mut self, token: Token, style: Emphasis, ctx: &mut Context) -> Result<()> {
        if !self.options.is_lenient() {
            return Err(Error::decode(
                Format::Latex,
                format!("line {}: nesting deeper than {} levels", token.line, MAX_NESTING),
            ));
        }
        if !self.depth_warned {
            self.depth_warned = true;
            ctx.warn(
                WarningKind::Degraded,
                format!(
                    "line {}: content nested deeper than {} levels kept as literal source",
                    token.line, MAX_NESTING
                ),
            );
        }

        let end = match &token.kind {
            TokenKind::Text(text) => {
                self.push_text(text, style);
                return Ok(());
            }
            TokenKind::Space => {
                self.push_space(style);
                return Ok(());
            }
            TokenKind::ParBreak => {
                self.flush_paragraph();
                return Ok(());
            }
            TokenKind::Command(name) if name == "begin" => {
                let name = self.environment_name(token.line, ctx)?;
                return self.raw_environment(&name, token.span.start, token.line, ctx);
            }
            TokenKind::BeginGroup => match self.matching_group_end(self.pos - 1) {
                Some(close) => {
                    self.pos = close + 1;
                    self.tokens[close].span.end
                }
                None => {
                    self.pos = self.tokens.len();
                    self.source.len()
                }
            },
            _ => token.span.end,
        };
        let raw = literal(&self.source[token.span.start..end]);
        self.push_text(&raw, style);
        Ok(())
    }

    fn command(
        &mut self,
        name: &str,
        span: Range<usize>,
        line: usize,
        style: &mut Emphasis,
        ctx: &mut Context,
    ) -> Result<()> {
        if let Some(level) = heading_level(name) {
            return self.heading(name, level, line, ctx);
        }
        if let Some(text) = symbol_text(name) {
            self.eat_empty_group();
            self.push_text(text, *style);
            return Ok(());
        }
        if let Some(mark) = accent_mark(name) {
            return self.accent(mark, *style, ctx);
        }
        if let Some((optional, required)) = layout_arguments(name) {
            return self.skip_arguments(optional, required, ctx);
        }

        match name {
            "begin" => self.begin_environment(span.start, line, *style, ctx)?,
            "title" | "author" | "date" => self.metadata_field(name, ctx)?,
            "textbf" => self.styled_argument(style.with_bold(true), ctx)?,
            "textit" | "emph" | "textsl" => self.styled_argument(style.with_italic(true), ctx)?,
            "textmd" => self.styled_argument(style.with_bold(false), ctx)?,
            "textup" => self.styled_argument(style.with_italic(false), ctx)?,
            "textnormal" => self.styled_argument(Emphasis::NONE, ctx)?,
            "texttt" | "textrm" | "textsf" | "textsc" | "underline" | "uline" | "mbox"
            | "fbox" | "hbox" | "text" | "textsuperscript" | "textsubscript" => {
                self.styled_argument(*style, ctx)?
            }
            "bfseries" | "bf" => *style = style.with_bold(true),
            "itshape" | "it" | "em" | "slshape" | "sl" => *style = style.with_italic(true),
            "mdseries" => *style = style.with_bold(false),
            "upshape" => *style = style.with_italic(false),
            "normalfont" | "rm" => *style = Emphasis::NONE,
            "href" => {
                self.read_group(ctx)?;
                self.styled_argument(*style, ctx)?;
            }
            "url" | "nolinkurl" => {
                if let Some(url) = self.read_group(ctx)? {
                    self.push_text(url.trim(), *style);
                }
            }
            "verb" => self.verbatim(span.end, *style),
            "cite" | "citep" | "citet" | "parencite" | "textcite" | "autocite" | "citealp"
            | "citealt" | "citeauthor" | "citeyear" | "nocite" => self.citation(*style, ctx)?,
            "includegraphics" => self.include_graphics(ctx)?,
            "caption" => self.caption(ctx)?,
            "item" => {
                self.flush_paragraph();
                if let Some(label) = self.read_optional() {
                    self.push_text(&literal(&label), *style);
                    self.push_space(*style);
                }
            }
            "bibitem" => {
                self.flush_paragraph();
                self.read_optional();
                match self.read_group(ctx)? {
                    Some(key) if !key.trim().is_empty() => {
                        self.push_text(&format!("[{}] ", key.trim()), *style)
                    }
                    _ => self.note(
                        ctx,
                        WarningKind::Degraded,
                        format!("line {}: \\bibitem without a key", line),
                    ),
                }
            }
            "par" => self.flush_paragraph(),
            "newline" | "linebreak" => {
                self.read_optional();
                self.push_space(*style);
            }
            "footnote" | "footnotetext" | "marginpar" => {
                self.read_optional();
                self.note(
                    ctx,
                    WarningKind::Degraded,
                    format!("\\{} kept inline in parentheses", name),
                );
                self.push_space(*style);
                self.push_text("(", *style);
                self.styled_argument(*style, ctx)?;
                self.push_text(")", *style);
            }
            "bibliography" | "addbibresource" => {
                let file = self.read_group(ctx)?.unwrap_or_default();
                self.note(
                    ctx,
                    WarningKind::UnsupportedConstruct,
                    format!("external bibliography `{}` is not read", file.trim()),
                );
            }
            "and" => {
                self.trim_trailing_space();
                self.push_text(", ", *style);
            }
            _ => self.unknown_command(name, span, *style, ctx)?,
        }
        Ok(())
    }

    fn symbol(&mut self, c: char, style: Emphasis, ctx: &mut Context) -> Result<()> {
        match c {
            '\\' => {
                self.eat_star();
                self.read_optional();
                self.push_space(style);
            }
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => self.push_text(&c.to_string(), style),
            ' ' | '\n' | '\t' | '\r' | ',' | ';' | ':' | '>' => self.push_space(style),
            '-' | '/' | '@' | '!' => {}
            _ => match accent_symbol(c) {
                Some(mark) => self.accent(mark, style, ctx)?,
                None => {
                    self.note(
                        ctx,
                        WarningKind::UnsupportedConstruct,
                        format!("unknown control symbol \\{} kept as text", c),
                    );
                    self.push_text(&format!("\\{}", c), style);
                }
            },
        }
        Ok(())
    }

    // ---- commands ----

    fn heading(&mut self, name: &str, level: u8, line: usize, ctx: &mut Context) -> Result<()> {
        self.eat_star();
        self.read_optional();
        let spans = self.argument_spans(ctx)?;
        if inline::spans_are_blank(&spans) {
            self.note(
                ctx,
                WarningKind::Degraded,
                format!("line {}: \\{} without a title dropped", line, name),
            );
            return Ok(());
        }
        self.push_block(Block::heading(level, inline::group(spans)));
        Ok(())
    }

    fn metadata_field(&mut self, name: &str, ctx: &mut Context) -> Result<()> {
        self.read_optional();
        let spans = self.argument_spans(ctx)?;
        let text = inline::plain_text(&inline::group(spans));
        let value = Some(text.trim().to_string()).filter(|t| !t.is_empty());
        match name {
            "title" => self.metadata.title = value,
            "author" => self.metadata.author = value,
            _ => self.metadata.date = value,
        }
        Ok(())
    }

    fn citation(&mut self, style: Emphasis, ctx: &mut Context) -> Result<()> {
        self.eat_star();
        self.read_optional();
        self.read_optional();
        if let Some(keys) = self.read_group(ctx)? {
            for key in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                self.current
                    .spans
                    .push(Span::Citation(key.to_string(), style));
            }
        }
        Ok(())
    }

    fn include_graphics(&mut self, ctx: &mut Context) -> Result<()> {
        self.eat_star();
        self.read_optional();
        self.read_optional();
        match self.read_group(ctx)? {
            Some(path) if !path.trim().is_empty() => {
                self.push_block(Block::image(path.trim()));
            }
            _ => self.note(
                ctx,
                WarningKind::DroppedObject,
                "\\includegraphics without a path dropped",
            ),
        }
        Ok(())
    }

    fn caption(&mut self, ctx: &mut Context) -> Result<()> {
        self.eat_star();
        self.read_optional();
        let content = inline::group(self.argument_spans(ctx)?);
        match self.floats.last_mut() {
            Some(float) => float.caption = Some(content),
            None => {
                self.note(ctx, WarningKind::Degraded, "caption outside a float kept as a paragraph");
                self.push_block(Block::paragraph(content));
            }
        }
        Ok(())
    }

    fn accent(&mut self, mark: char, style: Emphasis, ctx: &mut Context) -> Result<()> {
        let base = if self.peek_kind() == Some(&TokenKind::BeginGroup) {
            self.read_group(ctx)?.unwrap_or_default()
        } else {
            self.take_char().map(String::from).unwrap_or_default()
        };
        let base = match base.trim() {
            "\\i" => "i".to_string(),
            "\\j" => "j".to_string(),
            other => other.to_string(),
        };
        let mut chars = base.chars();
        let mut text = String::new();
        if let Some(first) = chars.next() {
            text.push(first);
        }
        text.push(mark);
        text.extend(chars);
        self.push_text(&text, style);
        Ok(())
    }

    /// `\verb|text|`: the delimiter is the character right after the name.
    fn verbatim(&mut self, offset: usize, style: Emphasis) {
        let rest = &self.source[offset..];
        let Some(delimiter) = rest.chars().next() else {
            return;
        };
        let body_start = offset + delimiter.len_utf8();
        let Some(length) = self.source[body_start..].find(delimiter) else {
            self.push_text("\\verb", style);
            return;
        };
        let end = body_start + length + delimiter.len_utf8();
        let body = self.source[body_start..body_start + length].to_string();
        while self.tokens.get(self.pos).is_some_and(|t| t.span.start < end) {
            self.pos += 1;
        }
        self.push_text(&body, style);
    }

    fn unknown_command(
        &mut self,
        name: &str,
        span: Range<usize>,
        style: Emphasis,
        ctx: &mut Context,
    ) -> Result<()> {
        let mut end = span.end;
        loop {
            let open = self.pos;
            let close = match self.peek_kind() {
                Some(TokenKind::BeginGroup) => self.matching_group_end(open),
                Some(TokenKind::Text(t)) if t == "[" => self.matching_bracket(open),
                _ => None,
            };
            let Some(close) = close else { break };
            end = self.tokens[close].span.end;
            self.pos = close + 1;
        }

        self.note(
            ctx,
            WarningKind::UnsupportedConstruct,
            format!("unknown command \\{} kept as literal text", name),
        );
        let raw = literal(&self.source[span.start..end]);
        self.push_text(&raw, style);
        // The lexer ate the spaces after a bare control word.
        if end == span.end && self.source[end..].starts_with(|c: char| c == ' ' || c == '\t') {
            self.push_space(style);
        }
        Ok(())
    }

    // ---- environments ----

    fn begin_environment(
        &mut self,
        start: usize,
        line: usize,
        style: Emphasis,
        ctx: &mut Context,
    ) -> Result<()> {
        let name = self.environment_name(line, ctx)?;
        match name.as_str() {
            "document" => {
                self.in_preamble = false;
                self.current = Frame::default();
                self.parse_until(Until::Env("document", line), Emphasis::NONE, ctx)?;
                self.finished = true;
            }
            _ if self.in_preamble || name.is_empty() => {
                self.raw_environment(&name, start, line, ctx)?
            }
            "tabular" | "tabular*" | "tabularx" | "tabulary" => {
                let table = self.tabular(&name, line, ctx)?;
                self.push_table(table, ctx);
            }
            "longtable" | "longtable*" => {
                self.floats.push(Float::default());
                let table = self.tabular(&name, line, ctx);
                let caption = self.floats.pop().and_then(|f| f.caption);
                let mut blocks = vec![Block::Table(table?)];
                attach_caption(&mut blocks, caption, FloatKind::Table, ctx);
                self.emit_blocks(blocks, ctx);
            }
            "table" | "table*" => self.float(&name, FloatKind::Table, line, ctx)?,
            "figure" | "figure*" | "wrapfigure" => {
                self.float(&name, FloatKind::Figure, line, ctx)?
            }
            "thebibliography" if self.options.extract_bibliography => {
                self.bibliography_environment(line, ctx)?
            }
            "thebibliography" => {
                self.read_group(ctx)?;
                self.transparent_environment(&name, line, style, ctx)?;
            }
            "itemize" | "enumerate" | "description" => {
                if !self.list_warned {
                    self.list_warned = true;
                    ctx.warn(WarningKind::Degraded, "lists are kept as one paragraph per item");
                }
                self.transparent_environment(&name, line, style, ctx)?;
            }
            "minipage" => {
                self.read_optional();
                self.read_optional();
                self.read_optional();
                self.read_group(ctx)?;
                self.transparent_environment(&name, line, style, ctx)?;
            }
            "multicols" | "multicols*" => {
                self.read_group(ctx)?;
                self.transparent_environment(&name, line, style, ctx)?;
            }
            "center" | "flushleft" | "flushright" | "quote" | "quotation" | "verse" | "abstract"
            | "small" | "footnotesize" | "landscape" | "singlespace" | "onehalfspace"
            | "doublespace" => self.transparent_environment(&name, line, style, ctx)?,
            _ => self.raw_environment(&name, start, line, ctx)?,
        }
        Ok(())
    }

    fn transparent_environment(
        &mut self,
        name: &str,
        line: usize,
        style: Emphasis,
        ctx: &mut Context,
    ) -> Result<()> {
        self.flush_paragraph();
        self.parse_until(Until::Env(name, line), style, ctx)?;
        self.flush_paragraph();
        Ok(())
    }

    fn raw_environment(
        &mut self,
        name: &str,
        start: usize,
        line: usize,
        ctx: &mut Context,
    ) -> Result<()> {
        let end = match self.find_environment_end(name) {
            Some((index, offset)) => {
                self.pos = index;
                offset
            }
            None => {
                self.unterminated(&format!("environment `{}`", name), line, ctx)?;
                self.pos = self.tokens.len();
                self.source.len()
            }
        };
        if self.in_preamble {
            return Ok(());
        }
        self.note(
            ctx,
            WarningKind::UnsupportedConstruct,
            format!("environment `{}` kept as literal source", name),
        );
        let raw = literal(&self.source[start..end]);
        self.push_block(Block::paragraph(vec![Inline::text(raw)]));
        Ok(())
    }

    fn float(&mut self, name: &str, kind: FloatKind, line: usize, ctx: &mut Context) -> Result<()> {
        self.read_optional();
        if name == "wrapfigure" {
            self.read_group(ctx)?;
            self.read_optional();
            self.read_group(ctx)?;
        }
        self.flush_paragraph();
        self.floats.push(Float::default());
        self.push_frame();
        let result = self.parse_until(Until::Env(name, line), Emphasis::NONE, ctx);
        self.flush_paragraph();
        let frame = self.pop_frame();
        let caption = self.floats.pop().and_then(|f| f.caption);
        result?;

        let mut blocks = frame.blocks;
        attach_caption(&mut blocks, caption, kind, ctx);
        self.emit_blocks(blocks, ctx);
        Ok(())
    }

    fn emit_blocks(&mut self, blocks: Vec<Block>, ctx: &mut Context) {
        for block in blocks {
            match block {
                Block::Table(table) => self.push_table(table, ctx),
                block => self.push_block(block),
            }
        }
    }

    fn tabular(&mut self, name: &str, line: usize, ctx: &mut Context) -> Result<Table> {
        if matches!(name, "tabular*" | "tabularx" | "tabulary") {
            self.read_group(ctx)?;
        }
        self.read_optional();
        self.read_group(ctx)?;

        self.push_frame();
        self.cell_depth += 1;
        let result = self.table_rows(name, line, ctx);
        self.cell_depth -= 1;
        self.pop_frame();

        let mut table = Table::from_rows(result?);
        let padded = table.pad();
        if padded > 0 {
            log::debug!("padded ragged table with {} empty cells", padded);
        }
        Ok(table)
    }

    fn table_rows(&mut self, name: &str, line: usize, ctx: &mut Context) -> Result<Vec<TableRow>> {
        let mut rows = Vec::new();
        let mut cells = Vec::new();
        let mut span = 0usize;
        let mut style = Emphasis::NONE;

        loop {
            ctx.checkpoint()?;
            let Some(Token { kind, span: range, line: token_line }) = self.next_token() else {
                self.unterminated(&format!("environment `{}`", name), line, ctx)?;
                if !cells.is_empty() || !self.current.is_blank() {
                    self.finish_row(&mut rows, &mut cells, &mut span);
                }
                break;
            };
            match kind {
                TokenKind::Alignment => {
                    self.finish_cell(&mut cells, &mut span);
                    style = Emphasis::NONE;
                }
                TokenKind::Symbol('\\') => {
                    self.eat_star();
                    self.read_optional();
                    self.finish_row(&mut rows, &mut cells, &mut span);
                    style = Emphasis::NONE;
                }
                TokenKind::ParBreak => {}
                TokenKind::Command(c) => match c.as_str() {
                    "end" => {
                        let env = self.environment_name(token_line, ctx)?;
                        if env == name {
                            if !cells.is_empty() || !self.current.is_blank() {
                                self.finish_row(&mut rows, &mut cells, &mut span);
                            }
                            break;
                        }
                        self.mismatched_end(&env, token_line, ctx)?;
                    }
                    "tabularnewline" => {
                        self.finish_row(&mut rows, &mut cells, &mut span);
                        style = Emphasis::NONE;
                    }
                    "newline" => self.flush_paragraph(),
                    "multicolumn" => {
                        let columns = self
                            .read_group(ctx)?
                            .and_then(|n| n.trim().parse::<usize>().ok())
                            .unwrap_or(1);
                        self.read_group(ctx)?;
                        self.styled_argument(style, ctx)?;
                        span += columns.saturating_sub(1);
                    }
                    "hline" | "toprule" | "midrule" | "bottomrule" | "cline" | "cmidrule"
                    | "specialrule" | "addlinespace" | "hhline" | "morecmidrules" | "endhead"
                    | "endfirsthead" | "endfoot" | "endlastfoot" => self.skip_rule(&c, ctx)?,
                    _ => self.command(&c, range, token_line, &mut style, ctx)?,
                },
                kind => self.dispatch(
                    Token {
                        kind,
                        span: range,
                        line: token_line,
                    },
                    &mut style,
                    ctx,
                )?,
            }
        }
        Ok(rows)
    }

    fn skip_rule(&mut self, name: &str, ctx: &mut Context) -> Result<()> {
        self.read_optional();
        if name == "cmidrule" {
            if let Some(TokenKind::Text(t)) = self.peek_kind() {
                if t.starts_with('(') {
                    self.pos += 1;
                }
            }
        }
        let groups = match name {
            "cline" | "cmidrule" | "hhline" => 1,
            "specialrule" => 3,
            _ => 0,
        };
        for _ in 0..groups {
            self.read_group(ctx)?;
        }
        Ok(())
    }

    fn finish_cell(&mut self, cells: &mut Vec<TableCell>, span: &mut usize) {
        self.flush_paragraph();
        let blocks = mem::take(&mut self.current.blocks);
        cells.push(TableCell::new(blocks));
        cells.extend((0..*span).map(|_| TableCell::empty()));
        *span = 0;
    }

    fn finish_row(&mut self, rows: &mut Vec<TableRow>, cells: &mut Vec<TableCell>, span: &mut usize) {
        self.finish_cell(cells, span);
        rows.push(TableRow::new(mem::take(cells)));
    }

    fn push_table(&mut self, table: Table, ctx: &mut Context) {
        if table.is_empty() {
            self.note(ctx, WarningKind::DroppedObject, "empty table dropped");
            return;
        }
        if self.cell_depth > 0 {
            ctx.warn(
                WarningKind::Degraded,
                "nested table flattened into its enclosing cell",
            );
            self.flush_paragraph();
            for row in table.rows {
                for cell in row.cells {
                    self.current.blocks.extend(cell.blocks);
                }
            }
            return;
        }
        self.push_block(Block::Table(table));
    }

    fn bibliography_environment(&mut self, line: usize, ctx: &mut Context) -> Result<()> {
        self.read_group(ctx)?;
        self.flush_paragraph();
        self.push_frame();
        let result = self.bibliography_items(line, ctx);
        self.pop_frame();
        result
    }

    fn bibliography_items(&mut self, line: usize, ctx: &mut Context) -> Result<()> {
        let mut key: Option<String> = None;
        let mut open = false;
        let mut style = Emphasis::NONE;

        loop {
            ctx.checkpoint()?;
            let Some(Token { kind, span, line: token_line }) = self.next_token() else {
                self.unterminated("environment `thebibliography`", line, ctx)?;
                break;
            };
            match kind {
                TokenKind::Command(c) if c == "bibitem" => {
                    if open {
                        self.finish_bibitem(key.take(), ctx);
                    }
                    self.read_optional();
                    key = self
                        .read_group(ctx)?
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty());
                    if key.is_none() {
                        ctx.warn(
                            WarningKind::Degraded,
                            format!(
                                "line {}: \\bibitem without a key; key derived from the entry",
                                token_line
                            ),
                        );
                    }
                    open = true;
                    style = Emphasis::NONE;
                }
                TokenKind::Command(c) if c == "end" => {
                    let env = self.environment_name(token_line, ctx)?;
                    if env == "thebibliography" {
                        break;
                    }
                    self.mismatched_end(&env, token_line, ctx)?;
                }
                kind => self.dispatch(
                    Token {
                        kind,
                        span,
                        line: token_line,
                    },
                    &mut style,
                    ctx,
                )?,
            }
        }
        if open {
            self.finish_bibitem(key, ctx);
        }
        Ok(())
    }

    fn finish_bibitem(&mut self, key: Option<String>, ctx: &mut Context) {
        self.flush_paragraph();
        let text = mem::take(&mut self.current.blocks)
            .iter()
            .map(Block::plain_text)
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(entry) = self.extractor.extract(key.as_deref(), &text, ctx) {
            self.entries.push(entry);
        }
    }

    // ---- arguments ----

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        Some(token)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    /// Index of the next token that is not a space.
    fn next_non_space(&self) -> usize {
        let mut i = self.pos;
        while self.tokens.get(i).is_some_and(|t| t.kind == TokenKind::Space) {
            i += 1;
        }
        i
    }

    fn matching_group_end(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open + 1) {
            match token.kind {
                TokenKind::BeginGroup => depth += 1,
                TokenKind::EndGroup if depth == 0 => return Some(i),
                TokenKind::EndGroup => depth -= 1,
                _ => {}
            }
        }
        None
    }

    /// `]` closing the optional argument opened at `open`, at brace depth zero.
    fn matching_bracket(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut nested = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open + 1) {
            match &token.kind {
                TokenKind::BeginGroup => depth += 1,
                TokenKind::EndGroup if depth == 0 => return None,
                TokenKind::EndGroup => depth -= 1,
                TokenKind::ParBreak if depth == 0 => return None,
                TokenKind::Text(t) if depth == 0 && t == "[" => nested += 1,
                TokenKind::Text(t) if depth == 0 && t == "]" => {
                    if nested == 0 {
                        return Some(i);
                    }
                    nested -= 1;
                }
                _ => {}
            }
        }
        None
    }

    /// Consume a `{...}` argument and return its raw source.
    fn read_group(&mut self, ctx: &mut Context) -> Result<Option<String>> {
        let open = self.next_non_space();
        let Some(token) = self.tokens.get(open) else {
            return Ok(None);
        };
        if token.kind != TokenKind::BeginGroup {
            return Ok(None);
        }
        let (body_start, line) = (token.span.end, token.line);
        match self.matching_group_end(open) {
            Some(close) => {
                let raw = self.source[body_start..self.tokens[close].span.start].to_string();
                self.pos = close + 1;
                Ok(Some(raw))
            }
            None => {
                self.unterminated("group", line, ctx)?;
                self.pos = self.tokens.len();
                Ok(Some(self.source[body_start..].to_string()))
            }
        }
    }

    /// Consume a `[...]` argument right at the cursor and return its raw source.
    fn read_optional(&mut self) -> Option<String> {
        let open = self.pos;
        match self.tokens.get(open) {
            Some(Token {
                kind: TokenKind::Text(t),
                ..
            }) if t == "[" => {}
            _ => return None,
        }
        let close = self.matching_bracket(open)?;
        let raw = self.source[self.tokens[open].span.end..self.tokens[close].span.start].to_string();
        self.pos = close + 1;
        Some(raw)
    }

    /// Consume a `*` directly following a command.
    fn eat_star(&mut self) -> bool {
        match self.tokens.get_mut(self.pos) {
            Some(Token {
                kind: TokenKind::Text(t),
                span,
                ..
            }) if t.starts_with('*') => {
                if t.len() == 1 {
                    self.pos += 1;
                } else {
                    t.remove(0);
                    span.start += 1;
                }
                true
            }
            _ => false,
        }
    }

    /// Take the first character of a following text token.
    fn take_char(&mut self) -> Option<char> {
        let i = self.next_non_space();
        let Some(Token {
            kind: TokenKind::Text(t),
            span,
            ..
        }) = self.tokens.get_mut(i)
        else {
            return None;
        };
        let c = t.chars().next()?;
        if t.len() == c.len_utf8() {
            self.pos = i + 1;
        } else {
            t.drain(..c.len_utf8());
            span.start += c.len_utf8();
            self.pos = i;
        }
        Some(c)
    }

    fn eat_empty_group(&mut self) {
        if self.peek_kind() == Some(&TokenKind::BeginGroup)
            && self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::EndGroup)
        {
            self.pos += 2;
        }
    }

    fn skip_arguments(&mut self, optional: usize, required: usize, ctx: &mut Context) -> Result<()> {
        self.eat_star();
        let (mut optional, mut required) = (optional, required);
        loop {
            if optional > 0 && self.read_optional().is_some() {
                optional -= 1;
                continue;
            }
            if required == 0 {
                break;
            }
            let next = self.next_non_space();
            match self.tokens.get(next).map(|t| &t.kind) {
                Some(TokenKind::BeginGroup) => {
                    self.read_group(ctx)?;
                }
                Some(TokenKind::Command(_)) => self.pos = next + 1,
                _ => break,
            }
            required -= 1;
        }
        Ok(())
    }

    /// Parse a `{...}` argument (or a single token) into the current frame.
    fn styled_argument(&mut self, style: Emphasis, ctx: &mut Context) -> Result<()> {
        let next = self.next_non_space();
        let Some((kind, line)) = self.tokens.get(next).map(|t| (t.kind.clone(), t.line)) else {
            return Ok(());
        };
        match kind {
            TokenKind::BeginGroup => {
                self.pos = next + 1;
                self.parse_until(Until::Group(line), style, ctx)
            }
            TokenKind::Text(_) | TokenKind::Command(_) | TokenKind::Symbol(_) => {
                self.pos = next;
                let mut local = style;
                match self.next_token() {
                    Some(token) => self.dispatch(token, &mut local, ctx),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Parse an argument in isolation and return its trimmed spans.
    fn argument_spans(&mut self, ctx: &mut Context) -> Result<Vec<Span>> {
        self.push_frame();
        let result = self.styled_argument(Emphasis::NONE, ctx);
        let frame = self.pop_frame();
        result?;

        let mut spans = Vec::new();
        for block in frame.blocks {
            match block {
                Block::Paragraph(p) => {
                    spans.extend(inline::flatten(&p.content));
                    spans.push(Span::Text(" ".to_string(), Emphasis::NONE));
                }
                _ => self.note(
                    ctx,
                    WarningKind::DroppedObject,
                    "block content inside a command argument dropped",
                ),
            }
        }
        spans.extend(frame.spans);
        inline::trim_spans(&mut spans);
        Ok(spans)
    }

    fn environment_name(&mut self, line: usize, ctx: &mut Context) -> Result<String> {
        match self.read_group(ctx)? {
            Some(name) => Ok(name.trim().to_string()),
            None if self.options.is_lenient() => {
                ctx.warn(
                    WarningKind::Degraded,
                    format!("line {}: environment name missing", line),
                );
                Ok(String::new())
            }
            None => Err(Error::decode(
                Format::Latex,
                format!("line {}: environment name missing", line),
            )),
        }
    }

    fn find_environment_end(&self, name: &str) -> Option<(usize, usize)> {
        let mut depth = 0usize;
        let mut i = self.pos;
        while i + 3 < self.tokens.len() {
            let marker = match &self.tokens[i].kind {
                TokenKind::Command(c) if c == "begin" || c == "end" => c.as_str(),
                _ => {
                    i += 1;
                    continue;
                }
            };
            let named = self.tokens[i + 1].kind == TokenKind::BeginGroup
                && matches!(&self.tokens[i + 2].kind, TokenKind::Text(t) if t == name)
                && self.tokens[i + 3].kind == TokenKind::EndGroup;
            if named {
                if marker == "begin" {
                    depth += 1;
                } else if depth == 0 {
                    return Some((i + 4, self.tokens[i + 3].span.end));
                } else {
                    depth -= 1;
                }
            }
            i += 1;
        }
        None
    }

    // ---- errors ----

    fn unterminated(&self, what: &str, line: usize, ctx: &mut Context) -> Result<()> {
        if self.options.is_lenient() {
            ctx.warn(
                WarningKind::Degraded,
                format!("unterminated {} from line {} closed at end of input", what, line),
            );
            return Ok(());
        }
        Err(Error::decode(
            Format::Latex,
            format!("line {}: unterminated {}", line, what),
        ))
    }

    fn mismatched_end(&self, name: &str, line: usize, ctx: &mut Context) -> Result<()> {
        if self.options.is_lenient() {
            ctx.warn(
                WarningKind::Degraded,
                format!("line {}: ignoring unmatched \\end{{{}}}", line, name),
            );
            return Ok(());
        }
        Err(Error::decode(
            Format::Latex,
            format!("line {}: \\end{{{}}} does not match the open environment", line, name),
        ))
    }

    fn stray_close(&self, line: usize, ctx: &mut Context) -> Result<()> {
        if self.options.is_lenient() {
            ctx.warn(
                WarningKind::Degraded,
                format!("line {}: ignoring unbalanced `}}`", line),
            );
            return Ok(());
        }
        Err(Error::decode(
            Format::Latex,
            format!("line {}: unbalanced `}}`", line),
        ))
    }

    /// Record a warning unless the preamble is being skipped.
    fn note(&self, ctx: &mut Context, kind: WarningKind, message: impl Into<String>) {
        if !self.in_preamble {
            ctx.warn(kind, message);
        }
    }

    // ---- frames ----

    fn push_frame(&mut self) {
        let outer = mem::take(&mut self.current);
        self.stack.push(outer);
    }

    fn pop_frame(&mut self) -> Frame {
        let outer = self.stack.pop().unwrap_or_default();
        mem::replace(&mut self.current, outer)
    }

    fn push_text(&mut self, text: &str, style: Emphasis) {
        if !text.is_empty() {
            self.current
                .spans
                .push(Span::Text(text.to_string(), style));
        }
    }

    fn trim_trailing_space(&mut self) {
        if let Some(Span::Text(t, _)) = self.current.spans.last_mut() {
            let trimmed = t.trim_end_matches(' ').len();
            t.truncate(trimmed);
        }
    }

    fn push_space(&mut self, style: Emphasis) {
        match self.current.spans.last() {
            None => {}
            Some(Span::Text(t, _)) if t.ends_with(' ') => {}
            Some(_) => self.current.spans.push(Span::Text(" ".to_string(), style)),
        }
    }

    fn push_block(&mut self, block: Block) {
        self.flush_paragraph();
        self.current.blocks.push(block);
    }

    fn flush_paragraph(&mut self) {
        let mut spans = mem::take(&mut self.current.spans);
        inline::trim_spans(&mut spans);
        if !inline::spans_are_blank(&spans) {
            self.current
                .blocks
                .push(Block::paragraph(inline::group(spans)));
        }
    }
}

/// Put a float caption on the last image, or after the content.
fn attach_caption(
    blocks: &mut Vec<Block>,
    caption: Option<Vec<Inline>>,
    kind: FloatKind,
    ctx: &mut Context,
) {
    let Some(caption) = caption.filter(|c| !inline::is_blank(c)) else {
        return;
    };
    if kind == FloatKind::Figure {
        let last_image = blocks.iter_mut().rev().find_map(|b| match b {
            Block::Image(image) => Some(image),
            _ => None,
        });
        if let Some(image) = last_image {
            image.caption = Some(caption);
            return;
        }
    }
    ctx.warn(
        WarningKind::Degraded,
        "float caption kept as a paragraph after its content",
    );
    blocks.push(Block::paragraph(caption));
}

/// Collapse layout whitespace in passthrough source.
fn literal(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn heading_level(name: &str) -> Option<u8> {
    Some(match name {
        "part" | "chapter" | "section" => 1,
        "subsection" => 2,
        "subsubsection" => 3,
        "paragraph" => 4,
        "subparagraph" => 5,
        "subsubparagraph" => 6,
        _ => return None,
    })
}

fn symbol_text(name: &str) -> Option<&'static str> {
    Some(match name {
        "textbackslash" => "\\",
        "textasciitilde" => "~",
        "textasciicircum" => "^",
        "textbar" => "|",
        "textless" => "<",
        "textgreater" => ">",
        "textunderscore" => "_",
        "textbraceleft" => "{",
        "textbraceright" => "}",
        "textdollar" => "$",
        "textendash" => "\u{2013}",
        "textemdash" => "\u{2014}",
        "ldots" | "dots" | "textellipsis" => "\u{2026}",
        "textquoteleft" => "\u{2018}",
        "textquoteright" => "\u{2019}",
        "textquotedblleft" => "\u{201c}",
        "textquotedblright" => "\u{201d}",
        "LaTeX" => "LaTeX",
        "LaTeXe" => "LaTeX2e",
        "TeX" => "TeX",
        "S" => "\u{a7}",
        "P" => "\u{b6}",
        "copyright" | "textcopyright" => "\u{a9}",
        "textregistered" => "\u{ae}",
        "texttrademark" => "\u{2122}",
        "textdegree" => "\u{b0}",
        "euro" => "\u{20ac}",
        "pounds" | "textsterling" => "\u{a3}",
        "ss" => "\u{df}",
        "ae" => "\u{e6}",
        "AE" => "\u{c6}",
        "oe" => "\u{153}",
        "OE" => "\u{152}",
        "o" => "\u{f8}",
        "O" => "\u{d8}",
        "aa" => "\u{e5}",
        "AA" => "\u{c5}",
        "l" => "\u{142}",
        "L" => "\u{141}",
        "i" => "\u{131}",
        "quad" | "qquad" | "enspace" | "thinspace" => " ",
        _ => return None,
    })
}

/// Combining mark for letter accent commands such as `\c{c}`.
fn accent_mark(name: &str) -> Option<char> {
    Some(match name {
        "c" => '\u{327}',
        "v" => '\u{30c}',
        "u" => '\u{306}',
        "H" => '\u{30b}',
        "r" => '\u{30a}',
        "k" => '\u{328}',
        "d" => '\u{323}',
        "b" => '\u{331}',
        _ => return None,
    })
}

/// Combining mark for symbol accents such as `\'e`.
fn accent_symbol(c: char) -> Option<char> {
    Some(match c {
        '\'' => '\u{301}',
        '`' => '\u{300}',
        '^' => '\u{302}',
        '"' => '\u{308}',
        '~' => '\u{303}',
        '=' => '\u{304}',
        '.' => '\u{307}',
        _ => return None,
    })
}

/// Layout commands consumed silently, with their optional and required
/// argument counts.
fn layout_arguments(name: &str) -> Option<(usize, usize)> {
    Some(match name {
        "documentclass" | "usepackage" | "RequirePackage" => (1, 1),
        "newcommand" | "renewcommand" | "providecommand" => (2, 2),
        "newenvironment" | "renewenvironment" => (2, 3),
        "setlength" | "addtolength" | "setcounter" | "addtocounter" | "fontsize" => (0, 2),
        "addcontentsline" => (0, 3),
        "label" | "vspace" | "hspace" | "hypersetup" | "graphicspath" | "bibliographystyle"
        | "geometry" | "pagestyle" | "thispagestyle" | "linespread" | "pagenumbering"
        | "setstretch" | "thanks" | "hyphenation" | "DeclareUnicodeCharacter" => (0, 1),
        "pagebreak" | "nopagebreak" | "nolinebreak" | "newblock" => (1, 0),
        "centering" | "raggedright" | "raggedleft" | "noindent" | "indent" | "maketitle"
        | "tableofcontents" | "listoffigures" | "listoftables" | "newpage" | "clearpage"
        | "cleardoublepage" | "vfill" | "hfill" | "smallskip" | "medskip" | "bigskip"
        | "onehalfspacing" | "doublespacing" | "singlespacing" | "tiny" | "scriptsize"
        | "footnotesize" | "small" | "normalsize" | "large" | "Large" | "LARGE" | "huge"
        | "Huge" | "selectfont" | "phantomsection" | "appendix" | "frontmatter"
        | "mainmatter" | "backmatter" | "protect" | "relax" | "sloppy" | "fussy"
        | "FloatBarrier" | "makeatletter" | "makeatother" | "today" | "footnotemark"
        | "printbibliography" | "ttfamily" | "sffamily" | "rmfamily" | "scshape"
        | "hline" | "toprule" | "midrule" | "bottomrule" | "null" | "break" | "clearfloat" => {
            (0, 0)
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, Heading, Image};

    fn parse(source: &str) -> Document {
        let mut ctx = Context::new();
        LatexParser::new(source).unwrap().parse(&mut ctx).unwrap()
    }

    fn parse_with_warnings(source: &str) -> (Document, Context<'static>) {
        let mut ctx = Context::new();
        let doc = LatexParser::new(source).unwrap().parse(&mut ctx).unwrap();
        (doc, ctx)
    }

    #[test]
    fn test_heading_and_emphasis() {
        let doc = parse(r"\section{Intro}\textbf{Hello} \textit{world}");
        assert_eq!(
            doc.blocks,
            vec![
                Block::Heading(Heading::new(1, vec![Inline::text("Intro")])),
                Block::paragraph(vec![
                    Inline::bold("Hello"),
                    Inline::text(" "),
                    Inline::italic("world"),
                ]),
            ]
        );
    }

    #[test]
    fn test_heading_levels() {
        let doc = parse(
            "\\chapter{A}\n\\subsection*{B}\n\\subsubsection[short]{C}\n\\paragraph{D}\n\\subparagraph{E}\n\\subsubparagraph{F}",
        );
        let levels: Vec<u8> = doc
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Heading(h) => Some(h.level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_nested_emphasis_flattens() {
        let doc = parse(r"\textbf{\textit{x}} and {\bfseries\itshape y}");
        assert_eq!(
            doc.blocks,
            vec![Block::paragraph(vec![
                Inline::BoldItalic(vec![Inline::text("x")]),
                Inline::text(" and "),
                Inline::BoldItalic(vec![Inline::text("y")]),
            ])]
        );
    }

    #[test]
    fn test_declaration_scoped_to_group() {
        let doc = parse(r"{\em a} b");
        assert_eq!(
            doc.blocks,
            vec![Block::paragraph(vec![
                Inline::italic("a"),
                Inline::text(" b"),
            ])]
        );
    }

    #[test]
    fn test_paragraphs_and_escapes() {
        let doc = parse("A \\& B 50\\% \\$5 \\textbackslash{} x~y\n\nSecond \\LaTeX{} line");
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[0].plain_text(), "A & B 50% $5 \\ x\u{a0}y");
        assert_eq!(doc.blocks[1].plain_text(), "Second LaTeX line");
    }

    #[test]
    fn test_preamble_metadata() {
        let source = r"\documentclass[11pt]{article}
\usepackage{graphicx}
\title{My Paper}
\author{Jane Doe \and John Roe}
\date{\today}
\begin{document}
\maketitle
Body text.
\end{document}
Ignored trailing text.";
        let (doc, ctx) = parse_with_warnings(source);
        assert_eq!(doc.metadata.title.as_deref(), Some("My Paper"));
        assert_eq!(doc.metadata.author.as_deref(), Some("Jane Doe, John Roe"));
        assert_eq!(doc.metadata.date, None);
        assert_eq!(doc.blocks, vec![Block::paragraph(vec![Inline::text("Body text.")])]);
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn test_tabular() {
        let source = r"\begin{table}[h]
\centering
\begin{tabular}{|l|c|}
\hline
\textbf{Name} & Value \\
\hline
a & 1 \\
\multicolumn{2}{c}{wide} \\
b \\
\hline
\end{tabular}
\end{table}";
        let doc = parse(source);
        assert_eq!(doc.blocks.len(), 1);
        let Block::Table(table) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.shape(), (4, 2));
        assert!(table.is_rectangular());
        assert_eq!(table.rows[0].cells[0].plain_text(), "Name");
        assert_eq!(table.rows[2].cells[0].plain_text(), "wide");
        assert!(table.rows[2].cells[1].is_empty());
        assert!(table.rows[3].cells[1].is_empty());
    }

    #[test]
    fn test_empty_last_row_survives() {
        let doc = parse("\\begin{tabular}{ll}\na & b \\\\\n & \\\\\n\\end{tabular}");
        let Block::Table(table) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.shape(), (2, 2));
    }

    #[test]
    fn test_cell_newline_splits_paragraphs() {
        let doc = parse(r"\begin{tabular}{l} one\newline two \\ \end{tabular}");
        let Block::Table(table) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.rows[0].cells[0].blocks.len(), 2);
    }

    #[test]
    fn test_nested_tabular_flattened() {
        let source = r"\begin{tabular}{ll}
x & \begin{tabular}{l} inner \\ \end{tabular} \\
\end{tabular}";
        let (doc, ctx) = parse_with_warnings(source);
        let Block::Table(table) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.shape(), (1, 2));
        assert_eq!(table.rows[0].cells[1].plain_text(), "inner");
        assert!(ctx.has_warning(WarningKind::Degraded));
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_unterminated_tabular_is_error() {
        let mut ctx = Context::new();
        let err = LatexParser::new("\\begin{tabular}{ll}\na & b \\\\\n")
            .unwrap()
            .parse(&mut ctx)
            .unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_lenient_closes_unterminated() {
        let mut ctx = Context::new();
        let doc = LatexParser::with_options(
            "\\begin{tabular}{ll}\na & b \\\\\n",
            ParseOptions::new().lenient(),
        )
        .unwrap()
        .parse(&mut ctx)
        .unwrap();
        let Block::Table(table) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.shape(), (1, 2));
        assert!(ctx.has_warning(WarningKind::Degraded));
    }

    #[test]
    fn test_mismatched_end_is_error() {
        let mut ctx = Context::new();
        let result = LatexParser::new(r"\begin{center} x \end{figure}")
            .unwrap()
            .parse(&mut ctx);
        assert!(result.unwrap_err().is_decode());
    }

    #[test]
    fn test_unbalanced_group_is_error() {
        let mut ctx = Context::new();
        assert!(LatexParser::new(r"\textbf{open")
            .unwrap()
            .parse(&mut ctx)
            .is_err());
        assert!(LatexParser::new("$x").is_err());
    }

    #[test]
    fn test_figure_caption() {
        let source = r"\begin{figure}[h]
\centering
\includegraphics[width=0.8\textwidth]{media/plot.png}
\caption{A \emph{nice} plot}
\label{fig:plot}
\end{figure}";
        let doc = parse(source);
        assert_eq!(
            doc.blocks,
            vec![Block::Image(Image::new("media/plot.png").with_caption(vec![
                Inline::text("A "),
                Inline::italic("nice"),
                Inline::text(" plot"),
            ]))]
        );
    }

    #[test]
    fn test_table_caption_becomes_paragraph() {
        let source = r"\begin{table}
\caption{Results}
\begin{tabular}{l} a \\ \end{tabular}
\end{table}";
        let (doc, ctx) = parse_with_warnings(source);
        assert!(matches!(doc.blocks[0], Block::Table(_)));
        assert_eq!(doc.blocks[1].plain_text(), "Results");
        assert!(ctx.has_warning(WarningKind::Degraded));
    }

    #[test]
    fn test_citations() {
        let doc = parse(r"See \cite{a, b} and \citep[p.~2]{c}.");
        assert_eq!(
            doc.blocks,
            vec![Block::paragraph(vec![
                Inline::text("See "),
                Inline::cite("a"),
                Inline::cite("b"),
                Inline::text(" and "),
                Inline::cite("c"),
                Inline::text("."),
            ])]
        );
    }

    #[test]
    fn test_thebibliography() {
        let source = r"Text \cite{doe2020}.

\begin{thebibliography}{9}
\bibitem{doe2020} Doe, J. (2020). \textit{A Title}.
\bibitem{misc} Something unstructured
\end{thebibliography}";
        let (doc, ctx) = parse_with_warnings(source);
        let entries: Vec<_> = doc.bibliography().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "doe2020");
        assert_eq!(entries[0].confidence, Confidence::High);
        assert_eq!(entries[0].field("year"), Some("2020"));
        assert_eq!(entries[1].key, "misc");
        assert_eq!(entries[1].confidence, Confidence::Low);
        assert!(ctx.has_warning(WarningKind::ExtractionAmbiguity));
        assert!(matches!(doc.blocks.last(), Some(Block::BibliographyEntry(_))));
        assert_eq!(doc.citation_keys(), vec!["doe2020".to_string()]);
    }

    #[test]
    fn test_unknown_command_passthrough() {
        let (doc, ctx) = parse_with_warnings(r"Value \foo[opt]{bar} here and \baz next");
        assert_eq!(
            doc.blocks[0].plain_text(),
            "Value \\foo[opt]{bar} here and \\baz next"
        );
        assert!(ctx.has_warning(WarningKind::UnsupportedConstruct));
    }

    #[test]
    fn test_unknown_environment_passthrough() {
        let (doc, ctx) = parse_with_warnings("\\begin{tikzpicture}\n\\draw (0,0);\n\\end{tikzpicture}");
        assert_eq!(
            doc.blocks[0].plain_text(),
            "\\begin{tikzpicture} \\draw (0,0); \\end{tikzpicture}"
        );
        assert!(ctx.has_warning(WarningKind::UnsupportedConstruct));
    }

    #[test]
    fn test_math_passthrough() {
        let (doc, ctx) = parse_with_warnings(r"Energy $E = mc^2$ holds.");
        assert_eq!(doc.blocks[0].plain_text(), "Energy $E = mc^2$ holds.");
        assert!(ctx.has_warning(WarningKind::UnsupportedConstruct));
    }

    #[test]
    fn test_lists_degrade() {
        let (doc, ctx) = parse_with_warnings(
            "\\begin{itemize}\n\\item One\n\\item Two\n\\end{itemize}",
        );
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[1].plain_text(), "Two");
        assert!(ctx.has_warning(WarningKind::Degraded));
    }

    #[test]
    fn test_links_keep_text() {
        let doc = parse(r"\href{https://x.org}{site} and \url{https://y.org}");
        assert_eq!(doc.blocks[0].plain_text(), "site and https://y.org");
    }

    #[test]
    fn test_accents() {
        let doc = parse(r#"Caf\'e na\"ive \c{c}"#);
        assert_eq!(doc.blocks[0].plain_text(), "Café naïve ç");
    }

    #[test]
    fn test_comments_ignored() {
        let doc = parse("Hello % a comment\nworld");
        assert_eq!(doc.blocks[0].plain_text(), "Hello world");
    }

    fn nested(open: &str, depth: usize) -> String {
        format!("{}x{}", open.repeat(depth), "}".repeat(depth))
    }

    #[test]
    fn test_nesting_within_limit() {
        let doc = parse(&nested(r"\textbf{", MAX_NESTING - 1));
        assert_eq!(doc.blocks, vec![Block::paragraph(vec![Inline::bold("x")])]);
    }

    #[test]
    fn test_deep_nesting_is_error() {
        for source in [nested(r"\textbf{", 1_000), nested("{", 10_000)] {
            let mut ctx = Context::new();
            let err = LatexParser::new(&source)
                .unwrap()
                .parse(&mut ctx)
                .unwrap_err();
            assert!(err.is_decode());
            assert!(err.to_string().contains("nesting deeper"));
        }
    }

    #[test]
    fn test_deep_nesting_flattened_when_lenient() {
        let source = nested(r"\textit{", 1_000);
        let mut ctx = Context::new();
        let doc = LatexParser::with_options(&source, ParseOptions::new().lenient())
            .unwrap()
            .parse(&mut ctx)
            .unwrap();
        let text = doc.blocks[0].plain_text();
        assert!(text.starts_with(r"\textit{"));
        assert!(text.contains('x'));
        let degraded = ctx
            .warnings()
            .iter()
            .filter(|w| w.kind == WarningKind::Degraded)
            .count();
        assert_eq!(degraded, 1);
    }

    #[test]
    fn test_missing_arguments_warn() {
        for source in [r"Text \section", r"\section{} Text", "Text \\", r"\bibitem Text"] {
            let (doc, ctx) = parse_with_warnings(source);
            assert!(
                ctx.has_warning(WarningKind::Degraded),
                "no warning for {:?}",
                source
            );
            assert!(doc.blocks.iter().all(|b| !matches!(b, Block::Heading(_))));
        }
        let (doc, _) = parse_with_warnings("Text \\");
        assert_eq!(doc.blocks[0].plain_text(), "Text \\");
    }

    #[test]
    fn test_bibitem_without_key_warns() {
        let (doc, ctx) = parse_with_warnings(
            "\\begin{thebibliography}{9}\n\\bibitem Doe, J. (2020). A Title.\n\\end{thebibliography}",
        );
        assert_eq!(doc.bibliography().count(), 1);
        assert!(ctx.has_warning(WarningKind::Degraded));
    }

    #[test]
    fn test_cancelled() {
        use crate::context::CancelToken;
        let token = CancelToken::new();
        token.cancel();
        let mut ctx = Context::new().with_cancel_token(token);
        let result = LatexParser::new("text").unwrap().parse(&mut ctx);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
