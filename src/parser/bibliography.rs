//! Reference extraction and citation linking.
//!
//! Bibliographies arrive as free text: paragraphs under a "References"
//! heading in DOCX, `\bibitem` bodies in LaTeX. The extractor turns each
//! entry into a [`BibliographyEntry`], parsing `Author (Year). Title` when it
//! can and keeping the raw text otherwise. Nothing is ever discarded.

use crate::context::{Context, WarningKind};
use crate::model::inline::{self, Span};
use crate::model::{BibliographyEntry, Block, Inline};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::sync::OnceLock;

/// Heading texts that open a bibliography section (compared lowercase).
const BIBLIOGRAPHY_TITLES: &[&str] = &[
    "references",
    "reference list",
    "bibliography",
    "works cited",
    "literature cited",
    "literature",
    "literatur",
    "sources",
];

fn label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*\[([^\[\]\s]+)\]\s*(.*)$").expect("label pattern"))
}

fn entry_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)^(?P<author>[^()]+?)\s*\((?P<year>\d{4}[a-z]?|n\.d\.)\)\.?\s+(?P<title>\S.*)$",
        )
        .expect("entry pattern")
    })
}

fn bracket_cite_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]+)\]").expect("bracket citation pattern"))
}

fn author_year_cite_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\((\p{Lu}[\p{L}'\-]+)(?:\s+et\s+al\.?)?,\s*(\d{4}[a-z]?)\)")
            .expect("author-year citation pattern")
    })
}

/// Check if a heading text opens a bibliography section.
pub fn is_bibliography_heading(text: &str) -> bool {
    let title = text.trim().trim_end_matches(':').trim().to_lowercase();
    BIBLIOGRAPHY_TITLES.contains(&title.as_str())
}

/// Turns free-text references into bibliography entries with unique keys.
#[derive(Debug, Default)]
pub struct ReferenceExtractor {
    keys: HashSet<String>,
    count: usize,
}

impl ReferenceExtractor {
    /// Create a new extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries produced so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Extract one entry.
    ///
    /// `key` is the key given by the markup (`\bibitem{key}`); without one a
    /// leading `[label]` in the text is used, then a key derived from the
    /// first author and year, then `ref<N>`. Returns `None` for empty input.
    pub fn extract(
        &mut self,
        key: Option<&str>,
        text: &str,
        ctx: &mut Context,
    ) -> Option<BibliographyEntry> {
        let text = collapse_whitespace(text);
        let explicit = key.map(str::trim).filter(|k| !k.is_empty());
        if text.is_empty() && explicit.is_none() {
            return None;
        }
        self.count += 1;

        let (label, body) = match explicit {
            Some(k) => (Some(k.to_string()), text),
            None => split_label(&text),
        };
        let fields = parse_fields(&body);
        let base = label
            .or_else(|| fields.as_ref().and_then(derive_key))
            .unwrap_or_else(|| format!("ref{}", self.count));
        let key = self.unique_key(base, ctx);

        match fields {
            Some(fields) => Some(BibliographyEntry::new(key, fields)),
            None => {
                ctx.warn(
                    WarningKind::ExtractionAmbiguity,
                    format!(
                        "bibliography entry `{}` does not match `Author (Year). Title`; kept as raw text",
                        key
                    ),
                );
                Some(BibliographyEntry::raw(key, body))
            }
        }
    }

    /// Remove the last bibliography section from `blocks` and extract its
    /// entries.
    ///
    /// The section runs from a heading such as "References" to the next
    /// heading. Non-paragraph blocks inside it stay in the flow.
    pub fn extract_section(
        &mut self,
        blocks: &mut Vec<Block>,
        ctx: &mut Context,
    ) -> Vec<BibliographyEntry> {
        let Some(start) = blocks.iter().rposition(|b| match b {
            Block::Heading(h) => is_bibliography_heading(&h.plain_text()),
            _ => false,
        }) else {
            return Vec::new();
        };
        let end = blocks[start + 1..]
            .iter()
            .position(Block::is_heading)
            .map_or(blocks.len(), |i| start + 1 + i);

        let section: Vec<Block> = blocks.drain(start..end).collect();
        let mut entries = Vec::new();
        let mut kept = Vec::new();
        for block in section.into_iter().skip(1) {
            match block {
                Block::Paragraph(p) => {
                    if let Some(entry) = self.extract(None, &p.plain_text(), ctx) {
                        entries.push(entry);
                    }
                }
                Block::BibliographyEntry(entry) => entries.push(entry),
                other => kept.push(other),
            }
        }
        if !kept.is_empty() {
            ctx.warn(
                WarningKind::Degraded,
                format!(
                    "{} non-paragraph block(s) in the bibliography section left in the body",
                    kept.len()
                ),
            );
            blocks.splice(start..start, kept);
        }
        log::debug!("extracted {} bibliography entries", entries.len());
        entries
    }

    fn unique_key(&mut self, base: String, ctx: &mut Context) -> String {
        let mut key = base.clone();
        let mut n = 2;
        while self.keys.contains(&key) {
            key = format!("{}-{}", base, n);
            n += 1;
        }
        if key != base {
            ctx.warn(
                WarningKind::ExtractionAmbiguity,
                format!("duplicate bibliography key `{}` renamed to `{}`", base, key),
            );
        }
        self.keys.insert(key.clone());
        key
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_label(text: &str) -> (Option<String>, String) {
    match label_pattern().captures(text) {
        Some(caps) => (Some(caps[1].to_string()), caps[2].trim().to_string()),
        None => (None, text.to_string()),
    }
}

/// Parse `Author (Year). Title` into fields.
pub fn parse_fields(text: &str) -> Option<BTreeMap<String, String>> {
    let caps = entry_pattern().captures(text)?;
    let author = caps["author"].trim();
    if author.is_empty() {
        return None;
    }
    let mut fields = BTreeMap::new();
    fields.insert("author".to_string(), author.to_string());
    fields.insert("year".to_string(), caps["year"].to_string());
    fields.insert("title".to_string(), caps["title"].trim().to_string());
    Some(fields)
}

/// First author's surname: text before the first comma, else the last word.
fn surname(author: &str) -> Option<&str> {
    let first = author.split([';', '&']).next()?.trim();
    let name = match first.split_once(',') {
        Some((last, _)) => last.trim(),
        None => first.split_whitespace().last()?,
    };
    (!name.is_empty()).then_some(name)
}

fn derive_key(fields: &BTreeMap<String, String>) -> Option<String> {
    let surname: String = surname(fields.get("author")?)?
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if surname.is_empty() {
        return None;
    }
    let year = fields.get("year").map(String::as_str).unwrap_or_default();
    Some(format!("{}{}", surname, year.replace('.', "")))
}

/// Lookup tables for turning in-text references into citation keys.
struct CitationIndex {
    keys: HashSet<String>,
    author_year: HashMap<(String, String), String>,
}

impl CitationIndex {
    fn new(entries: &[BibliographyEntry]) -> Self {
        let mut author_year = HashMap::new();
        for entry in entries {
            if let (Some(author), Some(year)) = (entry.field("author"), entry.field("year")) {
                if let Some(name) = surname(author) {
                    author_year
                        .entry((name.to_lowercase(), year.to_string()))
                        .or_insert_with(|| entry.key.clone());
                }
            }
        }
        Self {
            keys: entries.iter().map(|e| e.key.clone()).collect(),
            author_year,
        }
    }

    /// Find citation markers in `text` that resolve to known entries.
    fn find(&self, text: &str) -> Vec<(Range<usize>, Vec<String>)> {
        let mut found = Vec::new();
        for caps in bracket_cite_pattern().captures_iter(text) {
            let keys: Vec<String> = caps[1].split(',').map(|k| k.trim().to_string()).collect();
            if keys.iter().all(|k| self.keys.contains(k)) {
                if let Some(m) = caps.get(0) {
                    found.push((m.range(), keys));
                }
            }
        }
        for caps in author_year_cite_pattern().captures_iter(text) {
            let lookup = (caps[1].to_lowercase(), caps[2].to_string());
            if let (Some(key), Some(m)) = (self.author_year.get(&lookup), caps.get(0)) {
                found.push((m.range(), vec![key.clone()]));
            }
        }
        found.sort_by_key(|(range, _)| range.start);

        let mut result: Vec<(Range<usize>, Vec<String>)> = Vec::new();
        for (range, keys) in found {
            if result.last().map_or(true, |(prev, _)| range.start >= prev.end) {
                result.push((range, keys));
            }
        }
        result
    }
}

/// Turn `[key]` and `(Surname, Year)` text into citation references when
/// they match an entry. Returns the number of citations created.
pub fn link_citations(blocks: &mut [Block], entries: &[BibliographyEntry]) -> usize {
    if entries.is_empty() {
        return 0;
    }
    let index = CitationIndex::new(entries);
    link_blocks(blocks, &index)
}

fn link_blocks(blocks: &mut [Block], index: &CitationIndex) -> usize {
    let mut linked = 0;
    for block in blocks {
        match block {
            Block::Heading(h) => linked += link_inlines(&mut h.content, index),
            Block::Paragraph(p) => linked += link_inlines(&mut p.content, index),
            Block::Table(t) => {
                for cell in t.rows.iter_mut().flat_map(|r| r.cells.iter_mut()) {
                    linked += link_blocks(&mut cell.blocks, index);
                }
            }
            Block::Image(img) => {
                if let Some(caption) = img.caption.as_mut() {
                    linked += link_inlines(caption, index);
                }
            }
            Block::BibliographyEntry(_) => {}
        }
    }
    linked
}

fn link_inlines(content: &mut Vec<Inline>, index: &CitationIndex) -> usize {
    let mut linked = 0;
    let mut spans = Vec::new();
    for span in inline::flatten(content) {
        let Span::Text(text, emphasis) = span else {
            spans.push(span);
            continue;
        };
        let matches = index.find(&text);
        if matches.is_empty() {
            spans.push(Span::Text(text, emphasis));
            continue;
        }
        let mut pos = 0;
        for (range, keys) in matches {
            spans.push(Span::Text(text[pos..range.start].to_string(), emphasis));
            for key in keys {
                spans.push(Span::Citation(key, emphasis));
                linked += 1;
            }
            pos = range.end;
        }
        spans.push(Span::Text(text[pos..].to_string(), emphasis));
    }
    if linked > 0 {
        *content = inline::group(spans);
    }
    linked
}
