//! Inline content and emphasis normalization.
//!
//! Both source formats allow emphasis to nest arbitrarily (`\textbf{\textit{x}}`,
//! runs carrying both `w:b` and `w:i`). The model keeps at most one level of
//! emphasis: every inline sequence is flattened into [`Span`]s carrying an
//! [`Emphasis`] and regrouped, so bold and italic together always become a
//! single [`Inline::BoldItalic`].

use serde::{Deserialize, Serialize};

/// Inline content inside headings, paragraphs and captions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Inline {
    /// Plain text
    Text(String),
    /// Bold text
    Bold(Vec<Inline>),
    /// Italic text
    Italic(Vec<Inline>),
    /// Bold and italic text
    BoldItalic(Vec<Inline>),
    /// Reference to a bibliography entry by key (may dangle)
    CitationRef(String),
}

impl Inline {
    /// Create a text inline.
    pub fn text(s: impl Into<String>) -> Self {
        Inline::Text(s.into())
    }

    /// Create a bold inline holding plain text.
    pub fn bold(s: impl Into<String>) -> Self {
        Inline::Bold(vec![Inline::text(s)])
    }

    /// Create an italic inline holding plain text.
    pub fn italic(s: impl Into<String>) -> Self {
        Inline::Italic(vec![Inline::text(s)])
    }

    /// Create a citation reference.
    pub fn cite(key: impl Into<String>) -> Self {
        Inline::CitationRef(key.into())
    }

    /// Children of an emphasis wrapper.
    pub fn children(&self) -> Option<&[Inline]> {
        match self {
            Inline::Bold(c) | Inline::Italic(c) | Inline::BoldItalic(c) => Some(c),
            _ => None,
        }
    }

    /// Get plain text; citations render as their key.
    pub fn plain_text(&self) -> String {
        match self {
            Inline::Text(t) => t.clone(),
            Inline::CitationRef(key) => key.clone(),
            Inline::Bold(c) | Inline::Italic(c) | Inline::BoldItalic(c) => plain_text(c),
        }
    }
}

/// Emphasis flags carried by a flattened span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Emphasis {
    /// Bold weight
    pub bold: bool,
    /// Italic shape
    pub italic: bool,
}

impl Emphasis {
    /// No emphasis.
    pub const NONE: Emphasis = Emphasis {
        bold: false,
        italic: false,
    };

    /// Return a copy with bold set.
    pub fn with_bold(self, bold: bool) -> Self {
        Self { bold, ..self }
    }

    /// Return a copy with italic set.
    pub fn with_italic(self, italic: bool) -> Self {
        Self { italic, ..self }
    }

    /// Check if no emphasis is applied.
    pub fn is_plain(&self) -> bool {
        !self.bold && !self.italic
    }
}

/// A leaf of an inline tree with its accumulated emphasis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    /// Text run
    Text(String, Emphasis),
    /// Citation reference
    Citation(String, Emphasis),
}

impl Span {
    /// Emphasis of this span.
    pub fn emphasis(&self) -> Emphasis {
        match self {
            Span::Text(_, e) | Span::Citation(_, e) => *e,
        }
    }
}

/// Flatten an inline tree into spans.
pub fn flatten(inlines: &[Inline]) -> Vec<Span> {
    let mut spans = Vec::new();
    flatten_into(inlines, Emphasis::NONE, &mut spans);
    spans
}

fn flatten_into(inlines: &[Inline], emphasis: Emphasis, out: &mut Vec<Span>) {
    for inline in inlines {
        match inline {
            Inline::Text(t) => out.push(Span::Text(t.clone(), emphasis)),
            Inline::CitationRef(key) => out.push(Span::Citation(key.clone(), emphasis)),
            Inline::Bold(c) => flatten_into(c, emphasis.with_bold(true), out),
            Inline::Italic(c) => flatten_into(c, emphasis.with_italic(true), out),
            Inline::BoldItalic(c) => {
                flatten_into(c, emphasis.with_bold(true).with_italic(true), out)
            }
        }
    }
}

/// Regroup spans into normalized inlines.
///
/// Consecutive spans with equal emphasis share one wrapper, adjacent text
/// merges and empty text disappears.
pub fn group(spans: impl IntoIterator<Item = Span>) -> Vec<Inline> {
    let mut out = Vec::new();
    let mut run: Option<(Emphasis, Vec<Inline>)> = None;

    for span in spans {
        let (emphasis, item) = match span {
            Span::Text(t, _) if t.is_empty() => continue,
            Span::Text(t, e) => (e, Inline::Text(t)),
            Span::Citation(key, e) => (e, Inline::CitationRef(key)),
        };
        match run.as_mut() {
            Some((current, items)) if *current == emphasis => push_merged(items, item),
            _ => {
                if let Some(finished) = run.take() {
                    emit_run(&mut out, finished);
                }
                run = Some((emphasis, vec![item]));
            }
        }
    }
    if let Some(finished) = run {
        emit_run(&mut out, finished);
    }
    out
}

fn push_merged(items: &mut Vec<Inline>, item: Inline) {
    if let Inline::Text(next) = &item {
        if let Some(Inline::Text(prev)) = items.last_mut() {
            prev.push_str(next);
            return;
        }
    }
    items.push(item);
}

fn emit_run(out: &mut Vec<Inline>, (emphasis, items): (Emphasis, Vec<Inline>)) {
    match (emphasis.bold, emphasis.italic) {
        (false, false) => out.extend(items),
        (true, false) => out.push(Inline::Bold(items)),
        (false, true) => out.push(Inline::Italic(items)),
        (true, true) => out.push(Inline::BoldItalic(items)),
    }
}

/// Normalize an inline sequence to the flat emphasis form.
pub fn normalize(inlines: &[Inline]) -> Vec<Inline> {
    group(flatten(inlines))
}

/// Check if an inline sequence is already in normalized form.
pub fn is_normalized(inlines: &[Inline]) -> bool {
    normalize(inlines) == inlines
}

fn is_layout_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Strip layout whitespace from both ends of a span sequence.
///
/// Non-breaking spaces are content and survive.
pub fn trim_spans(spans: &mut Vec<Span>) {
    while let Some(Span::Text(t, _)) = spans.first_mut() {
        let trimmed = t.trim_start_matches(is_layout_space);
        if trimmed.is_empty() {
            spans.remove(0);
        } else {
            *t = trimmed.to_string();
            break;
        }
    }
    while let Some(Span::Text(t, _)) = spans.last_mut() {
        let trimmed = t.trim_end_matches(is_layout_space);
        if trimmed.is_empty() {
            spans.pop();
        } else {
            *t = trimmed.to_string();
            break;
        }
    }
}

/// Check if spans carry no visible content.
pub fn spans_are_blank(spans: &[Span]) -> bool {
    spans.iter().all(|span| match span {
        Span::Text(t, _) => t.chars().all(char::is_whitespace),
        Span::Citation(..) => false,
    })
}

/// Concatenate the plain text of an inline sequence.
pub fn plain_text(inlines: &[Inline]) -> String {
    inlines.iter().map(Inline::plain_text).collect()
}

/// Check if an inline sequence carries no visible content.
pub fn is_blank(inlines: &[Inline]) -> bool {
    spans_are_blank(&flatten(inlines))
}
