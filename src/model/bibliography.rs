//! Bibliography entries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field holding the unparsed entry text of a low-confidence entry.
pub const RAW_FIELD: &str = "raw";

/// How reliably an entry's fields were recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Fields matched a known reference pattern
    High,
    /// Only raw text was kept
    Low,
}

/// A bibliography entry with free-form fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    /// Citation key, unique within a document
    pub key: String,
    /// Field name to value (author, year, title, raw, ...)
    pub fields: BTreeMap<String, String>,
    /// Extraction confidence
    pub confidence: Confidence,
}

impl BibliographyEntry {
    /// Create an entry with parsed fields.
    pub fn new(key: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            key: key.into(),
            fields,
            confidence: Confidence::High,
        }
    }

    /// Create a low-confidence entry that only keeps the raw text.
    pub fn raw(key: impl Into<String>, text: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(RAW_FIELD.to_string(), text.into());
        Self {
            key: key.into(),
            fields,
            confidence: Confidence::Low,
        }
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Render the entry as reference-list text: `Author (Year). Title`.
    ///
    /// Low-confidence entries render their raw text. Fields other than
    /// author, year and title are appended in key order.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(author) = self.field("author") {
            out.push_str(author);
        }
        if let Some(year) = self.field("year") {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push('(');
            out.push_str(year);
            out.push_str(").");
        }
        if let Some(title) = self.field("title") {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(title);
        }
        for (name, value) in &self.fields {
            if matches!(name.as_str(), "author" | "year" | "title" | RAW_FIELD) {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(value);
        }
        if let Some(raw) = self.field(RAW_FIELD) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(raw);
        }
        out
    }
}
