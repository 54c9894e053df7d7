//! Decoding options and configuration.

use serde::{Deserialize, Serialize};

/// Options shared by the DOCX and LaTeX decoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Whether to run the reference extractor
    pub extract_bibliography: bool,

    /// Whether to turn `[key]` and `(Author, Year)` text into citations (DOCX)
    pub link_citations: bool,

    /// Whether to apply Unicode NFC normalization to text
    pub normalize_unicode: bool,

    /// Whether to keep embedded image bytes (DOCX)
    pub extract_resources: bool,
}

impl ParseOptions {
    /// Create new parse options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enable lenient mode (close unterminated constructs at end of input).
    pub fn lenient(mut self) -> Self {
        self.error_mode = ErrorMode::Lenient;
        self
    }

    /// Enable or disable bibliography extraction.
    pub fn with_bibliography(mut self, extract: bool) -> Self {
        self.extract_bibliography = extract;
        self
    }

    /// Enable or disable citation linking.
    pub fn with_citation_linking(mut self, link: bool) -> Self {
        self.link_citations = link;
        self
    }

    /// Enable or disable Unicode normalization.
    pub fn with_unicode_normalization(mut self, normalize: bool) -> Self {
        self.normalize_unicode = normalize;
        self
    }

    /// Enable or disable resource extraction.
    pub fn with_resources(mut self, extract: bool) -> Self {
        self.extract_resources = extract;
        self
    }

    /// Check if lenient mode is on.
    pub fn is_lenient(&self) -> bool {
        self.error_mode == ErrorMode::Lenient
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Strict,
            extract_bibliography: true,
            link_citations: true,
            normalize_unicode: true,
            extract_resources: true,
        }
    }
}

/// Error handling mode during decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Fail on malformed input
    #[default]
    Strict,
    /// Recover where possible and record a warning
    Lenient,
}
