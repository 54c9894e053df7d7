//! Format detection from file names.
//!
//! The conversion direction is chosen from the file extension alone. The
//! byte-level helpers only exist so callers can report a mismatch between
//! an extension and the actual content.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A document format handled by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Office Open XML word-processing package (`.docx`)
    Docx,
    /// LaTeX markup (`.tex`, `.latex`)
    Latex,
}

impl Format {
    /// All supported formats.
    pub const ALL: [Format; 2] = [Format::Docx, Format::Latex];

    /// File extensions mapped to this format (lowercase, without dot).
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Format::Docx => &["docx"],
            Format::Latex => &["tex", "latex"],
        }
    }

    /// Preferred extension for output files.
    pub fn default_extension(&self) -> &'static str {
        self.extensions()[0]
    }

    /// MIME type of the format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Format::Latex => "application/x-latex",
        }
    }

    /// The format a file of this format is converted to by default.
    pub fn counterpart(&self) -> Format {
        match self {
            Format::Docx => Format::Latex,
            Format::Latex => Format::Docx,
        }
    }

    /// Whether encoded output of this format is text.
    pub fn is_text(&self) -> bool {
        matches!(self, Format::Latex)
    }

    /// Map an extension (with or without a leading dot) to a format.
    pub fn from_extension(ext: &str) -> Result<Format> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        Format::ALL
            .into_iter()
            .find(|format| format.extensions().contains(&ext.as_str()))
            .ok_or_else(|| Error::UnsupportedFormat(format!(".{}", ext)))
    }

    /// Detect the format of a file from its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Format> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Format::from_extension(ext),
            None => Err(Error::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Docx => write!(f, "DOCX"),
            Format::Latex => write!(f, "LaTeX"),
        }
    }
}

impl std::str::FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_extension(s)
    }
}

/// Zip local file header magic.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Check whether bytes start like a zip container (DOCX packages are zips).
pub fn looks_like_docx(data: &[u8]) -> bool {
    data.starts_with(ZIP_MAGIC)
}

/// Check whether a file starts like a zip container.
pub fn looks_like_docx_file<P: AsRef<Path>>(path: P) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut reader = BufReader::new(file);
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).is_ok() && looks_like_docx(&header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Format::from_extension("docx").unwrap(), Format::Docx);
        assert_eq!(Format::from_extension(".DOCX").unwrap(), Format::Docx);
        assert_eq!(Format::from_extension("tex").unwrap(), Format::Latex);
        assert_eq!(Format::from_extension("latex").unwrap(), Format::Latex);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = Format::from_extension("pdf");
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Format::from_path("paper/main.tex").unwrap(), Format::Latex);
        assert_eq!(Format::from_path("Report.Docx").unwrap(), Format::Docx);
        assert!(Format::from_path("README").is_err());
    }

    #[test]
    fn test_counterpart() {
        assert_eq!(Format::Docx.counterpart(), Format::Latex);
        assert_eq!(Format::Latex.counterpart(), Format::Docx);
        assert_eq!(Format::Latex.default_extension(), "tex");
    }

    #[test]
    fn test_looks_like_docx() {
        assert!(looks_like_docx(b"PK\x03\x04\x14\x00"));
        assert!(!looks_like_docx(b"\\documentclass{article}"));
    }
}
