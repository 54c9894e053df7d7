//! Rendering options and configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Options for encoding a document.
///
/// LaTeX output uses the class, size, spacing, margins and package settings;
/// DOCX output uses the font, size, spacing and image limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// LaTeX document class
    pub document_class: DocumentClass,

    /// Base font size
    pub font_size: FontSize,

    /// Line spacing
    pub line_spacing: LineSpacing,

    /// Page margins in inches
    pub margins: Margins,

    /// Load `fontenc`/`inputenc` for Unicode input
    pub unicode_support: bool,

    /// Extra LaTeX packages to load
    pub custom_packages: Vec<String>,

    /// Emit a complete LaTeX document instead of a body fragment
    pub standalone: bool,

    /// Width given to `\includegraphics`
    pub image_width: String,

    /// Heading used for the bibliography
    pub bibliography_title: String,

    /// BibTeX style named with `\bibliographystyle`; also loads `natbib`
    pub bibliography_style: Option<String>,

    /// DOCX body font
    pub font_name: String,

    /// Maximum DOCX image width in inches
    pub docx_image_max_width_in: f32,
}

impl RenderOptions {
    /// Create new render options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document class.
    pub fn with_document_class(mut self, class: DocumentClass) -> Self {
        self.document_class = class;
        self
    }

    /// Set the base font size.
    pub fn with_font_size(mut self, size: FontSize) -> Self {
        self.font_size = size;
        self
    }

    /// Set the line spacing.
    pub fn with_line_spacing(mut self, spacing: LineSpacing) -> Self {
        self.line_spacing = spacing;
        self
    }

    /// Set the page margins.
    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    /// Use the same margin on all sides.
    pub fn with_uniform_margin(mut self, inches: f32) -> Self {
        self.margins = Margins::uniform(inches);
        self
    }

    /// Enable or disable Unicode input packages.
    pub fn with_unicode_support(mut self, enabled: bool) -> Self {
        self.unicode_support = enabled;
        self
    }

    /// Add a LaTeX package.
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.custom_packages.push(package.into());
        self
    }

    /// Emit a full document or a fragment.
    pub fn with_standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    /// Set the image width expression (e.g. `0.5\textwidth`).
    pub fn with_image_width(mut self, width: impl Into<String>) -> Self {
        self.image_width = width.into();
        self
    }

    /// Set the bibliography heading.
    pub fn with_bibliography_title(mut self, title: impl Into<String>) -> Self {
        self.bibliography_title = title.into();
        self
    }

    /// Set the bibliography style (`plain`, `abbrvnat`, ...).
    pub fn with_bibliography_style(mut self, style: impl Into<String>) -> Self {
        self.bibliography_style = Some(style.into());
        self
    }

    /// Set the DOCX body font.
    pub fn with_font_name(mut self, font: impl Into<String>) -> Self {
        self.font_name = font.into();
        self
    }

    /// Set the maximum DOCX image width in inches.
    pub fn with_image_max_width(mut self, inches: f32) -> Self {
        self.docx_image_max_width_in = inches;
        self
    }

    /// Check that the options describe a renderable document.
    pub fn validate(&self) -> Result<()> {
        self.margins.validate()?;
        if !(self.docx_image_max_width_in > 0.0 && self.docx_image_max_width_in <= 22.0) {
            return Err(Error::InvalidOptions(format!(
                "image max width {} in is outside (0, 22]",
                self.docx_image_max_width_in
            )));
        }
        if self.image_width.trim().is_empty() || !braces_balanced(&self.image_width) {
            return Err(Error::InvalidOptions(format!(
                "invalid image width `{}`",
                self.image_width
            )));
        }
        if self.font_name.trim().is_empty() {
            return Err(Error::InvalidOptions("font name is empty".to_string()));
        }
        if self.bibliography_title.trim().is_empty() {
            return Err(Error::InvalidOptions(
                "bibliography title is empty".to_string(),
            ));
        }
        for package in &self.custom_packages {
            if !is_latex_name(package) {
                return Err(Error::InvalidOptions(format!(
                    "invalid package name `{}`",
                    package
                )));
            }
        }
        if let Some(style) = &self.bibliography_style {
            if !is_latex_name(style) {
                return Err(Error::InvalidOptions(format!(
                    "invalid bibliography style `{}`",
                    style
                )));
            }
        }
        Ok(())
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            document_class: DocumentClass::Article,
            font_size: FontSize::Pt11,
            line_spacing: LineSpacing::Single,
            margins: Margins::default(),
            unicode_support: true,
            custom_packages: Vec::new(),
            standalone: true,
            image_width: "0.8\\textwidth".to_string(),
            bibliography_title: "References".to_string(),
            bibliography_style: None,
            font_name: "Calibri".to_string(),
            docx_image_max_width_in: 6.0,
        }
    }
}

/// Package and style names: letters, digits, `-`, `_` and `.`.
fn is_latex_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn braces_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// LaTeX document class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentClass {
    /// `article`
    #[default]
    Article,
    /// `report`
    Report,
    /// `book`
    Book,
}

impl DocumentClass {
    /// Class name as used in `\documentclass`.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentClass::Article => "article",
            DocumentClass::Report => "report",
            DocumentClass::Book => "book",
        }
    }

    /// Macro holding the bibliography heading for this class.
    pub fn bibliography_macro(&self) -> &'static str {
        match self {
            DocumentClass::Article => "\\refname",
            DocumentClass::Report | DocumentClass::Book => "\\bibname",
        }
    }
}

/// Base font size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontSize {
    /// 10 pt
    #[serde(rename = "10pt")]
    Pt10,
    /// 11 pt
    #[default]
    #[serde(rename = "11pt")]
    Pt11,
    /// 12 pt
    #[serde(rename = "12pt")]
    Pt12,
}

impl FontSize {
    /// Size in points.
    pub fn points(&self) -> u32 {
        match self {
            FontSize::Pt10 => 10,
            FontSize::Pt11 => 11,
            FontSize::Pt12 => 12,
        }
    }

    /// Class option (`11pt`).
    pub fn class_option(&self) -> String {
        format!("{}pt", self.points())
    }

    /// Parse `10`, `11pt`, ...
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_end_matches("pt") {
            "10" => Some(FontSize::Pt10),
            "11" => Some(FontSize::Pt11),
            "12" => Some(FontSize::Pt12),
            _ => None,
        }
    }
}

/// Line spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSpacing {
    /// Single spacing
    #[default]
    Single,
    /// One and a half
    OneHalf,
    /// Double spacing
    Double,
}

impl LineSpacing {
    /// `setspace` command, if any.
    pub fn latex_command(&self) -> Option<&'static str> {
        match self {
            LineSpacing::Single => None,
            LineSpacing::OneHalf => Some("\\onehalfspacing"),
            LineSpacing::Double => Some("\\doublespacing"),
        }
    }

    /// `w:spacing/@w:line` value in 240ths of a line.
    pub fn docx_line(&self) -> u32 {
        match self {
            LineSpacing::Single => 240,
            LineSpacing::OneHalf => 360,
            LineSpacing::Double => 480,
        }
    }

    /// Parse `single`, `onehalf`, `1.5`, `double`, `2`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "1" => Some(LineSpacing::Single),
            "onehalf" | "one_half" | "1.5" => Some(LineSpacing::OneHalf),
            "double" | "2" => Some(LineSpacing::Double),
            _ => None,
        }
    }
}

/// Page margins in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    /// Top margin
    pub top: f32,
    /// Right margin
    pub right: f32,
    /// Bottom margin
    pub bottom: f32,
    /// Left margin
    pub left: f32,
}

impl Margins {
    /// Same margin on all sides.
    pub fn uniform(inches: f32) -> Self {
        Self {
            top: inches,
            right: inches,
            bottom: inches,
            left: inches,
        }
    }

    /// Check that all margins are in `(0, 4]` inches.
    pub fn validate(&self) -> Result<()> {
        for (side, value) in [
            ("top", self.top),
            ("right", self.right),
            ("bottom", self.bottom),
            ("left", self.left),
        ] {
            if !(value > 0.0 && value <= 4.0) {
                return Err(Error::InvalidOptions(format!(
                    "{} margin {} in is outside (0, 4]",
                    side, value
                )));
            }
        }
        Ok(())
    }

    /// `geometry` package options.
    pub fn geometry(&self) -> String {
        format!(
            "top={}in,right={}in,bottom={}in,left={}in",
            self.top, self.right, self.bottom, self.left
        )
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_options_builder() {
        let options = RenderOptions::new()
            .with_document_class(DocumentClass::Report)
            .with_font_size(FontSize::Pt12)
            .with_line_spacing(LineSpacing::Double)
            .with_package("amsmath")
            .with_standalone(false);

        assert_eq!(options.document_class.name(), "report");
        assert_eq!(options.font_size.class_option(), "12pt");
        assert_eq!(options.line_spacing.latex_command(), Some("\\doublespacing"));
        assert_eq!(options.custom_packages, vec!["amsmath".to_string()]);
        assert!(!options.standalone);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RenderOptions::new().with_uniform_margin(0.0).validate().is_err());
        assert!(RenderOptions::new().with_image_max_width(-1.0).validate().is_err());
        assert!(RenderOptions::new()
            .with_image_width("0.5\\textwidth}")
            .validate()
            .is_err());
        assert!(RenderOptions::new()
            .with_package("bad name")
            .validate()
            .is_err());
        assert!(RenderOptions::new()
            .with_bibliography_title("  ")
            .validate()
            .is_err());
        assert!(RenderOptions::new()
            .with_bibliography_style("plain}\\input{x")
            .validate()
            .is_err());
        assert!(RenderOptions::new()
            .with_bibliography_style("abbrvnat")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: RenderOptions =
            serde_json::from_str(r#"{"font_size": "12pt", "line_spacing": "one_half"}"#).unwrap();
        assert_eq!(options.font_size, FontSize::Pt12);
        assert_eq!(options.line_spacing, LineSpacing::OneHalf);
        assert_eq!(options.document_class, DocumentClass::Article);
        assert_eq!(options.bibliography_title, "References");
        assert_eq!(options.bibliography_style, None);

        let options: RenderOptions =
            serde_json::from_str(r#"{"bibliography_style": "unsrt"}"#).unwrap();
        assert_eq!(options.bibliography_style.as_deref(), Some("unsrt"));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(FontSize::parse("10"), Some(FontSize::Pt10));
        assert_eq!(FontSize::parse("11pt"), Some(FontSize::Pt11));
        assert_eq!(FontSize::parse("14"), None);
        assert_eq!(LineSpacing::parse("1.5"), Some(LineSpacing::OneHalf));
        assert_eq!(LineSpacing::docx_line(&LineSpacing::Double), 480);
        assert_eq!(
            Margins::uniform(1.5).geometry(),
            "top=1.5in,right=1.5in,bottom=1.5in,left=1.5in"
        );
    }
}
