//! Fixed package parts of a generated DOCX file.

use super::RenderOptions;
use crate::model::Metadata;
use chrono::SecondsFormat;
use quick_xml::escape::escape;
use std::borrow::Cow;
use std::collections::BTreeSet;

pub(crate) const XML_DECLARATION: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

pub(crate) const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const NS_R: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(crate) const NS_WP: &str =
    "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub(crate) const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_CORE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub(crate) const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Heading sizes in half-points, level 1 first.
const HEADING_SIZES: [u32; 6] = [32, 28, 26, 24, 22, 22];

/// Whether XML 1.0 allows `c` in a document.
pub(crate) fn is_xml_char(c: char) -> bool {
    !matches!(
        c,
        '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}'
    )
}

/// Number of characters in `text` that XML 1.0 cannot carry.
pub(crate) fn invalid_xml_chars(text: &str) -> usize {
    text.chars().filter(|&c| !is_xml_char(c)).count()
}

/// Escape text for content or attribute values, dropping characters XML
/// cannot carry.
pub(crate) fn xml_escape(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        return escape(text);
    }
    let kept: String = text.chars().filter(|&c| is_xml_char(c)).collect();
    Cow::Owned(escape(kept.as_str()).into_owned())
}

/// A relationship from `word/document.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartRelationship {
    pub id: String,
    pub kind: &'static str,
    pub target: String,
    pub external: bool,
}

/// `[Content_Types].xml` covering the given media extensions.
pub(crate) fn content_types(extensions: &BTreeSet<String>) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    );
    out.push_str(
        "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    );
    out.push_str("<Default Extension=\"xml\" ContentType=\"application/xml\"/>");
    for ext in extensions {
        let mime = crate::model::Resource::mime_for_extension(ext)
            .unwrap_or("application/octet-stream");
        out.push_str(&format!(
            "<Default Extension=\"{}\" ContentType=\"{}\"/>",
            xml_escape(ext.as_str()),
            mime
        ));
    }
    out.push_str(
        "<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>",
    );
    out.push_str(
        "<Override PartName=\"/word/styles.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml\"/>",
    );
    out.push_str(
        "<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>",
    );
    out.push_str("</Types>");
    out
}

/// `_rels/.rels`.
pub(crate) fn package_relationships() -> String {
    relationships(&[
        PartRelationship {
            id: "rId1".to_string(),
            kind: REL_OFFICE_DOCUMENT,
            target: "word/document.xml".to_string(),
            external: false,
        },
        PartRelationship {
            id: "rId2".to_string(),
            kind: REL_CORE,
            target: "docProps/core.xml".to_string(),
            external: false,
        },
    ])
}

/// `word/_rels/document.xml.rels`; `rId1` is always the styles part.
pub(crate) fn document_relationships(images: &[PartRelationship]) -> String {
    let mut rels = vec![PartRelationship {
        id: "rId1".to_string(),
        kind: REL_STYLES,
        target: "styles.xml".to_string(),
        external: false,
    }];
    rels.extend(images.iter().cloned());
    relationships(&rels)
}

fn relationships(rels: &[PartRelationship]) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for rel in rels {
        out.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"{}/>",
            rel.id,
            rel.kind,
            xml_escape(rel.target.as_str()),
            if rel.external {
                " TargetMode=\"External\""
            } else {
                ""
            }
        ));
    }
    out.push_str("</Relationships>");
    out
}

/// `word/styles.xml` derived from the render options.
pub(crate) fn styles(options: &RenderOptions) -> String {
    let font = xml_escape(options.font_name.as_str());
    let size = options.font_size.points() * 2;

    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!("<w:styles xmlns:w=\"{}\">", NS_W));
    out.push_str(&format!(
        "<w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii=\"{f}\" w:hAnsi=\"{f}\" w:eastAsia=\"{f}\" w:cs=\"{f}\"/><w:sz w:val=\"{s}\"/><w:szCs w:val=\"{s}\"/></w:rPr></w:rPrDefault>\
         <w:pPrDefault><w:pPr><w:spacing w:after=\"160\" w:line=\"{l}\" w:lineRule=\"auto\"/></w:pPr></w:pPrDefault></w:docDefaults>",
        f = font,
        s = size,
        l = options.line_spacing.docx_line()
    ));
    out.push_str(
        "<w:style w:type=\"paragraph\" w:default=\"1\" w:styleId=\"Normal\"><w:name w:val=\"Normal\"/><w:qFormat/></w:style>",
    );
    out.push_str(
        "<w:style w:type=\"paragraph\" w:styleId=\"Title\"><w:name w:val=\"Title\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
         <w:pPr><w:spacing w:after=\"240\"/><w:jc w:val=\"center\"/></w:pPr><w:rPr><w:b/><w:sz w:val=\"48\"/><w:szCs w:val=\"48\"/></w:rPr></w:style>",
    );
    for (i, half_points) in HEADING_SIZES.iter().enumerate() {
        let level = i + 1;
        out.push_str(&format!(
            "<w:style w:type=\"paragraph\" w:styleId=\"Heading{level}\"><w:name w:val=\"heading {level}\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
             <w:pPr><w:keepNext/><w:spacing w:before=\"240\" w:after=\"80\"/><w:outlineLvl w:val=\"{outline}\"/></w:pPr>\
             <w:rPr><w:b/><w:sz w:val=\"{hp}\"/><w:szCs w:val=\"{hp}\"/></w:rPr></w:style>",
            level = level,
            outline = level - 1,
            hp = half_points
        ));
    }
    out.push_str(
        "<w:style w:type=\"paragraph\" w:styleId=\"Caption\"><w:name w:val=\"caption\"/><w:basedOn w:val=\"Normal\"/><w:next w:val=\"Normal\"/><w:qFormat/>\
         <w:pPr><w:jc w:val=\"center\"/></w:pPr><w:rPr><w:i/><w:sz w:val=\"18\"/><w:szCs w:val=\"18\"/></w:rPr></w:style>",
    );
    out.push_str(
        "<w:style w:type=\"table\" w:styleId=\"TableGrid\"><w:name w:val=\"Table Grid\"/><w:tblPr><w:tblBorders>\
         <w:top w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/><w:left w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
         <w:bottom w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/><w:right w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
         <w:insideH w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/><w:insideV w:val=\"single\" w:sz=\"4\" w:space=\"0\" w:color=\"auto\"/>\
         </w:tblBorders></w:tblPr></w:style>",
    );
    out.push_str("</w:styles>");
    out
}

/// `docProps/core.xml`.
///
/// The free-form LaTeX date line has no core property and is not written.
pub(crate) fn core_properties(metadata: &Metadata) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(
        "<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">",
    );
    if let Some(title) = &metadata.title {
        out.push_str(&format!("<dc:title>{}</dc:title>", xml_escape(title.as_str())));
    }
    if let Some(author) = &metadata.author {
        out.push_str(&format!("<dc:creator>{}</dc:creator>", xml_escape(author.as_str())));
    }
    for (name, value) in [
        ("dcterms:created", metadata.created),
        ("dcterms:modified", metadata.modified),
    ] {
        if let Some(date) = value {
            out.push_str(&format!(
                "<{n} xsi:type=\"dcterms:W3CDTF\">{}</{n}>",
                date.to_rfc3339_opts(SecondsFormat::Secs, true),
                n = name
            ));
        }
    }
    out.push_str("</cp:coreProperties>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::xml;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_content_types_lists_media() {
        let exts: BTreeSet<String> = ["png".to_string(), "jpg".to_string()].into();
        let out = content_types(&exts);
        assert!(out.contains("Extension=\"png\" ContentType=\"image/png\""));
        assert!(out.contains("Extension=\"jpg\" ContentType=\"image/jpeg\""));
        assert!(xml::parse(&out).is_ok());
    }

    #[test]
    fn test_styles_follow_options() {
        let options = RenderOptions::new()
            .with_font_name("Times & Co")
            .with_font_size(crate::render::FontSize::Pt12)
            .with_line_spacing(crate::render::LineSpacing::Double);
        let out = styles(&options);
        let root = xml::parse(&out).unwrap();
        assert_eq!(root.children_named("w:style").count(), 10);
        assert!(out.contains("w:ascii=\"Times &amp; Co\""));
        assert!(out.contains("<w:sz w:val=\"24\"/>"));
        assert!(out.contains("w:line=\"480\""));
        assert!(out.contains("w:styleId=\"Heading6\""));
    }

    #[test]
    fn test_core_properties() {
        let metadata = Metadata {
            title: Some("A < B".to_string()),
            author: Some("Jane".to_string()),
            date: Some("Spring".to_string()),
            created: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            modified: None,
        };
        let out = core_properties(&metadata);
        assert!(out.contains("<dc:title>A &lt; B</dc:title>"));
        assert!(out.contains("2024-03-01T12:00:00Z"));
        assert!(!out.contains("Spring"));
        assert!(xml::parse(&out).is_ok());
    }

    #[test]
    fn test_xml_escape_drops_control_characters() {
        assert_eq!(xml_escape("a\u{1}b\u{0}<c>"), "ab&lt;c&gt;");
        assert_eq!(xml_escape("tab\tline\n"), "tab\tline\n");
        assert!(matches!(xml_escape("plain"), Cow::Borrowed("plain")));
        assert_eq!(invalid_xml_chars("x\u{b}y\u{1f}\u{ffff}"), 3);
        assert_eq!(invalid_xml_chars("\r\n\té"), 0);
    }

    #[test]
    fn test_external_relationship() {
        let out = document_relationships(&[PartRelationship {
            id: "rId2".to_string(),
            kind: REL_IMAGE,
            target: "https://example.com/a.png?x=1&y=2".to_string(),
            external: true,
        }]);
        assert!(out.contains("TargetMode=\"External\""));
        assert!(out.contains("x=1&amp;y=2"));
    }
}
