//! Hand-built DOCX packages for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="png" ContentType="image/png"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

/// Builder for a minimal DOCX package.
#[derive(Default)]
pub struct DocxFixture {
    paragraphs: Vec<String>,
    images: Vec<(String, String, Vec<u8>)>,
}

impl DocxFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw body XML.
    pub fn raw(mut self, xml: &str) -> Self {
        self.paragraphs.push(xml.to_string());
        self
    }

    pub fn heading(self, level: u8, text: &str) -> Self {
        self.styled(&format!("Heading{}", level), text)
    }

    pub fn styled(self, style: &str, text: &str) -> Self {
        let xml = format!(
            r#"<w:p><w:pPr><w:pStyle w:val="{}"/></w:pPr><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            style, text
        );
        self.raw(&xml)
    }

    pub fn paragraph(self, text: &str) -> Self {
        let xml = format!(
            r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            text
        );
        self.raw(&xml)
    }

    /// Embed an image part and reference it from an inline drawing.
    pub fn image(mut self, id: &str, name: &str, data: Vec<u8>) -> Self {
        let xml = format!(
            concat!(
                r#"<w:p><w:r><w:drawing><wp:inline><wp:extent cx="952500" cy="952500"/>"#,
                r#"<a:graphic><a:graphicData><pic:pic><pic:blipFill><a:blip r:embed="{}"/>"#,
                r#"</pic:blipFill></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
            ),
            id
        );
        self.images.push((id.to_string(), name.to_string(), data));
        self.raw(&xml)
    }

    pub fn build(self) -> Vec<u8> {
        let document = format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
                r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
                r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
                r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
                r#"<w:body>{}<w:sectPr/></w:body></w:document>"#
            ),
            self.paragraphs.concat()
        );

        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (id, name, _) in &self.images {
            rels.push_str(&format!(
                r#"<Relationship Id="{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/{}"/>"#,
                id, name
            ));
        }
        rels.push_str("</Relationships>");

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        let mut add = |name: &str, data: &[u8]| {
            zip.start_file(name, options).unwrap();
            zip.write_all(data).unwrap();
        };
        add("[Content_Types].xml", CONTENT_TYPES.as_bytes());
        add("_rels/.rels", PACKAGE_RELS.as_bytes());
        add("word/document.xml", document.as_bytes());
        add("word/_rels/document.xml.rels", rels.as_bytes());
        for (_, name, data) in &self.images {
            add(&format!("word/media/{}", name), data);
        }
        zip.finish().unwrap().into_inner()
    }
}

/// PNG signature and IHDR header with the given pixel size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.extend_from_slice(&13u32.to_be_bytes());
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}

/// Read one part of a DOCX package as text.
pub fn read_part(docx: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
    let mut part = archive.by_name(name).unwrap();
    let mut content = String::new();
    part.read_to_string(&mut content).unwrap();
    content
}
