//! DOCX decoding of hand-built packages and encoding checks.

mod common;

use common::{png, DocxFixture};
use texbridge::{
    convert, decode, Block, Confidence, Context, Converter, Error, Format, Heading, Image, Inline,
    NullResolver, TableCell, WarningKind,
};

#[test]
fn test_headings_and_emphasis() {
    let docx = DocxFixture::new()
        .heading(1, "Intro")
        .heading(3, "Detail")
        .raw(concat!(
            r#"<w:p><w:r><w:rPr><w:b/><w:i/></w:rPr><w:t>Both</w:t></w:r>"#,
            r#"<w:r><w:t xml:space="preserve"> then </w:t></w:r>"#,
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r></w:p>"#
        ))
        .build();

    let doc = decode(&docx, Format::Docx).unwrap();
    assert_eq!(
        doc.blocks,
        vec![
            Block::Heading(Heading::new(1, vec![Inline::text("Intro")])),
            Block::Heading(Heading::new(3, vec![Inline::text("Detail")])),
            Block::paragraph(vec![
                Inline::BoldItalic(vec![Inline::text("Both")]),
                Inline::text(" then "),
                Inline::bold("bold"),
            ]),
        ]
    );
}

#[test]
fn test_reference_section_extracted() {
    let docx = DocxFixture::new()
        .heading(1, "Intro")
        .paragraph("As argued in [doe2020], results vary.")
        .heading(1, "References")
        .paragraph("[doe2020] Doe, J. (2020). Title.")
        .build();

    let doc = decode(&docx, Format::Docx).unwrap();
    assert_eq!(
        doc.blocks[1],
        Block::paragraph(vec![
            Inline::text("As argued in "),
            Inline::cite("doe2020"),
            Inline::text(", results vary."),
        ])
    );
    assert!(!doc
        .blocks
        .iter()
        .any(|b| b.plain_text() == "References"));

    let entries: Vec<_> = doc.bibliography().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "doe2020");
    assert_eq!(entries[0].field("author"), Some("Doe, J."));
    assert_eq!(entries[0].field("year"), Some("2020"));
    assert_eq!(entries[0].field("title"), Some("Title."));
    assert_eq!(entries[0].confidence, Confidence::High);
}

#[test]
fn test_author_year_citation_linked() {
    let docx = DocxFixture::new()
        .paragraph("Prior work (Smith, 2019) disagrees.")
        .heading(1, "Bibliography")
        .paragraph("Smith, A. (2019). Another title.")
        .paragraph("Unstructured note without a year")
        .build();

    let mut ctx = Context::new();
    let doc = Converter::new().decode(&docx, Format::Docx, &mut ctx).unwrap();
    assert_eq!(doc.citation_keys(), vec!["smith2019"]);
    let entries: Vec<_> = doc.bibliography().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].confidence, Confidence::Low);
    assert!(ctx.has_warning(WarningKind::ExtractionAmbiguity));
}

#[test]
fn test_table_with_merged_cell() {
    let docx = DocxFixture::new()
        .raw(concat!(
            "<w:tbl>",
            "<w:tr><w:tc><w:p><w:r><w:t>a</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:p><w:r><w:t>b</w:t></w:r></w:p></w:tc></w:tr>",
            r#"<w:tr><w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr>"#,
            "<w:p><w:r><w:t>wide</w:t></w:r></w:p></w:tc></w:tr>",
            "</w:tbl>"
        ))
        .build();

    let doc = decode(&docx, Format::Docx).unwrap();
    let Block::Table(table) = &doc.blocks[0] else {
        panic!("expected table");
    };
    assert_eq!(table.shape(), (2, 2));
    assert_eq!(table.rows[0].cells[1], TableCell::text("b"));
    assert_eq!(table.rows[1].cells[0], TableCell::text("wide"));
    assert!(table.rows[1].cells[1].is_empty());
}

#[test]
fn test_embedded_image_with_caption() {
    let docx = DocxFixture::new()
        .image("rId7", "image1.png", png(40, 30))
        .styled("Caption", "Figure 1")
        .build();

    let doc = decode(&docx, Format::Docx).unwrap();
    assert_eq!(
        doc.blocks,
        vec![Block::Image(
            Image::new("media/image1.png").with_caption(vec![Inline::text("Figure 1")])
        )]
    );
    let resource = doc.get_resource("media/image1.png").unwrap();
    assert_eq!(resource.mime_type, "image/png");
    assert_eq!((resource.width, resource.height), (Some(40), Some(30)));
}

#[test]
fn test_docx_to_latex_carries_media() {
    let docx = DocxFixture::new()
        .heading(1, "Figures")
        .image("rId7", "image1.png", png(40, 30))
        .build();

    let output = convert(&docx, Format::Docx, Format::Latex, &NullResolver).unwrap();
    let latex = output.as_text().unwrap();
    assert!(latex.contains("\\usepackage{graphicx}"));
    assert!(latex.contains("{media/image1.png}"));
    assert_eq!(output.resources.len(), 1);
    assert_eq!(output.resources["media/image1.png"].data, png(40, 30));
    assert!(output.warnings.is_empty());
}

#[test]
fn test_missing_image_part_warns() {
    let docx = DocxFixture::new()
        .raw(concat!(
            r#"<w:p><w:r><w:drawing><wp:inline><a:graphic><a:graphicData><pic:pic>"#,
            r#"<pic:blipFill><a:blip r:embed="rId404"/></pic:blipFill>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ))
        .paragraph("after")
        .build();

    let output = convert(&docx, Format::Docx, Format::Latex, &NullResolver).unwrap();
    assert!(output
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::Resource));
    assert!(output.as_text().unwrap().contains("after"));
}

#[test]
fn test_title_paragraph_becomes_metadata() {
    let docx = DocxFixture::new()
        .styled("Title", "A Study")
        .paragraph("Body")
        .build();

    let doc = decode(&docx, Format::Docx).unwrap();
    assert_eq!(doc.metadata.title.as_deref(), Some("A Study"));
    assert_eq!(doc.blocks, vec![Block::paragraph(vec![Inline::text("Body")])]);
}

#[test]
fn test_not_a_package() {
    let result = convert(b"\\section{x}", Format::Docx, Format::Latex, &NullResolver);
    assert!(matches!(
        result,
        Err(Error::Decode {
            format: Format::Docx,
            ..
        })
    ));
}

#[test]
fn test_deeply_nested_body_is_rejected() {
    let depth = 5_000;
    let docx = DocxFixture::new()
        .raw(&format!(
            "{}<w:p><w:r><w:t>deep</w:t></w:r></w:p>{}",
            "<w:customXml>".repeat(depth),
            "</w:customXml>".repeat(depth)
        ))
        .build();

    let err = decode(&docx, Format::Docx).unwrap_err();
    assert!(err.is_decode());
    assert!(err.to_string().contains("nested deeper"));
}

#[test]
fn test_moderate_nesting_is_walked() {
    let depth = 20;
    let docx = DocxFixture::new()
        .raw(&format!(
            "{}<w:p><w:r><w:t>inside</w:t></w:r></w:p>{}",
            "<w:customXml>".repeat(depth),
            "</w:customXml>".repeat(depth)
        ))
        .build();

    let doc = decode(&docx, Format::Docx).unwrap();
    assert_eq!(doc.blocks, vec![Block::paragraph(vec![Inline::text("inside")])]);
}
