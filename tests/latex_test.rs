//! LaTeX decoding and encoding through the public API.

mod common;

use texbridge::{
    convert, decode, encode, Block, Confidence, Context, Converter, ConvertOptions, Error,
    Format, Heading, Inline, NullResolver, ParseOptions, RenderOptions, WarningKind,
};

const INTRO: &str = r"\section{Intro}\textbf{Hello} \textit{world}";

#[test]
fn test_intro_decodes_to_model() {
    let doc = decode(INTRO.as_bytes(), Format::Latex).unwrap();
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
fn test_intro_encodes_to_docx() {
    let output = convert(INTRO.as_bytes(), Format::Latex, Format::Docx, &NullResolver).unwrap();
    assert!(output.warnings.is_empty());

    let body = common::read_part(&output.content, "word/document.xml");
    assert_eq!(body.matches("<w:pStyle w:val=\"Heading1\"/>").count(), 1);
    assert!(body.contains("<w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">Hello</w:t>"));
    assert!(body.contains("<w:rPr><w:i/></w:rPr><w:t xml:space=\"preserve\">world</w:t>"));
}

#[test]
fn test_unterminated_table_is_decode_error() {
    let input = b"\\section{Data}\n\\begin{tabular}{ll}\na & b \\\\\nc & d \\\\\n";
    let result = convert(input, Format::Latex, Format::Docx, &NullResolver);
    assert!(matches!(
        result,
        Err(Error::Decode {
            format: Format::Latex,
            ..
        })
    ));
}

#[test]
fn test_lenient_mode_recovers_unterminated_table() {
    let input = b"\\begin{tabular}{ll}\na & b \\\\\nc & d \\\\\n";
    let converter = Converter::with_options(
        ConvertOptions::new().with_parse_options(ParseOptions::new().lenient()),
    );
    let output = converter
        .convert(input, Format::Latex, Format::Latex, &NullResolver)
        .unwrap();
    assert_eq!(output.stats.table_count, 1);
    assert_eq!(output.stats.cell_count, 4);
    assert!(!output.warnings.is_empty());
}

#[test]
fn test_bibliography_and_citations() {
    let input = "\\section{Intro}\nAs shown \\cite{doe2020, roe2019}.\n\
                 \\begin{thebibliography}{9}\n\
                 \\bibitem{doe2020} Doe, J. (2020). Title.\n\
                 \\bibitem{roe2019} Notes from a conversation\n\
                 \\end{thebibliography}\n";
    let mut ctx = Context::new();
    let doc = Converter::new()
        .decode(input.as_bytes(), Format::Latex, &mut ctx)
        .unwrap();

    assert_eq!(doc.citation_keys(), vec!["doe2020", "roe2019"]);
    let entries: Vec<_> = doc.bibliography().collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, "doe2020");
    assert_eq!(entries[0].field("author"), Some("Doe, J."));
    assert_eq!(entries[0].field("year"), Some("2020"));
    assert_eq!(entries[0].field("title"), Some("Title."));
    assert_eq!(entries[0].confidence, Confidence::High);
    assert_eq!(entries[1].confidence, Confidence::Low);
    assert!(ctx.has_warning(WarningKind::ExtractionAmbiguity));
}

#[test]
fn test_dangling_citation_survives() {
    let doc = decode(b"See \\cite{nokey}.", Format::Latex).unwrap();
    assert_eq!(doc.citation_keys(), vec!["nokey"]);

    let latex = encode(&doc, Format::Latex, &RenderOptions::new().with_standalone(false)).unwrap();
    assert!(String::from_utf8(latex).unwrap().contains("\\cite{nokey}"));

    let docx = encode(&doc, Format::Docx, &RenderOptions::default()).unwrap();
    let body = common::read_part(&docx, "word/document.xml");
    assert!(body.contains("nokey"));
    assert!(!body.contains("[nokey]"));
}

#[test]
fn test_unknown_constructs_warn_but_convert() {
    let input = "\\section{Math}\nEnergy $E = mc^2$ and \\foo{bar}.\n\\begin{itemize}\\item one\\end{itemize}\n";
    let output = convert(input.as_bytes(), Format::Latex, Format::Latex, &NullResolver).unwrap();
    assert!(!output.warnings.is_empty());
    assert!(output
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::UnsupportedConstruct || w.kind == WarningKind::Degraded));
    assert!(output.as_text().unwrap().contains("\\section{Math}"));
}

#[test]
fn test_adjacent_dangling_citations_keep_boundaries() {
    let output = convert(br"see \cite{smith,jones}.", Format::Latex, Format::Docx, &NullResolver)
        .unwrap();
    let doc = decode(&output.content, Format::Docx).unwrap();
    assert_eq!(doc.blocks.len(), 1);
    assert_eq!(doc.blocks[0].plain_text(), "see smith, jones.");
}

#[test]
fn test_adjacent_resolved_citations_link_again() {
    let input = "see \\cite{a,b}.\n\n\
                 \\begin{thebibliography}{9}\n\
                 \\bibitem{a} Doe, J. (2020). Alpha.\n\
                 \\bibitem{b} Roe, R. (2019). Beta.\n\
                 \\end{thebibliography}\n";
    let output = convert(input.as_bytes(), Format::Latex, Format::Docx, &NullResolver).unwrap();
    let doc = decode(&output.content, Format::Docx).unwrap();
    assert_eq!(
        doc.blocks[0],
        Block::paragraph(vec![
            Inline::text("see "),
            Inline::cite("a"),
            Inline::cite("b"),
            Inline::text("."),
        ])
    );
    assert_eq!(doc.bibliography().count(), 2);
}

#[test]
fn test_control_characters_do_not_reach_docx() {
    let mut ctx = Context::new();
    let converter = Converter::new();
    let doc = converter
        .decode("a\u{1}b and x\u{0}y".as_bytes(), Format::Latex, &mut ctx)
        .unwrap();
    let docx = converter.encode(&doc, Format::Docx, &mut ctx).unwrap();

    let body = common::read_part(&docx, "word/document.xml");
    assert!(!body.chars().any(|c| c < ' ' && c != '\t' && c != '\n' && c != '\r'));
    assert!(body.contains("ab and xy"));
    assert!(ctx.has_warning(WarningKind::Degraded));
}

#[test]
fn test_bibliography_style_survives_redecode() {
    let input = "See \\cite{doe2020}.\n\n\
                 \\begin{thebibliography}{9}\n\
                 \\bibitem{doe2020} Doe, J. (2020). Title.\n\
                 \\end{thebibliography}\n";
    let doc = decode(input.as_bytes(), Format::Latex).unwrap();
    let options = RenderOptions::new().with_bibliography_style("plainnat");
    let latex = String::from_utf8(encode(&doc, Format::Latex, &options).unwrap()).unwrap();
    assert!(latex.contains("\\bibliographystyle{plainnat}"));

    let mut ctx = Context::new();
    let again = Converter::new()
        .decode(latex.as_bytes(), Format::Latex, &mut ctx)
        .unwrap();
    assert_eq!(again.citation_keys(), vec!["doe2020"]);
    assert_eq!(again.bibliography().count(), 1);
    assert!(!ctx.has_warning(WarningKind::UnsupportedConstruct));
}
