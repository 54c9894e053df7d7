//! Small XML tree builder over quick-xml.
//!
//! Package parts of a DOCX file are a few hundred kilobytes at most, so they
//! are read into an owned element tree and walked from there. Element names
//! keep their prefix (`w:p`, `a:blip`) because WordprocessingML producers
//! use the conventional prefixes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Deepest element nesting accepted by [`parse`]. Tree walks recurse per
/// level, so deeper input is rejected instead of walked.
pub(crate) const MAX_DEPTH: usize = 256;

/// An element with attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    /// Attribute value by qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// Child elements with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.elements().filter(move |e| e.name == name)
    }

    /// First descendant (depth-first, excluding self) with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in self.elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text of all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }
}

/// Parse a document into its root element.
pub(crate) fn parse(content: &str) -> Result<XmlElement, String> {
    let content = content.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text_start = false;
    reader.config_mut().trim_text_end = false;

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(format!(
                        "elements nested deeper than {} levels at byte {}",
                        MAX_DEPTH,
                        reader.buffer_position()
                    ));
                }
                stack.push(start_element(&e)?)
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "unexpected closing tag".to_string())?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Empty(e)) => {
                let element = start_element(&e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| format!("invalid text content: {}", err))?;
                if let Some(node) = stack.last_mut() {
                    // Whitespace between elements is layout, not content.
                    if text.trim().is_empty() && !node.children.is_empty() {
                        continue;
                    }
                    node.children.push(XmlNode::Text(text.into_owned()));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(node) = stack.last_mut() {
                    node.children
                        .push(XmlNode::Text(String::from_utf8_lossy(e.as_ref()).into_owned()));
                }
            }
            Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML syntax error at byte {}: {}",
                    reader.error_position(),
                    e
                ))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unexpected end of document inside <{}>", open.name));
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn start_element(e: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("invalid attribute in <{}>: {}", name, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| format!("invalid attribute value in <{}>: {}", name, err))?;
        attributes.push((key, value.into_owned()));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err("multiple root elements".to_string()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree() {
        let root = parse(
            r#"<?xml version="1.0"?><w:p><w:r><w:t xml:space="preserve"> Hi &amp; bye </w:t></w:r><w:r><w:br/></w:r></w:p>"#,
        )
        .unwrap();
        assert_eq!(root.name, "w:p");
        assert_eq!(root.children_named("w:r").count(), 2);

        let t = root.find("w:t").unwrap();
        assert_eq!(t.attr("xml:space"), Some("preserve"));
        assert_eq!(t.text(), " Hi & bye ");
        assert!(root.find("w:br").is_some());
    }

    #[test]
    fn test_whitespace_between_elements_dropped() {
        let root = parse("<a>\n  <b/>\n  <c/>\n</a>").unwrap();
        assert_eq!(root.elements().count(), 2);
        assert_eq!(root.children.len(), 3);
    }

    #[test]
    fn test_unclosed_element() {
        assert!(parse("<a><b></b>").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}x{}", "<a>".repeat(depth), "</a>".repeat(depth));

        let root = parse(&nested(MAX_DEPTH)).unwrap();
        assert_eq!(root.text(), "x");
        assert!(root.find("b").is_none());

        let err = parse(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.contains("nested deeper"));
        assert!(parse(&"<a>".repeat(100_000)).is_err());
    }

    #[test]
    fn test_mismatched_end() {
        assert!(parse("<a><b></a></b>").is_err());
    }
}
