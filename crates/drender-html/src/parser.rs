//! HTML5 Parser implementation
//!
//! Uses html5ever's built-in RcDom and converts it into the arena document.
//! Whitespace-only text nodes are dropped.

use crate::HtmlError;
use drender_dom::{Document, NodeId};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// HTML5 parser
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    fn parse_rcdom(&self, html: &str) -> Result<RcDom, HtmlError> {
        let dom = parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())?;
        Ok(dom)
    }

    /// Parse HTML string into a Document
    pub fn parse(&self, html: &str) -> Result<Document, HtmlError> {
        tracing::debug!("Parsing HTML document ({} bytes)", html.len());

        let dom = self.parse_rcdom(html)?;
        let mut document = Document::empty();
        self.convert_node(&dom.document, &mut document, NodeId::ROOT)?;
        document.refresh_structure();

        tracing::debug!("Parsed {} nodes", document.tree().len());
        Ok(document)
    }

    /// Parse markup as body content and append it under `parent`.
    ///
    /// The nodes are built in a detached fragment first so the document
    /// sees a single insertion. Returns the inserted top-level nodes.
    pub fn parse_fragment_into(&self, doc: &mut Document, parent: NodeId, html: &str) -> Result<Vec<NodeId>, HtmlError> {
        let dom = self.parse_rcdom(html)?;
        let body = find_body(&dom.document).ok_or(HtmlError::MissingBody)?;

        let fragment = doc.create_fragment();
        for child in body.children.borrow().iter() {
            self.convert_node(child, doc, fragment)?;
        }
        let inserted = doc.children(fragment);
        let target = doc.template_content(parent).unwrap_or(parent);
        doc.append_child(target, fragment)?;
        Ok(inserted)
    }

    /// Convert an RcDom node to our DOM format
    fn convert_node(&self, handle: &Handle, doc: &mut Document, parent: NodeId) -> Result<(), HtmlError> {
        match &handle.data {
            RcNodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.convert_node(child, doc, parent)?;
                }
            }
            RcNodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if !text.trim().is_empty() {
                    let id = doc.create_text(&text);
                    doc.append_child(parent, id)?;
                }
            }
            RcNodeData::Comment { contents } => {
                let id = doc.create_comment(contents);
                doc.append_child(parent, id)?;
            }
            RcNodeData::Element { name, attrs, template_contents, .. } => {
                let id = doc.create_element(&name.local);
                for attr in attrs.borrow().iter() {
                    doc.set_attribute(id, &attr.name.local, &attr.value)?;
                }
                doc.append_child(parent, id)?;

                // <template> children live in its content fragment
                let content = template_contents.borrow().clone();
                match (content, doc.template_content(id)) {
                    (Some(content), Some(fragment)) => {
                        for child in content.children.borrow().iter() {
                            self.convert_node(child, doc, fragment)?;
                        }
                    }
                    _ => {
                        for child in handle.children.borrow().iter() {
                            self.convert_node(child, doc, id)?;
                        }
                    }
                }
            }
            RcNodeData::Doctype { .. } | RcNodeData::ProcessingInstruction { .. } => {}
        }
        Ok(())
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

fn find_body(handle: &Handle) -> Option<Handle> {
    if let RcNodeData::Element { name, .. } = &handle.data {
        if name.local.as_ref() == "body" {
            return Some(handle.clone());
        }
    }
    handle.children.borrow().iter().find_map(find_body)
}

/// Replace the children of `node` with parsed markup
pub fn set_inner_html(doc: &mut Document, node: NodeId, html: &str) -> Result<(), HtmlError> {
    let target = doc.template_content(node).unwrap_or(node);
    doc.clear_children(target)?;
    if !html.is_empty() {
        HtmlParser::new().parse_fragment_into(doc, target, html)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
        let doc = HtmlParser::new().parse(html).unwrap();

        let body = doc.body().unwrap();
        let p = doc.first_element_child(body).unwrap();
        assert_eq!(doc.tag_name(p), Some("p"));
        assert_eq!(doc.text_content(p), "Hello");
    }

    #[test]
    fn test_parse_wraps_fragments() {
        let doc = HtmlParser::new().parse("<div><span>Text</span></div>").unwrap();
        // html5ever always produces html/head/body
        assert!(doc.head().is_some());
        let div = doc.first_element_child(doc.body().unwrap()).unwrap();
        assert_eq!(doc.tag_name(div), Some("div"));
    }

    #[test]
    fn test_template_content_is_inert() {
        let doc = HtmlParser::new()
            .parse("<ul d-loop=\"items\"><template><li d-key=\"loopItem.id\"></li></template></ul>")
            .unwrap();
        let ul = doc.first_element_child(doc.body().unwrap()).unwrap();
        let template = doc.first_element_child(ul).unwrap();
        assert!(doc.children(template).is_empty());

        let content = doc.template_content(template).unwrap();
        let li = doc.first_element_child(content).unwrap();
        assert_eq!(doc.get_attribute(li, "d-key"), Some("loopItem.id"));
        assert!(!doc.is_connected(li));
    }

    #[test]
    fn test_set_inner_html() {
        let mut doc = HtmlParser::new().parse("<div id=\"a\">old</div>").unwrap();
        let div = doc.first_element_child(doc.body().unwrap()).unwrap();
        set_inner_html(&mut doc, div, "<b>new</b> text").unwrap();
        assert_eq!(doc.inner_html(div), "<b>new</b> text");
        set_inner_html(&mut doc, div, "").unwrap();
        assert!(doc.children(div).is_empty());
    }
}
