//! HTML serialization

use crate::{Document, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
];

/// Elements whose text children are emitted verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

impl Document {
    /// Markup of the node itself and its subtree
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, false, &mut out);
        out
    }

    /// Markup of the node's children (template content for `<template>`)
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_children(id, &mut out);
        out
    }

    fn write_children(&self, id: NodeId, out: &mut String) {
        let source = self.template_content(id).unwrap_or(id);
        let raw = self.tag_name(id).is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
        for child in self.children(source) {
            self.write_node(child, raw, out);
        }
    }

    fn write_node(&self, id: NodeId, raw: bool, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.data {
            NodeData::Document | NodeData::Fragment => self.write_children(id, out),
            NodeData::Text(text) if raw => out.push_str(text),
            NodeData::Text(text) => escape_into(text, false, out),
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for attr in element.attrs.iter() {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    escape_into(&attr.value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&element.tag.as_str()) {
                    return;
                }
                self.write_children(id, out);
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outer_html() {
        let mut doc = Document::new();
        let div = doc.create_element("div");
        doc.set_attribute(div, "d-show", "a && \"b\"").unwrap();
        let br = doc.create_element("br");
        let text = doc.create_text("1 < 2 & 3");
        doc.append_child(div, br).unwrap();
        doc.append_child(div, text).unwrap();

        assert_eq!(
            doc.outer_html(div),
            "<div d-show=\"a &amp;&amp; &quot;b&quot;\"><br>1 &lt; 2 &amp; 3</div>"
        );
    }

    #[test]
    fn test_template_serializes_content() {
        let mut doc = Document::new();
        let template = doc.create_element("template");
        let content = doc.template_content(template).unwrap();
        let li = doc.create_element("li");
        doc.append_child(content, li).unwrap();
        assert_eq!(doc.outer_html(template), "<template><li></li></template>");
    }
}
