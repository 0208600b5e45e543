//! Document - High-level document API
//!
//! Every structural or attribute edit goes through [`Document`] so that the
//! mutation log sees it.

use crate::{
    DOMTokenList, DomError, DomResult, DomTree, ElementData, ListenerId, MutationLog,
    MutationObserverInit, MutationRecord, Node, NodeData, NodeId, Selector,
};
use serde_json::Value;

/// Properties backed by a boolean content attribute
const BOOLEAN_REFLECTED: &[(&str, &str)] = &[
    ("disabled", "disabled"),
    ("readOnly", "readonly"),
    ("hidden", "hidden"),
    ("required", "required"),
];

/// Properties backed by a string content attribute
const STRING_REFLECTED: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("className", "class"),
    ("name", "name"),
    ("type", "type"),
    ("placeholder", "placeholder"),
];

/// HTML Document
#[derive(Debug)]
pub struct Document {
    /// The DOM tree
    tree: DomTree,
    /// Cached reference to <html> element
    html_element: NodeId,
    /// Cached reference to <head> element
    head_element: NodeId,
    /// Cached reference to <body> element
    body_element: NodeId,
    mutations: MutationLog,
}

impl Document {
    /// Create a new document with html/head/body
    pub fn new() -> Self {
        let mut doc = Self::empty();
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.link(NodeId::ROOT, html, NodeId::NONE);
        doc.link(html, head, NodeId::NONE);
        doc.link(html, body, NodeId::NONE);
        doc.html_element = html;
        doc.head_element = head;
        doc.body_element = body;
        doc
    }

    /// Create an empty document (no structure)
    pub fn empty() -> Self {
        Self {
            tree: DomTree::new(),
            html_element: NodeId::NONE,
            head_element: NodeId::NONE,
            body_element: NodeId::NONE,
            mutations: MutationLog::new(),
        }
    }

    /// Re-resolve the cached html/head/body references
    pub fn refresh_structure(&mut self) {
        let html = self.element_children(NodeId::ROOT)
            .into_iter()
            .find(|&id| self.tag_name(id) == Some("html"));
        self.html_element = html.unwrap_or(NodeId::NONE);
        self.head_element = NodeId::NONE;
        self.body_element = NodeId::NONE;
        if let Some(html) = html {
            for child in self.element_children(html) {
                match self.tag_name(child) {
                    Some("head") => self.head_element = child,
                    Some("body") => self.body_element = child,
                    _ => {}
                }
            }
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Get <html> element
    pub fn document_element(&self) -> Option<NodeId> {
        self.html_element.some()
    }

    /// Get <head> element
    pub fn head(&self) -> Option<NodeId> {
        self.head_element.some()
    }

    /// Get <body> element
    pub fn body(&self) -> Option<NodeId> {
        self.body_element.some()
    }

    /// Access the DOM tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    fn node_checked(&self, id: NodeId) -> DomResult<&Node> {
        self.tree.get(id).ok_or(DomError::NotFound(id))
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.tree.get(id).and_then(Node::as_element)
    }

    fn element_mut(&mut self, id: NodeId) -> DomResult<&mut ElementData> {
        match self.tree.get_mut(id) {
            Some(node) => node.as_element_mut().ok_or(DomError::NotAnElement(id)),
            None => Err(DomError::NotFound(id)),
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Lowercase tag name
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    // ---- node creation ----

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = self.tree.push(Node::element(tag));
        if tag.eq_ignore_ascii_case("template") {
            let content = self.tree.push(Node::fragment());
            if let Some(e) = self.tree.get_mut(id).and_then(Node::as_element_mut) {
                e.template_content = Some(content);
            }
        }
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.tree.push(Node::text(text))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.tree.push(Node::comment(text))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.tree.push(Node::fragment())
    }

    /// Inert content fragment of a `<template>`
    pub fn template_content(&self, id: NodeId) -> Option<NodeId> {
        self.element(id).and_then(|e| e.template_content)
    }

    // ---- tree edits ----

    /// Append child, moving it out of its current parent first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert child before `reference` (append when None)
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) -> DomResult<()> {
        self.check_insert(parent, child)?;
        if let Some(r) = reference {
            if r == child {
                return Ok(());
            }
            if self.node_checked(r)?.parent != parent {
                return Err(DomError::NotAChild { parent, child: r });
            }
        }

        let moved = if matches!(self.node_checked(child)?.data, NodeData::Fragment) {
            let kids = self.children(child);
            for &k in &kids {
                self.unlink(k);
            }
            kids
        } else {
            if let Some(old_parent) = self.detach(child) {
                self.record_child_list(old_parent, Vec::new(), vec![child]);
            }
            vec![child]
        };

        let before = reference.unwrap_or(NodeId::NONE);
        for &node in &moved {
            self.link(parent, node, before);
        }
        if !moved.is_empty() {
            self.record_child_list(parent, moved, Vec::new());
        }
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if self.node_checked(child)?.parent != parent {
            return Err(DomError::NotAChild { parent, child });
        }
        self.unlink(child);
        self.record_child_list(parent, Vec::new(), vec![child]);
        Ok(())
    }

    /// Detach node from its parent; no-op when already detached
    pub fn remove(&mut self, node: NodeId) -> DomResult<()> {
        self.node_checked(node)?;
        if let Some(parent) = self.detach(node) {
            self.record_child_list(parent, Vec::new(), vec![node]);
        }
        Ok(())
    }

    /// Remove every child of `node`
    pub fn clear_children(&mut self, node: NodeId) -> DomResult<()> {
        let kids = self.children(node);
        if kids.is_empty() {
            return Ok(());
        }
        for &k in &kids {
            self.unlink(k);
        }
        self.record_child_list(node, Vec::new(), kids);
        Ok(())
    }

    /// Clone a node. Properties and listeners are not copied.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> DomResult<NodeId> {
        let source = self.node_checked(node)?;
        let data = match &source.data {
            NodeData::Element(e) => {
                let mut copy = ElementData::new(&e.tag);
                copy.attrs = e.attrs.clone();
                copy.style = e.style.clone();
                NodeData::Element(copy)
            }
            other => other.clone(),
        };
        let template = self.template_content(node);
        let id = self.tree.push(Node { data, ..Node::fragment() });

        if let Some(content) = template {
            let copy = self.clone_node(content, true)?;
            self.element_mut(id)?.template_content = Some(copy);
        }
        if deep {
            for child in self.children(node) {
                let c = self.clone_node(child, true)?;
                self.link(id, c, NodeId::NONE);
            }
        }
        Ok(id)
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
        let p = self.node_checked(parent)?;
        let c = self.node_checked(child)?;
        let container = matches!(p.data, NodeData::Element(_) | NodeData::Document | NodeData::Fragment);
        if !container || matches!(c.data, NodeData::Document) || self.contains(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    /// Unlink from parent, returning the old parent
    fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.tree.get(child)?.parent.some()?;
        self.unlink(child);
        Some(parent)
    }

    fn unlink(&mut self, child: NodeId) {
        let Some(node) = self.tree.get(child) else { return };
        let (parent, prev, next) = (node.parent, node.prev_sibling, node.next_sibling);
        if !parent.is_valid() {
            return;
        }
        if let Some(p) = self.tree.get_mut(prev) {
            p.next_sibling = next;
        } else if let Some(par) = self.tree.get_mut(parent) {
            par.first_child = next;
        }
        if let Some(n) = self.tree.get_mut(next) {
            n.prev_sibling = prev;
        } else if let Some(par) = self.tree.get_mut(parent) {
            par.last_child = prev;
        }
        if let Some(node) = self.tree.get_mut(child) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Link a detached node under `parent` before `before` (NONE = append)
    fn link(&mut self, parent: NodeId, child: NodeId, before: NodeId) {
        let prev = match self.tree.get(before) {
            Some(b) => b.prev_sibling,
            None => self.tree.get(parent).map_or(NodeId::NONE, |p| p.last_child),
        };
        if let Some(node) = self.tree.get_mut(child) {
            node.parent = parent;
            node.prev_sibling = prev;
            node.next_sibling = before;
        }
        match self.tree.get_mut(prev) {
            Some(p) => p.next_sibling = child,
            None => {
                if let Some(par) = self.tree.get_mut(parent) {
                    par.first_child = child;
                }
            }
        }
        match self.tree.get_mut(before) {
            Some(b) => b.prev_sibling = child,
            None => {
                if let Some(par) = self.tree.get_mut(parent) {
                    par.last_child = child;
                }
            }
        }
    }

    // ---- navigation ----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.parent.some()
    }

    /// Parent if it is an element
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.is_element(p))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.next_sibling.some()
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.prev_sibling.some()
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.tree.get(id).map_or(NodeId::NONE, |n| n.first_child);
        while let Some(node) = self.tree.get(cur) {
            out.push(cur);
            cur = node.next_sibling;
        }
        out
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).into_iter().filter(|&c| self.is_element(c)).collect()
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.element_children(id).into_iter().next()
    }

    /// Preorder descendants of `id`, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).into_iter().rev().collect();
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.children(cur).into_iter().rev());
        }
        out
    }

    /// Element descendants of `id`, excluding `id` itself
    pub fn element_descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id).into_iter().filter(|&d| self.is_element(d)).collect()
    }

    /// Whether `node` is attached to this document's root
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut cur = node;
        loop {
            if cur == NodeId::ROOT {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Inclusive ancestor check
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent(node);
        while let Some(c) = cur {
            out.push(c);
            cur = self.parent(c);
        }
        out
    }

    // ---- attributes ----

    pub fn get_attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.get_attr(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.attrs.has_attribute(name))
    }

    pub fn attribute_names(&self, id: NodeId) -> Vec<String> {
        self.element(id)
            .map(|e| e.attrs.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        let name = name.to_ascii_lowercase();
        let element = self.element_mut(id)?;
        let old = element.attrs.set_attribute(&name, value).map(|a| a.value);
        if name == "style" {
            element.style = parse_style(value);
        }
        self.record_attribute(id, &name, old);
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> DomResult<()> {
        let name = name.to_ascii_lowercase();
        let element = self.element_mut(id)?;
        if let Some(old) = element.attrs.remove_named_item(&name) {
            if name == "style" {
                element.style.clear();
            }
            self.record_attribute(id, &name, Some(old.value));
        }
        Ok(())
    }

    // ---- classes ----

    pub fn class_list(&self, id: NodeId) -> DOMTokenList {
        DOMTokenList::from_string(self.get_attribute(id, "class").unwrap_or(""))
    }

    pub fn class_name(&self, id: NodeId) -> String {
        self.get_attribute(id, "class").unwrap_or("").to_string()
    }

    pub fn set_class_name(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        self.set_attribute(id, "class", value)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.class_list(id).contains(class)
    }

    /// Force a class on or off. The attribute is only written on change.
    pub fn toggle_class(&mut self, id: NodeId, class: &str, force: bool) -> DomResult<bool> {
        let mut list = self.class_list(id);
        let changed = if force { list.add(class) } else { list.remove(class) };
        if changed {
            self.set_attribute(id, "class", &list.value())?;
        }
        Ok(force)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> DomResult<()> {
        self.toggle_class(id, class, true).map(|_| ())
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> DomResult<()> {
        self.toggle_class(id, class, false).map(|_| ())
    }

    // ---- inline style ----

    /// Inline style property; accepts `camelCase` or `kebab-case` names
    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        let name = css_property_name(name);
        self.element(id)?.style_property(&name).map(str::to_string)
    }

    /// Set an inline style property; an empty value removes it
    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<()> {
        let name = css_property_name(name);
        let element = self.element_mut(id)?;
        let mut style = element.style.clone();
        match style.iter().position(|(n, _)| *n == name) {
            Some(i) if value.is_empty() => {
                style.remove(i);
            }
            Some(i) => style[i].1 = value.to_string(),
            None if value.is_empty() => return Ok(()),
            None => style.push((name, value.to_string())),
        }
        let serialized = serialize_style(&style);
        if serialized.is_empty() {
            self.remove_attribute(id, "style")
        } else {
            self.set_attribute(id, "style", &serialized)
        }
    }

    // ---- properties ----

    /// Read an element property, falling back to the content attribute
    pub fn property(&self, id: NodeId, name: &str) -> Value {
        let Some(element) = self.element(id) else { return Value::Null };
        if let Some((_, attr)) = BOOLEAN_REFLECTED.iter().find(|(p, _)| *p == name) {
            return Value::Bool(element.attrs.has_attribute(attr));
        }
        if let Some((_, attr)) = STRING_REFLECTED.iter().find(|(p, _)| *p == name) {
            return Value::String(element.get_attr(attr).unwrap_or("").to_string());
        }
        match name {
            "value" => Value::String(self.value(id)),
            "checked" => Value::Bool(self.checked(id)),
            "tagName" => Value::String(element.tag.to_ascii_uppercase()),
            "textContent" | "innerText" => Value::String(self.text_content(id)),
            "innerHTML" => Value::String(self.inner_html(id)),
            _ => element.props.get(name).cloned().unwrap_or(Value::Null),
        }
    }

    /// Write an element property. Reflected properties update their attribute.
    pub fn set_property(&mut self, id: NodeId, name: &str, value: Value) -> DomResult<()> {
        self.element_mut(id)?;
        if let Some((_, attr)) = BOOLEAN_REFLECTED.iter().find(|(p, _)| *p == name) {
            return if json_truthy(&value) {
                self.set_attribute(id, attr, "")
            } else {
                self.remove_attribute(id, attr)
            };
        }
        if let Some((_, attr)) = STRING_REFLECTED.iter().find(|(p, _)| *p == name) {
            return self.set_attribute(id, attr, &json_to_text(&value));
        }
        match name {
            "value" => self.set_value(id, &json_to_text(&value)),
            "checked" => self.set_checked(id, json_truthy(&value)),
            "textContent" | "innerText" => self.set_text_content(id, &json_to_text(&value)),
            _ => {
                self.element_mut(id)?.props.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    /// Current control value
    pub fn value(&self, id: NodeId) -> String {
        let Some(element) = self.element(id) else { return String::new() };
        match element.props.get("value") {
            Some(v) => json_to_text(v),
            None if element.tag == "textarea" => self.text_content(id),
            None => element.get_attr("value").unwrap_or("").to_string(),
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: &str) -> DomResult<()> {
        self.element_mut(id)?.props.insert("value".into(), Value::String(value.to_string()));
        Ok(())
    }

    pub fn checked(&self, id: NodeId) -> bool {
        match self.element(id) {
            Some(e) => match e.props.get("checked") {
                Some(v) => json_truthy(v),
                None => e.attrs.has_attribute("checked"),
            },
            None => false,
        }
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) -> DomResult<()> {
        self.element_mut(id)?.props.insert("checked".into(), Value::Bool(checked));
        Ok(())
    }

    // ---- text ----

    pub fn text_content(&self, id: NodeId) -> String {
        match self.node(id).map(|n| &n.data) {
            Some(NodeData::Text(t)) | Some(NodeData::Comment(t)) => t.clone(),
            Some(_) => self.descendants(id)
                .into_iter()
                .filter_map(|d| self.node(d).and_then(Node::as_text))
                .collect(),
            None => String::new(),
        }
    }

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> DomResult<()> {
        if let Some(node) = self.tree.get_mut(id) {
            if let NodeData::Text(t) | NodeData::Comment(t) = &mut node.data {
                *t = text.to_string();
                return Ok(());
            }
        }
        self.clear_children(id)?;
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(id, t)?;
        }
        Ok(())
    }

    // ---- queries ----

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        self.element(id).is_some_and(|e| selector.matches(e))
    }

    /// Matching element descendants of `root` in document order
    pub fn query_selector_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&d| self.matches(d, selector))
            .collect()
    }

    pub fn query_selector(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.query_selector_all(root, selector).into_iter().next()
    }

    // ---- event listeners ----

    pub fn add_event_listener(&mut self, id: NodeId, event_type: &str, listener: ListenerId) -> DomResult<()> {
        let element = self.element_mut(id)?;
        if !element.listeners.iter().any(|(t, l)| t == event_type && *l == listener) {
            element.listeners.push((event_type.to_string(), listener));
        }
        Ok(())
    }

    /// Returns whether the listener was attached
    pub fn remove_event_listener(&mut self, id: NodeId, event_type: &str, listener: ListenerId) -> bool {
        match self.element_mut(id) {
            Ok(element) => {
                let before = element.listeners.len();
                element.listeners.retain(|(t, l)| !(t == event_type && *l == listener));
                before != element.listeners.len()
            }
            Err(_) => false,
        }
    }

    pub fn listeners(&self, id: NodeId, event_type: &str) -> Vec<ListenerId> {
        self.element(id)
            .map(|e| e.listeners.iter().filter(|(t, _)| t == event_type).map(|(_, l)| *l).collect())
            .unwrap_or_default()
    }

    // ---- mutation records ----

    pub fn observe(&mut self, options: MutationObserverInit) {
        tracing::trace!("Observing mutations: {:?}", options);
        self.mutations.observe(options);
    }

    pub fn disconnect(&mut self) {
        tracing::trace!("Mutation observation stopped");
        self.mutations.disconnect();
    }

    pub fn is_observing(&self) -> bool {
        self.mutations.is_observing()
    }

    pub fn has_pending_records(&self) -> bool {
        self.mutations.has_records()
    }

    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        self.mutations.take_records()
    }

    fn record_child_list(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if self.mutations.wants_child_list() && self.is_connected(target) {
            self.mutations.push(MutationRecord::child_list(target, added, removed));
        }
    }

    fn record_attribute(&mut self, target: NodeId, name: &str, old_value: Option<String>) {
        if self.mutations.wants_attribute(name) && self.is_connected(target) {
            self.mutations.push(MutationRecord::attributes(target, name, old_value));
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// `backgroundColor` -> `background-color`
fn css_property_name(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_style(value: &str) -> Vec<(String, String)> {
    value.split(';')
        .filter_map(|decl| {
            let (name, v) = decl.split_once(':')?;
            let (name, v) = (name.trim(), v.trim());
            (!name.is_empty()).then(|| (name.to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

fn serialize_style(style: &[(String, String)]) -> String {
    style.iter()
        .map(|(n, v)| format!("{n}: {v};"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn json_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
