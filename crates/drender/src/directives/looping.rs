//! `d-loop`
//!
//! The first element of the `<template>` is the prototype of every item.
//! Each item is a component (a shadow component unless the prototype
//! names a class) whose context carries the iteration bindings. Items are
//! built once the owning component is registered; on render the loop result
//! is reconciled against the existing items by `d-key`.

use super::DirectiveFn;
use super::helpers::{directive, hook, read_value};
use crate::compiler::{Expression, compile};
use crate::component::{COMPONENT_ATTR, Component, Context, Hook};
use crate::{Error, Result};
use drender_dom::{Document, NodeId};
use drender_expr::{Object, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

const IDENTIFIER: &str = "d-loop";
const LOOP_VAR_ATTR: &str = "d-loop-var";
const KEY_ATTR: &str = "d-key";
const ITEM_KEY: &str = "_loopComponentKey";
const PARENT_KEY: &str = "parentComponent";

/// Names of the three iteration bindings
struct Bindings {
    key: String,
    item: String,
    index: String,
}

impl Bindings {
    fn new(var: &str) -> Self {
        Self { key: format!("{var}Key"), item: var.to_string(), index: format!("{var}Index") }
    }

    /// `(key, item, index)` for every entry of an array or object result
    fn iterate(&self, results: &Value) -> Vec<Object> {
        let entry = |key: Value, item: Value, index: usize| -> Object {
            [(self.key.clone(), key), (self.item.clone(), item), (self.index.clone(), Value::from(index))]
                .into_iter()
                .collect()
        };
        match results {
            Value::Array(items) => items.iter().enumerate().map(|(i, item)| entry(Value::Null, item.clone(), i)).collect(),
            Value::Object(map) => map
                .iter()
                .enumerate()
                .map(|(i, (key, item))| entry(Value::from(key), item.clone(), i))
                .collect(),
            Value::Host(_) => match Value::from_json(&results.to_json()) {
                converted @ (Value::Array(_) | Value::Object(_)) => self.iterate(&converted),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn args(&self, binding: &Object) -> Vec<Value> {
        [&self.key, &self.item, &self.index]
            .into_iter()
            .map(|name| binding.get(name).cloned().unwrap_or_default())
            .collect()
    }
}

fn next_element_sibling(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = doc.next_sibling(node);
    while let Some(sibling) = current {
        if doc.is_element(sibling) {
            return Some(sibling);
        }
        current = doc.next_sibling(sibling);
    }
    None
}

struct LoopHook {
    node: NodeId,
    prototype: NodeId,
    bindings: Bindings,
    items: Expression,
    key: Expression,
    /// Serialized result of the last reconciliation
    last: RefCell<Option<String>>,
}

impl LoopHook {
    fn run(&self, component: &Rc<Component>) -> Result<()> {
        let results = self.items.call(component, Vec::new())?;
        let fingerprint =
            serde_json::to_string(&results.to_json()).map_err(|e| Error::InvalidState(e.to_string()))?;
        if self.last.borrow().as_deref() == Some(fingerprint.as_str()) {
            return Ok(());
        }
        self.reconcile(component, &results)?;
        *self.last.borrow_mut() = Some(fingerprint);
        Ok(())
    }

    fn reconcile(&self, component: &Rc<Component>, results: &Value) -> Result<()> {
        let registry = component.registry()?;

        let existing: Vec<(String, Rc<Component>)> = {
            let children = registry.doc.borrow().element_children(self.node);
            children
                .into_iter()
                .filter_map(|child| registry.live_component(child))
                .filter_map(|item| {
                    let key = item.context().get(ITEM_KEY).map(Value::to_js_string)?;
                    Some((key, item))
                })
                .collect()
        };

        let mut desired = Vec::new();
        let mut seen = HashSet::new();
        for binding in self.bindings.iterate(results) {
            let key = self.key.call(component, self.bindings.args(&binding))?;
            let key_text = key.to_js_string();
            if !seen.insert(key_text.clone()) {
                tracing::warn!("Duplicate d-key {} in d-loop of {}", key_text, component.name());
                continue;
            }
            let reused = existing.iter().find(|(k, _)| *k == key_text).map(|(_, item)| Rc::clone(item));
            let item = match reused {
                Some(item) => {
                    let mut context = item.context();
                    for (name, value) in binding {
                        context.set(name, value);
                    }
                    item.set_context(context);
                    item
                }
                None => self.append(component, binding, key)?,
            };
            desired.push(item.element());
        }

        let mut doc = registry.doc.borrow_mut();
        for (key, item) in &existing {
            if !seen.contains(key) && doc.parent(item.element()) == Some(self.node) {
                doc.remove(item.element())?;
            }
        }
        let mut anchor = None;
        for &element in desired.iter().rev() {
            if next_element_sibling(&doc, element) != anchor {
                doc.insert_before(self.node, element, anchor)?;
            }
            anchor = Some(element);
        }
        Ok(())
    }

    /// Clone the prototype at the end of the loop and build its component
    fn append(&self, component: &Rc<Component>, binding: Object, key: Value) -> Result<Rc<Component>> {
        let registry = component.registry()?;
        let element = {
            let mut doc = registry.doc.borrow_mut();
            let element = doc.clone_node(self.prototype, true)?;
            doc.append_child(self.node, element)?;
            element
        };
        let mut values = binding;
        values.set(ITEM_KEY, key);
        values.set(PARENT_KEY, component.this_value());
        let context = Context { values, parent: Some(Rc::downgrade(component)) };
        let (item, _) = registry.create_component(element, Some(context))?;
        Ok(item)
    }
}

pub(super) fn loop_directive() -> DirectiveFn {
    directive(|component, node, value| {
        let source = read_value(component, node, IDENTIFIER, value)?;
        let registry = component.registry()?;

        let (prototype, key_source, var) = {
            let mut doc = registry.doc.borrow_mut();
            let template = doc
                .element_descendants(node)
                .into_iter()
                .find(|&n| doc.tag_name(n) == Some("template"))
                .ok_or_else(|| Error::structural(IDENTIFIER, "Must have a template element inside the d-loop."))?;
            let no_key = || Error::structural(IDENTIFIER, "The root element inside d-loop must have d-key directive");
            let first = doc
                .template_content(template)
                .and_then(|content| doc.first_element_child(content))
                .ok_or_else(no_key)?;
            let key_source = doc.get_attribute(first, KEY_ATTR).map(str::to_string).ok_or_else(no_key)?;
            if !doc.has_attribute(first, COMPONENT_ATTR) {
                doc.set_attribute(first, COMPONENT_ATTR, &registry.config.shadow_component)?;
            }
            let var = doc
                .get_attribute(node, LOOP_VAR_ATTR)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(registry.config.default_loop_var.as_str())
                .to_string();
            let prototype = doc.clone_node(first, true)?;

            for child in doc.children(node) {
                if child != template {
                    doc.remove_child(node, child)?;
                }
            }
            if doc.parent(template) != Some(node) {
                doc.append_child(node, template)?;
            }
            (prototype, key_source, var)
        };

        let bindings = Bindings::new(&var);
        let items = compile(component, &source, &[])?;
        let key = compile(component, &key_source, &[bindings.key.as_str(), bindings.item.as_str(), bindings.index.as_str()])?;
        let state = Rc::new(LoopHook { node, prototype, bindings, items, key, last: RefCell::new(None) });
        let initial = Rc::clone(&state);
        component.when_registered(move |component| initial.run(component))?;

        component.add_render_hook(Hook {
            identifier: IDENTIFIER.into(),
            value: source,
            node,
            hook: hook(move |component, _transition| state.run(component)),
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_iterate_array_and_object() {
        let bindings = Bindings::new("todo");
        let array = bindings.iterate(&Value::from_json(&json!(["a", "b"])));
        assert_eq!(array.len(), 2);
        assert_eq!(array[1].get("todoIndex"), Some(&Value::from(1usize)));
        assert_eq!(array[0].get("todoKey"), Some(&Value::Null));

        let object = bindings.iterate(&Value::from_json(&json!({"x": 1, "y": 2})));
        assert_eq!(object[1].get("todoKey"), Some(&Value::from("y")));
        assert_eq!(object[1].get("todo"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_iterate_nullish_is_empty() {
        let bindings = Bindings::new("loopItem");
        assert!(bindings.iterate(&Value::Null).is_empty());
        assert!(bindings.iterate(&Value::Undefined).is_empty());
    }

    #[test]
    fn test_args_follow_binding_order() {
        let bindings = Bindings::new("row");
        let entry = &bindings.iterate(&Value::from_json(&json!([{"id": 7}])))[0];
        let args = bindings.args(entry);
        assert_eq!(args[0], Value::Null);
        assert_eq!(args[2], Value::from(0usize));
    }
}
