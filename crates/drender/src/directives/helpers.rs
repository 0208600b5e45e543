//! Directive generators
//!
//! Most built-ins are one of two shapes: an event directive that compiles
//! its value into a listener, or a DOM directive that compiles its value
//! into a render hook and hands each result to a write callback.

use super::{DirectiveFn, ModifierFn};
use crate::compiler::{compile, compile_with};
use crate::component::{Component, Hook, HookFn};
use crate::runtime::EventHandler;
use crate::{Error, Result};
use drender_dom::{Event, NodeId};
use drender_expr::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const DEBOUNCE_DURATION_ATTR: &str = "d-debounce-duration";

pub fn directive(f: impl Fn(&Rc<Component>, NodeId, Option<&str>) -> Result<()> + 'static) -> DirectiveFn {
    Rc::new(f)
}

pub fn handler(f: impl Fn(&Rc<RefCell<Event>>) -> Result<()> + 'static) -> EventHandler {
    Rc::new(f)
}

pub fn modifier(f: impl Fn(EventHandler, &Rc<Component>, NodeId) -> EventHandler + 'static) -> ModifierFn {
    Rc::new(f)
}

pub(crate) fn hook(f: impl Fn(&Rc<Component>, &Value) -> Result<()> + 'static) -> HookFn {
    Rc::new(f)
}

/// Split a leading `.a.b ` modifier run from the expression.
///
/// `".prevent.stop { done: true }"` gives `("{ done: true }", [".prevent", ".stop"])`.
/// The run must be followed by whitespace; otherwise nothing is stripped.
pub fn collect_prefixes(source: &str) -> (String, Vec<String>) {
    if !source.starts_with('.') {
        return (source.to_string(), Vec::new());
    }
    let Some((end, ws)) = source.char_indices().find(|(_, c)| c.is_whitespace()) else {
        return (source.to_string(), Vec::new());
    };
    if end < 2 {
        return (source.to_string(), Vec::new());
    }
    let prefixes = source[1..end].split('.').map(|p| format!(".{p}").trim().to_string()).collect();
    (source[end + ws.len_utf8()..].to_string(), prefixes)
}

/// Directive source: the pre-resolved value when given, else the attribute
pub fn read_value(component: &Component, node: NodeId, identifier: &str, value: Option<&str>) -> Result<String> {
    if let Some(value) = value {
        return Ok(value.trim().to_string());
    }
    component
        .registry()?
        .doc
        .borrow()
        .get_attribute(node, identifier)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| Error::structural(identifier, format!("missing attribute on {node:?}")))
}

/// `d-debounce-duration` of the node, else the configured default
pub(crate) fn debounce_duration(component: &Component, node: NodeId) -> Result<u64> {
    let registry = component.registry()?;
    let declared = registry
        .doc
        .borrow()
        .get_attribute(node, DEBOUNCE_DURATION_ATTR)
        .and_then(|v| v.trim().parse::<u64>().ok());
    Ok(declared.unwrap_or(registry.config.debounce_duration_ms))
}

/// Generator for directives backed by a native event. With `predefined`
/// the attribute value is ignored and the literal is compiled instead.
pub fn event_directive(identifier: &'static str, event_type: &'static str, predefined: Option<&'static str>) -> DirectiveFn {
    directive(move |component, node, value| {
        let source = match predefined {
            Some(source) => source.to_string(),
            None => read_value(component, node, identifier, value)?,
        };
        register_event(component, identifier, event_type, node, &source)
    })
}

/// Compile `source` as an event handler and attach it under `identifier`
pub(crate) fn register_event(
    component: &Rc<Component>,
    identifier: &str,
    event_type: &str,
    node: NodeId,
    source: &str,
) -> Result<()> {
    let (code, prefixes) = collect_prefixes(source.trim());
    let expression = compile_with(component, &code, &["event"], |s| {
        if s.starts_with('{') { format!("this.setState({s})") } else { s.to_string() }
    })?;

    let weak = Rc::downgrade(component);
    let mut current = handler(move |event| {
        let Some(component) = weak.upgrade() else { return Ok(()) };
        if component.is_destroyed() {
            return Ok(());
        }
        let arg = component.event_value(event);
        expression.call(&component, vec![arg]).map(|_| ())
    });

    let registry = component.registry()?;
    for prefix in &prefixes {
        let found = registry.modifiers.borrow().get(prefix);
        match found {
            Some(modifier) => current = modifier(current, component, node),
            None => tracing::debug!("Unknown modifier {} on {}", prefix, identifier),
        }
    }
    component.add_event_listener(identifier, event_type, node, current)
}

/// Generator for directives that write to the DOM on every render.
///
/// The callback gets `(component, node, result, original)` where
/// `original` is the value `original_attr` had when the node was first
/// registered. Callbacks compare before writing.
pub fn dom_directive(
    identifier: &'static str,
    original_attr: Option<&'static str>,
    callback: impl Fn(&Rc<Component>, NodeId, Value, Option<&str>) -> Result<()> + 'static,
) -> DirectiveFn {
    let callback = Rc::new(callback);
    let originals: Rc<RefCell<HashMap<NodeId, Option<String>>>> = Rc::default();
    directive(move |component, node, value| {
        let source = read_value(component, node, identifier, value)?;
        let original = match original_attr {
            Some(attr) => {
                let registry = component.registry()?;
                let current = registry.doc.borrow().get_attribute(node, attr).map(str::to_string);
                originals.borrow_mut().entry(node).or_insert(current).clone()
            }
            None => None,
        };
        let expression = compile(component, &source, &["node", "transition"])?;
        let callback = Rc::clone(&callback);
        component.add_render_hook(Hook {
            identifier: identifier.to_string(),
            value: source,
            node,
            hook: hook(move |component, transition| {
                let result = expression.call(component, vec![component.node_value(node), transition.clone()])?;
                callback(component, node, result, original.as_deref())
            }),
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_prefixes() {
        let (code, prefixes) = collect_prefixes(".prevent.stop { updating: true }");
        assert_eq!(code, "{ updating: true }");
        assert_eq!(prefixes, vec![".prevent", ".stop"]);
    }

    #[test]
    fn test_collect_prefixes_requires_whitespace() {
        let (code, prefixes) = collect_prefixes(".prevent");
        assert_eq!(code, ".prevent");
        assert!(prefixes.is_empty());

        let (code, prefixes) = collect_prefixes("save()");
        assert_eq!(code, "save()");
        assert!(prefixes.is_empty());
    }

    #[test]
    fn test_collect_prefixes_single() {
        let (code, prefixes) = collect_prefixes(".debounce search(event)");
        assert_eq!(code, "search(event)");
        assert_eq!(prefixes, vec![".debounce"]);
    }
}
