//! Directive and modifier registries
//!
//! A directive is registration code run once per matching element: it
//! compiles the attribute value and stores hooks or listeners on the
//! component. Registration order is scan order, so built-ins come first
//! and custom directives follow in the order they were added.

mod builtin;
mod helpers;
mod looping;

pub use helpers::{collect_prefixes, directive, dom_directive, event_directive, handler, modifier, read_value};

use crate::component::{Component, TimerKey};
use crate::runtime::EventHandler;
use drender_dom::NodeId;
use std::rc::Rc;

/// `(component, node, pre-resolved value)`; the value is `None` when the
/// directive should read its own attribute
pub type DirectiveFn = Rc<dyn Fn(&Rc<Component>, NodeId, Option<&str>) -> crate::Result<()>>;

/// Wraps an event handler; modifiers compose left to right
pub type ModifierFn = Rc<dyn Fn(EventHandler, &Rc<Component>, NodeId) -> EventHandler>;

/// Ordered identifier to directive table
#[derive(Clone, Default)]
pub struct DirectiveRegistry {
    entries: Vec<(String, DirectiveFn)>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in directive
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (identifier, directive) in builtin::directives() {
            registry.register(&identifier, directive);
        }
        registry
    }

    /// Add a directive; an existing identifier keeps its position
    pub fn register(&mut self, identifier: &str, directive: DirectiveFn) {
        match self.entries.iter_mut().find(|(id, _)| id == identifier) {
            Some((_, existing)) => *existing = directive,
            None => self.entries.push((identifier.to_string(), directive)),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<DirectiveFn> {
        self.entries.iter().find(|(id, _)| id == identifier).map(|(_, d)| Rc::clone(d))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.iter().any(|(id, _)| id == identifier)
    }

    pub fn entries(&self) -> &[(String, DirectiveFn)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `.name` to modifier table
#[derive(Clone, Default)]
pub struct ModifierRegistry {
    entries: Vec<(String, ModifierFn)>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `.prevent`, `.stop` and `.debounce`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(
            ".prevent",
            modifier(|next, _, _| {
                helpers::handler(move |event| {
                    event.borrow_mut().prevent_default();
                    next(event)
                })
            }),
        );

        registry.register(
            ".stop",
            modifier(|next, _, _| {
                helpers::handler(move |event| {
                    event.borrow_mut().stop_propagation();
                    next(event)
                })
            }),
        );

        registry.register(
            ".debounce",
            modifier(|next, component, node| {
                let weak = Rc::downgrade(component);
                helpers::handler(move |event| {
                    let Some(component) = weak.upgrade() else { return Ok(()) };
                    let delay = helpers::debounce_duration(&component, node)?;
                    let key = TimerKey::Node(node, format!("{}-debounce", event.borrow().event_type));
                    let next = Rc::clone(&next);
                    let event = Rc::clone(event);
                    component.set_timer(key, delay, move || next(&event))
                })
            }),
        );

        registry
    }

    pub fn register(&mut self, name: &str, modifier: ModifierFn) {
        let name = if name.starts_with('.') { name.to_string() } else { format!(".{name}") };
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = modifier,
            None => self.entries.push((name, modifier)),
        }
    }

    pub fn get(&self, name: &str) -> Option<ModifierFn> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, m)| Rc::clone(m))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let registry = DirectiveRegistry::with_builtins();
        let ids: Vec<&str> = registry.entries().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"d-model"));
        assert_eq!(ids.get(1), Some(&"d-loop"));
        assert!(ids.iter().position(|id| *id == "d-click") < ids.iter().position(|id| *id == "d-show"));
        assert_eq!(ids.last(), Some(&"d-on-render"));
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = DirectiveRegistry::with_builtins();
        let before = registry.len();
        let custom = directive(|_, _, _| Ok(()));
        registry.register("d-text", Rc::clone(&custom));
        assert_eq!(registry.len(), before);
        assert!(registry.get("d-text").is_some_and(|d| Rc::ptr_eq(&d, &custom)));

        registry.register("d-debug", custom);
        assert_eq!(registry.entries().last().map(|(id, _)| id.as_str()), Some("d-debug"));
    }

    #[test]
    fn test_modifier_names_are_dotted() {
        let mut registry = ModifierRegistry::with_builtins();
        assert!(registry.contains(".prevent"));
        assert!(registry.contains(".stop"));
        assert!(registry.contains(".debounce"));

        registry.register("esc", modifier(|next, _, _| next));
        assert!(registry.contains(".esc"));
    }
}
