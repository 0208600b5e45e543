//! Built-in directives

use super::DirectiveFn;
use super::helpers::{debounce_duration, directive, dom_directive, event_directive, hook, read_value};
use super::looping;
use crate::compiler::compile;
use crate::component::{Component, Hook, RenderMode, StateUpdate, TimerKey};
use crate::state::State;
use crate::Result;
use drender_dom::{Document, NodeId};
use drender_expr::Value;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Every built-in, in scan order
pub(super) fn directives() -> Vec<(String, DirectiveFn)> {
    let mut table: Vec<(&str, DirectiveFn)> = vec![("d-model", model()), ("d-loop", looping::loop_directive())];
    for (identifier, event_type) in [
        ("d-keyup", "keyup"),
        ("d-keydown", "keydown"),
        ("d-keypress", "keypress"),
        ("d-change", "change"),
        ("d-input", "input"),
        ("d-click", "click"),
        ("d-submit", "submit"),
        ("d-focus", "focus"),
        ("d-blur", "blur"),
    ] {
        table.push((identifier, event_directive(identifier, event_type, None)));
    }
    table.extend([
        ("d-show", show()),
        ("d-debounce-show", debounce_show()),
        ("d-class", class()),
        ("d-debounce-class", debounce_class()),
        ("d-style", style()),
        ("d-disabled", boolean_property("d-disabled", "disabled")),
        ("d-readonly", boolean_property("d-readonly", "readOnly")),
        ("d-text", text()),
        ("d-html", html()),
        ("d-value", value()),
        ("d-prop", prop()),
        ("d-attr", attr()),
        ("d-on-state-change", on_state_change()),
        ("d-on-render", on_render()),
    ]);
    table.into_iter().map(|(id, d)| (id.to_string(), d)).collect()
}

fn is_text_control(doc: &Document, node: NodeId) -> bool {
    doc.tag_name(node).is_some_and(|t| t.eq_ignore_ascii_case("input") || t.eq_ignore_ascii_case("textarea"))
}

/// Text written for a result; nullish writes nothing
fn display(value: &Value) -> String {
    if value.is_nullish() { String::new() } else { value.to_js_string() }
}

fn hidden_class(component: &Component) -> Result<String> {
    Ok(component.registry()?.config.hidden_class.clone())
}

fn set_class(component: &Component, node: NodeId, class: &str, on: bool) -> Result<()> {
    let registry = component.registry()?;
    let mut doc = registry.doc.borrow_mut();
    if doc.has_class(node, class) != on {
        doc.toggle_class(node, class, on)?;
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Checkbox,
    Radio,
    Value,
}

/// Two-way binding of a form control to a state key
fn model() -> DirectiveFn {
    directive(|component, node, value| {
        let key = read_value(component, node, "d-model", value)?;
        let kind = {
            let registry = component.registry()?;
            let doc = registry.doc.borrow();
            let is_input = doc.tag_name(node).is_some_and(|t| t.eq_ignore_ascii_case("input"));
            match doc.get_attribute(node, "type").map(str::to_ascii_lowercase) {
                Some(t) if is_input && t == "checkbox" => ModelKind::Checkbox,
                Some(t) if is_input && t == "radio" => ModelKind::Radio,
                _ => ModelKind::Value,
            }
        };

        let weak = Rc::downgrade(component);
        let field = key.clone();
        component.add_event_listener(
            "d-model",
            "input",
            node,
            super::handler(move |event| {
                let Some(component) = weak.upgrade() else { return Ok(()) };
                if component.is_destroyed() {
                    return Ok(());
                }
                let target = event.borrow().target;
                let value = {
                    let registry = component.registry()?;
                    let doc = registry.doc.borrow();
                    match kind {
                        ModelKind::Checkbox => Json::Bool(doc.checked(target)),
                        ModelKind::Radio | ModelKind::Value => Json::String(doc.value(target)),
                    }
                };
                let mut partial = State::new();
                partial.insert(field.clone(), value);
                component.set_state(StateUpdate::Merge(partial), State::new(), RenderMode::Immediate)?;
                Ok(())
            }),
        )?;

        component.add_render_hook(Hook {
            identifier: "d-model".into(),
            value: key.clone(),
            node,
            hook: hook(move |component, _transition| {
                let current = component.state().get(&key).map(Value::from_json).unwrap_or(Value::Null);
                let registry = component.registry()?;
                let mut doc = registry.doc.borrow_mut();
                match kind {
                    ModelKind::Checkbox => {
                        let checked = current.truthy();
                        if doc.checked(node) != checked {
                            doc.set_checked(node, checked)?;
                        }
                    }
                    ModelKind::Radio => {
                        let checked = current.loose_eq(&Value::from(doc.value(node)));
                        if doc.checked(node) != checked {
                            doc.set_checked(node, checked)?;
                        }
                    }
                    ModelKind::Value => {
                        let text = display(&current);
                        if doc.value(node) != text {
                            doc.set_value(node, &text)?;
                        }
                    }
                }
                Ok(())
            }),
        });
        Ok(())
    })
}

fn show() -> DirectiveFn {
    dom_directive("d-show", None, |component, node, result, _| {
        let class = hidden_class(component)?;
        set_class(component, node, &class, !result.truthy())
    })
}

/// Showing waits for the debounce duration, hiding happens at once
fn debounce_show() -> DirectiveFn {
    dom_directive("d-debounce-show", None, |component, node, result, _| {
        let class = hidden_class(component)?;
        let key = TimerKey::Node(node, "debounce-show".into());
        if result.truthy() {
            component.cancel_timer(&key);
            return set_class(component, node, &class, false);
        }
        let hidden = component.registry()?.doc.borrow().has_class(node, &class);
        if hidden {
            return Ok(());
        }
        let delay = debounce_duration(component, node)?;
        let weak = Rc::downgrade(component);
        component.set_timer(key, delay, move || match weak.upgrade() {
            Some(component) => set_class(&component, node, &class, true),
            None => Ok(()),
        })
    })
}

fn class() -> DirectiveFn {
    dom_directive("d-class", Some("class"), |component, node, result, original| {
        match result {
            Value::Object(classes) => {
                for (name, on) in classes.iter() {
                    set_class(component, node, name, on.truthy())?;
                }
                Ok(())
            }
            other => {
                let next = format!("{} {}", original.unwrap_or(""), display(&other)).trim().to_string();
                let registry = component.registry()?;
                let mut doc = registry.doc.borrow_mut();
                if doc.class_name(node) != next {
                    doc.set_class_name(node, &next)?;
                }
                Ok(())
            }
        }
    })
}

/// Adding a class waits for the debounce duration, removing happens at once
fn debounce_class() -> DirectiveFn {
    dom_directive("d-debounce-class", None, |component, node, result, _| {
        let Value::Object(classes) = result else { return Ok(()) };
        for (name, on) in classes.iter() {
            let key = TimerKey::Node(node, format!("debounce-class-{name}"));
            if !on.truthy() {
                component.cancel_timer(&key);
                set_class(component, node, name, false)?;
                continue;
            }
            if component.registry()?.doc.borrow().has_class(node, name) {
                continue;
            }
            let delay = debounce_duration(component, node)?;
            let weak = Rc::downgrade(component);
            let class = name.to_string();
            component.set_timer(key, delay, move || match weak.upgrade() {
                Some(component) => set_class(&component, node, &class, true),
                None => Ok(()),
            })?;
        }
        Ok(())
    })
}

fn style() -> DirectiveFn {
    dom_directive("d-style", None, |component, node, result, _| {
        let Value::Object(properties) = result else { return Ok(()) };
        let registry = component.registry()?;
        let mut doc = registry.doc.borrow_mut();
        for (name, value) in properties.iter() {
            let value = display(value);
            if doc.style_property(node, name).unwrap_or_default() != value {
                doc.set_style_property(node, name, &value)?;
            }
        }
        Ok(())
    })
}

fn boolean_property(identifier: &'static str, property: &'static str) -> DirectiveFn {
    dom_directive(identifier, None, move |component, node, result, _| {
        let wanted = Json::Bool(result.truthy());
        let registry = component.registry()?;
        let mut doc = registry.doc.borrow_mut();
        if doc.property(node, property) != wanted {
            doc.set_property(node, property, wanted)?;
        }
        Ok(())
    })
}

fn write_value(component: &Component, node: NodeId, text: &str) -> Result<()> {
    let registry = component.registry()?;
    let mut doc = registry.doc.borrow_mut();
    if doc.value(node) != text {
        doc.set_value(node, text)?;
    }
    Ok(())
}

fn text() -> DirectiveFn {
    dom_directive("d-text", None, |component, node, result, _| {
        let text = display(&result);
        let registry = component.registry()?;
        if is_text_control(&registry.doc.borrow(), node) {
            return write_value(component, node, &text);
        }
        let mut doc = registry.doc.borrow_mut();
        if doc.text_content(node) != text {
            doc.set_text_content(node, &text)?;
        }
        Ok(())
    })
}

/// The serialized form of parsed markup can differ from the source, so the
/// last write is remembered per node
fn html() -> DirectiveFn {
    let written: Rc<RefCell<HashMap<NodeId, (String, String)>>> = Rc::default();
    dom_directive("d-html", None, move |component, node, result, _| {
        let markup = display(&result);
        let registry = component.registry()?;
        if is_text_control(&registry.doc.borrow(), node) {
            return write_value(component, node, &markup);
        }
        let mut doc = registry.doc.borrow_mut();
        let current = doc.inner_html(node);
        let unchanged = match written.borrow().get(&node) {
            Some((raw, serialized)) => *raw == markup && *serialized == current,
            None => current == markup,
        };
        if unchanged {
            return Ok(());
        }
        drender_html::set_inner_html(&mut doc, node, &markup)?;
        let serialized = doc.inner_html(node);
        written.borrow_mut().insert(node, (markup, serialized));
        Ok(())
    })
}

fn value() -> DirectiveFn {
    dom_directive("d-value", None, |component, node, result, _| write_value(component, node, &display(&result)))
}

fn prop() -> DirectiveFn {
    dom_directive("d-prop", None, |component, node, result, _| {
        let Value::Object(properties) = result else { return Ok(()) };
        let registry = component.registry()?;
        let mut doc = registry.doc.borrow_mut();
        for (name, value) in properties.iter() {
            let value = value.to_json();
            if doc.property(node, name) != value {
                doc.set_property(node, name, value)?;
            }
        }
        Ok(())
    })
}

/// `null`, `undefined` and `false` remove the attribute
fn attr() -> DirectiveFn {
    dom_directive("d-attr", None, |component, node, result, _| {
        let Value::Object(attributes) = result else { return Ok(()) };
        let registry = component.registry()?;
        let mut doc = registry.doc.borrow_mut();
        for (name, value) in attributes.iter() {
            if value.is_nullish() || matches!(value, Value::Bool(false)) {
                if doc.has_attribute(node, name) {
                    doc.remove_attribute(node, name)?;
                }
                continue;
            }
            let value = value.to_js_string();
            if doc.get_attribute(node, name) != Some(value.as_str()) {
                doc.set_attribute(node, name, &value)?;
            }
        }
        Ok(())
    })
}

fn on_state_change() -> DirectiveFn {
    directive(|component, node, value| {
        let source = read_value(component, node, "d-on-state-change", value)?;
        let expression = compile(component, &source, &["node", "prevState"])?;
        component.add_state_hook(Hook {
            identifier: "d-on-state-change".into(),
            value: source,
            node,
            hook: hook(move |component, prev| {
                expression.call(component, vec![component.node_value(node), prev.clone()]).map(|_| ())
            }),
        });
        Ok(())
    })
}

fn on_render() -> DirectiveFn {
    directive(|component, node, value| {
        let source = read_value(component, node, "d-on-render", value)?;
        let expression = compile(component, &source, &["node", "transition"])?;
        component.add_render_hook(Hook {
            identifier: "d-on-render".into(),
            value: source,
            node,
            hook: hook(move |component, transition| {
                expression.call(component, vec![component.node_value(node), transition.clone()]).map(|_| ())
            }),
        });
        Ok(())
    })
}
