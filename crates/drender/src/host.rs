//! Host objects handed to expressions
//!
//! Nodes, events and components cross into the interpreter as references.
//! Every read goes back to the live document, so an expression always sees
//! the current DOM.

use crate::component::Component;
use crate::runtime::Registry;
use drender_dom::{Event, NodeId, Selector};
use drender_expr::{EvalError, HostObject, Object, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

fn gone() -> EvalError {
    EvalError::host("document is no longer available")
}

/// Element of the live document
pub struct NodeRef {
    registry: Weak<Registry>,
    node: NodeId,
}

impl NodeRef {
    pub(crate) fn value(registry: &Weak<Registry>, node: NodeId) -> Value {
        Value::host(NodeRef { registry: registry.clone(), node })
    }

    fn registry(&self) -> Result<Rc<Registry>, EvalError> {
        self.registry.upgrade().ok_or_else(gone)
    }

    fn method(&self, name: &'static str) -> Value {
        let registry = self.registry.clone();
        let node = self.node;
        Value::function(name, move |_this, args| {
            let registry = registry.upgrade().ok_or_else(gone)?;
            let arg = |i: usize| args.get(i).map(Value::to_js_string).unwrap_or_default();
            match name {
                "matches" => {
                    let doc = registry.doc.borrow();
                    let selector = arg(0);
                    if selector.trim() == ":checked" {
                        return Ok(Value::Bool(doc.checked(node)));
                    }
                    let selector = Selector::parse(&selector).map_err(EvalError::host)?;
                    Ok(Value::Bool(doc.matches(node, &selector)))
                }
                "closest" => {
                    let doc = registry.doc.borrow();
                    let selector = Selector::parse(&arg(0)).map_err(EvalError::host)?;
                    let found = std::iter::once(node)
                        .chain(doc.ancestors(node))
                        .find(|&n| doc.matches(n, &selector));
                    Ok(found.map_or(Value::Null, |n| NodeRef::value(&Rc::downgrade(&registry), n)))
                }
                "getAttribute" => Ok(registry
                    .doc
                    .borrow()
                    .get_attribute(node, &arg(0))
                    .map_or(Value::Null, Value::from)),
                "hasAttribute" => Ok(Value::Bool(registry.doc.borrow().has_attribute(node, &arg(0)))),
                "setAttribute" => {
                    registry.doc.borrow_mut().set_attribute(node, &arg(0), &arg(1)).map_err(EvalError::host)?;
                    Ok(Value::Undefined)
                }
                "removeAttribute" => {
                    registry.doc.borrow_mut().remove_attribute(node, &arg(0)).map_err(EvalError::host)?;
                    Ok(Value::Undefined)
                }
                // no focus model in the arena document
                _ => Ok(Value::Undefined),
            }
        })
    }
}

impl HostObject for NodeRef {
    fn type_name(&self) -> &str {
        "HTMLElement"
    }

    fn get(&self, key: &str) -> Result<Value, EvalError> {
        let registry = self.registry()?;
        let doc = registry.doc.borrow();
        let weak = Rc::downgrade(&registry);
        Ok(match key {
            "value" | "checked" | "tagName" | "textContent" | "innerText" | "innerHTML" | "id"
            | "className" | "disabled" | "readOnly" | "hidden" | "name" | "type" | "title" => {
                Value::from_json(&doc.property(self.node, key))
            }
            "nodeName" => doc.tag_name(self.node).map_or(Value::Null, |t| Value::from(t.to_ascii_uppercase())),
            "parentElement" => doc.parent_element(self.node).map_or(Value::Null, |p| NodeRef::value(&weak, p)),
            "children" => Value::Array(
                doc.element_children(self.node).into_iter().map(|c| NodeRef::value(&weak, c)).collect(),
            ),
            "isConnected" => Value::Bool(doc.is_connected(self.node)),
            "style" => Value::host(StyleRef { registry: weak, node: self.node }),
            "matches" => self.method("matches"),
            "closest" => self.method("closest"),
            "getAttribute" => self.method("getAttribute"),
            "hasAttribute" => self.method("hasAttribute"),
            "setAttribute" => self.method("setAttribute"),
            "removeAttribute" => self.method("removeAttribute"),
            "focus" => self.method("focus"),
            "blur" => self.method("blur"),
            "select" => self.method("select"),
            other => doc
                .element(self.node)
                .and_then(|e| e.props.get(other))
                .map_or(Value::Undefined, Value::from_json),
        })
    }

    fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
        let registry = self.registry()?;
        let mut doc = registry.doc.borrow_mut();
        if key == "innerHTML" {
            drender_html::set_inner_html(&mut doc, self.node, &value.to_js_string()).map_err(EvalError::host)
        } else {
            doc.set_property(self.node, key, value.to_json()).map_err(EvalError::host)
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }
}

/// `node.style`
struct StyleRef {
    registry: Weak<Registry>,
    node: NodeId,
}

impl HostObject for StyleRef {
    fn type_name(&self) -> &str {
        "CSSStyleDeclaration"
    }

    fn get(&self, key: &str) -> Result<Value, EvalError> {
        let registry = self.registry.upgrade().ok_or_else(gone)?;
        let value = registry.doc.borrow().style_property(self.node, key).unwrap_or_default();
        Ok(Value::String(value))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
        let registry = self.registry.upgrade().ok_or_else(gone)?;
        let text = if value.is_nullish() { String::new() } else { value.to_js_string() };
        registry.doc.borrow_mut().set_style_property(self.node, key, &text).map_err(EvalError::host)
    }
}

/// Event being dispatched
pub struct EventRef {
    registry: Weak<Registry>,
    event: Rc<RefCell<Event>>,
}

impl EventRef {
    pub(crate) fn value(registry: &Weak<Registry>, event: &Rc<RefCell<Event>>) -> Value {
        Value::host(EventRef { registry: registry.clone(), event: Rc::clone(event) })
    }
}

impl HostObject for EventRef {
    fn type_name(&self) -> &str {
        "Event"
    }

    fn get(&self, key: &str) -> Result<Value, EvalError> {
        let event = self.event.borrow();
        Ok(match key {
            "type" => Value::from(event.event_type.as_str()),
            "target" => NodeRef::value(&self.registry, event.target),
            "currentTarget" => event.current_target.map_or(Value::Null, |n| NodeRef::value(&self.registry, n)),
            "key" => event.key.as_deref().map_or(Value::Undefined, Value::from),
            "detail" => Value::from_json(&event.detail),
            "bubbles" => Value::Bool(event.bubbles),
            "defaultPrevented" => Value::Bool(event.default_prevented()),
            "preventDefault" => {
                let event = Rc::clone(&self.event);
                Value::function("preventDefault", move |_, _| {
                    event.borrow_mut().prevent_default();
                    Ok(Value::Undefined)
                })
            }
            "stopPropagation" => {
                let event = Rc::clone(&self.event);
                Value::function("stopPropagation", move |_, _| {
                    event.borrow_mut().stop_propagation();
                    Ok(Value::Undefined)
                })
            }
            _ => Value::Undefined,
        })
    }
}

/// `this` inside an expression
pub struct ComponentRef(pub(crate) Weak<Component>);

impl ComponentRef {
    pub(crate) fn value(component: &Weak<Component>) -> Value {
        Value::host(ComponentRef(component.clone()))
    }

    /// The referenced component, if it is still alive
    pub fn component(&self) -> Option<Rc<Component>> {
        self.0.upgrade()
    }
}

impl HostObject for ComponentRef {
    fn type_name(&self) -> &str {
        "Component"
    }

    fn get(&self, key: &str) -> Result<Value, EvalError> {
        let component = self.0.upgrade().ok_or_else(|| EvalError::host("component has been dropped"))?;
        Ok(component.member(key).unwrap_or_default())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
        let component = self.0.upgrade().ok_or_else(|| EvalError::host("component has been dropped"))?;
        component.set_member(key, value).map_err(crate::Error::into_eval)
    }

    fn keys(&self) -> Vec<String> {
        self.0
            .upgrade()
            .map(|c| c.state().keys().cloned().collect())
            .unwrap_or_default()
    }

    fn to_json(&self) -> serde_json::Value {
        self.0
            .upgrade()
            .map(|c| serde_json::Value::Object(c.state()))
            .unwrap_or_default()
    }
}

/// Object of element references, as exposed by `refs`
pub(crate) fn refs_object(registry: &Weak<Registry>, refs: &[(String, crate::component::RefEntry)]) -> Object {
    refs.iter()
        .map(|(name, entry)| {
            let value = match entry {
                crate::component::RefEntry::Single(node) => NodeRef::value(registry, *node),
                crate::component::RefEntry::List(nodes) => {
                    Value::Array(nodes.iter().map(|n| NodeRef::value(registry, *n)).collect())
                }
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::config::Config;
    use crate::runtime::Runtime;

    fn page() -> (Runtime, Rc<Component>, NodeId) {
        let rt = Runtime::from_html(
            r#"<div class="box" d-state="{ n: 2 }"><input id="field" title="hint" value="abc"></div>"#,
            Config::default(),
        )
        .unwrap();
        rt.start().unwrap();
        let component = rt.component_for(rt.query("div").unwrap().unwrap()).unwrap();
        let field = rt.query("#field").unwrap().unwrap();
        (rt, component, field)
    }

    fn eval(component: &Rc<Component>, node: NodeId, source: &str) -> Value {
        let registry = component.registry().unwrap();
        let arg = NodeRef::value(&Rc::downgrade(&registry), node);
        compile(component, source, &["node"]).unwrap().call(component, vec![arg]).unwrap()
    }

    #[test]
    fn test_node_reads_go_to_the_document() {
        let (_rt, component, field) = page();
        assert_eq!(eval(&component, field, "node.getAttribute('title')"), Value::from("hint"));
        assert_eq!(eval(&component, field, "node.value"), Value::from("abc"));
        assert_eq!(eval(&component, field, "node.closest('.box').nodeName"), Value::from("DIV"));
        assert_eq!(eval(&component, field, "node.getAttribute('missing')"), Value::Null);
    }

    #[test]
    fn test_node_and_style_writes_reach_the_document() {
        let (rt, component, field) = page();
        eval(&component, field, "node.value = 'xyz'; node.style.color = 'red'; node.setAttribute('data-x', n)");
        let doc = rt.document();
        assert_eq!(doc.value(field), "xyz");
        assert_eq!(doc.style_property(field, "color").as_deref(), Some("red"));
        assert_eq!(doc.get_attribute(field, "data-x"), Some("2"));
    }

    #[test]
    fn test_this_reads_members_and_state() {
        let (_rt, component, field) = page();
        assert_eq!(eval(&component, field, "this.state.n + 1"), Value::Number(3.0));
        assert_eq!(eval(&component, field, "this.name"), Value::from("Component"));
        let this = ComponentRef::value(&Rc::downgrade(&component));
        assert_eq!(this.to_json(), serde_json::json!({ "n": 2 }));
    }
}
