//! Component lifecycle and topology
//!
//! Construction order, render cascades, transition flags, mixins, portals
//! and housekeeping.

use drender::directives::directive;
use drender::{ComponentClass, Config, Event, Mixin, NodeId, RenderMode, Runtime, State, StateUpdate, Value, compile};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn state(value: serde_json::Value) -> State {
    value.as_object().cloned().unwrap()
}

fn node(rt: &Runtime, selector: &str) -> NodeId {
    rt.query(selector).unwrap().unwrap()
}

type Log = Rc<RefCell<Vec<String>>>;

/// Class whose `mark(label)` method appends to `log`
fn marking(name: &str, log: &Log) -> ComponentClass {
    let log = Rc::clone(log);
    ComponentClass::new(name).method("mark", move |_, args| {
        log.borrow_mut().push(args.first().map(Value::to_js_string).unwrap_or_default());
        Ok(Value::Undefined)
    })
}

#[test]
fn test_loop_items_exist_before_after_initialized() {
    let html = r#"
<div d-component="Rows" d-state="{ rows: [{ id: 1 }, { id: 2 }] }">
  <ul d-loop="rows" d-loop-var="row"><template><li d-key="row.id"></li></template></ul>
</div>"#;
    let rt = Runtime::from_html(html, Config::default()).unwrap();
    let seen = Rc::new(Cell::new(usize::MAX));
    let count = Rc::clone(&seen);
    rt.register_component(ComponentClass::new("Rows").on_after_initialized(move |component| {
        count.set(component.children().len());
        Ok(())
    }))
    .unwrap();
    rt.start().unwrap();
    assert_eq!(seen.get(), 2);
}

#[test]
fn test_failed_loop_key_is_retried() {
    let rt = Runtime::from_html(
        r#"<div d-state="{ rows: [{ id: { v: 1 } }, {}] }"><ul d-loop="rows" d-loop-var="row"><template><li d-key="row.id.v"></li></template></ul></div>"#,
        Config::default(),
    )
    .unwrap();
    rt.start().unwrap();
    let component = rt.component_for(node(&rt, "div")).unwrap();
    assert!(component.render(&State::new()).is_err());
    assert!(component.render(&State::new()).is_err());
}

const NESTED: &str = r#"
<div d-component="Outer" d-state="{ n: 0 }">
  <i d-on-render="mark('outer')"></i>
  <section d-component="Inner" d-state="{ m: 0 }"><b d-on-render="mark('inner')"></b></section>
</div>"#;

/// `Inner` does not follow renders flagged `outerOnly`
fn nested(config: Config) -> (Runtime, Log) {
    let rt = Runtime::from_html(NESTED, config).unwrap();
    let log: Log = Rc::default();
    rt.register_component(marking("Outer", &log)).unwrap();
    rt.register_component(
        marking("Inner", &log).should_follow_render(|_child, _parent, transition| !transition.contains_key("outerOnly")),
    )
    .unwrap();
    rt.start().unwrap();
    (rt, log)
}

#[test]
fn test_children_can_opt_out_of_a_render() {
    let (rt, log) = nested(Config::default());
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    let outer = rt.component_for(node(&rt, "div")).unwrap();

    log.borrow_mut().clear();
    outer.render(&state(json!({ "outerOnly": true }))).unwrap();
    assert_eq!(*log.borrow(), vec!["outer"]);

    log.borrow_mut().clear();
    outer.render(&State::new()).unwrap();
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
}

#[test]
fn test_debounced_renders_stagger_by_depth() {
    let config = Config { render_step_ms: 10, ..Config::default() };
    let (rt, log) = nested(config);
    let outer = rt.component_for(node(&rt, "div")).unwrap();
    let inner = rt.component_for(node(&rt, "section")).unwrap();
    assert_eq!((outer.depth(), inner.depth()), (0, 1));

    log.borrow_mut().clear();
    inner.schedule_render(State::new()).unwrap();
    outer.schedule_render(state(json!({ "outerOnly": true }))).unwrap();
    rt.advance(5).unwrap();
    assert_eq!(*log.borrow(), vec!["outer"]);
    assert!(inner.has_pending_render());
    rt.advance(5).unwrap();
    assert_eq!(*log.borrow(), vec!["outer", "inner"]);
}

#[test]
fn test_child_changed_reaches_the_parent() {
    let rt = Runtime::from_html(NESTED, Config::default()).unwrap();
    let changed: Log = Rc::default();
    let sink = Rc::clone(&changed);
    let log: Log = Rc::default();
    rt.register_component(marking("Outer", &log).on_child_changed(move |_parent, child| {
        sink.borrow_mut().push(child.name().to_string());
        Ok(())
    }))
    .unwrap();
    rt.register_component(marking("Inner", &log)).unwrap();
    rt.start().unwrap();

    let inner = rt.component_for(node(&rt, "section")).unwrap();
    inner.set_state(StateUpdate::Merge(state(json!({ "m": 1 }))), State::new(), RenderMode::Skip).unwrap();
    assert_eq!(*changed.borrow(), vec!["Inner"]);
}

#[test]
fn test_explicit_transition_wins_over_computed_flags() {
    let rt = Runtime::from_html(
        r#"<div d-component="Flags" d-state="{ n: 0 }"><p d-on-render="record(transition)"></p></div>"#,
        Config::default(),
    )
    .unwrap();
    let recorded = Rc::new(RefCell::new(serde_json::Value::Null));
    let sink = Rc::clone(&recorded);
    rt.register_component(
        ComponentClass::new("Flags")
            .transition_on_state_changing(|_prev, _next| state(json!({ "computed": true, "kind": "auto" })))
            .method("record", move |_, args| {
                *sink.borrow_mut() = args.first().map(Value::to_json).unwrap_or_default();
                Ok(Value::Undefined)
            }),
    )
    .unwrap();
    rt.start().unwrap();

    let component = rt.component_for(node(&rt, "div")).unwrap();
    component
        .set_state(StateUpdate::Merge(state(json!({ "n": 1 }))), state(json!({ "kind": "manual" })), RenderMode::Immediate)
        .unwrap();
    assert_eq!(*recorded.borrow(), json!({ "computed": true, "kind": "manual" }));
}

#[test]
fn test_method_name_binds_the_method() {
    let rt = Runtime::from_html(r#"<div d-component="Counter" d-state="{}"><button d-click="bump"></button></div>"#, Config::default())
        .unwrap();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&calls);
    rt.register_component(ComponentClass::new("Counter").method("bump", move |_, args| {
        sink.borrow_mut().push(args.len());
        Ok(Value::Undefined)
    }))
    .unwrap();
    rt.start().unwrap();

    let component = rt.component_for(node(&rt, "div")).unwrap();
    assert!(compile(&component, " bump ", &["event"]).unwrap().is_method());
    assert!(!compile(&component, "bump()", &[]).unwrap().is_method());

    let button = node(&rt, "button");
    rt.dispatch_event(button, Event::new("click", button)).unwrap();
    assert_eq!(*calls.borrow(), vec![1]);
}

#[test]
fn test_mixins_contribute_state_methods_and_directives() {
    let rt = Runtime::from_html(
        r#"<div d-component="Mixed" d-state="{ n: 2 }"><b d-text="double()"></b><i d-text="label"></i><em d-mark></em></div>"#,
        Config::default(),
    )
    .unwrap();
    let marked = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&marked);
    let mixin = Mixin::new()
        .state(state(json!({ "n": 0, "extra": true })))
        .method("double", |component, _| {
            let n = component.state().get("n").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        })
        .directive(
            "d-mark",
            directive(move |_component, node, _value| {
                sink.borrow_mut().push(node);
                Ok(())
            }),
        );
    rt.register_component(
        ComponentClass::new("Mixed")
            .mixin(mixin)
            .mixin_fn(|component| Mixin::new().member("label", Value::from(component.name()))),
    )
    .unwrap();
    rt.start().unwrap();

    let component = rt.component_for(node(&rt, "div")).unwrap();
    assert_eq!(component.state().get("n"), Some(&json!(2)));
    assert_eq!(component.state().get("extra"), Some(&json!(true)));
    assert_eq!(rt.document().text_content(node(&rt, "b")), "4");
    assert_eq!(rt.document().text_content(node(&rt, "i")), "Mixed");
    assert_eq!(*marked.borrow(), vec![node(&rt, "em")]);
}

#[test]
fn test_mixin_hooks_with_one_identifier_all_run() {
    let rt = Runtime::from_html(r#"<div d-component="Stacked" d-state="{}"></div>"#, Config::default()).unwrap();
    let counts = Rc::new([Cell::new(0), Cell::new(0)]);
    let mut class = ComponentClass::new("Stacked");
    for i in 0..2 {
        let counts = Rc::clone(&counts);
        class = class.mixin(Mixin::new().render_hook("tick", move |_, _| {
            counts[i].set(counts[i].get() + 1);
            Ok(())
        }));
    }
    rt.register_component(class).unwrap();
    rt.start().unwrap();
    assert_eq!((counts[0].get(), counts[1].get()), (1, 1));
}

#[test]
fn test_alias_answers_child_and_ancestor_lookups() {
    let rt = Runtime::from_html(
        r#"<div d-component="Shell" d-state="{}"><section d-component="Panel" d-alias="sidebar" d-state="{}"><b></b></section></div>"#,
        Config::default(),
    )
    .unwrap();
    rt.register_component(ComponentClass::new("Shell")).unwrap();
    rt.register_component(ComponentClass::new("Panel")).unwrap();
    rt.start().unwrap();

    let shell = rt.component_for(node(&rt, "div")).unwrap();
    let panels = shell.filter_children("sidebar");
    assert_eq!(panels.len(), 1);
    assert_eq!(panels[0].alias(), Some("sidebar"));
    assert_eq!(shell.filter_children("Panel").len(), 1);
    let nearest = rt.nearest_component(node(&rt, "b"), Some("sidebar")).unwrap();
    assert_eq!(nearest.name(), "Panel");
}

#[test]
fn test_portal_regions_belong_to_their_component() {
    let html = r#"
<div d-component="Menu" d-portal-name="nav" d-state="{ label: 'x' }"></div>
<aside d-portal="nav"><span d-text="label"></span><em d-ref="badge"></em><p d-state="{}"></p></aside>"#;
    let rt = Runtime::from_html(html, Config::default()).unwrap();
    rt.register_component(ComponentClass::new("Menu")).unwrap();
    rt.start().unwrap();

    let menu = rt.component_for(node(&rt, "div")).unwrap();
    assert_eq!(menu.portal_name(), "nav");
    assert_eq!(rt.document().text_content(node(&rt, "span")), "x");
    assert_eq!(menu.ref_node("badge"), Some(node(&rt, "em")));
    let nested = rt.component_for(node(&rt, "p")).unwrap();
    assert!(nested.parent().is_some_and(|parent| Rc::ptr_eq(&parent, &menu)));
    assert_eq!(menu.children().len(), 1);

    menu.set_state(StateUpdate::Merge(state(json!({ "label": "y" }))), State::new(), RenderMode::Immediate).unwrap();
    assert_eq!(rt.document().text_content(node(&rt, "span")), "y");

    rt.set_inner_html(node(&rt, "em"), r#"<i d-text="label + '!'"></i>"#).unwrap();
    rt.flush().unwrap();
    assert_eq!(rt.document().text_content(node(&rt, "i")), "y!");
}

#[test]
fn test_global_directives_pick_up_inserted_markup() {
    let rt = Runtime::from_html(
        r#"<div d-component="Todo" d-global-directives d-state="{ label: 'hi' }"></div><main id="app"></main>"#,
        Config::default(),
    )
    .unwrap();
    rt.register_component(ComponentClass::new("Todo")).unwrap();
    rt.start().unwrap();

    rt.set_inner_html(node(&rt, "#app"), r#"<p d-todo-text="label"></p>"#).unwrap();
    rt.flush().unwrap();
    assert_eq!(rt.document().text_content(node(&rt, "p")), "hi");
}

#[test]
fn test_housekeeping_drops_hooks_of_detached_nodes() {
    let rt = Runtime::from_html(r#"<div d-state="{ n: 1 }"><p id="gone"><span d-text="n"></span></p></div>"#, Config::default())
        .unwrap();
    rt.start().unwrap();
    let component = rt.component_for(node(&rt, "div")).unwrap();
    let span = node(&rt, "span");
    assert!(component.render_hooks().iter().any(|h| h.node == span));

    let gone = node(&rt, "#gone");
    rt.document_mut().remove(gone).unwrap();
    rt.flush().unwrap();
    rt.next_frame().unwrap();
    assert!(component.render_hooks().iter().any(|h| h.node == span));
    rt.advance(500).unwrap();
    assert!(component.render_hooks().iter().all(|h| h.node != span));
}
