//! Runtime invariants
//!
//! Hook replacement, state isolation, transition re-entrancy, keyed loop
//! reconciliation, two-way binding and component teardown.

use drender::{ComponentClass, Config, Event, NodeId, RenderMode, Runtime, State, StateUpdate};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn state(value: serde_json::Value) -> State {
    value.as_object().cloned().unwrap()
}

fn started(html: &str) -> Runtime {
    let rt = Runtime::from_html(html, Config::default()).unwrap();
    rt.start().unwrap();
    rt
}

fn node(rt: &Runtime, selector: &str) -> NodeId {
    rt.query(selector).unwrap().unwrap()
}

fn items(rt: &Runtime, list: NodeId) -> Vec<NodeId> {
    let doc = rt.document();
    doc.element_children(list).into_iter().filter(|&n| doc.tag_name(n) == Some("li")).collect()
}

#[test]
fn test_changed_directive_replaces_its_hook() {
    let rt = started(r#"<div d-state="{ n: 1 }"><span d-text="n"></span><button d-click="{ n: n + 1 }"></button></div>"#);
    let div = node(&rt, "div");
    let span = node(&rt, "span");
    let button = node(&rt, "button");
    let component = rt.component_for(div).unwrap();

    for source in ["n + 1", "n + 2"] {
        rt.document_mut().set_attribute(span, "d-text", source).unwrap();
        rt.flush().unwrap();
    }
    for source in ["{ n: n + 5 }", "{ n: n + 10 }"] {
        rt.document_mut().set_attribute(button, "d-click", source).unwrap();
        rt.flush().unwrap();
    }
    rt.advance(20).unwrap();

    let text_hooks = component.render_hooks().into_iter().filter(|h| h.identifier == "d-text" && h.node == span).count();
    assert_eq!(text_hooks, 1);
    assert_eq!(rt.document().text_content(span), "3");

    let clicks = component.event_bindings().into_iter().filter(|(n, b)| *n == button && b.identifier == "d-click").count();
    assert_eq!(clicks, 1);
    assert_eq!(rt.document().listeners(button, "click").len(), 1);

    rt.dispatch_event(button, Event::new("click", button)).unwrap();
    assert_eq!(component.state().get("n"), Some(&json!(11)));
}

#[test]
fn test_render_with_unchanged_results_writes_nothing() {
    let html = r#"
<div d-state="{ on: true, label: 'x', rows: [{ id: 1 }, { id: 2 }] }">
  <p class="base" d-show="on" d-class="{ active: on }" d-style="{ color: 'red' }" d-attr="{ title: label }" d-text="label"></p>
  <input d-value="label" d-disabled="!on">
  <ul d-loop="rows"><template><li d-key="loopItem.id" d-text="loopItem.id"></li></template></ul>
</div>"#;
    let rt = started(html);
    rt.flush().unwrap();
    assert!(!rt.document().has_pending_records());

    let component = rt.component_for(node(&rt, "div")).unwrap();
    component.render(&State::new()).unwrap();
    component.render(&State::new()).unwrap();
    assert!(!rt.document().has_pending_records());

    // structurally equal but freshly built rows leave the loop alone
    let rows = json!({ "rows": [{ "id": 1 }, { "id": 2 }] });
    component.set_state(StateUpdate::Merge(state(rows)), State::new(), RenderMode::Immediate).unwrap();
    assert!(!rt.document().has_pending_records());
}

#[test]
fn test_state_copies_do_not_alias() {
    let rt = started(r#"<div d-state="{ n: 1, nested: { a: [1, 2] } }"></div>"#);
    let component = rt.component_for(node(&rt, "div")).unwrap();

    let mut copy = component.state();
    copy.insert("n".into(), json!(99));
    copy.insert("extra".into(), json!(true));
    assert_eq!(component.state().get("n"), Some(&json!(1)));
    assert!(component.state().get("extra").is_none());

    let mut returned = component
        .set_state(StateUpdate::Merge(state(json!({ "n": 2 }))), State::new(), RenderMode::Skip)
        .unwrap()
        .unwrap();
    returned.insert("n".into(), json!(-1));
    assert_eq!(component.state().get("n"), Some(&json!(2)));

    let mut initial = component.initial_state();
    initial.clear();
    assert_eq!(component.initial_state().get("nested"), Some(&json!({ "a": [1, 2] })));
}

#[test]
fn test_nested_set_state_is_ignored() {
    let rt = Runtime::from_html(r#"<div d-component="Echo" d-state="{ n: 0 }"></div>"#, Config::default()).unwrap();
    let nested = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&nested);
    rt.register_component(ComponentClass::new("Echo").on_state_changed(move |component, _prev, _next| {
        let result = component.set_state(StateUpdate::Merge(state(json!({ "n": 100 }))), State::new(), RenderMode::Immediate)?;
        seen.borrow_mut().push(result);
        Ok(())
    }))
    .unwrap();
    rt.start().unwrap();

    let component = rt.component_for(node(&rt, "div")).unwrap();
    let next = component
        .set_state(StateUpdate::Merge(state(json!({ "n": 1 }))), State::new(), RenderMode::Immediate)
        .unwrap();
    assert_eq!(next.unwrap().get("n"), Some(&json!(1)));
    assert_eq!(*nested.borrow(), vec![None]);
    assert_eq!(component.state().get("n"), Some(&json!(1)));

    // the guard is released once the transition is over
    let again = component
        .set_state(StateUpdate::Merge(state(json!({ "n": 2 }))), State::new(), RenderMode::Immediate)
        .unwrap();
    assert!(again.is_some());
}

const TODOS: &str = r#"
<div d-state="{ todos: [{ id: 1, t: 'a' }, { id: 2, t: 'b' }, { id: 3, t: 'c' }] }">
  <ul d-loop="todos" d-loop-var="todo">
    <template><li d-key="todo.id" d-text="todo.t"></li></template>
  </ul>
</div>"#;

#[test]
fn test_loop_items_keep_their_nodes_across_reorder() {
    let rt = started(TODOS);
    let ul = node(&rt, "ul");
    let before = items(&rt, ul);
    assert_eq!(before.len(), 3);
    let texts: Vec<String> = before.iter().map(|&li| rt.document().text_content(li)).collect();
    assert_eq!(texts, vec!["a", "b", "c"]);

    let component = rt.component_for(node(&rt, "div")).unwrap();
    let reordered = json!({ "todos": [{ "id": 3, "t": "C" }, { "id": 1, "t": "a" }] });
    component.set_state(StateUpdate::Merge(state(reordered)), State::new(), RenderMode::Immediate).unwrap();
    rt.flush().unwrap();

    let after = items(&rt, ul);
    assert_eq!(after, vec![before[2], before[0]]);
    assert_eq!(rt.document().text_content(after[0]), "C");

    // the moved item survives the deferred sweep, the dropped one does not
    assert!(rt.component_for(before[1]).is_some());
    rt.next_frame().unwrap();
    assert!(rt.component_for(before[1]).is_none());
    assert!(rt.component_for(before[2]).is_some());
    assert!(!rt.document().is_connected(before[1]));
}

#[test]
fn test_loop_skips_work_when_result_is_unchanged() {
    let html = r#"
<div d-component="List" d-state="{ todos: ['x', 'y'], other: 0 }">
  <ul d-loop="todos"><template><li d-key="keyOf" d-text="loopItem"></li></template></ul>
  <b d-text="other"></b>
</div>"#;
    let rt = Runtime::from_html(html, Config::default()).unwrap();
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    rt.register_component(ComponentClass::new("List").method("keyOf", move |_component, args| {
        counter.set(counter.get() + 1);
        Ok(args.get(1).cloned().unwrap_or_default())
    }))
    .unwrap();
    rt.start().unwrap();
    assert_eq!(calls.get(), 2);

    let component = rt.component_for(node(&rt, "div")).unwrap();
    component.set_state(StateUpdate::Merge(state(json!({ "other": 1 }))), State::new(), RenderMode::Immediate).unwrap();
    assert_eq!(rt.document().text_content(node(&rt, "b")), "1");
    assert_eq!(calls.get(), 2);

    component
        .set_state(StateUpdate::Merge(state(json!({ "todos": ["x", "y", "z"] }))), State::new(), RenderMode::Immediate)
        .unwrap();
    assert_eq!(calls.get(), 5);
    assert_eq!(items(&rt, node(&rt, "ul")).len(), 3);
}

#[test]
fn test_model_binds_text_and_checkbox() {
    let rt = started(
        r#"<form d-state="{ name: 'ada', done: false }"><input id="name" d-model="name"><input id="done" type="checkbox" d-model="done"></form>"#,
    );
    let form = rt.component_for(node(&rt, "form")).unwrap();
    let name = node(&rt, "#name");
    let done = node(&rt, "#done");
    assert_eq!(rt.document().value(name), "ada");
    assert!(!rt.document().checked(done));

    rt.document_mut().set_value(name, "grace").unwrap();
    rt.dispatch_event(name, Event::new("input", name)).unwrap();
    assert_eq!(form.state().get("name"), Some(&json!("grace")));

    rt.document_mut().set_checked(done, true).unwrap();
    rt.dispatch_event(done, Event::new("input", done)).unwrap();
    assert_eq!(form.state().get("done"), Some(&json!(true)));

    form.set_state(StateUpdate::Merge(state(json!({ "name": "lin", "done": false }))), State::new(), RenderMode::Immediate)
        .unwrap();
    assert_eq!(rt.document().value(name), "lin");
    assert!(!rt.document().checked(done));
}

#[test]
fn test_inserted_component_notifies_once_and_survives_a_move() {
    let rt = started(r#"<div id="left"></div><div id="right"></div>"#);
    let left = node(&rt, "#left");
    let right = node(&rt, "#right");
    let notified = Rc::new(Cell::new(0));

    let section = {
        let mut doc = rt.document_mut();
        let section = doc.create_element("section");
        doc.set_attribute(section, "d-state", "{ a: 1 }").unwrap();
        section
    };
    let count = Rc::clone(&notified);
    rt.add_event_listener(section, drender::INITIALIZED_FROM_MUTATION, move |_| {
        count.set(count.get() + 1);
        Ok(())
    })
    .unwrap();

    rt.document_mut().append_child(left, section).unwrap();
    rt.flush().unwrap();
    rt.flush().unwrap();
    assert_eq!(notified.get(), 1);
    let component = rt.component_for(section).unwrap();

    {
        let mut doc = rt.document_mut();
        doc.remove(section).unwrap();
        doc.append_child(right, section).unwrap();
    }
    rt.flush().unwrap();
    rt.next_frame().unwrap();

    assert_eq!(notified.get(), 1);
    assert!(!component.is_destroyed());
    assert!(Rc::ptr_eq(&rt.component_for(section).unwrap(), &component));
}

#[test]
fn test_destroy_runs_once_and_detaches_everything() {
    let rt = Runtime::from_html(
        r#"<div d-component="Box" d-state="{ n: 0 }"><button d-click="{ n: n + 1 }"></button></div>"#,
        Config::default(),
    )
    .unwrap();
    let unmounted = Rc::new(Cell::new(0));
    let count = Rc::clone(&unmounted);
    rt.register_component(ComponentClass::new("Box").on_unmounted(move |_| {
        count.set(count.get() + 1);
        Ok(())
    }))
    .unwrap();
    rt.start().unwrap();

    let div = node(&rt, "div");
    let button = node(&rt, "button");
    let component = rt.component_for(div).unwrap();
    component.schedule_render(State::new()).unwrap();
    assert!(component.has_pending_render());

    component.destroy().unwrap();
    component.destroy().unwrap();
    assert_eq!(unmounted.get(), 1);
    assert!(component.is_destroyed());
    assert!(component.event_bindings().is_empty());
    assert!(component.render_hooks().is_empty());
    assert!(!component.has_pending_render());
    assert!(rt.document().listeners(button, "click").is_empty());
    assert!(rt.component_for(div).is_none());

    let result = component
        .set_state(StateUpdate::Merge(state(json!({ "n": 5 }))), State::new(), RenderMode::Immediate)
        .unwrap();
    assert!(result.is_none());
    rt.dispatch_event(button, Event::new("click", button)).unwrap();
    assert_eq!(component.state().get("n"), Some(&json!(0)));
}
