//! Tree manipulation tests for drender-dom
//!
//! Reordering, detaching and querying the way the runtime drives the tree.

use drender_dom::{Document, MutationObserverInit, MutationType, NodeId, Selector};

fn list(doc: &mut Document, n: usize) -> (NodeId, Vec<NodeId>) {
    let ul = doc.create_element("ul");
    let body = doc.body().unwrap();
    doc.append_child(body, ul).unwrap();
    let items = (0..n)
        .map(|i| {
            let li = doc.create_element("li");
            doc.set_attribute(li, "data-i", &i.to_string()).unwrap();
            doc.append_child(ul, li).unwrap();
            li
        })
        .collect();
    (ul, items)
}

#[test]
fn test_reorder_by_reappending() {
    let mut doc = Document::new();
    let (ul, items) = list(&mut doc, 3);
    for &i in items.iter().rev() {
        doc.append_child(ul, i).unwrap();
    }
    let order: Vec<_> = doc.children(ul);
    assert_eq!(order, vec![items[2], items[1], items[0]]);
    assert_eq!(doc.first_element_child(ul), Some(items[2]));
    assert_eq!(doc.next_sibling(items[0]), None);
}

#[test]
fn test_detach_and_reattach_in_one_batch() {
    let mut doc = Document::new();
    let (ul, items) = list(&mut doc, 2);
    doc.observe(MutationObserverInit::everything());

    doc.remove(items[0]).unwrap();
    assert!(!doc.is_connected(items[0]));
    doc.append_child(ul, items[0]).unwrap();
    assert!(doc.is_connected(items[0]));

    let records = doc.take_records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.mutation_type == MutationType::ChildList));
    assert_eq!(records[0].removed_nodes, vec![items[0]]);
    assert_eq!(records[1].added_nodes, vec![items[0]]);
}

#[test]
fn test_query_selector_all_document_order() {
    let mut doc = Document::new();
    let (ul, items) = list(&mut doc, 3);
    doc.set_attribute(items[1], "d-state", "{}").unwrap();
    let inner = doc.create_element("span");
    doc.set_attribute(inner, "d-component", "Row").unwrap();
    doc.append_child(items[0], inner).unwrap();

    let sel = Selector::any_attribute(&["d-state", "d-component"]);
    assert_eq!(doc.query_selector_all(ul, &sel), vec![inner, items[1]]);
    assert_eq!(doc.query_selector(doc.root(), &Selector::parse("li[data-i=\"2\"]").unwrap()), Some(items[2]));
}

#[test]
fn test_attribute_removal_records_old_value() {
    let mut doc = Document::new();
    let (_, items) = list(&mut doc, 1);
    doc.observe(MutationObserverInit::everything());
    doc.remove_attribute(items[0], "data-i").unwrap();
    doc.remove_attribute(items[0], "data-i").unwrap();

    let records = doc.take_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attribute_name.as_deref(), Some("data-i"));
    assert_eq!(records[0].old_value.as_deref(), Some("0"));
}

#[test]
fn test_disconnect_drops_pending() {
    let mut doc = Document::new();
    doc.observe(MutationObserverInit::everything());
    let (_, _) = list(&mut doc, 2);
    assert!(doc.has_pending_records());
    doc.disconnect();
    assert!(!doc.has_pending_records());
    assert!(!doc.is_observing());
}

#[test]
fn test_inner_html_round() {
    let mut doc = Document::new();
    let (ul, _) = list(&mut doc, 2);
    assert_eq!(doc.inner_html(ul), "<li data-i=\"0\"></li><li data-i=\"1\"></li>");
}
