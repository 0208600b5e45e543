//! Mutation coordinator
//!
//! Turns batches of mutation records into component lifecycle work:
//! construction of inserted components, deferred destruction of removed
//! ones, and hook updates for changed directive attributes.

use crate::component::{COMPONENT_ATTR, RenderMode, STATE_ATTR, StateUpdate, is_root_marker};
use crate::runtime::Registry;
use crate::state::State;
use drender_dom::{Event, MutationRecord, MutationType, NodeId};
use serde_json::Value as Json;
use std::rc::Rc;

/// Event dispatched on a component element built because it was inserted
pub const INITIALIZED_FROM_MUTATION: &str = "d-component-initialized-from-mutation";

pub(crate) fn process(registry: &Rc<Registry>, records: Vec<MutationRecord>) {
    for record in records {
        match record.mutation_type {
            MutationType::ChildList => {
                registry.bump_epoch();
                for node in record.added_nodes {
                    node_added(registry, node);
                }
                if !record.removed_nodes.is_empty() {
                    nodes_removed(registry, record.target, record.removed_nodes);
                }
            }
            MutationType::Attributes => attribute_changed(registry, &record),
        }
    }
}

fn notify(registry: &Registry, node: NodeId) {
    registry.dispatch(Event::notification(INITIALIZED_FROM_MUTATION, node));
}

fn node_added(registry: &Rc<Registry>, node: NodeId) {
    let (usable, marker) = {
        let doc = registry.doc.borrow();
        (doc.is_element(node) && doc.is_connected(node), is_root_marker(&doc, node))
    };
    if !usable {
        return;
    }

    if marker {
        if registry.class_for(node, false).is_none() {
            tracing::debug!("Inserted {:?} waits for its component class", node);
            return;
        }
        match registry.create_component(node, None) {
            Ok((component, true)) => {
                if let Err(error) = component.render(&State::new()) {
                    tracing::error!("Render of inserted {} failed: {}", component.name(), error);
                }
                notify(registry, node);
            }
            Ok(_) => {}
            Err(error) => tracing::error!("Failed to create inserted component on {:?}: {}", node, error),
        }
        return;
    }

    if let Some(owner) = registry.governing_component(node) {
        if let Err(error) = owner.renew_from_mutation(node) {
            tracing::error!("Renewing {} after insertion failed: {}", owner.name(), error);
        }
    }
    for component in registry.bootstrap(node) {
        notify(registry, component.element());
    }
    for global in registry.global_components() {
        if global.scan_global_directives(node, true) > 0 {
            if let Err(error) = global.render(&State::new()) {
                tracing::error!("Render of {} after insertion failed: {}", global.name(), error);
            }
        }
    }
}

/// Destruction waits one frame so that a node moved within the document
/// keeps its components
fn nodes_removed(registry: &Rc<Registry>, parent: NodeId, nodes: Vec<NodeId>) {
    let weak = Rc::downgrade(registry);
    registry.scheduler.borrow_mut().request_frame(move || {
        let Some(registry) = weak.upgrade() else { return Ok(()) };
        for node in nodes {
            let subtree: Vec<NodeId> = {
                let doc = registry.doc.borrow();
                if doc.is_connected(node) || !doc.is_element(node) {
                    continue;
                }
                std::iter::once(node).chain(doc.element_descendants(node)).collect()
            };
            for element in subtree {
                if let Some(component) = registry.live_component(element) {
                    if let Err(error) = component.destroy() {
                        tracing::error!("Destroying {} failed: {}", component.name(), error);
                    }
                }
            }
        }
        let owner = registry.live_component(parent).or_else(|| registry.governing_component(parent));
        for component in owner.into_iter().chain(registry.global_components()) {
            component.schedule_housekeeping()?;
        }
        Ok(())
    });
}

fn attribute_changed(registry: &Rc<Registry>, record: &MutationRecord) {
    let Some(name) = record.attribute_name.as_deref() else { return };
    let node = record.target;
    let current = {
        let doc = registry.doc.borrow();
        if !doc.is_connected(node) {
            return;
        }
        doc.get_attribute(node, name).map(str::to_string)
    };
    if current == record.old_value {
        return;
    }
    match name {
        COMPONENT_ATTR => rebuild(registry, node),
        STATE_ATTR => state_attribute_changed(registry, node, current),
        _ => directive_attribute_changed(registry, node, name),
    }
}

/// Destroy the component now and build the element again next frame if it
/// is still a root marker
fn rebuild(registry: &Rc<Registry>, node: NodeId) {
    if let Some(component) = registry.live_component(node) {
        if let Err(error) = component.destroy() {
            tracing::error!("Destroying {} failed: {}", component.name(), error);
        }
    }
    let weak = Rc::downgrade(registry);
    registry.scheduler.borrow_mut().request_frame(move || {
        let Some(registry) = weak.upgrade() else { return Ok(()) };
        let ready = {
            let doc = registry.doc.borrow();
            doc.is_connected(node) && is_root_marker(&doc, node)
        };
        if !ready || registry.class_for(node, false).is_none() {
            return Ok(());
        }
        let (component, created) = registry.create_component(node, None)?;
        if created {
            component.render(&State::new())?;
        }
        Ok(())
    });
}

fn state_attribute_changed(registry: &Rc<Registry>, node: NodeId, current: Option<String>) {
    let Some(component) = registry.live_component(node) else {
        if current.is_some() {
            rebuild(registry, node);
        }
        return;
    };
    let Some(payload) = current.filter(|p| !p.trim().is_empty()) else { return };
    if component.is_shadow() {
        return;
    }
    let state = match serde_json::from_str::<Json>(&payload) {
        Ok(Json::Object(state)) => state,
        Ok(_) => {
            tracing::warn!("Ignoring d-state on {:?}: not an object", node);
            return;
        }
        Err(error) => {
            tracing::warn!("Ignoring malformed d-state on {:?}: {}", node, error);
            return;
        }
    };
    if state == component.state() {
        return;
    }
    if let Err(error) = component.set_state(StateUpdate::Merge(state), State::new(), RenderMode::Immediate) {
        tracing::error!("Applying d-state to {} failed: {}", component.name(), error);
    }
}

fn directive_attribute_changed(registry: &Rc<Registry>, node: NodeId, name: &str) {
    for global in registry.global_components() {
        let Some(identifier) = global.translate_scoped(name) else { continue };
        if global.knows_directive(&identifier) {
            if let Err(error) = global.update_hook(&identifier, node, name) {
                tracing::error!("Updating {} on {:?} failed: {}", identifier, node, error);
            }
            return;
        }
    }
    let owner = registry.live_component(node).or_else(|| registry.governing_component(node));
    let Some(owner) = owner else { return };
    if owner.knows_directive(name) {
        if let Err(error) = owner.update_hook(name, node, name) {
            tracing::error!("Updating {} on {:?} failed: {}", name, node, error);
        }
    }
}
