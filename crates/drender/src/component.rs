//! Component
//!
//! A component is the state container bound to one element. Construction
//! compiles the directives of its owned subtree into hooks; a state
//! transition fires the state hooks and then a render pass, which runs the
//! render hooks and cascades into child components.
//!
//! The owned subtree stops at nested root markers (`d-state`,
//! `d-component`), at `d-portal` regions and at the content of `d-loop`
//! elements. A component also owns the regions marked with its portal
//! name, wherever they are in the document.

use crate::class::{ComponentClass, MethodFn};
use crate::compiler::compile;
use crate::directives::DirectiveFn;
use crate::host::{ComponentRef, EventRef, NodeRef, refs_object};
use crate::runtime::{EventHandler, Registry};
use crate::scheduler::TimerId;
use crate::state::{State, as_state, deep_merge, kebab_case};
use crate::{Error, Result};
use drender_dom::{Document, Event, ListenerId, NodeId};
use drender_expr::{Object, Value};
use serde_json::Value as Json;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) const STATE_ATTR: &str = "d-state";
pub(crate) const COMPONENT_ATTR: &str = "d-component";
const NAME_ATTR: &str = "d-name";
const REF_ATTR: &str = "d-ref";
const AFTER_INITIALIZED_ATTR: &str = "d-after-initialized";
const GLOBAL_ATTR: &str = "d-global-directives";
const LOOP_ATTR: &str = "d-loop";
const ALIAS_ATTR: &str = "d-alias";
pub(crate) const PORTAL_ATTR: &str = "d-portal";
const PORTAL_NAME_ATTR: &str = "d-portal-name";

/// Members every component answers to, besides its methods
const BUILTIN_METHODS: &[&str] = &["setState", "render"];

/// Component lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Constructing,
    Active,
    Destroyed,
}

/// `(component, argument)`: transition flags for render hooks, previous
/// state for state hooks
pub type HookFn = Rc<dyn Fn(&Rc<Component>, &Value) -> Result<()>>;

type SetupTask = Box<dyn FnOnce(&Rc<Component>) -> Result<()>>;

/// Compiled directive stored on a component
#[derive(Clone)]
pub struct Hook {
    pub identifier: String,
    /// Source the hook was compiled from
    pub value: String,
    pub node: NodeId,
    pub hook: HookFn,
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("identifier", &self.identifier)
            .field("value", &self.value)
            .field("node", &self.node)
            .finish()
    }
}

/// Listener attached for a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBinding {
    pub identifier: String,
    pub event_type: String,
    pub listener: ListenerId,
}

/// Entry of `refs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefEntry {
    Single(NodeId),
    /// Collected from `d-ref="name[]"`, in document order
    List(Vec<NodeId>),
}

/// External values attached to an element, such as loop iteration bindings
#[derive(Clone, Default)]
pub struct Context {
    pub values: Object,
    /// Logical parent of a loop item
    pub parent: Option<Weak<Component>>,
}

impl Context {
    pub fn new(values: Object) -> Self {
        Self { values, parent: None }
    }
}

/// How `set_state` derives the next state
pub enum StateUpdate {
    /// Deep-merge a partial state onto a copy of the current one
    Merge(State),
    /// Compute the next state from a copy of the current one
    With(Box<dyn FnOnce(State) -> Result<State>>),
    Replace(State),
}

/// What `set_state` does about rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Immediate,
    Debounced,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TimerKey {
    Render,
    HooksUpdated,
    Housekeeping,
    /// Per-node timers of directives and modifiers
    Node(NodeId, String),
}

/// Clears the transition flag however the transition ends
struct TransitionGuard<'a>(&'a Cell<bool>);

impl<'a> TransitionGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub(crate) fn is_root_marker(doc: &Document, node: NodeId) -> bool {
    doc.has_attribute(node, STATE_ATTR) || doc.has_attribute(node, COMPONENT_ATTR)
}

/// Topmost root markers strictly below `root`. With `into_loops` false the
/// content of `d-loop` elements is skipped.
pub(crate) fn marker_descendants(doc: &Document, root: NodeId, into_loops: bool) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = doc.element_children(root).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if is_root_marker(doc, node) {
            out.push(node);
            continue;
        }
        if !into_loops && doc.has_attribute(node, LOOP_ATTR) {
            continue;
        }
        stack.extend(doc.element_children(node).into_iter().rev());
    }
    out
}

/// Elements owned by the component governing `root`: `root` itself, then
/// descendants in document order, not entering nested root markers,
/// `d-portal` regions or the content of `d-loop` elements
pub(crate) fn owned_elements(doc: &Document, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    if !doc.is_element(root) {
        return out;
    }
    out.push(root);
    if doc.has_attribute(root, LOOP_ATTR) {
        return out;
    }
    let mut stack: Vec<NodeId> = doc.element_children(root).into_iter().rev().collect();
    while let Some(node) = stack.pop() {
        if is_root_marker(doc, node) || doc.has_attribute(node, PORTAL_ATTR) {
            continue;
        }
        out.push(node);
        if !doc.has_attribute(node, LOOP_ATTR) {
            stack.extend(doc.element_children(node).into_iter().rev());
        }
    }
    out
}

pub struct Component {
    this: Weak<Component>,
    registry: Weak<Registry>,
    element: NodeId,
    class: Rc<ComponentClass>,
    name: String,
    kebab_name: String,
    alias: Option<String>,
    portal: String,
    global_directives: bool,
    status: Cell<Status>,
    state: RefCell<State>,
    initial_state: RefCell<State>,
    render_hooks: RefCell<BTreeMap<NodeId, Vec<Hook>>>,
    state_hooks: RefCell<BTreeMap<NodeId, Vec<Hook>>>,
    event_map: RefCell<BTreeMap<NodeId, Vec<EventBinding>>>,
    refs: RefCell<Vec<(String, RefEntry)>>,
    timers: RefCell<HashMap<TimerKey, TimerId>>,
    transitioning: Cell<bool>,
    parent_override: RefCell<Option<Weak<Component>>>,
    children_override: RefCell<Option<Vec<Weak<Component>>>>,
    depth_cache: Cell<Option<(u64, usize)>>,
    methods: RefCell<HashMap<String, MethodFn>>,
    members: RefCell<Object>,
    directives: RefCell<Vec<(String, DirectiveFn)>>,
    setup_errors: RefCell<Vec<String>>,
    pending_setup: RefCell<Vec<SetupTask>>,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("element", &self.element)
            .field("status", &self.status.get())
            .field("state", &self.state.borrow())
            .finish()
    }
}

impl Component {
    /// Build the component for `element`: state, mixins, directive hooks,
    /// refs and the initial state snapshot. Nested components are created
    /// by the registry afterwards.
    pub(crate) fn construct(registry: &Rc<Registry>, element: NodeId, class: Rc<ComponentClass>) -> Result<Rc<Self>> {
        let (name, alias, portal, global_directives) = {
            let doc = registry.doc.borrow();
            let attr = |name: &str| {
                doc.get_attribute(element, name).map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
            };
            let name = attr(NAME_ATTR).unwrap_or_else(|| class.name().to_string());
            let portal = attr(PORTAL_NAME_ATTR).unwrap_or_else(|| class.name().to_string());
            (name, attr(ALIAS_ATTR), portal, doc.has_attribute(element, GLOBAL_ATTR))
        };

        let component = Rc::new_cyclic(|this| Component {
            this: this.clone(),
            registry: Rc::downgrade(registry),
            element,
            kebab_name: kebab_case(&name),
            name,
            alias,
            portal,
            global_directives,
            status: Cell::new(Status::Constructing),
            state: RefCell::new(State::new()),
            initial_state: RefCell::new(State::new()),
            render_hooks: RefCell::new(BTreeMap::new()),
            state_hooks: RefCell::new(BTreeMap::new()),
            event_map: RefCell::new(BTreeMap::new()),
            refs: RefCell::new(Vec::new()),
            timers: RefCell::new(HashMap::new()),
            transitioning: Cell::new(false),
            parent_override: RefCell::new(None),
            children_override: RefCell::new(None),
            depth_cache: Cell::new(None),
            methods: RefCell::new(class.methods.iter().cloned().collect()),
            members: RefCell::new(Object::new()),
            directives: RefCell::new(class.directives.clone()),
            setup_errors: RefCell::new(Vec::new()),
            pending_setup: RefCell::new(Vec::new()),
            class,
        });
        tracing::debug!("Constructing component {} on {:?}", component.name, element);

        let contributed = component.apply_mixins();
        if !component.class.is_shadow() {
            let declared = component.declared_state()?;
            let state = deep_merge(deep_merge(component.class.default_state.clone(), contributed), declared);
            *component.state.borrow_mut() = state;
        }

        let roots = component.owned_roots(&registry.doc.borrow());
        for root in roots {
            component.register_directives(root, false);
            component.collect_refs(root);
        }
        if component.global_directives {
            let root = registry.doc.borrow().root();
            component.scan_global_directives(root, false);
        }
        *component.initial_state.borrow_mut() = component.state();
        Ok(component)
    }

    fn apply_mixins(self: &Rc<Self>) -> State {
        let mut contributed = State::new();
        for source in self.class.mixins.clone() {
            let mixin = source.resolve(self);
            contributed = deep_merge(contributed, mixin.state);
            self.methods.borrow_mut().extend(mixin.methods);
            for (key, value) in mixin.members {
                self.members.borrow_mut().set(key, value);
            }
            self.directives.borrow_mut().extend(mixin.directives);
            // mixins stack hooks under a shared identifier
            for (identifier, hook) in mixin.render_hooks {
                Self::append_hook(&self.render_hooks, Hook { identifier, value: String::new(), node: self.element, hook });
            }
            for (identifier, hook) in mixin.state_hooks {
                Self::append_hook(&self.state_hooks, Hook { identifier, value: String::new(), node: self.element, hook });
            }
        }
        contributed
    }

    /// Evaluate `d-state`; an absent or blank attribute declares nothing
    fn declared_state(self: &Rc<Self>) -> Result<State> {
        let source = self
            .registry()?
            .doc
            .borrow()
            .get_attribute(self.element, STATE_ATTR)
            .map(str::to_string)
            .unwrap_or_default();
        if source.trim().is_empty() {
            return Ok(State::new());
        }
        let value = compile(self, &source, &[])?.call(self, Vec::new())?;
        match value {
            Value::Undefined | Value::Null => Ok(State::new()),
            other => as_state(other.to_json())
                .ok_or_else(|| Error::InvalidState(format!("d-state `{source}` must evaluate to an object"))),
        }
    }

    pub(crate) fn activate(&self) {
        if self.status.get() == Status::Constructing {
            self.status.set(Status::Active);
        }
    }

    /// Run `task` once the registry knows this component, right away when
    /// it already does
    pub(crate) fn when_registered(self: &Rc<Self>, task: impl FnOnce(&Rc<Component>) -> Result<()> + 'static) -> Result<()> {
        if self.status.get() == Status::Constructing {
            self.pending_setup.borrow_mut().push(Box::new(task));
            Ok(())
        } else {
            task(self)
        }
    }

    /// Drain the tasks queued by `when_registered` during construction
    pub(crate) fn finish_setup(self: &Rc<Self>) {
        let tasks = std::mem::take(&mut *self.pending_setup.borrow_mut());
        for task in tasks {
            if let Err(error) = task(self) {
                tracing::error!("Setup of {} failed: {}", self.name, error);
                self.setup_errors.borrow_mut().push(error.to_string());
            }
        }
    }

    /// The element followed by the `d-portal` regions naming this component
    fn owned_roots(&self, doc: &Document) -> Vec<NodeId> {
        let mut roots = vec![self.element];
        roots.extend(self.portal_elements(doc));
        roots
    }

    /// Elements marked `d-portal="<portal name>"`
    pub(crate) fn portal_elements(&self, doc: &Document) -> Vec<NodeId> {
        doc.element_descendants(doc.root())
            .into_iter()
            .filter(|&n| doc.get_attribute(n, PORTAL_ATTR).map(str::trim) == Some(self.portal.as_str()))
            .collect()
    }

    /// Run `d-after-initialized` callbacks and the initialization lifecycle
    pub(crate) fn post_initialize(self: &Rc<Self>) -> Result<()> {
        let registry = self.registry()?;
        let callbacks: Vec<(NodeId, String)> = {
            let doc = registry.doc.borrow();
            self.owned_roots(&doc)
                .into_iter()
                .flat_map(|root| owned_elements(&doc, root))
                .filter_map(|n| doc.get_attribute(n, AFTER_INITIALIZED_ATTR).map(|s| (n, s.to_string())))
                .collect()
        };
        for (node, source) in callbacks {
            let result = compile(self, &source, &["node"]).and_then(|e| e.call(self, vec![self.node_value(node)]));
            if let Err(error) = result {
                self.setup_errors.borrow_mut().push(error.to_string());
            }
        }
        if let Some(after_initialized) = self.class.lifecycle.after_initialized.clone() {
            after_initialized(self)?;
        }
        if let Some(hooks_updated) = self.class.lifecycle.hooks_updated.clone() {
            hooks_updated(self)?;
        }
        Ok(())
    }

    // ---- directive registration ----

    /// Registry directives followed by component-specific ones
    pub(crate) fn directive_table(&self) -> Vec<(String, DirectiveFn)> {
        let mut table = self
            .registry
            .upgrade()
            .map(|r| r.directives.borrow().entries().to_vec())
            .unwrap_or_default();
        table.extend(self.directives.borrow().iter().cloned());
        table
    }

    pub(crate) fn directive(&self, identifier: &str) -> Option<DirectiveFn> {
        self.directive_table()
            .into_iter()
            .rev()
            .find(|(id, _)| id == identifier)
            .map(|(_, f)| f)
    }

    pub fn knows_directive(&self, identifier: &str) -> bool {
        self.directive(identifier).is_some()
    }

    /// Register every known directive found in the subtree owned from
    /// `root`. With `only_new`, directives that already have a hook or
    /// listener on a node are left alone.
    pub(crate) fn register_directives(self: &Rc<Self>, root: NodeId, only_new: bool) {
        let Some(registry) = self.registry.upgrade() else { return };
        let elements = owned_elements(&registry.doc.borrow(), root);
        for (identifier, directive) in self.directive_table() {
            for &node in &elements {
                if !registry.doc.borrow().has_attribute(node, &identifier) {
                    continue;
                }
                if only_new && self.is_registered(&identifier, node) {
                    continue;
                }
                self.run_directive(&identifier, &directive, node, None);
            }
        }
    }

    fn run_directive(self: &Rc<Self>, identifier: &str, directive: &DirectiveFn, node: NodeId, value: Option<&str>) {
        if let Err(error) = directive(self, node, value) {
            tracing::error!("{} on {:?} of {}: {}", identifier, node, self.name, error);
            self.setup_errors.borrow_mut().push(error.to_string());
        }
    }

    /// Register `d-{kebab}-*` attributes found anywhere below `root` under
    /// their canonical identifiers. Returns how many were registered.
    pub(crate) fn scan_global_directives(self: &Rc<Self>, root: NodeId, only_new: bool) -> usize {
        let Some(registry) = self.registry.upgrade() else { return 0 };
        let prefix = self.scoped_prefix();
        let found: Vec<(NodeId, String, String)> = {
            let doc = registry.doc.borrow();
            std::iter::once(root)
                .chain(doc.element_descendants(root))
                .filter(|&n| doc.is_element(n))
                .flat_map(|n| {
                    doc.attribute_names(n)
                        .into_iter()
                        .filter_map(|name| {
                            let suffix = name.strip_prefix(&prefix)?;
                            let value = doc.get_attribute(n, &name)?.to_string();
                            Some((n, format!("d-{suffix}"), value))
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        let mut registered = 0;
        for (node, identifier, value) in found {
            let Some(directive) = self.directive(&identifier) else { continue };
            if only_new && self.is_registered(&identifier, node) {
                continue;
            }
            self.run_directive(&identifier, &directive, node, Some(&value));
            registered += 1;
        }
        registered
    }

    /// Attribute prefix of directives declared outside the owned subtree
    pub fn scoped_prefix(&self) -> String {
        format!("d-{}-", self.kebab_name)
    }

    /// Map a scoped attribute such as `d-todo-list-text` to `d-text`
    pub fn translate_scoped(&self, attribute: &str) -> Option<String> {
        attribute.strip_prefix(&self.scoped_prefix()).map(|suffix| format!("d-{suffix}"))
    }

    fn collect_refs(&self, root: NodeId) {
        let Some(registry) = self.registry.upgrade() else { return };
        let doc = registry.doc.borrow();
        let mut refs = self.refs.borrow_mut();
        for node in owned_elements(&doc, root) {
            let Some(name) = doc.get_attribute(node, REF_ATTR).map(str::trim) else { continue };
            match name.strip_suffix("[]") {
                Some(list) => match refs.iter_mut().find(|(n, _)| n == list) {
                    Some((_, RefEntry::List(nodes))) => {
                        if !nodes.contains(&node) {
                            nodes.push(node);
                        }
                    }
                    Some((_, entry)) => *entry = RefEntry::List(vec![node]),
                    None => refs.push((list.to_string(), RefEntry::List(vec![node]))),
                },
                None => match refs.iter_mut().find(|(n, _)| n == name) {
                    Some((_, entry)) => *entry = RefEntry::Single(node),
                    None => refs.push((name.to_string(), RefEntry::Single(node))),
                },
            }
        }
    }

    /// Pick up directives in a subtree that was inserted into the owned
    /// region after construction, then render so they reflect the state
    pub(crate) fn renew_from_mutation(self: &Rc<Self>, node: NodeId) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.register_directives(node, true);
        self.collect_refs(node);
        self.render(&State::new())
    }

    pub(crate) fn is_registered(&self, identifier: &str, node: NodeId) -> bool {
        let hooked = |map: &RefCell<BTreeMap<NodeId, Vec<Hook>>>| {
            map.borrow().get(&node).is_some_and(|hooks| hooks.iter().any(|h| h.identifier == identifier))
        };
        hooked(&self.render_hooks)
            || hooked(&self.state_hooks)
            || self
                .event_map
                .borrow()
                .get(&node)
                .is_some_and(|bindings| bindings.iter().any(|b| b.identifier == identifier))
    }

    // ---- hooks and listeners ----

    fn insert_hook(map: &RefCell<BTreeMap<NodeId, Vec<Hook>>>, hook: Hook) {
        let mut map = map.borrow_mut();
        let hooks = map.entry(hook.node).or_default();
        match hooks.iter_mut().find(|h| h.identifier == hook.identifier) {
            Some(existing) => *existing = hook,
            None => hooks.push(hook),
        }
    }

    fn append_hook(map: &RefCell<BTreeMap<NodeId, Vec<Hook>>>, hook: Hook) {
        map.borrow_mut().entry(hook.node).or_default().push(hook);
    }

    /// Store a render hook, replacing the one with the same identifier and node
    pub fn add_render_hook(&self, hook: Hook) {
        Self::insert_hook(&self.render_hooks, hook);
    }

    pub fn add_state_hook(&self, hook: Hook) {
        Self::insert_hook(&self.state_hooks, hook);
    }

    /// Attach `handler` for `event_type` on `node`, detaching whatever was
    /// registered before for `identifier` on that node
    pub fn add_event_listener(&self, identifier: &str, event_type: &str, node: NodeId, handler: EventHandler) -> Result<()> {
        let registry = self.registry()?;
        self.remove_event_binding(&registry, identifier, node);
        let listener = registry.add_listener(node, event_type, handler)?;
        self.event_map.borrow_mut().entry(node).or_default().push(EventBinding {
            identifier: identifier.to_string(),
            event_type: event_type.to_string(),
            listener,
        });
        Ok(())
    }

    fn remove_event_binding(&self, registry: &Registry, identifier: &str, node: NodeId) {
        let removed: Vec<EventBinding> = {
            let mut map = self.event_map.borrow_mut();
            let Some(bindings) = map.get_mut(&node) else { return };
            let (removed, kept) = std::mem::take(bindings).into_iter().partition(|b| b.identifier == identifier);
            *bindings = kept;
            if bindings.is_empty() {
                map.remove(&node);
            }
            removed
        };
        for binding in removed {
            registry.remove_listener(node, &binding.event_type, binding.listener);
        }
    }

    /// Drop the render hook, state hook and listener of `identifier` on `node`
    pub fn remove_hooks(&self, identifier: &str, node: NodeId) {
        for map in [&self.render_hooks, &self.state_hooks] {
            let mut map = map.borrow_mut();
            if let Some(hooks) = map.get_mut(&node) {
                hooks.retain(|h| h.identifier != identifier);
                if hooks.is_empty() {
                    map.remove(&node);
                }
            }
        }
        if let Some(registry) = self.registry.upgrade() {
            self.remove_event_binding(&registry, identifier, node);
        }
    }

    /// Re-register `identifier` on `node` from the current value of
    /// `attribute`, then schedule `hooks_updated` and a render
    pub fn update_hook(self: &Rc<Self>, identifier: &str, node: NodeId, attribute: &str) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.remove_hooks(identifier, node);
        let value = self.registry()?.doc.borrow().get_attribute(node, attribute).map(str::to_string);
        let result = match (value, self.directive(identifier)) {
            (Some(value), Some(directive)) => directive(self, node, Some(&value)),
            _ => Ok(()),
        };
        self.schedule_hooks_updated()?;
        result
    }

    fn schedule_hooks_updated(self: &Rc<Self>) -> Result<()> {
        let delay = self.registry()?.config.hooks_update_delay_ms;
        let weak = self.this.clone();
        self.set_timer(TimerKey::HooksUpdated, delay, move || {
            let Some(component) = weak.upgrade() else { return Ok(()) };
            if let Some(hooks_updated) = component.class.lifecycle.hooks_updated.clone() {
                hooks_updated(&component)?;
            }
            component.render(&State::new())
        })
    }

    pub fn render_hooks(&self) -> Vec<Hook> {
        self.render_hooks.borrow().values().flatten().cloned().collect()
    }

    pub fn state_hooks(&self) -> Vec<Hook> {
        self.state_hooks.borrow().values().flatten().cloned().collect()
    }

    pub fn event_bindings(&self) -> Vec<(NodeId, EventBinding)> {
        self.event_map
            .borrow()
            .iter()
            .flat_map(|(node, bindings)| bindings.iter().map(|b| (*node, b.clone())))
            .collect()
    }

    // ---- state ----

    /// Copy of the current state; a shadow component reads its logical
    /// parent's state
    pub fn state(&self) -> State {
        if self.class.is_shadow() {
            if let Some(parent) = self.logical_parent() {
                return parent.state();
            }
        }
        self.state.borrow().clone()
    }

    pub fn initial_state(&self) -> State {
        self.initial_state.borrow().clone()
    }

    /// Apply a state transition. Returns a copy of the new state, or `None`
    /// when the component is destroyed or already inside a transition.
    pub fn set_state(self: &Rc<Self>, update: StateUpdate, transition: State, mode: RenderMode) -> Result<Option<State>> {
        if self.class.is_shadow() {
            return match self.logical_parent() {
                Some(parent) => parent.set_state(update, transition, mode),
                None => Err(Error::InvalidState(format!("{} has no parent to hold its state", self.name))),
            };
        }
        if self.is_destroyed() {
            return Ok(None);
        }
        let Some(guard) = TransitionGuard::enter(&self.transitioning) else {
            tracing::debug!("Nested setState on {} ignored", self.name);
            return Ok(None);
        };

        let prev = self.state.borrow().clone();
        let next = match update {
            StateUpdate::Merge(partial) => match self.class.lifecycle.merge_state.clone() {
                Some(merge) => merge(prev.clone(), partial),
                None => deep_merge(prev.clone(), partial),
            },
            StateUpdate::With(f) => f(prev.clone())?,
            StateUpdate::Replace(state) => state,
        };
        *self.state.borrow_mut() = next.clone();

        let registry = self.registry()?;
        if registry.config.reflect_state {
            let serialized = serde_json::to_string(&next).map_err(|e| Error::InvalidState(e.to_string()))?;
            registry.doc.borrow_mut().set_attribute(self.element, STATE_ATTR, &serialized)?;
        }

        let prev_value = Value::from_json(&Json::Object(prev.clone()));
        for hook in self.state_hooks() {
            (hook.hook)(self, &prev_value)?;
        }
        if let Some(state_changed) = self.class.lifecycle.state_changed.clone() {
            state_changed(self, &prev, &next)?;
        }

        let base = match self.class.lifecycle.transition_on_state_changing.clone() {
            Some(f) => f(&prev, &next),
            None => State::new(),
        };
        let transition = deep_merge(base, transition);
        // render hooks may set state again
        drop(guard);
        match mode {
            RenderMode::Immediate => self.render(&transition)?,
            RenderMode::Debounced => self.schedule_render(transition)?,
            RenderMode::Skip => {}
        }

        if let Some(parent) = self.parent() {
            if let Some(child_changed) = parent.class.lifecycle.child_changed.clone() {
                child_changed(&parent, self)?;
            }
        }
        Ok(Some(next))
    }

    /// `setState(partial | fn, transition?, immediate?)` from an expression
    fn set_state_from_args(self: &Rc<Self>, args: Vec<Value>) -> Result<Value> {
        let mut args = args.into_iter();
        let update = match args.next().unwrap_or_default() {
            Value::Undefined | Value::Null => StateUpdate::Merge(State::new()),
            Value::Function(f) => {
                let this = self.this_value();
                StateUpdate::With(Box::new(move |current| {
                    let result = f
                        .call(&this, vec![Value::from_json(&Json::Object(current))])
                        .map_err(|error| Error::Eval { code: "setState".into(), error })?;
                    as_state(result.to_json())
                        .ok_or_else(|| Error::InvalidState("setState function must return an object".into()))
                }))
            }
            other => StateUpdate::Merge(
                as_state(other.to_json())
                    .ok_or_else(|| Error::InvalidState("setState expects an object or a function".into()))?,
            ),
        };
        let transition = as_state(args.next().unwrap_or_default().to_json()).unwrap_or_default();
        let mode = match args.next() {
            Some(Value::Bool(false)) => RenderMode::Debounced,
            _ => RenderMode::Immediate,
        };
        Ok(match self.set_state(update, transition, mode)? {
            Some(state) => Value::from_json(&Json::Object(state)),
            None => Value::Undefined,
        })
    }

    // ---- rendering ----

    /// Run the render hooks, then render the children that follow
    pub fn render(self: &Rc<Self>, transition: &State) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        self.cancel_timer(&TimerKey::Render);
        let flags = Value::from_json(&Json::Object(transition.clone()));
        for hook in self.render_hooks() {
            if self.is_destroyed() {
                return Ok(());
            }
            (hook.hook)(self, &flags)?;
        }
        for child in self.children() {
            if !child.is_destroyed() && child.follows_render(self, transition) {
                child.render(transition)?;
            }
        }
        Ok(())
    }

    fn follows_render(self: &Rc<Self>, parent: &Rc<Component>, transition: &State) -> bool {
        match self.class.lifecycle.should_follow_render.clone() {
            Some(predicate) => predicate(self, parent, transition),
            None => true,
        }
    }

    /// Render after a delay growing with tree depth; a pending debounced
    /// render is replaced
    pub fn schedule_render(self: &Rc<Self>, transition: State) -> Result<()> {
        let delay = self.registry()?.config.render_delay(self.depth());
        let weak = self.this.clone();
        self.set_timer(TimerKey::Render, delay, move || match weak.upgrade() {
            Some(component) => component.render(&transition),
            None => Ok(()),
        })
    }

    pub fn has_pending_render(&self) -> bool {
        self.timers.borrow().contains_key(&TimerKey::Render)
    }

    // ---- timers ----

    pub(crate) fn set_timer(&self, key: TimerKey, delay_ms: u64, task: impl FnOnce() -> Result<()> + 'static) -> Result<()> {
        let registry = self.registry()?;
        self.cancel_timer(&key);
        let weak = self.this.clone();
        let fired = key.clone();
        let id = registry.scheduler.borrow_mut().set_timeout(delay_ms, move || {
            if let Some(component) = weak.upgrade() {
                component.timers.borrow_mut().remove(&fired);
            }
            task()
        });
        self.timers.borrow_mut().insert(key, id);
        Ok(())
    }

    pub(crate) fn cancel_timer(&self, key: &TimerKey) -> bool {
        let Some(id) = self.timers.borrow_mut().remove(key) else { return false };
        match self.registry.upgrade() {
            Some(registry) => registry.scheduler.borrow_mut().clear_timeout(id),
            None => false,
        }
    }

    // ---- teardown ----

    /// Cancel timers, detach listeners, drop hooks and refs, call
    /// `unmounted` and release the element. Idempotent.
    pub fn destroy(self: &Rc<Self>) -> Result<()> {
        if self.status.replace(Status::Destroyed) == Status::Destroyed {
            return Ok(());
        }
        tracing::debug!("Destroying component {} on {:?}", self.name, self.element);

        let timers: Vec<TimerId> = self.timers.borrow_mut().drain().map(|(_, id)| id).collect();
        let bindings = std::mem::take(&mut *self.event_map.borrow_mut());
        self.render_hooks.borrow_mut().clear();
        self.state_hooks.borrow_mut().clear();
        self.refs.borrow_mut().clear();

        let registry = self.registry.upgrade();
        if let Some(registry) = &registry {
            let mut scheduler = registry.scheduler.borrow_mut();
            for id in timers {
                scheduler.clear_timeout(id);
            }
            drop(scheduler);
            for (node, bindings) in bindings {
                for binding in bindings {
                    registry.remove_listener(node, &binding.event_type, binding.listener);
                }
            }
        }

        let result = match self.class.lifecycle.unmounted.clone() {
            Some(unmounted) => unmounted(self),
            None => Ok(()),
        };
        if let Some(registry) = registry {
            registry.release(self);
        }
        result
    }

    /// Drop hooks, listeners and refs whose node left the document
    pub fn housekeeping(&self) {
        let Some(registry) = self.registry.upgrade() else { return };
        let detached = |node: &NodeId| !registry.doc.borrow().is_connected(*node);

        for map in [&self.render_hooks, &self.state_hooks] {
            map.borrow_mut().retain(|node, _| !detached(node));
        }
        let stale: Vec<(NodeId, Vec<EventBinding>)> = {
            let mut map = self.event_map.borrow_mut();
            let nodes: Vec<NodeId> = map.keys().copied().filter(|n| detached(n)).collect();
            nodes.into_iter().filter_map(|n| map.remove(&n).map(|b| (n, b))).collect()
        };
        for (node, bindings) in stale {
            for binding in bindings {
                registry.remove_listener(node, &binding.event_type, binding.listener);
            }
        }
        self.refs.borrow_mut().retain_mut(|(_, entry)| match entry {
            RefEntry::Single(node) => !detached(node),
            RefEntry::List(nodes) => {
                nodes.retain(|n| !detached(n));
                !nodes.is_empty()
            }
        });
    }

    pub(crate) fn schedule_housekeeping(&self) -> Result<()> {
        let delay = self.registry()?.config.housekeeping_delay_ms;
        let weak = self.this.clone();
        self.set_timer(TimerKey::Housekeeping, delay, move || {
            if let Some(component) = weak.upgrade() {
                component.housekeeping();
            }
            Ok(())
        })
    }

    // ---- topology ----

    /// Nearest ancestor element owning a live component, unless overridden
    pub fn parent(&self) -> Option<Rc<Component>> {
        if let Some(parent) = self.parent_override.borrow().as_ref() {
            return parent.upgrade();
        }
        let registry = self.registry.upgrade()?;
        registry.governing_component(self.element).filter(|parent| parent.element != self.element)
    }

    /// Pin the parent; `None` goes back to walking the DOM
    pub fn set_parent(&self, parent: Option<&Rc<Component>>) {
        *self.parent_override.borrow_mut() = parent.map(Rc::downgrade);
        self.depth_cache.set(None);
    }

    /// Components of the topmost root markers below the element and inside
    /// its portals, loop items included
    pub fn children(&self) -> Vec<Rc<Component>> {
        if let Some(children) = self.children_override.borrow().as_ref() {
            return children.iter().filter_map(Weak::upgrade).collect();
        }
        let Some(registry) = self.registry.upgrade() else { return Vec::new() };
        let markers: Vec<NodeId> = {
            let doc = registry.doc.borrow();
            let mut markers = marker_descendants(&doc, self.element, true);
            for portal in self.portal_elements(&doc) {
                if is_root_marker(&doc, portal) {
                    markers.push(portal);
                } else {
                    markers.extend(marker_descendants(&doc, portal, true));
                }
            }
            markers
        };
        markers
            .into_iter()
            .filter_map(|node| registry.live_component(node))
            .filter(|child| child.parent().is_some_and(|parent| parent.element == self.element))
            .collect()
    }

    pub fn set_children(&self, children: Option<&[Rc<Component>]>) {
        *self.children_override.borrow_mut() = children.map(|c| c.iter().map(Rc::downgrade).collect());
    }

    /// Children named or aliased `name`
    pub fn filter_children(&self, name: &str) -> Vec<Rc<Component>> {
        self.children().into_iter().filter(|c| c.answers_to(name)).collect()
    }

    pub fn root(self: &Rc<Self>) -> Rc<Component> {
        let mut current = Rc::clone(self);
        while let Some(parent) = current.parent() {
            if Rc::ptr_eq(&parent, self) {
                break;
            }
            current = parent;
        }
        current
    }

    /// Distance to the root component, cached until the topology changes
    pub fn depth(&self) -> usize {
        let epoch = self.registry.upgrade().map_or(0, |r| r.epoch.get());
        if let Some((cached_epoch, depth)) = self.depth_cache.get() {
            if cached_epoch == epoch {
                return depth;
            }
        }
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(parent) = current {
            depth += 1;
            current = parent.parent();
        }
        self.depth_cache.set(Some((epoch, depth)));
        depth
    }

    /// Parent named by the loop context, else the DOM parent
    pub fn logical_parent(&self) -> Option<Rc<Component>> {
        let registry = self.registry.upgrade()?;
        let named = registry
            .contexts
            .borrow()
            .get(&self.element)
            .and_then(|c| c.parent.as_ref())
            .and_then(Weak::upgrade);
        named.or_else(|| self.parent())
    }

    // ---- context ----

    pub fn context(&self) -> Object {
        self.registry
            .upgrade()
            .and_then(|r| r.contexts.borrow().get(&self.element).map(|c| c.values.clone()))
            .unwrap_or_default()
    }

    pub fn set_context(&self, values: Object) {
        if let Some(registry) = self.registry.upgrade() {
            registry.contexts.borrow_mut().entry(self.element).or_default().values = values;
        }
    }

    // ---- members ----

    pub fn has_method(&self, name: &str) -> bool {
        if BUILTIN_METHODS.contains(&name) || self.methods.borrow().contains_key(name) {
            return true;
        }
        self.class.is_shadow() && self.logical_parent().is_some_and(|p| p.has_method(name))
    }

    /// Call a class or mixin method, `setState` or `render`
    pub fn call_method(self: &Rc<Self>, name: &str, args: Vec<Value>) -> Result<Value> {
        match name {
            "setState" => return self.set_state_from_args(args),
            "render" => {
                let transition = args.into_iter().next().and_then(|t| as_state(t.to_json())).unwrap_or_default();
                self.render(&transition)?;
                return Ok(Value::Undefined);
            }
            _ => {}
        }
        let method = self.methods.borrow().get(name).cloned();
        match method {
            Some(method) => method(self, args),
            None => match self.resolve_from_parent_method() {
                Some(parent) => parent.call_method(name, args),
                None => Err(Error::InvalidState(format!("{name} is not a method of {}", self.name))),
            },
        }
    }

    fn resolve_from_parent_method(&self) -> Option<Rc<Component>> {
        if self.class.is_shadow() { self.logical_parent() } else { None }
    }

    fn method_value(&self, name: &str) -> Value {
        let weak = self.this.clone();
        let method = name.to_string();
        Value::function(name, move |_this, args| {
            let component = weak
                .upgrade()
                .ok_or_else(|| drender_expr::EvalError::host("component has been dropped"))?;
            component.call_method(&method, args).map_err(Error::into_eval)
        })
    }

    /// Member visible to expressions as a bare identifier or on `this`
    pub fn member(&self, name: &str) -> Option<Value> {
        let registry = &self.registry;
        let value = match name {
            "state" => Value::from_json(&Json::Object(self.state())),
            "initialState" => Value::from_json(&Json::Object(self.initial_state())),
            "context" => Value::Object(self.context()),
            "refs" => Value::Object(refs_object(registry, &self.refs.borrow())),
            "name" => Value::from(self.name.as_str()),
            "kebabName" => Value::from(self.kebab_name.as_str()),
            "element" => NodeRef::value(registry, self.element),
            "parent" => self.parent().map_or(Value::Null, |p| p.this_value()),
            "children" => Value::Array(self.children().iter().map(|c| c.this_value()).collect()),
            "root" => {
                let root = self.this.upgrade().map(|this| this.root());
                root.map_or(Value::Null, |r| r.this_value())
            }
            _ if self.has_own_method(name) => self.method_value(name),
            _ => match self.members.borrow().get(name) {
                Some(value) => value.clone(),
                None => return self.resolve_from_parent(name),
            },
        };
        Some(value)
    }

    fn has_own_method(&self, name: &str) -> bool {
        BUILTIN_METHODS.contains(&name) || self.methods.borrow().contains_key(name)
    }

    /// Lookup fallback of loop items: members they do not define come from
    /// the logical parent
    pub fn resolve_from_parent(&self, name: &str) -> Option<Value> {
        if !self.class.is_shadow() {
            return None;
        }
        self.logical_parent()?.member(name)
    }

    /// Assign a plain member (`this.name = value`)
    pub fn set_member(&self, name: &str, value: Value) -> Result<()> {
        if matches!(name, "state" | "initialState" | "context" | "refs" | "element" | "name" | "kebabName")
            || self.has_own_method(name)
        {
            return Err(Error::InvalidState(format!("{name} is read-only")));
        }
        self.members.borrow_mut().set(name, value);
        Ok(())
    }

    /// Value bound to a free identifier: state key, then context key, then
    /// member
    pub(crate) fn resolve_identifier(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.state_value(name) {
            return Some(value);
        }
        if let Some(value) = self.context().get(name) {
            return Some(value.clone());
        }
        self.member(name)
    }

    fn state_value(&self, key: &str) -> Option<Value> {
        if self.class.is_shadow() {
            return self.logical_parent().and_then(|p| p.state_value(key));
        }
        self.state.borrow().get(key).map(Value::from_json)
    }

    // ---- accessors ----

    pub(crate) fn registry(&self) -> Result<Rc<Registry>> {
        self.registry.upgrade().ok_or(Error::RuntimeGone)
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Second name from `d-alias`
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alias.as_deref() == Some(name)
    }

    /// Value of `d-portal` that hands a region to this component
    pub fn portal_name(&self) -> &str {
        &self.portal
    }

    pub fn kebab_name(&self) -> &str {
        &self.kebab_name
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn is_shadow(&self) -> bool {
        self.class.is_shadow()
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.status.get() == Status::Destroyed
    }

    pub fn has_global_directives(&self) -> bool {
        self.global_directives
    }

    pub fn refs(&self) -> Vec<(String, RefEntry)> {
        self.refs.borrow().clone()
    }

    pub fn ref_node(&self, name: &str) -> Option<NodeId> {
        self.refs.borrow().iter().find_map(|(n, entry)| match entry {
            RefEntry::Single(node) if n == name => Some(*node),
            _ => None,
        })
    }

    /// Messages of directives that failed to register
    pub fn setup_errors(&self) -> Vec<String> {
        self.setup_errors.borrow().clone()
    }

    pub(crate) fn this_value(&self) -> Value {
        ComponentRef::value(&self.this)
    }

    pub(crate) fn node_value(&self, node: NodeId) -> Value {
        NodeRef::value(&self.registry, node)
    }

    pub(crate) fn event_value(&self, event: &Rc<RefCell<Event>>) -> Value {
        EventRef::value(&self.registry, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::runtime::Runtime;
    use drender_dom::Selector;
    use serde_json::json;

    fn find(doc: &Document, selector: &str) -> NodeId {
        doc.query_selector(doc.root(), &Selector::parse(selector).unwrap()).unwrap()
    }

    fn tags(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().filter_map(|&n| doc.tag_name(n).map(str::to_string)).collect()
    }

    #[test]
    fn test_owned_elements_stop_at_boundaries() {
        let doc = drender_html::parse(
            r#"<div id="root"><p></p><section d-state="{}"><b></b></section><ul d-loop="xs"><li></li></ul><aside d-portal="x"><i></i></aside></div>"#,
        )
        .unwrap();
        let root = find(&doc, "#root");
        assert_eq!(tags(&doc, &owned_elements(&doc, root)), vec!["div", "p", "ul"]);

        let aside = find(&doc, "aside");
        assert_eq!(tags(&doc, &owned_elements(&doc, aside)), vec!["aside", "i"]);
    }

    #[test]
    fn test_marker_descendants_are_topmost() {
        let doc = drender_html::parse(
            r#"<main><div d-state="{}"><p d-state="{}"></p></div><ul d-loop="xs"><li d-component="Item"></li></ul></main>"#,
        )
        .unwrap();
        let main = find(&doc, "main");
        assert_eq!(tags(&doc, &marker_descendants(&doc, main, false)), vec!["div"]);
        assert_eq!(tags(&doc, &marker_descendants(&doc, main, true)), vec!["div", "li"]);
    }

    #[test]
    fn test_transition_guard_is_exclusive() {
        let flag = Cell::new(false);
        let guard = TransitionGuard::enter(&flag);
        assert!(guard.is_some());
        assert!(TransitionGuard::enter(&flag).is_none());
        drop(guard);
        assert!(!flag.get());
        assert!(TransitionGuard::enter(&flag).is_some());
    }

    #[test]
    fn test_destroyed_component_ignores_updates() {
        let rt = Runtime::from_html(r#"<div d-state="{ n: 1 }"><span d-text="n"></span></div>"#, Config::default()).unwrap();
        rt.start().unwrap();
        let component = rt.component_for(rt.query("div").unwrap().unwrap()).unwrap();
        component.destroy().unwrap();
        component.destroy().unwrap();

        let mut partial = State::new();
        partial.insert("n".into(), json!(2));
        let result = component.set_state(StateUpdate::Merge(partial), State::new(), RenderMode::Immediate).unwrap();
        assert!(result.is_none());
        assert!(component.render_hooks().is_empty());
        assert_eq!(rt.document().text_content(rt.query("span").unwrap().unwrap()), "1");
    }

    #[test]
    fn test_when_registered_runs_now_on_an_active_component() {
        let rt = Runtime::from_html(r#"<div d-state="{}"></div>"#, Config::default()).unwrap();
        rt.start().unwrap();
        let component = rt.component_for(rt.query("div").unwrap().unwrap()).unwrap();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        component
            .when_registered(move |_| {
                flag.set(true);
                Ok(())
            })
            .unwrap();
        assert!(ran.get());
    }
}
