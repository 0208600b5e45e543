//! Runtime
//!
//! Owns the live document, the virtual clock, the directive and class
//! registries and every component. Components reach it through a weak
//! handle; dropping the [`Runtime`] tears everything down.

use crate::class::{ComponentClass, MixinSource};
use crate::component::{COMPONENT_ATTR, Component, Context, PORTAL_ATTR, STATE_ATTR, marker_descendants};
use crate::config::Config;
use crate::directives::{DirectiveFn, DirectiveRegistry, ModifierFn, ModifierRegistry};
use crate::discovery;
use crate::scheduler::Scheduler;
use crate::state::State;
use crate::{Error, Result};
use drender_dom::{Document, Event, ListenerId, MutationObserverInit, NodeId, Selector};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Listener stored by the runtime; the event is shared with the handlers
/// along the propagation path
pub type EventHandler = Rc<dyn Fn(&Rc<RefCell<Event>>) -> Result<()>>;

/// Class used for `d-state` elements without `d-component`
const BASE_CLASS: &str = "Component";

/// Bound on clock steps taken by [`Runtime::run_until_idle`]
const IDLE_STEPS: usize = 10_000;

struct Reset<'a>(&'a Cell<bool>);

impl Drop for Reset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub(crate) struct Registry {
    this: Weak<Registry>,
    pub(crate) config: Config,
    pub(crate) doc: RefCell<Document>,
    pub(crate) scheduler: RefCell<Scheduler>,
    pub(crate) directives: RefCell<DirectiveRegistry>,
    pub(crate) modifiers: RefCell<ModifierRegistry>,
    classes: RefCell<HashMap<String, Rc<ComponentClass>>>,
    base_class: Rc<ComponentClass>,
    components: RefCell<HashMap<NodeId, Rc<Component>>>,
    pub(crate) contexts: RefCell<HashMap<NodeId, Context>>,
    listeners: RefCell<HashMap<ListenerId, EventHandler>>,
    next_listener: Cell<u64>,
    started: Cell<bool>,
    flushing: Cell<bool>,
    /// Bumped on every topology change; invalidates cached depths
    pub(crate) epoch: Cell<u64>,
}

impl Registry {
    fn new(document: Document, config: Config) -> Rc<Self> {
        let shadow = Rc::new(ComponentClass::new(&config.shadow_component).shadow());
        let mut classes = HashMap::new();
        classes.insert(config.shadow_component.clone(), shadow);
        Rc::new_cyclic(|this| Registry {
            this: this.clone(),
            config,
            doc: RefCell::new(document),
            scheduler: RefCell::new(Scheduler::new()),
            directives: RefCell::new(DirectiveRegistry::with_builtins()),
            modifiers: RefCell::new(ModifierRegistry::with_builtins()),
            classes: RefCell::new(classes),
            base_class: Rc::new(ComponentClass::new(BASE_CLASS)),
            components: RefCell::new(HashMap::new()),
            contexts: RefCell::new(HashMap::new()),
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(1),
            started: Cell::new(false),
            flushing: Cell::new(false),
            epoch: Cell::new(0),
        })
    }

    fn rc(&self) -> Result<Rc<Registry>> {
        self.this.upgrade().ok_or(Error::RuntimeGone)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.get()
    }

    pub(crate) fn bump_epoch(&self) {
        self.epoch.set(self.epoch.get().wrapping_add(1));
    }

    // ---- classes and components ----

    /// Class named by the element's `d-component`. A plain `d-state`
    /// element gets the base class, as does an unknown name when
    /// `fallback` is set.
    pub(crate) fn class_for(&self, node: NodeId, fallback: bool) -> Option<Rc<ComponentClass>> {
        let name = self
            .doc
            .borrow()
            .get_attribute(node, COMPONENT_ATTR)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        match name {
            None => Some(Rc::clone(&self.base_class)),
            Some(name) => match self.classes.borrow().get(&name) {
                Some(class) => Some(Rc::clone(class)),
                None if fallback => Some(Rc::clone(&self.base_class)),
                None => None,
            },
        }
    }

    pub(crate) fn live_component(&self, node: NodeId) -> Option<Rc<Component>> {
        self.components.borrow().get(&node).filter(|c| !c.is_destroyed()).cloned()
    }

    pub(crate) fn all_components(&self) -> Vec<Rc<Component>> {
        let mut components: Vec<Rc<Component>> =
            self.components.borrow().values().filter(|c| !c.is_destroyed()).cloned().collect();
        components.sort_by_key(|c| c.element());
        components
    }

    pub(crate) fn global_components(&self) -> Vec<Rc<Component>> {
        self.all_components().into_iter().filter(|c| c.has_global_directives()).collect()
    }

    /// Nearest ancestor of `node` (exclusive) owning a live component. A
    /// `d-portal` region on the way, `node` included, belongs to the
    /// component of that portal name.
    pub(crate) fn governing_component(&self, node: NodeId) -> Option<Rc<Component>> {
        let path: Vec<(NodeId, Option<String>)> = {
            let doc = self.doc.borrow();
            std::iter::once(node)
                .chain(doc.ancestors(node))
                .map(|n| (n, doc.get_attribute(n, PORTAL_ATTR).map(|p| p.trim().to_string())))
                .collect()
        };
        for (n, portal) in path {
            if n != node {
                if let Some(component) = self.live_component(n) {
                    return Some(component);
                }
            }
            if let Some(portal) = portal {
                return self.portal_owner(&portal);
            }
        }
        None
    }

    fn portal_owner(&self, portal: &str) -> Option<Rc<Component>> {
        self.all_components().into_iter().find(|c| c.portal_name() == portal)
    }

    /// Forget a destroyed component and its context
    pub(crate) fn release(&self, component: &Rc<Component>) {
        let element = component.element();
        let mut components = self.components.borrow_mut();
        if components.get(&element).is_some_and(|c| Rc::ptr_eq(c, component)) {
            components.remove(&element);
            self.contexts.borrow_mut().remove(&element);
        }
        drop(components);
        self.bump_epoch();
    }

    /// Return the component of `node`, constructing it (and the components
    /// nested inside it) when there is none. The flag tells whether a new
    /// component was built.
    pub(crate) fn create_component(&self, node: NodeId, context: Option<Context>) -> Result<(Rc<Component>, bool)> {
        if let Some(existing) = self.live_component(node) {
            return Ok((existing, false));
        }
        let registry = self.rc()?;
        let class = self
            .class_for(node, true)
            .ok_or_else(|| Error::InvalidState(format!("no component class for {node:?}")))?;
        if let Some(context) = context {
            self.contexts.borrow_mut().insert(node, context);
        }

        let component = match Component::construct(&registry, node, class) {
            Ok(component) => component,
            Err(error) => {
                self.contexts.borrow_mut().remove(&node);
                return Err(error);
            }
        };
        self.components.borrow_mut().insert(node, Rc::clone(&component));
        self.bump_epoch();
        component.activate();
        component.finish_setup();

        let inherited = self.contexts.borrow().get(&node).map(|c| Context::new(c.values.clone()));
        let nested = marker_descendants(&self.doc.borrow(), node, false);
        for child in nested {
            let has_own = self.contexts.borrow().contains_key(&child);
            let context = if has_own { None } else { inherited.clone() };
            if let Err(error) = self.create_component(child, context) {
                tracing::error!("Failed to create nested component on {:?}: {}", child, error);
            }
        }

        if let Err(error) = component.post_initialize() {
            tracing::error!("Initialization of {} failed: {}", component.name(), error);
        }
        Ok((component, true))
    }

    /// Construct and render the top-level components below `root` whose
    /// class is registered
    pub(crate) fn bootstrap(&self, root: NodeId) -> Vec<Rc<Component>> {
        let markers = {
            let doc = self.doc.borrow();
            if doc.is_element(root) && (doc.has_attribute(root, STATE_ATTR) || doc.has_attribute(root, COMPONENT_ATTR)) {
                vec![root]
            } else {
                marker_descendants(&doc, root, true)
            }
        };
        let mut created = Vec::new();
        for node in markers {
            if self.class_for(node, false).is_none() {
                tracing::debug!("Skipping {:?}: component class not registered yet", node);
                continue;
            }
            match self.create_component(node, None) {
                Ok((component, true)) => {
                    if let Err(error) = component.render(&State::new()) {
                        tracing::error!("Initial render of {} failed: {}", component.name(), error);
                    }
                    created.push(component);
                }
                Ok(_) => {}
                Err(error) => tracing::error!("Failed to create component on {:?}: {}", node, error),
            }
        }
        created
    }

    // ---- listeners ----

    pub(crate) fn add_listener(&self, node: NodeId, event_type: &str, handler: EventHandler) -> Result<ListenerId> {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.doc.borrow_mut().add_event_listener(node, event_type, id)?;
        self.listeners.borrow_mut().insert(id, handler);
        Ok(id)
    }

    pub(crate) fn remove_listener(&self, node: NodeId, event_type: &str, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(&id);
        self.doc.borrow_mut().remove_event_listener(node, event_type, id)
    }

    /// Run the listeners along the propagation path. Returns false when a
    /// handler prevented the default action.
    pub(crate) fn dispatch(&self, event: Event) -> bool {
        let path: Vec<NodeId> = {
            let doc = self.doc.borrow();
            if event.bubbles {
                std::iter::once(event.target).chain(doc.ancestors(event.target)).collect()
            } else {
                vec![event.target]
            }
        };
        let event_type = event.event_type.clone();
        let event = Rc::new(RefCell::new(event));
        for node in path {
            let ids = self.doc.borrow().listeners(node, &event_type);
            event.borrow_mut().current_target = Some(node);
            for id in ids {
                let handler = self.listeners.borrow().get(&id).cloned();
                if let Some(handler) = handler {
                    if let Err(error) = handler(&event) {
                        tracing::error!("{} handler on {:?} failed: {}", event_type, node, error);
                    }
                }
            }
            if event.borrow().propagation_stopped() {
                break;
            }
        }
        let prevented = event.borrow().default_prevented();
        !prevented
    }

    // ---- clock ----

    /// Deliver pending mutation records until the document is quiet
    pub(crate) fn flush(&self) -> Result<()> {
        if self.flushing.replace(true) {
            return Ok(());
        }
        let _reset = Reset(&self.flushing);
        let registry = self.rc()?;
        let mut rounds = 0;
        loop {
            let records = self.doc.borrow_mut().take_records();
            if records.is_empty() {
                return Ok(());
            }
            rounds += 1;
            if rounds > self.config.max_mutation_rounds {
                tracing::warn!("Mutation processing stopped after {} rounds", self.config.max_mutation_rounds);
                return Ok(());
            }
            discovery::process(&registry, records);
        }
    }

    fn run_task(&self, task: crate::scheduler::Task) -> Result<()> {
        if let Err(error) = task() {
            tracing::error!("Scheduled task failed: {}", error);
        }
        self.flush()
    }

    pub(crate) fn next_frame(&self) -> Result<()> {
        let tasks = self.scheduler.borrow_mut().take_frame_tasks();
        for task in tasks {
            self.run_task(task)?;
        }
        Ok(())
    }

    pub(crate) fn advance(&self, ms: u64) -> Result<()> {
        let until = self.scheduler.borrow().now().saturating_add(ms);
        loop {
            let task = self.scheduler.borrow_mut().pop_due(until);
            match task {
                Some(task) => self.run_task(task)?,
                None => break,
            }
        }
        self.scheduler.borrow_mut().set_now(until);
        Ok(())
    }
}

/// Handle applications hold: registration, lifecycle and the clock
pub struct Runtime {
    registry: Rc<Registry>,
}

impl Runtime {
    pub fn new(document: Document, config: Config) -> Self {
        Self { registry: Registry::new(document, config) }
    }

    pub fn from_html(html: &str, config: Config) -> Result<Self> {
        Ok(Self::new(drender_html::parse(html)?, config))
    }

    pub fn config(&self) -> &Config {
        &self.registry.config
    }

    /// Turn on mutation recording and build the top-level components
    pub fn start(&self) -> Result<()> {
        if self.registry.started.replace(true) {
            return Ok(());
        }
        tracing::info!("Starting d-render runtime");
        self.registry.doc.borrow_mut().observe(MutationObserverInit::everything());
        let root = self.registry.doc.borrow().root();
        let created = self.registry.bootstrap(root);
        tracing::debug!("Bootstrapped {} components", created.len());
        self.registry.flush()
    }

    /// Stop reacting to document mutations
    pub fn stop(&self) {
        if self.registry.started.replace(false) {
            self.registry.doc.borrow_mut().disconnect();
        }
    }

    pub fn is_started(&self) -> bool {
        self.registry.is_started()
    }

    /// Make a class available to `d-component`. On a started runtime the
    /// top-level markers waiting for it are built right away.
    pub fn register_component(&self, class: ComponentClass) -> Result<()> {
        let name = class.name().to_string();
        if name.is_empty() {
            return Err(Error::InvalidState("component class needs a name".into()));
        }
        tracing::debug!("Registering component class {}", name);
        self.registry.classes.borrow_mut().insert(name, Rc::new(class));
        if self.is_started() {
            let root = self.registry.doc.borrow().root();
            self.registry.bootstrap(root);
            self.registry.flush()?;
        }
        Ok(())
    }

    /// Register a class made only of mixins
    pub fn define_component(&self, name: &str, mixins: Vec<MixinSource>) -> Result<()> {
        let class = mixins.into_iter().fold(ComponentClass::new(name), |class, mixin| class.mixin(mixin));
        self.register_component(class)
    }

    pub fn register_directive(&self, identifier: &str, directive: DirectiveFn) {
        self.registry.directives.borrow_mut().register(identifier, directive);
    }

    pub fn register_modifier(&self, name: &str, modifier: ModifierFn) {
        self.registry.modifiers.borrow_mut().register(name, modifier);
    }

    pub fn component_for(&self, node: NodeId) -> Option<Rc<Component>> {
        self.registry.live_component(node)
    }

    /// Component of `node` or its nearest ancestor, optionally with the
    /// given name
    pub fn nearest_component(&self, node: NodeId, name: Option<&str>) -> Option<Rc<Component>> {
        let path: Vec<NodeId> = {
            let doc = self.registry.doc.borrow();
            std::iter::once(node).chain(doc.ancestors(node)).collect()
        };
        path.into_iter()
            .filter_map(|n| self.registry.live_component(n))
            .find(|c| name.is_none_or(|name| c.answers_to(name)))
    }

    pub fn components_named(&self, name: &str) -> Vec<Rc<Component>> {
        self.registry.all_components().into_iter().filter(|c| c.name() == name).collect()
    }

    pub fn components(&self) -> Vec<Rc<Component>> {
        self.registry.all_components()
    }

    /// Build the component of `node` with an optional context and render
    /// it when it is new
    pub fn create_component(&self, node: NodeId, context: Option<Context>) -> Result<Rc<Component>> {
        let (component, created) = self.registry.create_component(node, context)?;
        if created {
            component.render(&State::new())?;
        }
        self.registry.flush()?;
        Ok(component)
    }

    /// Dispatch `event` at `target`, then deliver the resulting mutations.
    /// Returns false when a handler prevented the default action.
    pub fn dispatch_event(&self, target: NodeId, mut event: Event) -> Result<bool> {
        event.target = target;
        let not_prevented = self.registry.dispatch(event);
        self.registry.flush()?;
        Ok(not_prevented)
    }

    /// Attach a plain listener outside any component
    pub fn add_event_listener(
        &self,
        node: NodeId,
        event_type: &str,
        listener: impl Fn(&mut Event) -> Result<()> + 'static,
    ) -> Result<ListenerId> {
        let handler: EventHandler = Rc::new(move |event: &Rc<RefCell<Event>>| listener(&mut event.borrow_mut()));
        self.registry.add_listener(node, event_type, handler)
    }

    pub fn remove_event_listener(&self, node: NodeId, event_type: &str, id: ListenerId) -> bool {
        self.registry.remove_listener(node, event_type, id)
    }

    /// Deliver pending mutation records
    pub fn flush(&self) -> Result<()> {
        self.registry.flush()
    }

    /// Run the callbacks waiting for the next animation frame
    pub fn next_frame(&self) -> Result<()> {
        self.registry.next_frame()
    }

    /// Move the clock forward, running every timer that falls due
    pub fn advance(&self, ms: u64) -> Result<()> {
        self.registry.advance(ms)
    }

    /// Run frames and timers until nothing is scheduled
    pub fn run_until_idle(&self) -> Result<()> {
        for _ in 0..IDLE_STEPS {
            self.registry.flush()?;
            let (has_frames, next_due, now) = {
                let scheduler = self.registry.scheduler.borrow();
                (scheduler.has_frames(), scheduler.next_due(), scheduler.now())
            };
            if has_frames {
                self.registry.next_frame()?;
            } else if let Some(due) = next_due {
                self.registry.advance(due.saturating_sub(now))?;
            } else {
                return Ok(());
            }
        }
        tracing::warn!("Scheduler still busy after {} steps", IDLE_STEPS);
        Ok(())
    }

    /// Virtual clock in milliseconds
    pub fn now(&self) -> u64 {
        self.registry.scheduler.borrow().now()
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.registry.doc.borrow()
    }

    /// Direct access to the document. Changes are seen at the next flush.
    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.registry.doc.borrow_mut()
    }

    pub fn query(&self, selector: &str) -> Result<Option<NodeId>> {
        let selector = Selector::parse(selector)?;
        let doc = self.registry.doc.borrow();
        Ok(doc.query_selector(doc.root(), &selector))
    }

    pub fn query_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        let doc = self.registry.doc.borrow();
        Ok(doc.query_selector_all(doc.root(), &selector))
    }

    /// Replace the children of `node` with parsed markup
    pub fn set_inner_html(&self, node: NodeId, html: &str) -> Result<()> {
        drender_html::set_inner_html(&mut self.registry.doc.borrow_mut(), node, html)?;
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        for component in self.registry.all_components() {
            if let Err(error) = component.destroy() {
                tracing::error!("Teardown of {} failed: {}", component.name(), error);
            }
        }
    }
}
