//! Component classes and mixins
//!
//! A class is a named bundle of defaults, methods, directives and lifecycle
//! callbacks. Mixins are capability structs merged in at construction;
//! factories build one from the component being constructed.

use crate::component::{Component, HookFn};
use crate::directives::DirectiveFn;
use crate::state::State;
use crate::Result;
use drender_expr::{Object, Value};
use std::rc::Rc;

/// Method callable from expressions as `name(...)` or `this.name(...)`
pub type MethodFn = Rc<dyn Fn(&Rc<Component>, Vec<Value>) -> Result<Value>>;

pub type LifecycleFn = Rc<dyn Fn(&Rc<Component>) -> Result<()>>;

/// `(component, previous, current)`
pub type StateChangedFn = Rc<dyn Fn(&Rc<Component>, &State, &State) -> Result<()>>;

/// `(parent, child)`
pub type ChildChangedFn = Rc<dyn Fn(&Rc<Component>, &Rc<Component>) -> Result<()>>;

/// `(child, parent, transition)`
pub type FollowRenderFn = Rc<dyn Fn(&Rc<Component>, &Rc<Component>, &State) -> bool>;

/// `(previous, current)` to transition flags
pub type TransitionFn = Rc<dyn Fn(&State, &State) -> State>;

/// `(current clone, partial)` to next state
pub type MergeStateFn = Rc<dyn Fn(State, State) -> State>;

pub type MixinFactory = Rc<dyn Fn(&Rc<Component>) -> Mixin>;

/// Contribution of one mixin
#[derive(Clone, Default)]
pub struct Mixin {
    /// Merged underneath the declared state
    pub state: State,
    /// Component-specific directives, scanned after the registry
    pub directives: Vec<(String, DirectiveFn)>,
    pub methods: Vec<(String, MethodFn)>,
    /// Plain members readable as bare identifiers
    pub members: Object,
    /// Hooks attached to the component element
    pub render_hooks: Vec<(String, HookFn)>,
    pub state_hooks: Vec<(String, HookFn)>,
}

impl Mixin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = state;
        self
    }

    pub fn method(mut self, name: &str, method: impl Fn(&Rc<Component>, Vec<Value>) -> Result<Value> + 'static) -> Self {
        self.methods.push((name.to_string(), Rc::new(method)));
        self
    }

    pub fn member(mut self, name: &str, value: Value) -> Self {
        self.members.set(name, value);
        self
    }

    pub fn directive(mut self, identifier: &str, directive: DirectiveFn) -> Self {
        self.directives.push((identifier.to_string(), directive));
        self
    }

    pub fn render_hook(mut self, identifier: &str, hook: impl Fn(&Rc<Component>, &Value) -> Result<()> + 'static) -> Self {
        self.render_hooks.push((identifier.to_string(), Rc::new(hook)));
        self
    }

    pub fn state_hook(mut self, identifier: &str, hook: impl Fn(&Rc<Component>, &Value) -> Result<()> + 'static) -> Self {
        self.state_hooks.push((identifier.to_string(), Rc::new(hook)));
        self
    }
}

#[derive(Clone)]
pub enum MixinSource {
    Static(Mixin),
    Factory(MixinFactory),
}

impl MixinSource {
    pub(crate) fn resolve(&self, component: &Rc<Component>) -> Mixin {
        match self {
            MixinSource::Static(mixin) => mixin.clone(),
            MixinSource::Factory(factory) => factory(component),
        }
    }
}

impl From<Mixin> for MixinSource {
    fn from(mixin: Mixin) -> Self {
        MixinSource::Static(mixin)
    }
}

/// Overridable lifecycle; `None` keeps the default behavior
#[derive(Clone, Default)]
pub(crate) struct Lifecycle {
    pub after_initialized: Option<LifecycleFn>,
    pub hooks_updated: Option<LifecycleFn>,
    pub unmounted: Option<LifecycleFn>,
    pub state_changed: Option<StateChangedFn>,
    pub child_changed: Option<ChildChangedFn>,
    pub should_follow_render: Option<FollowRenderFn>,
    pub transition_on_state_changing: Option<TransitionFn>,
    pub merge_state: Option<MergeStateFn>,
}

/// Registered component class
#[derive(Clone)]
pub struct ComponentClass {
    name: String,
    shadow: bool,
    pub(crate) default_state: State,
    pub(crate) mixins: Vec<MixinSource>,
    pub(crate) methods: Vec<(String, MethodFn)>,
    pub(crate) directives: Vec<(String, DirectiveFn)>,
    pub(crate) lifecycle: Lifecycle,
}

impl ComponentClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shadow: false,
            default_state: State::new(),
            mixins: Vec::new(),
            methods: Vec::new(),
            directives: Vec::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loop-item class: state and `setState` belong to the logical parent
    pub fn shadow(mut self) -> Self {
        self.shadow = true;
        self
    }

    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    /// State merged underneath `d-state`
    pub fn default_state(mut self, state: State) -> Self {
        self.default_state = state;
        self
    }

    pub fn mixin(mut self, mixin: impl Into<MixinSource>) -> Self {
        self.mixins.push(mixin.into());
        self
    }

    pub fn mixin_fn(mut self, factory: impl Fn(&Rc<Component>) -> Mixin + 'static) -> Self {
        self.mixins.push(MixinSource::Factory(Rc::new(factory)));
        self
    }

    pub fn method(mut self, name: &str, method: impl Fn(&Rc<Component>, Vec<Value>) -> Result<Value> + 'static) -> Self {
        self.methods.push((name.to_string(), Rc::new(method)));
        self
    }

    pub fn directive(mut self, identifier: &str, directive: DirectiveFn) -> Self {
        self.directives.push((identifier.to_string(), directive));
        self
    }

    pub fn on_after_initialized(mut self, f: impl Fn(&Rc<Component>) -> Result<()> + 'static) -> Self {
        self.lifecycle.after_initialized = Some(Rc::new(f));
        self
    }

    pub fn on_hooks_updated(mut self, f: impl Fn(&Rc<Component>) -> Result<()> + 'static) -> Self {
        self.lifecycle.hooks_updated = Some(Rc::new(f));
        self
    }

    pub fn on_unmounted(mut self, f: impl Fn(&Rc<Component>) -> Result<()> + 'static) -> Self {
        self.lifecycle.unmounted = Some(Rc::new(f));
        self
    }

    pub fn on_state_changed(mut self, f: impl Fn(&Rc<Component>, &State, &State) -> Result<()> + 'static) -> Self {
        self.lifecycle.state_changed = Some(Rc::new(f));
        self
    }

    pub fn on_child_changed(mut self, f: impl Fn(&Rc<Component>, &Rc<Component>) -> Result<()> + 'static) -> Self {
        self.lifecycle.child_changed = Some(Rc::new(f));
        self
    }

    /// Opt a subtree out of parent-triggered renders
    pub fn should_follow_render(mut self, f: impl Fn(&Rc<Component>, &Rc<Component>, &State) -> bool + 'static) -> Self {
        self.lifecycle.should_follow_render = Some(Rc::new(f));
        self
    }

    pub fn transition_on_state_changing(mut self, f: impl Fn(&State, &State) -> State + 'static) -> Self {
        self.lifecycle.transition_on_state_changing = Some(Rc::new(f));
        self
    }

    pub fn merge_state(mut self, f: impl Fn(State, State) -> State + 'static) -> Self {
        self.lifecycle.merge_state = Some(Rc::new(f));
        self
    }
}

impl std::fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("shadow", &self.shadow)
            .field("mixins", &self.mixins.len())
            .field("methods", &self.methods.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
            .finish()
    }
}
