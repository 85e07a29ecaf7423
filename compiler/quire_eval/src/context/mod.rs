//! Environment chain.
//!
//! A render sees its variables through a chain of [`Frame`]s. The base frame
//! holds the render's bindings; every nested scope (an included template, a
//! loop body, a macro body) pushes a frame that borrows its parent, so a
//! frame can never outlive the traversal region that created it.
//!
//! Frames differ only in where writes land, described by a [`FramePolicy`]:
//!
//! | constructor       | `put`     | `local_put` |
//! |-------------------|-----------|-------------|
//! | `base`            | local     | local       |
//! | `forwarding`      | parent    | parent      |
//! | `loop_scope`      | parent    | local       |
//! | `macro_scope`     | local     | local       |
//! | `directive_scope` | parent    | local       |
//!
//! A write aimed at the parent is re-issued as the same operation on the
//! parent, so `put` from anywhere reaches the nearest frame whose `put` is
//! local (the base frame by default) and `local_put` reaches the nearest
//! frame whose `local_put` is local. Reads (`get`, `contains`, `keys`,
//! `remove`) always consult the frame's own bindings first and then the
//! parent.
//!
//! Every frame holds the same [`SharedState`], so housekeeping calls never
//! walk the chain.

mod guard;

pub use guard::{MacroGuard, ResourceGuard, TemplateGuard};

use std::cell::RefCell;
use std::fmt;

use quire_ir::NodeKey;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{RenderError, RenderResult};
use crate::events::SharedEventCartridge;
use crate::icache::MethodHandle;
use crate::resource::Resource;
use crate::state::SharedState;
use crate::value::{RuntimeType, Value};

/// Variable bindings of one frame.
pub type Bindings = FxHashMap<String, Value>;

/// Where a write operation lands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteTarget {
    /// Re-issue the write on the parent frame.
    Parent,
    /// Bind in this frame, shadowing the parent.
    Local,
}

/// Override points of a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FramePolicy {
    pub put: WriteTarget,
    pub local_put: WriteTarget,
}

impl FramePolicy {
    pub const BASE: FramePolicy = FramePolicy {
        put: WriteTarget::Local,
        local_put: WriteTarget::Local,
    };
    pub const FORWARDING: FramePolicy = FramePolicy {
        put: WriteTarget::Parent,
        local_put: WriteTarget::Parent,
    };
    pub const LOOP: FramePolicy = FramePolicy {
        put: WriteTarget::Parent,
        local_put: WriteTarget::Local,
    };
    pub const MACRO: FramePolicy = FramePolicy {
        put: WriteTarget::Local,
        local_put: WriteTarget::Local,
    };
    pub const DIRECTIVE: FramePolicy = FramePolicy {
        put: WriteTarget::Parent,
        local_put: WriteTarget::Local,
    };
}

/// What kind of scope pushed a frame. Informational only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    Base,
    Forwarding,
    Loop,
    Macro,
    Directive,
}

/// One link of the environment chain.
pub struct Frame<'p> {
    kind: FrameKind,
    parent: Option<&'p Frame<'p>>,
    bindings: RefCell<Bindings>,
    policy: FramePolicy,
    state: SharedState,
}

impl Frame<'static> {
    /// Root frame of a render, owning the initial bindings.
    pub fn base(state: SharedState, bindings: Bindings) -> Self {
        Frame {
            kind: FrameKind::Base,
            parent: None,
            bindings: RefCell::new(bindings),
            policy: FramePolicy::BASE,
            state,
        }
    }
}

impl<'p> Frame<'p> {
    /// Frame that delegates every operation to `parent`.
    pub fn forwarding(parent: &'p Frame<'p>) -> Self {
        Self::with_policy(parent, FrameKind::Forwarding, FramePolicy::FORWARDING)
    }

    /// Loop body: loop variables are local, assignments reach the outer scope.
    pub fn loop_scope(parent: &'p Frame<'p>) -> Self {
        Self::with_policy(parent, FrameKind::Loop, FramePolicy::LOOP)
    }

    /// Macro body: every write stays inside the invocation.
    pub fn macro_scope(parent: &'p Frame<'p>) -> Self {
        Self::with_policy(parent, FrameKind::Macro, FramePolicy::MACRO)
    }

    /// Block directive body: like a loop, without iteration.
    pub fn directive_scope(parent: &'p Frame<'p>) -> Self {
        Self::with_policy(parent, FrameKind::Directive, FramePolicy::DIRECTIVE)
    }

    /// Frame with an arbitrary policy.
    pub fn with_policy(parent: &'p Frame<'p>, kind: FrameKind, policy: FramePolicy) -> Self {
        if kind != FrameKind::Forwarding {
            tracing::debug!(?kind, depth = parent.depth().saturating_add(1), "push frame");
        }
        Frame {
            kind,
            parent: Some(parent),
            bindings: RefCell::new(Bindings::default()),
            policy,
            state: parent.state.clone(),
        }
    }

    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    #[inline]
    pub fn policy(&self) -> FramePolicy {
        self.policy
    }

    #[inline]
    pub fn parent(&self) -> Option<&'p Frame<'p>> {
        self.parent
    }

    /// Number of frames above the base frame.
    pub fn depth(&self) -> usize {
        std::iter::successors(self.parent, |frame| frame.parent).count()
    }

    #[inline]
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    // Variable operations

    /// Look `key` up here, then outward.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow().get(key) {
            return Some(value.clone());
        }
        self.parent.and_then(|parent| parent.get(key))
    }

    /// Bind `key`, by default in the outermost frame. Returns the value it
    /// replaced in the frame that received the write.
    pub fn put(&self, key: &str, value: Value) -> Option<Value> {
        match (self.policy.put, self.parent) {
            (WriteTarget::Parent, Some(parent)) => parent.put(key, value),
            _ => self.bind(key, value),
        }
    }

    /// Bind `key` in the nearest frame that binds locally.
    pub fn local_put(&self, key: &str, value: Value) -> Option<Value> {
        match (self.policy.local_put, self.parent) {
            (WriteTarget::Parent, Some(parent)) => parent.local_put(key, value),
            _ => self.bind(key, value),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.borrow().contains_key(key)
            || self.parent.is_some_and(|parent| parent.contains(key))
    }

    /// Remove the nearest binding of `key`.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.bindings.borrow_mut().remove(key) {
            return Some(value);
        }
        self.parent.and_then(|parent| parent.remove(key))
    }

    /// Every key visible from this frame.
    pub fn keys(&self) -> FxHashSet<String> {
        let mut keys = self.parent.map(Frame::keys).unwrap_or_default();
        keys.extend(self.bindings.borrow().keys().cloned());
        keys
    }

    fn bind(&self, key: &str, value: Value) -> Option<Value> {
        self.bindings.borrow_mut().insert(key.to_string(), value)
    }

    // Template-name stack

    pub fn push_template(&self, name: &str) {
        self.state.borrow_mut().push_template(name);
    }

    pub fn pop_template(&self) -> Option<String> {
        self.state.borrow_mut().pop_template()
    }

    pub fn current_template(&self) -> Option<String> {
        self.state.borrow().current_template().map(str::to_string)
    }

    pub fn template_stack(&self) -> Vec<String> {
        self.state.borrow().template_stack().to_vec()
    }

    // Macro-name stack

    /// Push a macro name, failing when the depth bound is reached.
    pub fn push_macro(&self, name: &str) -> RenderResult<()> {
        self.state.borrow_mut().push_macro(name)
    }

    pub fn pop_macro(&self) -> Option<String> {
        self.state.borrow_mut().pop_macro()
    }

    pub fn current_macro(&self) -> Option<String> {
        self.state.borrow().current_macro().map(str::to_string)
    }

    pub fn macro_depth(&self) -> usize {
        self.state.borrow().macro_depth()
    }

    pub fn macro_stack(&self) -> Vec<String> {
        self.state.borrow().macro_stack().to_vec()
    }

    /// Attach the current template and macro stacks to `err`, unless it
    /// already carries a snapshot.
    pub fn capture(&self, err: RenderError) -> RenderError {
        if err.has_stacks() {
            return err;
        }
        let state = self.state.borrow();
        err.with_stacks(
            state.template_stack().to_vec(),
            state.macro_stack().to_vec(),
        )
    }

    // Introspection cache

    pub fn icache_get(&self, node: NodeKey, target_type: RuntimeType) -> Option<MethodHandle> {
        self.state.borrow().icache_get(node, target_type)
    }

    pub fn icache_put(&self, node: NodeKey, target_type: RuntimeType, handle: MethodHandle) {
        self.state.borrow().icache_put(node, target_type, handle);
    }

    // Attachments

    pub fn attach_event_cartridge(
        &self,
        cartridge: SharedEventCartridge,
    ) -> Option<SharedEventCartridge> {
        self.state.borrow_mut().attach_event_cartridge(cartridge)
    }

    pub fn event_cartridge(&self) -> Option<SharedEventCartridge> {
        self.state.borrow().event_cartridge()
    }

    pub fn set_current_resource(&self, resource: Option<Resource>) -> Option<Resource> {
        self.state.borrow_mut().set_current_resource(resource)
    }

    pub fn current_resource(&self) -> Option<Resource> {
        self.state.borrow().current_resource().cloned()
    }

    pub fn set_macro_libraries(&self, libraries: Vec<String>) {
        self.state.borrow_mut().set_macro_libraries(libraries);
    }

    pub fn macro_libraries(&self) -> Vec<String> {
        self.state.borrow().macro_libraries().to_vec()
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("kind", &self.kind)
            .field("depth", &self.depth())
            .field("bindings", &self.bindings.borrow().len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
