//! Render-wide bookkeeping.
//!
//! One [`RenderState`] exists per render. Every frame of the environment
//! chain holds the same [`SharedState`] handle, so housekeeping reached
//! through any frame lands in the same place without walking the chain.
//!
//! The state is single-threaded (`Rc<RefCell<_>>`): a render never crosses
//! threads, and concurrent renders each build their own.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use quire_ir::NodeKey;
use smallvec::SmallVec;

use crate::errors::{recursion_limit_exceeded, RenderResult};
use crate::events::SharedEventCartridge;
use crate::icache::{IntrospectionCache, MethodHandle};
use crate::resource::Resource;
use crate::value::RuntimeType;

/// Shared, single-threaded handle to the render state.
///
/// Clones point at the same state.
#[repr(transparent)]
pub struct SharedState(Rc<RefCell<RenderState>>);

impl SharedState {
    pub fn new(state: RenderState) -> Self {
        SharedState(Rc::new(RefCell::new(state)))
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, RenderState> {
        self.0.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, RenderState> {
        self.0.borrow_mut()
    }

    /// Mutable access that fails instead of panicking when already borrowed.
    ///
    /// Used by scope guards, which may run while a panic unwinds.
    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, RenderState>> {
        self.0.try_borrow_mut().ok()
    }

    /// Whether both handles refer to one state.
    pub fn same_as(&self, other: &SharedState) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Clone for SharedState {
    #[inline]
    fn clone(&self) -> Self {
        SharedState(Rc::clone(&self.0))
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedState").field(&self.0).finish()
    }
}

/// Call stacks, caches and attachments of one render.
pub struct RenderState {
    template_stack: SmallVec<[String; 4]>,
    macro_stack: SmallVec<[String; 8]>,
    /// `None` means unbounded.
    max_macro_depth: Option<usize>,
    icache: IntrospectionCache,
    event_cartridge: Option<SharedEventCartridge>,
    current_resource: Option<Resource>,
    macro_libraries: Vec<String>,
}

impl RenderState {
    pub fn new(max_macro_depth: Option<usize>, icache: IntrospectionCache) -> Self {
        RenderState {
            template_stack: SmallVec::new(),
            macro_stack: SmallVec::new(),
            max_macro_depth,
            icache,
            event_cartridge: None,
            current_resource: None,
            macro_libraries: Vec::new(),
        }
    }

    // Template-name stack

    pub fn push_template(&mut self, name: &str) {
        self.template_stack.push(name.to_string());
    }

    /// Pop the innermost template name. `None` on an empty stack.
    pub fn pop_template(&mut self) -> Option<String> {
        self.template_stack.pop()
    }

    pub fn current_template(&self) -> Option<&str> {
        self.template_stack.last().map(String::as_str)
    }

    /// Template names, outermost first.
    pub fn template_stack(&self) -> &[String] {
        &self.template_stack
    }

    // Macro-name stack

    /// Push a macro name, refusing if the call depth bound would be exceeded.
    ///
    /// On refusal nothing is pushed and the error carries both stacks as
    /// they were at the call site.
    pub fn push_macro(&mut self, name: &str) -> RenderResult<()> {
        if let Some(max) = self.max_macro_depth {
            if self.macro_stack.len() >= max {
                tracing::debug!(
                    macro_name = name,
                    limit = max,
                    stack = ?self.macro_stack,
                    "macro call depth exceeded"
                );
                return Err(recursion_limit_exceeded(max, name).with_stacks(
                    self.template_stack.to_vec(),
                    self.macro_stack.to_vec(),
                ));
            }
        }
        self.macro_stack.push(name.to_string());
        Ok(())
    }

    pub fn pop_macro(&mut self) -> Option<String> {
        self.macro_stack.pop()
    }

    pub fn current_macro(&self) -> Option<&str> {
        self.macro_stack.last().map(String::as_str)
    }

    /// Number of active macro invocations.
    #[inline]
    pub fn macro_depth(&self) -> usize {
        self.macro_stack.len()
    }

    /// Macro names, outermost first.
    pub fn macro_stack(&self) -> &[String] {
        &self.macro_stack
    }

    pub fn max_macro_depth(&self) -> Option<usize> {
        self.max_macro_depth
    }

    // Introspection cache

    pub fn icache_get(&self, node: NodeKey, target_type: RuntimeType) -> Option<MethodHandle> {
        self.icache.get(node, target_type)
    }

    pub fn icache_put(&self, node: NodeKey, target_type: RuntimeType, handle: MethodHandle) {
        self.icache.put(node, target_type, handle);
    }

    pub fn icache(&self) -> &IntrospectionCache {
        &self.icache
    }

    // Attachments

    /// Attach a cartridge, returning the one it replaces.
    pub fn attach_event_cartridge(
        &mut self,
        cartridge: SharedEventCartridge,
    ) -> Option<SharedEventCartridge> {
        self.event_cartridge.replace(cartridge)
    }

    pub fn event_cartridge(&self) -> Option<SharedEventCartridge> {
        self.event_cartridge.clone()
    }

    /// Set the current resource, returning the previous one.
    pub fn set_current_resource(&mut self, resource: Option<Resource>) -> Option<Resource> {
        std::mem::replace(&mut self.current_resource, resource)
    }

    pub fn current_resource(&self) -> Option<&Resource> {
        self.current_resource.as_ref()
    }

    pub fn set_macro_libraries(&mut self, libraries: Vec<String>) {
        self.macro_libraries = libraries;
    }

    pub fn macro_libraries(&self) -> &[String] {
        &self.macro_libraries
    }
}

impl fmt::Debug for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderState")
            .field("template_stack", &self.template_stack)
            .field("macro_stack", &self.macro_stack)
            .field("max_macro_depth", &self.max_macro_depth)
            .field("icache", &self.icache)
            .field("event_cartridge", &self.event_cartridge.is_some())
            .field("current_resource", &self.current_resource)
            .field("macro_libraries", &self.macro_libraries)
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(max: Option<usize>) -> RenderState {
        RenderState::new(max, IntrospectionCache::new())
    }

    #[test]
    fn test_template_stack_order() {
        let mut s = state(None);
        s.push_template("layout.vm");
        s.push_template("header.vm");
        assert_eq!(s.current_template(), Some("header.vm"));
        assert_eq!(s.template_stack(), ["layout.vm", "header.vm"]);
        assert_eq!(s.pop_template().as_deref(), Some("header.vm"));
        assert_eq!(s.current_template(), Some("layout.vm"));
    }

    #[test]
    fn test_macro_depth_bound() {
        let mut s = state(Some(2));
        s.push_template("page.vm");
        s.push_macro("a").unwrap();
        s.push_macro("b").unwrap();
        assert_eq!(s.macro_depth(), 2);

        let err = s.push_macro("c").unwrap_err();
        assert!(err.is_recursion_limit());
        assert_eq!(err.macro_stack, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.template_stack, vec!["page.vm".to_string()]);
        // Refused push leaves the stack untouched
        assert_eq!(s.macro_depth(), 2);
        assert_eq!(s.current_macro(), Some("b"));
    }

    #[test]
    fn test_unbounded_depth() {
        let mut s = state(None);
        for _ in 0..1000 {
            s.push_macro("deep").unwrap();
        }
        assert_eq!(s.macro_depth(), 1000);
    }

    #[test]
    fn test_zero_bound_refuses_every_call() {
        let mut s = state(Some(0));
        assert!(s.push_macro("any").is_err());
    }

    #[test]
    fn test_shared_handle_identity() {
        let a = SharedState::new(state(None));
        let b = a.clone();
        b.borrow_mut().push_template("x.vm");
        assert_eq!(a.borrow().current_template(), Some("x.vm"));
        assert!(a.same_as(&b));
        assert!(!a.same_as(&SharedState::new(state(None))));
    }

    #[test]
    fn test_macro_libraries_replace() {
        let mut s = state(None);
        s.set_macro_libraries(vec!["lib/forms.vm".into()]);
        s.set_macro_libraries(vec!["lib/layout.vm".into(), "lib/util.vm".into()]);
        assert_eq!(s.macro_libraries(), ["lib/layout.vm", "lib/util.vm"]);
    }
}
