//! RAII guards for render-state stacks.
//!
//! Each guard applies one change on creation and undoes it on drop, so the
//! template stack, macro stack and current resource are restored on every
//! exit path: normal return, `?` propagation, and panic unwinding.
//!
//! ```text
//! let _template = frame.enter_template(resource.name());
//! let _resource = frame.enter_resource(resource.clone());
//! let _call = frame.enter_macro("greet")?;
//! renderer.visit_node(body, acc)?;
//! // popped here, in reverse order
//! ```
//!
//! Guards own a clone of the state handle rather than borrowing the frame,
//! which leaves the frame free to be borrowed by the child frames created
//! while the guard is alive.

use crate::errors::RenderResult;
use crate::resource::Resource;
use crate::state::SharedState;

use super::Frame;

/// Pops the template name pushed by [`Frame::enter_template`].
#[must_use = "the template is popped as soon as the guard is dropped"]
pub struct TemplateGuard {
    state: SharedState,
}

impl Drop for TemplateGuard {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.try_borrow_mut() {
            state.pop_template();
        }
    }
}

/// Pops the macro name pushed by [`Frame::enter_macro`].
#[must_use = "the macro is popped as soon as the guard is dropped"]
pub struct MacroGuard {
    state: SharedState,
}

impl Drop for MacroGuard {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.try_borrow_mut() {
            state.pop_macro();
        }
    }
}

/// Restores the resource that was current before [`Frame::enter_resource`].
#[must_use = "the previous resource is restored as soon as the guard is dropped"]
pub struct ResourceGuard {
    state: SharedState,
    previous: Option<Resource>,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if let Some(mut state) = self.state.try_borrow_mut() {
            state.set_current_resource(self.previous.take());
        }
    }
}

impl Frame<'_> {
    /// Push a template name until the guard drops.
    pub fn enter_template(&self, name: &str) -> TemplateGuard {
        self.push_template(name);
        TemplateGuard {
            state: self.state().clone(),
        }
    }

    /// Push a macro name until the guard drops.
    ///
    /// Fails, pushing nothing, when the macro depth bound is reached.
    pub fn enter_macro(&self, name: &str) -> RenderResult<MacroGuard> {
        self.push_macro(name)?;
        Ok(MacroGuard {
            state: self.state().clone(),
        })
    }

    /// Make `resource` current until the guard drops.
    pub fn enter_resource(&self, resource: Resource) -> ResourceGuard {
        let previous = self.set_current_resource(Some(resource));
        ResourceGuard {
            state: self.state().clone(),
            previous,
        }
    }
}
