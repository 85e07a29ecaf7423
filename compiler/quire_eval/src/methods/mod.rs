//! Method resolution.
//!
//! Turning `$value.name(args)` into a callable is delegated to a
//! [`MethodResolver`]. The evaluator caches whatever the resolver returns in
//! the introspection cache, so a resolver is consulted once per
//! `(node, runtime type)` pair, not once per evaluation.
//!
//! [`MethodTable`] is the stock resolver. Resolution order:
//! 1. Host methods registered for the target's concrete host type
//! 2. Built-in methods on strings, lists and maps (see `builtin`)

mod builtin;

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{method_failed, RenderResult};
use crate::icache::{MethodFn, MethodHandle};
use crate::value::{HostObject, Value};

/// Resolves a method name against a target value.
pub trait MethodResolver: Send + Sync {
    /// A handle for `method` on `target` called with `arg_count` arguments,
    /// or `None` if the target has no such method.
    fn resolve(&self, target: &Value, method: &str, arg_count: usize) -> Option<MethodHandle>;
}

/// Host methods by type plus the built-in method set.
#[derive(Default)]
pub struct MethodTable {
    host: FxHashMap<(TypeId, String), Arc<MethodFn>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` on host type `T`.
    ///
    /// The callable receives the downcast object and the evaluated arguments.
    pub fn register_host<T, F>(&mut self, name: &str, func: F) -> &mut Self
    where
        T: HostObject,
        F: Fn(&T, &[Value]) -> RenderResult<Value> + Send + Sync + 'static,
    {
        let method = name.to_string();
        let wrapped = move |target: &Value, args: &[Value]| {
            let object = target.downcast_host::<T>().ok_or_else(|| {
                method_failed(
                    &method,
                    target.runtime_type().name(),
                    "target is not the registered host type",
                )
            })?;
            func(object, args)
        };
        self.host
            .insert((TypeId::of::<T>(), name.to_string()), Arc::new(wrapped));
        self
    }

    /// Number of registered host methods.
    pub fn host_method_count(&self) -> usize {
        self.host.len()
    }
}

impl MethodResolver for MethodTable {
    fn resolve(&self, target: &Value, method: &str, arg_count: usize) -> Option<MethodHandle> {
        let ty = target.runtime_type();
        if let Value::Host(object) = target {
            let key = (object.as_any().type_id(), method.to_string());
            if let Some(func) = self.host.get(&key) {
                return Some(MethodHandle::from_shared(method, ty, Arc::clone(func)));
            }
        }
        builtin::lookup(ty, method, arg_count).map(|func| MethodHandle::new(method, ty, func))
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("host_methods", &self.host.len())
            .finish()
    }
}
