//! Introspection cache.
//!
//! Resolving what a method or property node denotes on a given value is the
//! expensive part of evaluating a reference chain. The result is a
//! [`MethodHandle`], memoized per `(node identity, runtime type of target)`.
//!
//! The runtime type is part of the key because one node is routinely
//! evaluated against different types across renders. Every handle also
//! remembers the type it was resolved for, and [`IntrospectionCache::get`]
//! refuses to return a handle whose type does not match the request: a stale
//! entry behaves as a miss.
//!
//! The cache is a cloneable handle over a `RwLock`ed map. A render normally
//! owns a fresh one; an engine can instead hand the same handle to every
//! render so resolution is amortized across renders and threads. Concurrent
//! writers may race on one key; the loser's work is simply redone later.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use quire_ir::NodeKey;
use rustc_hash::FxHashMap;

use crate::errors::RenderResult;
use crate::value::{RuntimeType, Value};

/// Signature of a resolved callable: `(target, args) -> value`.
pub type MethodFn = dyn Fn(&Value, &[Value]) -> RenderResult<Value> + Send + Sync;

/// A resolved, reusable callable bound to the runtime type it was resolved for.
#[derive(Clone)]
pub struct MethodHandle {
    name: Arc<str>,
    target_type: RuntimeType,
    func: Arc<MethodFn>,
}

impl MethodHandle {
    pub fn new(
        name: impl Into<Arc<str>>,
        target_type: RuntimeType,
        func: impl Fn(&Value, &[Value]) -> RenderResult<Value> + Send + Sync + 'static,
    ) -> Self {
        MethodHandle {
            name: name.into(),
            target_type,
            func: Arc::new(func),
        }
    }

    /// Handle over an already shared callable.
    pub fn from_shared(
        name: impl Into<Arc<str>>,
        target_type: RuntimeType,
        func: Arc<MethodFn>,
    ) -> Self {
        MethodHandle {
            name: name.into(),
            target_type,
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_type(&self) -> RuntimeType {
        self.target_type
    }

    /// Whether this handle may be invoked on a value of type `ty`.
    #[inline]
    pub fn applies_to(&self, ty: RuntimeType) -> bool {
        self.target_type == ty
    }

    pub fn invoke(&self, target: &Value, args: &[Value]) -> RenderResult<Value> {
        (self.func)(target, args)
    }

    /// Whether both handles share one resolved callable.
    pub fn same_as(&self, other: &MethodHandle) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodHandle({}::{})", self.target_type, self.name)
    }
}

/// Cache key: which node, evaluated against which type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub node: NodeKey,
    pub target_type: RuntimeType,
}

/// Shared memo table of resolved handles.
#[derive(Clone, Default)]
pub struct IntrospectionCache(Arc<RwLock<FxHashMap<CacheKey, MethodHandle>>>);

impl IntrospectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `node` on `target_type`, if one applies.
    pub fn get(&self, node: NodeKey, target_type: RuntimeType) -> Option<MethodHandle> {
        let map = self.0.read();
        let handle = map.get(&CacheKey { node, target_type })?;
        if handle.applies_to(target_type) {
            Some(handle.clone())
        } else {
            tracing::trace!(
                %node,
                cached = %handle.target_type(),
                requested = %target_type,
                "stale introspection entry ignored"
            );
            None
        }
    }

    pub fn put(&self, node: NodeKey, target_type: RuntimeType, handle: MethodHandle) {
        self.0
            .write()
            .insert(CacheKey { node, target_type }, handle);
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn clear(&self) {
        self.0.write().clear();
    }

    /// Whether both handles point at the same table.
    pub fn shares_with(&self, other: &IntrospectionCache) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for IntrospectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntrospectionCache({} entries)", self.len())
    }
}
