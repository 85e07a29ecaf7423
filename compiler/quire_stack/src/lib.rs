//! Stack growth for deep recursion.
//!
//! Template trees nest arbitrarily: blocks inside loops inside macro bodies
//! inside parsed sub-templates. Every evaluator dispatch recurses on the host
//! stack, so a pathological template can exhaust it long before the macro
//! depth guard fires. Wrapping each dispatch in [`ensure_sufficient_stack`]
//! grows the stack on demand instead.
//!
//! # Platform Support
//!
//! - **Native targets**: `stacker::maybe_grow`.
//! - **WASM targets**: plain call; the runtime manages its own stack.

/// Remaining stack below which we grow (128KB red zone).
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment (2MB).
const STACK_PER_SEGMENT: usize = 2 * 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
///
/// ```text
/// fn visit(&mut self, node: NodeRef<'_>, acc: Value) -> Result<Value, RenderError> {
///     ensure_sufficient_stack(|| dispatch(self, node, acc))
/// }
/// ```
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_SEGMENT, f)
}

/// WASM version: call directly.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
