#![deny(clippy::arithmetic_side_effects)]
//! Quire Eval - render core for Quire templates.
//!
//! This crate provides:
//! - [`Frame`]: the environment chain (variables plus housekeeping access)
//! - [`RenderState`]: per-render stacks, introspection cache and attachments
//! - [`ExprEvaluator`] and [`Renderer`]: reference evaluators built on the
//!   `quire_ir` traversal protocol
//! - [`Engine`]: configured entry point that runs renders
//!
//! # Architecture
//!
//! ```text
//! Engine::render
//!   └─ RenderState (one per render, Rc<RefCell>)
//!        └─ Frame::base ← loop/macro/forwarding frames (borrowed chain)
//!             └─ Renderer ──visit_*──▶ Sink
//!                  └─ ExprEvaluator ──▶ IntrospectionCache ──miss──▶ MethodResolver
//! ```

mod config;
mod context;
mod engine;
mod errors;
mod events;
mod icache;
mod macros;
mod methods;
mod render;
mod resource;
mod sink;
mod state;
mod value;

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;

pub use config::{RenderConfig, DEFAULT_MAX_MACRO_DEPTH};
pub use context::{
    Bindings, Frame, FrameKind, FramePolicy, MacroGuard, ResourceGuard, TemplateGuard,
    WriteTarget,
};
pub use engine::{Engine, EngineBuilder};
pub use errors::{
    custom, internal_error, method_failed, output_failed, recursion_limit_exceeded,
    resource_not_found, RenderError, RenderErrorKind, RenderResult,
};
pub use events::{EventCartridge, NoopCartridge, SharedEventCartridge};
pub use icache::{CacheKey, IntrospectionCache, MethodFn, MethodHandle};
pub use macros::{Macro, MacroTable};
pub use methods::{MethodResolver, MethodTable};
pub use render::{ExprEvaluator, RenderEnv, Renderer};
pub use resource::{MemoryLoader, Resource, ResourceLoader};
pub use sink::{buffer_sink, stdout_sink, BufferSink, SharedSink, Sink, WriterSink};
pub use state::{RenderState, SharedState};
pub use value::{HostObject, HostType, RuntimeType, Value};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing unless `RUST_LOG` is set; safe to call more than once.
///
/// ```text
/// RUST_LOG=quire_eval=debug cargo test -p quire_eval
/// RUST_LOG=quire_eval::render=trace my-app
/// ```
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init()
                .ok();
        }
    });
}
