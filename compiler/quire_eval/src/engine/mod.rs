//! Render entry point.
//!
//! An [`Engine`] holds everything that outlives a single render: the
//! configuration, the collaborators, and optionally an introspection cache
//! shared by all renders. It is `Send + Sync`; each call to
//! [`Engine::render`] builds its own render state and environment chain, so
//! renders on different threads never share mutable state other than the
//! (thread-safe) shared cache.

mod builder;

pub use builder::EngineBuilder;

use std::sync::Arc;

use quire_ir::Tree;
use rustc_hash::FxHashMap;

use crate::config::RenderConfig;
use crate::context::{Bindings, Frame};
use crate::errors::{internal_error, resource_not_found, RenderResult};
use crate::events::SharedEventCartridge;
use crate::icache::IntrospectionCache;
use crate::macros::MacroTable;
use crate::methods::MethodResolver;
use crate::render::{RenderEnv, Renderer};
use crate::resource::{Resource, ResourceLoader};
use crate::sink::Sink;
use crate::state::{RenderState, SharedState};

/// Configured template engine.
pub struct Engine {
    config: RenderConfig,
    loader: Option<Arc<dyn ResourceLoader>>,
    resolver: Arc<dyn MethodResolver>,
    macros: MacroTable,
    libraries: FxHashMap<String, MacroTable>,
    library_order: Vec<String>,
    shared_cache: Option<IntrospectionCache>,
    cartridge: Option<SharedEventCartridge>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The cache shared by every render, if sharing is enabled.
    pub fn shared_cache(&self) -> Option<&IntrospectionCache> {
        self.shared_cache.as_ref()
    }

    /// Render `tree` under the template name `name` into `sink`.
    ///
    /// On success both call stacks are back at their entry depth; a render
    /// that leaves them unbalanced fails with an internal error.
    #[tracing::instrument(level = "debug", skip_all, fields(template = name))]
    pub fn render(
        &self,
        name: &str,
        tree: &Arc<Tree>,
        bindings: Bindings,
        sink: &Sink,
    ) -> RenderResult<()> {
        let cache = self.shared_cache.clone().unwrap_or_default();
        let state = SharedState::new(RenderState::new(self.config.max_macro_depth, cache));
        let base = Frame::base(state, bindings);
        if let Some(cartridge) = &self.cartridge {
            base.attach_event_cartridge(Arc::clone(cartridge));
        }
        base.set_macro_libraries(self.library_order.clone());

        let env = RenderEnv {
            config: &self.config,
            loader: self.loader.as_deref(),
            resolver: self.resolver.as_ref(),
            macros: &self.macros,
            libraries: &self.libraries,
            sink,
        };

        tracing::debug!("render start");
        let result = {
            let _template = base.enter_template(name);
            let _resource = base.enter_resource(Resource::new(name, Arc::clone(tree)));
            let mut renderer = Renderer::new(&base, env);
            renderer.render(tree)
        };
        let result = result.and_then(|_value| sink.flush());
        let result = check_balanced(&base, name, result);

        match &result {
            Ok(()) => tracing::debug!("render finished"),
            Err(err) => tracing::debug!(%err, "render failed"),
        }
        result
    }

    /// Render into a fresh buffer and return the text.
    pub fn render_to_string(
        &self,
        name: &str,
        tree: &Arc<Tree>,
        bindings: Bindings,
    ) -> RenderResult<String> {
        let sink = Sink::buffer();
        self.render(name, tree, bindings, &sink)?;
        Ok(sink.output())
    }

    /// Load `name` through the configured loader and render it.
    pub fn render_resource(&self, name: &str, bindings: Bindings, sink: &Sink) -> RenderResult<()> {
        let loader = self
            .loader
            .as_deref()
            .ok_or_else(|| resource_not_found(name))?;
        let resource = loader.load(name)?;
        self.render(resource.name(), resource.tree(), bindings, sink)
    }
}

/// Fail if `base` still holds templates, macros or a current resource once
/// the render is over. An error already in `result` wins.
fn check_balanced(base: &Frame<'_>, name: &str, result: RenderResult<()>) -> RenderResult<()> {
    let templates = base.template_stack();
    let macros = base.macro_stack();
    if templates.is_empty() && macros.is_empty() && base.current_resource().is_none() {
        return result;
    }
    tracing::debug!(?templates, ?macros, "render left the stacks unbalanced");
    let unbalanced = internal_error(format!(
        "render of {name} left {} template(s) and {} macro(s) on the stacks",
        templates.len(),
        macros.len()
    ))
    .with_stacks(templates, macros);
    Err(result.err().unwrap_or(unbalanced))
}
