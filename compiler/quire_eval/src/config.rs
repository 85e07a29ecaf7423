//! Render configuration.

/// Default bound on nested macro invocations.
pub const DEFAULT_MAX_MACRO_DEPTH: usize = 20;

/// Knobs that change how a template renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// Maximum nested macro calls. `None` disables the bound.
    pub max_macro_depth: Option<usize>,
    /// Write an unresolved reference as its source text (`$user.name`)
    /// instead of nothing.
    pub render_unresolved_references: bool,
    /// Reuse one introspection cache for every render of an engine.
    pub share_introspection_cache: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            max_macro_depth: Some(DEFAULT_MAX_MACRO_DEPTH),
            render_unresolved_references: true,
            share_introspection_cache: false,
        }
    }
}

impl RenderConfig {
    /// Unresolved references render as nothing.
    pub fn strict() -> Self {
        RenderConfig {
            render_unresolved_references: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_macro_depth(mut self, max: Option<usize>) -> Self {
        self.max_macro_depth = max;
        self
    }

    #[must_use]
    pub fn with_unresolved_references(mut self, render: bool) -> Self {
        self.render_unresolved_references = render;
        self
    }

    #[must_use]
    pub fn with_shared_cache(mut self, share: bool) -> Self {
        self.share_introspection_cache = share;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.max_macro_depth, Some(20));
        assert!(config.render_unresolved_references);
        assert!(!config.share_introspection_cache);
    }

    #[test]
    fn test_strict_and_builders() {
        let config = RenderConfig::strict()
            .with_max_macro_depth(None)
            .with_shared_cache(true);
        assert!(!config.render_unresolved_references);
        assert_eq!(config.max_macro_depth, None);
        assert!(config.share_introspection_cache);
        assert!(config.with_unresolved_references(true).render_unresolved_references);
    }
}
