//! Render errors.
//!
//! A lookup that finds nothing is not an error (it is `None`), and neither is
//! a stale introspection-cache entry (it is a miss). What remains is fatal to
//! the render: the macro depth guard, broken stack discipline, collaborators
//! that fail, and evaluator-defined failures.
//!
//! Factory functions build the error; the frame or evaluator that sees it
//! first attaches the template/macro stacks and the node position with
//! [`RenderError::with_stacks`] and [`RenderError::at`]. The first attachment
//! wins, so the snapshot describes the innermost failure point.

use std::fmt;

use quire_ir::{Location, NodeRef, Span};

/// Result of a render operation.
pub type RenderResult<T> = Result<T, RenderError>;

/// Typed error category.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RenderErrorKind {
    /// Macro call depth would exceed the configured bound.
    #[error("maximum macro call depth exceeded (limit: {limit}) calling #{name}")]
    RecursionLimit { limit: usize, name: String },

    /// Stack discipline or tree shape violated; a defect, never retried.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// The resource loader has no resource under this name.
    #[error("resource not found: {name}")]
    ResourceNotFound { name: String },

    /// A resolved method reported failure.
    #[error("method {method} failed on {type_name}: {message}")]
    Method {
        method: String,
        type_name: String,
        message: String,
    },

    /// Writing to the output sink failed.
    #[error("output error: {message}")]
    Output { message: String },

    /// Evaluator-defined failure.
    #[error("{message}")]
    Custom { message: String },
}

/// A render-terminating failure with the stack state where it happened.
#[derive(Clone, Debug)]
pub struct RenderError {
    pub kind: RenderErrorKind,
    /// Template names, outermost first.
    pub template_stack: Vec<String>,
    /// Macro names, outermost first.
    pub macro_stack: Vec<String>,
    pub span: Option<Span>,
    pub location: Option<Location>,
    stacks_captured: bool,
}

impl RenderError {
    pub fn from_kind(kind: RenderErrorKind) -> Self {
        RenderError {
            kind,
            template_stack: Vec::new(),
            macro_stack: Vec::new(),
            span: None,
            location: None,
            stacks_captured: false,
        }
    }

    /// Attach a stack snapshot unless one is already attached.
    #[must_use]
    pub fn with_stacks(mut self, template_stack: Vec<String>, macro_stack: Vec<String>) -> Self {
        if !self.stacks_captured {
            self.template_stack = template_stack;
            self.macro_stack = macro_stack;
            self.stacks_captured = true;
        }
        self
    }

    /// Attach the position of `node` unless a position is already attached.
    #[must_use]
    pub fn at(mut self, node: NodeRef<'_>) -> Self {
        if self.span.is_none() {
            self.span = Some(node.span());
            self.location = Some(node.location());
        }
        self
    }

    pub fn has_stacks(&self) -> bool {
        self.stacks_captured
    }

    pub fn is_recursion_limit(&self) -> bool {
        matches!(self.kind, RenderErrorKind::RecursionLimit { .. })
    }
}

impl PartialEq for RenderError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.template_stack == other.template_stack
            && self.macro_stack == other.macro_stack
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(template) = self.template_stack.last() {
            write!(f, " in {template}")?;
        }
        if let Some(location) = self.location.filter(Location::is_known) {
            write!(f, " at {location}")?;
        }
        if !self.macro_stack.is_empty() {
            write!(f, " (macro stack: {})", self.macro_stack.join(" -> "))?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {}

impl From<RenderErrorKind> for RenderError {
    fn from(kind: RenderErrorKind) -> Self {
        RenderError::from_kind(kind)
    }
}

/// Macro depth bound reached while calling `name`.
#[cold]
pub fn recursion_limit_exceeded(limit: usize, name: &str) -> RenderError {
    RenderError::from_kind(RenderErrorKind::RecursionLimit {
        limit,
        name: name.to_string(),
    })
}

/// Internal consistency failure.
#[cold]
pub fn internal_error(message: impl Into<String>) -> RenderError {
    RenderError::from_kind(RenderErrorKind::Internal {
        message: message.into(),
    })
}

#[cold]
pub fn resource_not_found(name: &str) -> RenderError {
    RenderError::from_kind(RenderErrorKind::ResourceNotFound {
        name: name.to_string(),
    })
}

#[cold]
pub fn method_failed(method: &str, type_name: &str, message: impl Into<String>) -> RenderError {
    RenderError::from_kind(RenderErrorKind::Method {
        method: method.to_string(),
        type_name: type_name.to_string(),
        message: message.into(),
    })
}

#[cold]
pub fn output_failed(err: &std::io::Error) -> RenderError {
    RenderError::from_kind(RenderErrorKind::Output {
        message: err.to_string(),
    })
}

#[cold]
pub fn custom(message: impl Into<String>) -> RenderError {
    RenderError::from_kind(RenderErrorKind::Custom {
        message: message.into(),
    })
}
