//! Event cartridge: lifecycle notification policy.
//!
//! The chain only stores the cartridge; evaluators decide when to call it.
//! Every callback defaults to "no opinion".

use std::sync::Arc;

use crate::errors::RenderError;
use crate::value::Value;

pub trait EventCartridge: Send + Sync {
    /// A resolved reference is about to be written. Returns the value to write.
    fn reference_insert(&self, reference: &str, value: Value) -> Value {
        let _ = reference;
        value
    }

    /// A reference (or a step of its chain) did not resolve.
    fn invalid_reference(&self, reference: &str) {
        let _ = reference;
    }

    /// A template is about to include `requested` from `current`.
    ///
    /// Returns the name to load instead, or `None` to skip the include.
    fn include_event(&self, requested: &str, current: Option<&str>) -> Option<String> {
        let _ = current;
        Some(requested.to_string())
    }

    /// A resolved method failed. Returning a value recovers from the error.
    fn method_exception(&self, method: &str, error: &RenderError) -> Option<Value> {
        let _ = (method, error);
        None
    }
}

pub type SharedEventCartridge = Arc<dyn EventCartridge>;

/// Cartridge with every default; handy as an explicit "no policy".
#[derive(Debug, Default)]
pub struct NoopCartridge;

impl EventCartridge for NoopCartridge {}
