//! Execution context handed to adapters by the hosting engine.

use std::sync::Arc;

use pvlink_types::{TypedValue, UpdateSink};

/// Access to the procedure's named variables.
///
/// Adapters read request payloads from variables and store results back
/// into them. `store` returns `false` when the variable does not exist
/// or rejects the value; adapters treat that as an in-loop failure, not
/// a panic.
pub trait VariableStore: Send + Sync {
    /// Current value of the named variable, `None` if it does not exist.
    fn fetch(&self, name: &str) -> Option<TypedValue>;

    /// Stores a value into the named variable.
    fn store(&self, name: &str, value: &TypedValue) -> bool;
}

/// Everything an adapter may touch while running.
///
/// The context is engine-owned and shared; adapters hold it only for
/// the duration of a single call.
#[derive(Clone)]
pub struct AdapterContext {
    pub variables: Arc<dyn VariableStore>,
    pub sink: Arc<dyn UpdateSink>,
}

impl AdapterContext {
    #[must_use]
    pub fn new(variables: Arc<dyn VariableStore>, sink: Arc<dyn UpdateSink>) -> Self {
        Self { variables, sink }
    }
}
