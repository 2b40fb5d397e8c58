//! In-memory doubles for adapter tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use pvlink_types::TypedValue;

use crate::context::VariableStore;

pub use pvlink_types::{NullSink, RecordingSink, SinkEvent};

/// [`VariableStore`] backed by a plain map.
///
/// Variables must be declared up front; `store` refuses names that were
/// never declared, mirroring how a procedure engine rejects writes to
/// undeclared variables.
#[derive(Default)]
pub struct MemoryStore {
    cells: Mutex<HashMap<String, TypedValue>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style declaration with an initial value.
    #[must_use]
    pub fn with(self, name: impl Into<String>, value: TypedValue) -> Self {
        self.declare(name, value);
        self
    }

    /// Declares a variable, replacing any previous value.
    pub fn declare(&self, name: impl Into<String>, value: TypedValue) {
        self.cells.lock().insert(name.into(), value);
    }
}

impl VariableStore for MemoryStore {
    fn fetch(&self, name: &str) -> Option<TypedValue> {
        self.cells.lock().get(name).cloned()
    }

    fn store(&self, name: &str, value: &TypedValue) -> bool {
        let mut cells = self.cells.lock();
        match cells.get_mut(name) {
            Some(cell) => {
                *cell = value.clone();
                true
            }
            None => false,
        }
    }
}
