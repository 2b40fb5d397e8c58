//! Server-role shared registry for PVLink.
//!
//! Many published variables within one logical scope (e.g. one
//! workspace) share a single underlying protocol-server process
//! resource. [`SharedServer`] owns that resource and the record map;
//! [`SharedServerRegistry`] owns the scope → server mapping with a
//! deliberately asymmetric lifecycle: creation is implicit (the first
//! variable registration wins), teardown is explicit and fails loudly
//! on an unknown scope.

mod error;
mod registry;
mod scope;
mod shared;

pub use error::RegistryError;
pub use registry::SharedServerRegistry;
pub use scope::ScopeId;
pub use shared::{ChangeListener, SharedServer};
