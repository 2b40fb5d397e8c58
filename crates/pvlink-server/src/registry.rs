//! Scope-to-server registry.
//!
//! The registry is the single owner of the scope → [`SharedServer`]
//! mapping. Creation is implicit — the first variable registration in a
//! scope calls [`get_server`](SharedServerRegistry::get_server) and
//! wins — while teardown is explicit and scope-bounded:
//! [`setup`](SharedServerRegistry::setup) and
//! [`teardown`](SharedServerRegistry::teardown) fail loudly on a scope
//! the registry has never seen, because an unbalanced lifecycle is a
//! caller bug.

use crate::error::RegistryError;
use crate::scope::ScopeId;
use crate::shared::SharedServer;
use parking_lot::Mutex;
use pvlink_wire::ServerBackend;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Owner of one [`SharedServer`] per logical scope.
///
/// Safe to call from multiple scope lifecycles concurrently; each
/// scope's own hooks are assumed single-threaded.
pub struct SharedServerRegistry {
    backend: Arc<dyn ServerBackend>,
    servers: Mutex<HashMap<ScopeId, Arc<SharedServer>>>,
}

impl SharedServerRegistry {
    #[must_use]
    pub fn new(backend: Arc<dyn ServerBackend>) -> Self {
        Self {
            backend,
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the scope's server, creating it on first call.
    #[must_use]
    pub fn get_server(&self, scope: &ScopeId) -> Arc<SharedServer> {
        let mut servers = self.servers.lock();
        if let Some(server) = servers.get(scope) {
            return Arc::clone(server);
        }
        debug!(scope = %scope, "creating shared server for scope");
        let server = Arc::new(SharedServer::new(Arc::clone(&self.backend)));
        servers.insert(scope.clone(), Arc::clone(&server));
        server
    }

    /// Starts the scope's server.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownScope`] when no variable has ever been
    /// registered for `scope`.
    pub fn setup(&self, scope: &ScopeId) -> Result<(), RegistryError> {
        let server = self.lookup(scope)?;
        server.start();
        info!(scope = %scope, records = server.len(), "scope server started");
        Ok(())
    }

    /// Stops the scope's server and erases the registry entry. A later
    /// [`get_server`](Self::get_server) yields a fresh instance.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownScope`] when the scope is not registered.
    pub fn teardown(&self, scope: &ScopeId) -> Result<(), RegistryError> {
        let server = {
            let mut servers = self.servers.lock();
            servers
                .remove(scope)
                .ok_or_else(|| RegistryError::UnknownScope {
                    scope: scope.clone(),
                })?
        };
        server.stop();
        info!(scope = %scope, "scope server torn down");
        Ok(())
    }

    /// Whether the scope currently owns a server.
    #[must_use]
    pub fn contains(&self, scope: &ScopeId) -> bool {
        self.servers.lock().contains_key(scope)
    }

    fn lookup(&self, scope: &ScopeId) -> Result<Arc<SharedServer>, RegistryError> {
        self.servers
            .lock()
            .get(scope)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownScope {
                scope: scope.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::{ScalarKind, TypeDesc, TypedValue};
    use pvlink_wire::LoopbackHub;
    use serde_json::json;

    fn uint32(v: u32) -> TypedValue {
        TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt32), json!(v)).unwrap()
    }

    fn registry() -> (LoopbackHub, SharedServerRegistry) {
        let hub = LoopbackHub::new();
        let reg = SharedServerRegistry::new(hub.server_backend());
        (hub, reg)
    }

    #[test]
    fn get_server_returns_same_identity() {
        let (_hub, reg) = registry();
        let scope = ScopeId::from("w1");
        let a = reg.get_server(&scope);
        let b = reg.get_server(&scope);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn scopes_never_share_a_server() {
        let (_hub, reg) = registry();
        let a = reg.get_server(&ScopeId::from("w1"));
        let b = reg.get_server(&ScopeId::from("w2"));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn teardown_then_get_yields_fresh_instance() {
        let (_hub, reg) = registry();
        let scope = ScopeId::from("w1");
        let first = reg.get_server(&scope);
        reg.teardown(&scope).unwrap();
        assert!(!reg.contains(&scope));
        let second = reg.get_server(&scope);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn setup_and_teardown_fail_on_unknown_scope() {
        let (_hub, reg) = registry();
        let scope = ScopeId::from("nowhere");
        assert!(matches!(
            reg.setup(&scope),
            Err(RegistryError::UnknownScope { .. })
        ));
        assert!(matches!(
            reg.teardown(&scope),
            Err(RegistryError::UnknownScope { .. })
        ));
    }

    #[test]
    fn setup_starts_registered_variables() {
        let (_hub, reg) = registry();
        let scope = ScopeId::from("w1");
        let server = reg.get_server(&scope);
        server.add_variable("a", uint32(1), None);
        server.add_variable("b", uint32(2), None);

        reg.setup(&scope).unwrap();
        assert!(server.is_running());
        assert!(server.set_value("a", &uint32(10)));
        assert_eq!(server.get_value("a"), uint32(10));
        assert_eq!(server.get_value("b"), uint32(2));

        reg.teardown(&scope).unwrap();
        assert!(!server.is_running());
    }
}
