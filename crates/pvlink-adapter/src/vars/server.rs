//! Served-record variables.

use std::sync::Arc;

use pvlink_server::{ScopeId, SharedServer, SharedServerRegistry};
use pvlink_types::{TypedValue, UpdateSink};
use tracing::debug;

use crate::config::{AdapterConfig, SetupError};
use crate::vars::EngineVariable;

/// Variable backed by a record on the scope's shared local server.
///
/// Attributes: `channel` (the record name), `type` and `value` (the
/// initial content), all required. All server variables of one scope
/// share a single underlying server process resource; the registry
/// hands out that server and the engine starts it via scope setup.
pub struct ServerVariable {
    kind: String,
    registry: Arc<SharedServerRegistry>,
    scope: ScopeId,
    config: AdapterConfig,
    sink: Arc<dyn UpdateSink>,
    record: String,
    server: Option<Arc<SharedServer>>,
}

impl ServerVariable {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        registry: Arc<SharedServerRegistry>,
        scope: ScopeId,
        config: AdapterConfig,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            kind: kind.into(),
            registry,
            scope,
            config,
            sink,
            record: String::new(),
            server: None,
        }
    }
}

impl EngineVariable for ServerVariable {
    fn name(&self) -> &str {
        &self.record
    }

    fn setup(&mut self) -> Result<(), SetupError> {
        let record = self.config.require(&self.kind, "channel")?.to_string();
        let ty = self.config.type_desc(&self.kind, "type")?;
        let initial = self.config.value_literal(&self.kind, "value", &ty)?;

        let server = self.registry.get_server(&self.scope);
        let sink = Arc::clone(&self.sink);
        let source = record.clone();
        let on_change = Arc::new(move |value: &TypedValue| {
            sink.value_changed(&source, value, true);
        });
        if !server.add_variable(&record, initial, Some(on_change)) {
            return Err(SetupError::RecordExists {
                adapter: self.kind.clone(),
                name: record,
            });
        }
        debug!(variable = %self.kind, scope = %self.scope, record = %record, "record registered");
        self.record = record;
        self.server = Some(server);
        Ok(())
    }

    fn get_value(&self) -> TypedValue {
        self.server
            .as_ref()
            .map_or_else(TypedValue::empty, |s| s.get_value(&self.record))
    }

    fn set_value(&self, value: &TypedValue) -> bool {
        self.server
            .as_ref()
            .is_some_and(|s| s.set_value(&self.record, value))
    }

    fn is_available(&self) -> bool {
        self.server.as_ref().is_some_and(|s| s.is_running())
    }

    fn teardown(&mut self) {
        // Drops this variable's interest only; the scope's server is
        // stopped by the registry's scope teardown.
        if self.server.take().is_some() {
            debug!(variable = %self.kind, record = %self.record, "record interest released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::{RecordingSink, ScalarKind, TypeDesc};
    use pvlink_wire::LoopbackHub;

    fn uint(n: u64) -> TypedValue {
        TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt64), serde_json::json!(n)).unwrap()
    }

    fn registry(hub: &LoopbackHub) -> Arc<SharedServerRegistry> {
        Arc::new(SharedServerRegistry::new(hub.server_backend()))
    }

    fn variable(
        registry: &Arc<SharedServerRegistry>,
        scope: &ScopeId,
        record: &str,
        initial: u64,
    ) -> ServerVariable {
        let config = AdapterConfig::new()
            .with("channel", record)
            .with("type", "uint64")
            .with("value", initial.to_string());
        ServerVariable::new(
            "server-variable",
            Arc::clone(registry),
            scope.clone(),
            config,
            RecordingSink::new(),
        )
    }

    #[test]
    fn serves_after_scope_setup() {
        let hub = LoopbackHub::new();
        let registry = registry(&hub);
        let scope = ScopeId::new("proc-1");

        let mut var = variable(&registry, &scope, "counter", 10);
        var.setup().unwrap();
        assert!(!var.is_available());
        assert_eq!(var.get_value(), uint(10));

        registry.setup(&scope).unwrap();
        assert!(var.is_available());
        assert!(var.set_value(&uint(11)));
        assert_eq!(var.get_value(), uint(11));

        registry.teardown(&scope).unwrap();
        assert!(!var.is_available());
    }

    #[test]
    fn duplicate_record_names_fail_setup() {
        let hub = LoopbackHub::new();
        let registry = registry(&hub);
        let scope = ScopeId::new("proc-1");

        let mut first = variable(&registry, &scope, "dup", 1);
        first.setup().unwrap();
        let mut second = variable(&registry, &scope, "dup", 2);
        let err = second.setup().unwrap_err();
        assert!(matches!(err, SetupError::RecordExists { .. }));
    }

    #[test]
    fn variables_of_one_scope_share_one_server() {
        let hub = LoopbackHub::new();
        let registry = registry(&hub);
        let scope = ScopeId::new("proc-1");

        let mut a = variable(&registry, &scope, "rec-a", 1);
        a.setup().unwrap();
        let mut b = variable(&registry, &scope, "rec-b", 2);
        b.setup().unwrap();
        assert_eq!(registry.get_server(&scope).len(), 2);

        registry.setup(&scope).unwrap();
        assert!(a.set_value(&uint(10)));
        assert_eq!(a.get_value(), uint(10));
        assert_eq!(b.get_value(), uint(2));
    }
}
