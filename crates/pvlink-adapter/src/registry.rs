//! Adapter kind registry.
//!
//! The hosting engine resolves adapters by kind name at procedure load
//! time. Registration is explicit: embedders call `standard` for the
//! built-in set and may add their own kinds on top.

use std::collections::HashMap;
use std::sync::Arc;

use pvlink_server::{ScopeId, SharedServerRegistry};
use pvlink_types::UpdateSink;
use pvlink_wire::{ChannelClient, RpcClient};
use tracing::debug;

use crate::config::{AdapterConfig, SetupError};
use crate::ops::{Instruction, ReadOp, RpcOp, WriteOp};
use crate::vars::{ClientVariable, EngineVariable, MonitorVariable, ServerVariable};

pub type InstructionFactory =
    Box<dyn Fn(AdapterConfig) -> Box<dyn Instruction> + Send + Sync>;
pub type VariableFactory =
    Box<dyn Fn(AdapterConfig) -> Box<dyn EngineVariable> + Send + Sync>;

/// Maps adapter kind names to factories.
#[derive(Default)]
pub struct AdapterRegistry {
    instructions: HashMap<String, InstructionFactory>,
    variables: HashMap<String, VariableFactory>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in adapter set wired to the given protocol roles.
    ///
    /// Instruction kinds: `channel-read`, `channel-write` (legacy
    /// protocol), `pv-read`, `pv-write` (structured-value protocol),
    /// `rpc-call`. Variable kinds: `channel-variable`,
    /// `monitor-variable`, `server-variable`.
    #[must_use]
    pub fn standard(
        channel: Arc<dyn ChannelClient>,
        pv: Arc<dyn ChannelClient>,
        rpc: Arc<dyn RpcClient>,
        servers: Arc<SharedServerRegistry>,
        scope: ScopeId,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        let mut registry = Self::new();

        let c = Arc::clone(&channel);
        registry.register_instruction("channel-read", move |config| {
            Box::new(ReadOp::new("channel-read", Arc::clone(&c), config))
        });
        let c = Arc::clone(&channel);
        registry.register_instruction("channel-write", move |config| {
            Box::new(WriteOp::new("channel-write", Arc::clone(&c), config))
        });
        let p = Arc::clone(&pv);
        registry.register_instruction("pv-read", move |config| {
            Box::new(ReadOp::new("pv-read", Arc::clone(&p), config))
        });
        let p = Arc::clone(&pv);
        registry.register_instruction("pv-write", move |config| {
            Box::new(WriteOp::new("pv-write", Arc::clone(&p), config))
        });
        let r = Arc::clone(&rpc);
        registry.register_instruction("rpc-call", move |config| {
            Box::new(RpcOp::new("rpc-call", Arc::clone(&r), config))
        });

        let (c, s) = (Arc::clone(&channel), Arc::clone(&sink));
        registry.register_variable("channel-variable", move |config| {
            Box::new(ClientVariable::new(
                "channel-variable",
                Arc::clone(&c),
                config,
                Arc::clone(&s),
            ))
        });
        let (c, s) = (Arc::clone(&channel), Arc::clone(&sink));
        registry.register_variable("monitor-variable", move |config| {
            Box::new(MonitorVariable::new(
                "monitor-variable",
                Arc::clone(&c),
                config,
                Arc::clone(&s),
            ))
        });
        let (reg, sc, s) = (Arc::clone(&servers), scope, Arc::clone(&sink));
        registry.register_variable("server-variable", move |config| {
            Box::new(ServerVariable::new(
                "server-variable",
                Arc::clone(&reg),
                sc.clone(),
                config,
                Arc::clone(&s),
            ))
        });

        registry
    }

    pub fn register_instruction(
        &mut self,
        kind: &str,
        factory: impl Fn(AdapterConfig) -> Box<dyn Instruction> + Send + Sync + 'static,
    ) {
        debug!(kind, "instruction adapter registered");
        self.instructions.insert(kind.into(), Box::new(factory));
    }

    pub fn register_variable(
        &mut self,
        kind: &str,
        factory: impl Fn(AdapterConfig) -> Box<dyn EngineVariable> + Send + Sync + 'static,
    ) {
        debug!(kind, "variable adapter registered");
        self.variables.insert(kind.into(), Box::new(factory));
    }

    /// Instantiates an instruction adapter.
    ///
    /// # Errors
    ///
    /// [`SetupError::UnknownAdapter`] for an unregistered kind.
    pub fn make_instruction(
        &self,
        kind: &str,
        config: AdapterConfig,
    ) -> Result<Box<dyn Instruction>, SetupError> {
        let factory = self
            .instructions
            .get(kind)
            .ok_or_else(|| SetupError::UnknownAdapter { kind: kind.into() })?;
        Ok(factory(config))
    }

    /// Instantiates a variable adapter.
    ///
    /// # Errors
    ///
    /// [`SetupError::UnknownAdapter`] for an unregistered kind.
    pub fn make_variable(
        &self,
        kind: &str,
        config: AdapterConfig,
    ) -> Result<Box<dyn EngineVariable>, SetupError> {
        let factory = self
            .variables
            .get(kind)
            .ok_or_else(|| SetupError::UnknownAdapter { kind: kind.into() })?;
        Ok(factory(config))
    }

    /// Registered instruction kinds, sorted.
    #[must_use]
    pub fn instruction_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.instructions.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Registered variable kinds, sorted.
    #[must_use]
    pub fn variable_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.variables.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::NullSink;
    use pvlink_wire::{LoopbackHub, ScalarCarrier};

    fn standard(hub: &LoopbackHub) -> AdapterRegistry {
        AdapterRegistry::standard(
            hub.channel_client(ScalarCarrier::Bare),
            hub.channel_client(ScalarCarrier::Struct),
            hub.rpc_client(),
            Arc::new(SharedServerRegistry::new(hub.server_backend())),
            ScopeId::new("test"),
            Arc::new(NullSink),
        )
    }

    #[test]
    fn standard_set_is_complete() {
        let hub = LoopbackHub::new();
        let registry = standard(&hub);
        assert_eq!(
            registry.instruction_kinds(),
            vec!["channel-read", "channel-write", "pv-read", "pv-write", "rpc-call"]
        );
        assert_eq!(
            registry.variable_kinds(),
            vec!["channel-variable", "monitor-variable", "server-variable"]
        );
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        let hub = LoopbackHub::new();
        let registry = standard(&hub);
        let err = registry
            .make_instruction("no-such-kind", AdapterConfig::new())
            .unwrap_err();
        assert!(matches!(err, SetupError::UnknownAdapter { .. }));
        assert!(registry
            .make_variable("no-such-kind", AdapterConfig::new())
            .is_err());
    }

    #[test]
    fn made_instructions_report_their_kind() {
        let hub = LoopbackHub::new();
        let registry = standard(&hub);
        let op = registry
            .make_instruction("pv-read", AdapterConfig::new())
            .unwrap();
        assert_eq!(op.name(), "pv-read");
    }
}
