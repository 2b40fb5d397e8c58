//! Channel write instruction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pvlink_client::ChannelBinding;
use pvlink_types::{Deadline, PollResult, TypedValue};
use pvlink_wire::ChannelClient;
use tracing::{debug, warn};

use crate::config::{AdapterConfig, SetupError};
use crate::context::AdapterContext;
use crate::ops::Instruction;

/// Writes one value to a remote channel once it connects.
///
/// Attributes: `channel` (required), exactly one of `type`+`value`
/// (inline JSON literal) or `varName` (procedure variable holding the
/// payload), optional `timeout` in seconds. The payload is captured at
/// init time; later variable updates do not affect an in-flight write.
pub struct WriteOp {
    name: String,
    client: Arc<dyn ChannelClient>,
    config: AdapterConfig,
    halted: AtomicBool,
    binding: Mutex<Option<ChannelBinding>>,
    channel: String,
    payload: TypedValue,
    deadline: Deadline,
    outcome: Option<PollResult>,
}

impl WriteOp {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ChannelClient>,
        config: AdapterConfig,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            config,
            halted: AtomicBool::new(false),
            binding: Mutex::new(None),
            channel: String::new(),
            payload: TypedValue::empty(),
            deadline: Deadline::unbounded(),
            outcome: None,
        }
    }

    fn resolve_payload(&self, ctx: &AdapterContext) -> Result<TypedValue, SetupError> {
        let groups: &[&[&str]] = &[&["type", "value"], &["varName"]];
        match self.config.exactly_one_of(&self.name, groups)? {
            0 => {
                let ty = self.config.type_desc(&self.name, "type")?;
                self.config.value_literal(&self.name, "value", &ty)
            }
            _ => {
                let var = self.config.require(&self.name, "varName")?;
                let value =
                    ctx.variables
                        .fetch(var)
                        .ok_or_else(|| SetupError::UnknownVariable {
                            adapter: self.name.clone(),
                            name: var.into(),
                        })?;
                if value.is_empty() {
                    return Err(SetupError::InvalidValue {
                        adapter: self.name.clone(),
                        attribute: "varName".into(),
                        detail: format!("variable '{var}' holds no value"),
                    });
                }
                Ok(value)
            }
        }
    }

    fn finish(&mut self, result: PollResult) -> PollResult {
        self.outcome = Some(result);
        self.binding.lock().take();
        result
    }
}

impl Instruction for WriteOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &AdapterContext) -> Result<(), SetupError> {
        let channel = self.config.require(&self.name, "channel")?.to_string();
        let payload = self.resolve_payload(ctx)?;
        let timeout = self.config.timeout(&self.name)?;
        self.deadline = timeout.map_or_else(Deadline::unbounded, Deadline::after);

        let declared = payload.ty().clone();
        let binding = ChannelBinding::open(self.client.as_ref(), &channel, declared, None)
            .map_err(|source| SetupError::ChannelOpen {
                adapter: self.name.clone(),
                source,
            })?;
        *self.binding.lock() = Some(binding);
        self.channel = channel;
        self.payload = payload;
        self.outcome = None;
        Ok(())
    }

    fn execute(&mut self, _ctx: &AdapterContext) -> PollResult {
        if self.halted.load(Ordering::SeqCst) {
            return self.finish(PollResult::Failure);
        }
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let connected = {
            let guard = self.binding.lock();
            let Some(binding) = guard.as_ref() else {
                warn!(instruction = %self.name, "execute without a channel binding");
                drop(guard);
                return self.finish(PollResult::Failure);
            };
            binding.snapshot().1
        };
        if connected {
            let written = self
                .binding
                .lock()
                .as_ref()
                .is_some_and(|b| b.write(&self.payload));
            if written {
                debug!(
                    instruction = %self.name,
                    channel = %self.channel,
                    value = %self.payload,
                    "write complete"
                );
                return self.finish(PollResult::Success);
            }
            warn!(instruction = %self.name, channel = %self.channel, "write refused");
            return self.finish(PollResult::Failure);
        }
        if !self.deadline.is_expired() {
            return PollResult::Running;
        }
        warn!(
            instruction = %self.name,
            channel = %self.channel,
            "timed out waiting for the channel to connect"
        );
        self.finish(PollResult::Failure)
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.binding.lock().take();
    }

    fn reset(&mut self) {
        self.binding.lock().take();
        self.halted.store(false, Ordering::SeqCst);
        self.channel.clear();
        self.payload = TypedValue::empty();
        self.deadline = Deadline::unbounded();
        self.outcome = None;
    }
}
