//! Channel read instruction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pvlink_client::ChannelBinding;
use pvlink_types::{Deadline, PollResult, TypeDesc};
use pvlink_wire::ChannelClient;
use tracing::{debug, warn};

use crate::config::{AdapterConfig, SetupError};
use crate::context::AdapterContext;
use crate::ops::Instruction;

/// Reads one valid value from a remote channel.
///
/// Attributes: `channel` (required), exactly one of `type` or
/// `outputVar`, optional `timeout` in seconds. With `outputVar` the
/// declared type is taken from the variable's current value, and the
/// result is stored back into it on success.
pub struct ReadOp {
    name: String,
    client: Arc<dyn ChannelClient>,
    config: AdapterConfig,
    halted: AtomicBool,
    binding: Mutex<Option<ChannelBinding>>,
    channel: String,
    output_var: Option<String>,
    deadline: Deadline,
    outcome: Option<PollResult>,
}

impl ReadOp {
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
            output_var: None,
            deadline: Deadline::unbounded(),
            outcome: None,
        }
    }

    fn declared_type(&mut self, ctx: &AdapterContext) -> Result<TypeDesc, SetupError> {
        let groups: &[&[&str]] = &[&["type"], &["outputVar"]];
        match self.config.exactly_one_of(&self.name, groups)? {
            0 => self.config.type_desc(&self.name, "type"),
            _ => {
                let var = self.config.require(&self.name, "outputVar")?.to_string();
                let current =
                    ctx.variables
                        .fetch(&var)
                        .ok_or_else(|| SetupError::UnknownVariable {
                            adapter: self.name.clone(),
                            name: var.clone(),
                        })?;
                let ty = current.ty().clone();
                self.output_var = Some(var);
                Ok(ty)
            }
        }
    }

    fn finish(&mut self, result: PollResult) -> PollResult {
        self.outcome = Some(result);
        self.binding.lock().take();
        result
    }
}

impl Instruction for ReadOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &AdapterContext) -> Result<(), SetupError> {
        let channel = self.config.require(&self.name, "channel")?.to_string();
        let declared = self.declared_type(ctx)?;
        let timeout = self.config.timeout(&self.name)?;
        self.deadline = timeout.map_or_else(Deadline::unbounded, Deadline::after);

        let binding = ChannelBinding::open(self.client.as_ref(), &channel, declared, None)
            .map_err(|source| SetupError::ChannelOpen {
                adapter: self.name.clone(),
                source,
            })?;
        *self.binding.lock() = Some(binding);
        self.channel = channel;
        self.outcome = None;
        Ok(())
    }

    fn execute(&mut self, ctx: &AdapterContext) -> PollResult {
        if self.halted.load(Ordering::SeqCst) {
            return self.finish(PollResult::Failure);
        }
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let snapshot = self.binding.lock().as_ref().map(ChannelBinding::snapshot);
        let Some((value, _connected)) = snapshot else {
            warn!(instruction = %self.name, "execute without a channel binding");
            return self.finish(PollResult::Failure);
        };
        if !value.is_empty() {
            if let Some(var) = &self.output_var {
                if !ctx.variables.store(var, &value) {
                    warn!(
                        instruction = %self.name,
                        variable = %var,
                        "variable refused the read result"
                    );
                    return self.finish(PollResult::Failure);
                }
            }
            debug!(instruction = %self.name, channel = %self.channel, %value, "read complete");
            return self.finish(PollResult::Success);
        }
        if !self.deadline.is_expired() {
            return PollResult::Running;
        }
        warn!(
            instruction = %self.name,
            channel = %self.channel,
            "timed out waiting for a valid value"
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
        self.output_var = None;
        self.deadline = Deadline::unbounded();
        self.outcome = None;
    }
}
