//! RPC call instruction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pvlink_types::{Deadline, PollResult, TypedValue};
use pvlink_wire::{RpcClient, RpcTicket};
use tracing::{debug, warn};

use crate::config::{AdapterConfig, SetupError};
use crate::context::AdapterContext;
use crate::ops::Instruction;

/// Issues one RPC request and polls for the reply.
///
/// Attributes: `service` (required), exactly one of `type`+`value`
/// (inline request literal) or `requestVar` (procedure variable holding
/// the request), optional `outputVar` to receive the reply, optional
/// `timeout` in seconds (also passed through to the backend).
///
/// A reply counts as success only when it carries an integral `result`
/// field equal to zero; anything else is a rejection.
pub struct RpcOp {
    name: String,
    rpc: Arc<dyn RpcClient>,
    config: AdapterConfig,
    halted: AtomicBool,
    ticket: Mutex<Option<Box<dyn RpcTicket>>>,
    service: String,
    output_var: Option<String>,
    deadline: Deadline,
    outcome: Option<PollResult>,
}

impl RpcOp {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        rpc: Arc<dyn RpcClient>,
        config: AdapterConfig,
    ) -> Self {
        Self {
            name: name.into(),
            rpc,
            config,
            halted: AtomicBool::new(false),
            ticket: Mutex::new(None),
            service: String::new(),
            output_var: None,
            deadline: Deadline::unbounded(),
            outcome: None,
        }
    }

    fn request(&self, ctx: &AdapterContext) -> Result<TypedValue, SetupError> {
        let groups: &[&[&str]] = &[&["type", "value"], &["requestVar"]];
        match self.config.exactly_one_of(&self.name, groups)? {
            0 => {
                let ty = self.config.type_desc(&self.name, "type")?;
                self.config.value_literal(&self.name, "value", &ty)
            }
            _ => {
                let var = self.config.require(&self.name, "requestVar")?;
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
                        attribute: "requestVar".into(),
                        detail: format!("variable '{var}' holds no value"),
                    });
                }
                Ok(value)
            }
        }
    }

    fn finish(&mut self, result: PollResult) -> PollResult {
        self.outcome = Some(result);
        self.ticket.lock().take();
        result
    }

    /// The reply's `result` field, when present and integral.
    fn result_code(reply: &TypedValue) -> Option<i64> {
        let field = reply.field("result")?;
        if let Some(code) = field.as_i64() {
            return Some(code);
        }
        let f = field.as_f64()?;
        (f.fract() == 0.0).then_some(f as i64)
    }
}

impl Instruction for RpcOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &AdapterContext) -> Result<(), SetupError> {
        let service = self.config.require(&self.name, "service")?.to_string();
        let request = self.request(ctx)?;
        let timeout = self.config.timeout(&self.name)?;
        self.output_var = self.config.get("outputVar").map(String::from);
        if let Some(var) = &self.output_var {
            if ctx.variables.fetch(var).is_none() {
                return Err(SetupError::UnknownVariable {
                    adapter: self.name.clone(),
                    name: var.clone(),
                });
            }
        }
        self.deadline = timeout.map_or_else(Deadline::unbounded, Deadline::after);

        let ticket = self
            .rpc
            .call(&service, &request, timeout)
            .map_err(|source| SetupError::CallFailed {
                adapter: self.name.clone(),
                source,
            })?;
        debug!(
            instruction = %self.name,
            service = %service,
            request_id = %ticket.request_id(),
            "request issued"
        );
        *self.ticket.lock() = Some(ticket);
        self.service = service;
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
        let polled = {
            let mut guard = self.ticket.lock();
            let Some(ticket) = guard.as_mut() else {
                warn!(instruction = %self.name, "execute without a pending request");
                drop(guard);
                return self.finish(PollResult::Failure);
            };
            ticket.poll()
        };
        let reply = match polled {
            None => {
                if !self.deadline.is_expired() {
                    return PollResult::Running;
                }
                warn!(
                    instruction = %self.name,
                    service = %self.service,
                    "timed out waiting for the reply"
                );
                return self.finish(PollResult::Failure);
            }
            Some(Err(err)) => {
                warn!(
                    instruction = %self.name,
                    service = %self.service,
                    error = %err,
                    "call failed"
                );
                return self.finish(PollResult::Failure);
            }
            Some(Ok(reply)) => reply,
        };
        if let Some(var) = &self.output_var {
            if !ctx.variables.store(var, &reply) {
                warn!(
                    instruction = %self.name,
                    variable = %var,
                    "variable refused the reply"
                );
                return self.finish(PollResult::Failure);
            }
        }
        match Self::result_code(&reply) {
            Some(0) => {
                debug!(instruction = %self.name, service = %self.service, "call succeeded");
                self.finish(PollResult::Success)
            }
            Some(code) => {
                warn!(
                    instruction = %self.name,
                    service = %self.service,
                    result = code,
                    "service rejected the request"
                );
                self.finish(PollResult::Failure)
            }
            None => {
                warn!(
                    instruction = %self.name,
                    service = %self.service,
                    "reply has no integral 'result' field"
                );
                self.finish(PollResult::Failure)
            }
        }
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.ticket.lock().take();
    }

    fn reset(&mut self) {
        self.ticket.lock().take();
        self.halted.store(false, Ordering::SeqCst);
        self.service.clear();
        self.output_var = None;
        self.deadline = Deadline::unbounded();
        self.outcome = None;
    }
}
