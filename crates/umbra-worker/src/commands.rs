//! Command dispatch.
//!
//! Commands are looked up by name in an open registry, so new handlers can
//! be added without touching the dispatch core or the serve loop.

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use log::debug;
use serde_json::{Map, Value, json};
use umbra_protocol::{CommandRequest, Envelope};

/// Per-session worker state.
///
/// The parameter store is where the modeling engine's state hangs off; for
/// the skeleton it is a flat name -> value map.
#[derive(Debug, Default)]
pub struct WorkerContext {
    values: Map<String, Value>,
}

/// One command implementation.
pub trait CommandHandler: Send + Sync {
    fn call(&self, ctx: &mut WorkerContext, args: Map<String, Value>) -> Result<Value>;
}

/// Maps command names to handlers.
pub struct CommandRegistry {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the built-in command set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping", Ping);
        registry.register("get_value", GetValue);
        registry.register("set_value", SetValue);
        registry.register("list_values", ListValues);
        registry
    }

    pub fn register(&mut self, name: &'static str, handler: impl CommandHandler + 'static) {
        self.handlers.insert(name, Box::new(handler));
    }

    /// Run one request against the context and wrap the outcome in a
    /// response envelope. Unknown commands and handler errors become
    /// failure envelopes; the serve loop never dies on them.
    pub fn dispatch(&self, ctx: &mut WorkerContext, request: CommandRequest) -> Envelope {
        let Some(handler) = self.handlers.get(request.command.as_str()) else {
            return Envelope::err(format!("unrecognized command '{}'", request.command));
        };
        match handler.call(ctx, request.args) {
            Ok(result) => Envelope::ok(result),
            Err(e) => {
                debug!("Command '{}' failed: {:#}", request.command, e);
                Envelope::err_with_traceback(e.to_string(), format!("{:#}", e))
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Built-in commands
// ============================================================================

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing required argument '{}'", key))
}

/// Health check / readiness probe.
struct Ping;

impl CommandHandler for Ping {
    fn call(&self, _ctx: &mut WorkerContext, _args: Map<String, Value>) -> Result<Value> {
        Ok(json!({"status": "ready"}))
    }
}

struct GetValue;

impl CommandHandler for GetValue {
    fn call(&self, ctx: &mut WorkerContext, args: Map<String, Value>) -> Result<Value> {
        let name = required_str(&args, "name")?;
        match ctx.values.get(name) {
            Some(value) => Ok(json!({"name": name, "value": value})),
            None => bail!("unknown parameter '{}'", name),
        }
    }
}

struct SetValue;

impl CommandHandler for SetValue {
    fn call(&self, ctx: &mut WorkerContext, mut args: Map<String, Value>) -> Result<Value> {
        let name = required_str(&args, "name")?.to_string();
        let value = args
            .remove("value")
            .ok_or_else(|| anyhow!("missing required argument 'value'"))?;
        ctx.values.insert(name, value);
        Ok(json!({}))
    }
}

struct ListValues;

impl CommandHandler for ListValues {
    fn call(&self, ctx: &mut WorkerContext, _args: Map<String, Value>) -> Result<Value> {
        Ok(json!({"values": Value::Object(ctx.values.clone())}))
    }
}
