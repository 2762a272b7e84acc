//! Executes one model-requested tool call against the registry.
//!
//! Every failure mode (malformed arguments, unknown names, tool errors,
//! panics) becomes text for the model to read. The only non-text outcome is
//! a deliberate [`Dispatch::Terminate`].

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info};

use crate::registry::{Lookup, ToolRegistry};
use crate::tool::{ToolCall, ToolContext, ToolOutput, ANSWER_TOOL};

pub const INVALID_ARGUMENTS: &str = "Error: function arguments were not valid JSON";

/// Outcome of dispatching one call.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Text to append as the call's tool result.
    Continue(String),
    /// The session must end; carries the goodbye message.
    Terminate { message: String },
}

impl Dispatch {
    pub fn text(&self) -> &str {
        match self {
            Dispatch::Continue(text) => text,
            Dispatch::Terminate { message } => message,
        }
    }
}

/// Run `call` and turn whatever happens into a [`Dispatch`].
pub async fn dispatch(call: &ToolCall, registry: &ToolRegistry, ctx: &ToolContext<'_>) -> Dispatch {
    let arguments = match parse_arguments(&call.arguments) {
        Some(value) => value,
        None => return Dispatch::Continue(INVALID_ARGUMENTS.to_string()),
    };

    if call.name == ANSWER_TOOL {
        return Dispatch::Continue(arguments.to_string());
    }

    let tool = match registry.lookup(&call.name) {
        Lookup::Ready(tool) => tool,
        Lookup::Missing => {
            return Dispatch::Continue(format!("Error: function {} does not exist", call.name))
        }
        Lookup::Uninstantiated => {
            return Dispatch::Continue(exception_text(
                &call.name,
                "tool is registered but has no implementation",
            ))
        }
    };

    if ctx.verbose {
        info!(tool = %call.name, arguments = %arguments, "Calling tool");
    } else {
        debug!(tool = %call.name, arguments = %arguments, "Calling tool");
    }

    if !arguments.is_object() {
        return Dispatch::Continue(exception_text(
            &call.name,
            "arguments must be a JSON object",
        ));
    }

    match AssertUnwindSafe(tool.execute(arguments, ctx)).catch_unwind().await {
        Ok(Ok(ToolOutput::Text(text))) => Dispatch::Continue(text),
        Ok(Ok(ToolOutput::Terminate { message })) => {
            info!(tool = %call.name, "Tool requested session termination");
            Dispatch::Terminate { message }
        }
        Ok(Err(err)) => {
            debug!(tool = %call.name, error = %err, "Tool failed");
            Dispatch::Continue(exception_text(&call.name, &err.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            debug!(tool = %call.name, panic = %message, "Tool panicked");
            Dispatch::Continue(exception_text(&call.name, &message))
        }
    }
}

/// Empty argument text is read as `{}`; models send it for zero-argument tools.
fn parse_arguments(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return Some(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).ok()
}

fn exception_text(name: &str, message: &str) -> String {
    format!("Error: Calling function {name} raised an exception.\n\n{message}")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
