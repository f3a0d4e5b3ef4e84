use std::sync::Arc;

use serde_json::{json, Value};

use toolgate_core::{Error, FnTool, ParamType, SharedTool, ToolContract, Toolset};

/// A small arithmetic/echo toolset, published by the `toolgate-server`
/// binary when no other tools are wired in.
#[must_use]
pub fn demo_toolset() -> Toolset {
    let tools: Vec<SharedTool> = vec![Arc::new(add()), Arc::new(multiply()), Arc::new(echo())];
    Toolset::new("demo", "Arithmetic and echo tools for smoke-testing a gateway.", tools)
}

fn add() -> FnTool {
    FnTool::sync(
        "add",
        "Add two integers.",
        ToolContract::new()
            .required("a", ParamType::Integer)
            .required("b", ParamType::Integer),
        |args| {
            let a = integer(&args["a"])?;
            let b = integer(&args["b"])?;
            a.checked_add(b)
                .map(Value::from)
                .ok_or_else(|| Error::LocalExecution(format!("integer overflow adding {a} and {b}")))
        },
    )
}

fn multiply() -> FnTool {
    FnTool::sync(
        "multiply",
        "Multiply two numbers.",
        ToolContract::new()
            .required("a", ParamType::Float)
            .required("b", ParamType::Float),
        |args| {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok(json!(a * b))
        },
    )
}

fn echo() -> FnTool {
    FnTool::sync(
        "echo",
        "Return the given text, optionally upper-cased.",
        ToolContract::new()
            .required("text", ParamType::String)
            .optional("uppercase", ParamType::Boolean)
            .describe("uppercase", "Upper-case the text before returning it"),
        |args| {
            let text = args["text"].as_str().unwrap_or_default();
            if args.get("uppercase").and_then(Value::as_bool).unwrap_or(false) {
                Ok(Value::from(text.to_uppercase()))
            } else {
                Ok(Value::from(text))
            }
        },
    )
}

fn integer(value: &Value) -> Result<i64, Error> {
    value
        .as_i64()
        .ok_or_else(|| Error::LocalExecution(format!("{value} does not fit in a 64-bit integer")))
}
