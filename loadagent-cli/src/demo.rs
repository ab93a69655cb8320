//! Built-in `demo` component used by `loadagent run`

use loadagent_core::ComponentRepository;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub const DEMO_COMPONENT: &str = "demo";

/// Repository with the `demo` component:
///
/// - `sleep(ms)` waits for `ms` milliseconds and returns it
/// - `echo(..)` returns its arguments as an array
/// - `fail(..)` always fails, with the first argument as message if given
pub fn demo_components() -> ComponentRepository {
    let mut repository = ComponentRepository::new();
    repository
        .register_action(DEMO_COMPONENT, "sleep", Some(1), sleep)
        .register_action(DEMO_COMPONENT, "echo", None, echo)
        .register_action(DEMO_COMPONENT, "fail", None, fail);
    repository
}

async fn sleep(args: Vec<JsonValue>) -> Result<JsonValue, String> {
    let millis = match args.first() {
        Some(value) => millis_argument(value)?,
        None => return Err("sleep needs milliseconds".to_string()),
    };
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Ok(json!(millis))
}

async fn echo(args: Vec<JsonValue>) -> Result<JsonValue, String> {
    Ok(JsonValue::Array(args))
}

async fn fail(args: Vec<JsonValue>) -> Result<JsonValue, String> {
    Err(match args.first() {
        Some(JsonValue::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => "requested failure".to_string(),
    })
}

fn millis_argument(value: &JsonValue) -> Result<u64, String> {
    match value {
        JsonValue::Number(number) => number
            .as_u64()
            .ok_or_else(|| format!("sleep needs a non-negative integer, got {}", number)),
        JsonValue::String(text) => text
            .trim()
            .parse()
            .map_err(|e| format!("sleep needs milliseconds, got '{}': {}", text, e)),
        other => Err(format!("sleep needs milliseconds, got {}", other)),
    }
}
