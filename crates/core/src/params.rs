//! Request parameters.
//!
//! Params are a JSON object. Two keys are reserved for routing and are never
//! scrubbed: [`ACTION_PARAM`] names the action, [`VERSION_PARAM`] pins its
//! version.

use serde_json::Value;

/// Parameters passed to actions and tasks.
pub type Params = serde_json::Map<String, Value>;

/// Param naming the action to invoke.
pub const ACTION_PARAM: &str = "action";

/// Param pinning the action version.
pub const VERSION_PARAM: &str = "apiVersion";

/// Params that routing reads and scrubbing keeps.
pub const RESERVED_PARAMS: [&str; 2] = [ACTION_PARAM, VERSION_PARAM];

/// Whether `key` is one of the [`RESERVED_PARAMS`].
pub fn is_reserved(key: &str) -> bool {
    RESERVED_PARAMS.contains(&key)
}

/// The requested action name, if present and a string.
pub fn action_name(params: &Params) -> Option<&str> {
    params.get(ACTION_PARAM).and_then(Value::as_str)
}

/// The requested action version.
///
/// Accepts a JSON number or a numeric string (query-string transports only
/// carry strings). Returns `Err` with the raw value when it is present but
/// not a non-negative integer.
pub fn api_version(params: &Params) -> Result<Option<u32>, Value> {
    match params.get(VERSION_PARAM) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| Value::Number(n.clone())),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| Value::String(s.clone())),
        Some(other) => Err(other.clone()),
    }
}
