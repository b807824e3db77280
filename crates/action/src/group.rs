//! Group metadata patches ("mods").
//!
//! A group names its members (explicitly, through the member's own `group`
//! field, or by module) and carries an ordered patch. Patch keys:
//!
//! - `+key` appends the value's entries to the list at `key` (union, order
//!   preserved, no duplicates)
//! - `-key` removes the value's entries from the list at `key`
//! - `key` replaces the value at `key`
//!
//! Values are literal JSON or computed from the action. Keys that name a
//! definition field (`description`, `middleware`, `private`, `protected`,
//! `blocked_connection_types`, `log_level`) patch that field; every other
//! key patches `metadata`.

use std::fmt;
use std::sync::Arc;

use orbit_log::Level;
use serde_json::Value;

use crate::definition::ActionDefinition;

type ComputeFn = Arc<dyn Fn(&ActionDefinition, Option<&Value>) -> Value + Send + Sync>;

/// How a patch entry changes its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    /// Bare key.
    Replace(String),
    /// `+key`.
    Append(String),
    /// `-key`.
    Remove(String),
}

/// Value of a patch entry.
#[derive(Clone)]
pub enum PatchValue {
    /// Fixed value.
    Literal(Value),
    /// Computed from the action being patched. Replace entries also receive
    /// the current value of the key.
    Computed(ComputeFn),
}

/// A named group of actions with a metadata patch.
#[derive(Clone)]
pub struct ActionGroup {
    name: String,
    actions: Vec<String>,
    modules: Vec<String>,
    patch: Vec<(PatchOp, PatchValue)>,
}

impl PatchOp {
    /// Parse a patch key.
    pub fn parse(key: &str) -> Self {
        if let Some(rest) = key.strip_prefix('+') {
            Self::Append(rest.to_string())
        } else if let Some(rest) = key.strip_prefix('-') {
            Self::Remove(rest.to_string())
        } else {
            Self::Replace(key.to_string())
        }
    }

    /// The key without its operator prefix.
    pub fn key(&self) -> &str {
        match self {
            Self::Replace(k) | Self::Append(k) | Self::Remove(k) => k,
        }
    }
}

impl PatchValue {
    fn resolve(&self, action: &ActionDefinition, current: Option<&Value>) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Computed(f) => f(action, current),
        }
    }
}

impl fmt::Debug for PatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl ActionGroup {
    /// An empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            modules: Vec::new(),
            patch: Vec::new(),
        }
    }

    /// Add an action by name.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(name.into());
        self
    }

    /// Add every action of a module.
    #[must_use]
    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(name.into());
        self
    }

    /// Add a literal patch entry; `key` may carry a `+` or `-` prefix.
    #[must_use]
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.patch
            .push((PatchOp::parse(key), PatchValue::Literal(value.into())));
        self
    }

    /// Add a computed patch entry; `key` may carry a `+` or `-` prefix.
    #[must_use]
    pub fn set_with<F>(mut self, key: &str, f: F) -> Self
    where
        F: Fn(&ActionDefinition, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        self.patch
            .push((PatchOp::parse(key), PatchValue::Computed(Arc::new(f))));
        self
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Explicit members.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Member modules.
    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// Patch entries in application order.
    pub fn patch(&self) -> &[(PatchOp, PatchValue)] {
        &self.patch
    }

    /// Whether `action` is a member.
    pub fn contains(&self, action: &ActionDefinition) -> bool {
        action.group.as_deref() == Some(self.name.as_str())
            || self.actions.iter().any(|a| *a == action.name)
            || action
                .module
                .as_deref()
                .is_some_and(|m| self.modules.iter().any(|g| g == m))
    }

    /// Return a patched copy of `action`.
    pub fn apply(&self, action: &ActionDefinition) -> ActionDefinition {
        let mut patched = action.clone();
        for (op, value) in &self.patch {
            let key = op.key();
            let current = read_key(&patched, key);
            let next = match op {
                PatchOp::Replace(_) => value.resolve(&patched, Some(&current)),
                PatchOp::Append(_) => union(current, value.resolve(&patched, None)),
                PatchOp::Remove(_) => difference(current, &value.resolve(&patched, None)),
            };
            if let Err(reason) = write_key(&mut patched, key, next) {
                tracing::warn!(
                    group = %self.name,
                    action = %action.name,
                    key,
                    reason = %reason,
                    "group patch entry skipped"
                );
            }
        }
        patched
    }
}

impl fmt::Debug for ActionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionGroup")
            .field("name", &self.name)
            .field("actions", &self.actions)
            .field("modules", &self.modules)
            .field("patch", &self.patch)
            .finish()
    }
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn union(current: Value, extra: Value) -> Value {
    let mut items = Vec::new();
    for item in as_list(current).into_iter().chain(as_list(extra)) {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}

fn difference(current: Value, excluded: &Value) -> Value {
    let excluded = as_list(excluded.clone());
    Value::Array(
        as_list(current)
            .into_iter()
            .filter(|item| !excluded.contains(item))
            .collect(),
    )
}

fn strings(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn read_key(action: &ActionDefinition, key: &str) -> Value {
    match key {
        "description" => Value::String(action.description.clone()),
        "middleware" => strings(&action.middleware),
        "private" => Value::Bool(action.private),
        "protected" => Value::Bool(action.protected),
        "blocked_connection_types" => strings(&action.blocked_connection_types),
        "log_level" => action
            .log_level
            .map_or(Value::Null, |l| Value::String(l.to_string())),
        other => action.metadata.get(other).cloned().unwrap_or(Value::Null),
    }
}

fn write_key(action: &mut ActionDefinition, key: &str, value: Value) -> Result<(), String> {
    match key {
        "description" => {
            action.description = value
                .as_str()
                .ok_or("description must be a string")?
                .to_string();
        }
        "middleware" => action.middleware = string_list(value)?,
        "private" => action.private = value.as_bool().ok_or("private must be a boolean")?,
        "protected" => action.protected = value.as_bool().ok_or("protected must be a boolean")?,
        "blocked_connection_types" => action.blocked_connection_types = string_list(value)?,
        "log_level" => {
            action.log_level = match value {
                Value::Null => None,
                other => Some(
                    serde_json::from_value::<Level>(other)
                        .map_err(|_| "log_level must be a level name")?,
                ),
            };
        }
        other => {
            action.metadata.insert(other.to_string(), value);
        }
    }
    Ok(())
}

fn string_list(value: Value) -> Result<Vec<String>, String> {
    as_list(value)
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            other => Err(format!("expected a list of strings, found {other}")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn action() -> ActionDefinition {
        ActionDefinition::builder("groupTest")
            .group("testGroup")
            .metadata("customProp", json!(["a", "b"]))
            .metadata("customProp2", json!(["a", "b"]))
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap()
    }

    #[test]
    fn parses_operators() {
        assert_eq!(PatchOp::parse("+tags"), PatchOp::Append("tags".into()));
        assert_eq!(PatchOp::parse("-tags"), PatchOp::Remove("tags".into()));
        assert_eq!(PatchOp::parse("tags"), PatchOp::Replace("tags".into()));
        assert_eq!(PatchOp::parse("+tags").key(), "tags");
    }

    #[test]
    fn replace_is_idempotent() {
        let group = ActionGroup::new("testGroup").set("modProp", "OK");
        let once = group.apply(&action());
        let twice = group.apply(&once);
        assert_eq!(once.metadata["modProp"], json!("OK"));
        assert_eq!(twice.metadata["modProp"], json!("OK"));
    }

    #[test]
    fn append_concatenates() {
        let group = ActionGroup::new("testGroup").set("+customProp", json!(["c"]));
        let patched = group.apply(&action());
        assert_eq!(patched.metadata["customProp"], json!(["a", "b", "c"]));
    }

    #[test]
    fn append_does_not_duplicate() {
        let group = ActionGroup::new("testGroup").set("+customProp", json!(["b", "c"]));
        let patched = group.apply(&action());
        assert_eq!(patched.metadata["customProp"], json!(["a", "b", "c"]));
    }

    #[test]
    fn remove_excludes_entries() {
        let group = ActionGroup::new("testGroup").set("-customProp2", json!(["b"]));
        let patched = group.apply(&action());
        assert_eq!(patched.metadata["customProp2"], json!(["a"]));
    }

    #[test]
    fn original_is_untouched() {
        let base = action();
        let _ = ActionGroup::new("testGroup")
            .set("modProp", "OK")
            .set("private", true)
            .apply(&base);
        assert!(!base.metadata.contains_key("modProp"));
        assert!(!base.private);
    }

    #[test]
    fn computed_values_see_action_and_current() {
        let group = ActionGroup::new("testGroup")
            .set_with("description", |action, current| {
                json!(format!(
                    "{} ({})",
                    action.name,
                    current.and_then(Value::as_str).unwrap_or_default()
                ))
            })
            .set_with("+middleware", |action, current| {
                assert!(current.is_none());
                json!([format!("audit:{}", action.name)])
            });

        let patched = group.apply(&action());

        assert_eq!(patched.description, "groupTest ()");
        assert_eq!(patched.middleware, vec!["audit:groupTest".to_string()]);
    }

    #[test]
    fn known_fields_are_typed() {
        let group = ActionGroup::new("testGroup")
            .set("private", true)
            .set("+blocked_connection_types", "websocket")
            .set("log_level", "debug");
        let patched = group.apply(&action());
        assert!(patched.private);
        assert_eq!(patched.blocked_connection_types, vec!["websocket"]);
        assert_eq!(patched.log_level, Some(Level::Debug));
    }

    #[test]
    fn mistyped_known_field_is_skipped() {
        let group = ActionGroup::new("testGroup")
            .set("private", "yes")
            .set("after", 1);
        let patched = group.apply(&action());
        assert!(!patched.private);
        assert_eq!(patched.metadata["after"], json!(1));
    }

    #[test]
    fn membership_sources() {
        let by_field = action();
        let by_name = ActionDefinition::builder("other")
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        let by_module = by_name.clone().with_module("billing");

        assert!(ActionGroup::new("testGroup").contains(&by_field));
        assert!(ActionGroup::new("g").action("other").contains(&by_name));
        assert!(ActionGroup::new("g").module("billing").contains(&by_module));
        assert!(!ActionGroup::new("g").module("billing").contains(&by_name));
    }
}
