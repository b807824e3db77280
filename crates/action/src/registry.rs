//! Versioned action store with group mods.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::definition::ActionDefinition;
use crate::error::RegistryError;
use crate::group::ActionGroup;

/// Thread-safe registry of actions by name and version, plus the groups
/// whose patches are applied on resolution.
///
/// Writes are accepted until [`freeze`](Self::freeze); reads are lock-free
/// for actions and take a shared lock for groups.
///
/// # Examples
///
/// ```rust
/// use orbit_action::{ActionDefinition, ActionRegistry};
/// use serde_json::json;
///
/// let registry = ActionRegistry::new();
/// for version in [1, 2, 3] {
///     let action = ActionDefinition::builder("status")
///         .version(version)
///         .run(move |_, _| async move { Ok(json!(version)) })
///         .build()
///         .unwrap();
///     registry.register(action).unwrap();
/// }
/// assert_eq!(registry.resolve("status", None).unwrap().version, 3);
/// ```
pub struct ActionRegistry {
    actions: DashMap<String, BTreeMap<u32, Arc<ActionDefinition>>>,
    groups: RwLock<IndexMap<String, Arc<ActionGroup>>>,
    frozen: AtomicBool,
}

impl ActionRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            actions: DashMap::new(),
            groups: RwLock::new(IndexMap::new()),
            frozen: AtomicBool::new(false),
        }
    }

    /// Register an action.
    ///
    /// A later registration of the same name and version replaces the
    /// earlier one, unless the earlier one is protected.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateVersion`] when a protected action already
    ///   holds the version. The existing action is kept.
    /// - [`RegistryError::Frozen`] after [`freeze`](Self::freeze).
    pub fn register(&self, action: ActionDefinition) -> Result<(), RegistryError> {
        self.ensure_open()?;

        let name = action.name.clone();
        let version = action.version;
        let mut versions = self.actions.entry(name.clone()).or_default();

        if let Some(existing) = versions.get(&version) {
            if existing.protected {
                tracing::warn!(
                    action = %name,
                    version,
                    "refusing to override protected action"
                );
                return Err(RegistryError::DuplicateVersion { name, version });
            }
            tracing::info!(action = %name, version, "overriding action");
        } else {
            tracing::debug!(action = %name, version, "registered action");
        }

        versions.insert(version, Arc::new(action));
        Ok(())
    }

    /// Register a group. A group with the same name is replaced in place,
    /// keeping its original position in the application order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Frozen`] after [`freeze`](Self::freeze), or
    /// [`RegistryError::InvalidDefinition`] for a blank name.
    pub fn register_group(&self, group: ActionGroup) -> Result<(), RegistryError> {
        self.ensure_open()?;
        if group.name().trim().is_empty() {
            return Err(RegistryError::invalid(group.name(), "group name must not be blank"));
        }
        tracing::debug!(group = %group.name(), entries = group.patch().len(), "registered group");
        self.groups
            .write()
            .insert(group.name().to_string(), Arc::new(group));
        Ok(())
    }

    /// Resolve an action with group mods applied.
    ///
    /// Without a version the highest registered version is returned.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownAction`] or [`RegistryError::UnknownVersion`].
    pub fn resolve(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Arc<ActionDefinition>, RegistryError> {
        let raw = self.get(name, version)?;
        Ok(Arc::new(self.apply_group_mods(&raw)))
    }

    /// Look up the stored definition, without mods.
    pub fn get(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<Arc<ActionDefinition>, RegistryError> {
        let versions = self
            .actions
            .get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RegistryError::UnknownAction {
                name: name.to_owned(),
            })?;

        let found = match version {
            None => versions.values().next_back(),
            Some(v) => versions.get(&v),
        };
        found.cloned().ok_or_else(|| RegistryError::UnknownVersion {
            name: name.to_owned(),
            version: version.unwrap_or_default(),
        })
    }

    /// Fold every group `action` belongs to into a copy, in group
    /// registration order.
    pub fn apply_group_mods(&self, action: &ActionDefinition) -> ActionDefinition {
        let groups = self.groups.read();
        groups
            .values()
            .filter(|g| g.contains(action))
            .fold(action.clone(), |acc, group| group.apply(&acc))
    }

    /// Check if any version of `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actions.get(name).is_some_and(|v| !v.is_empty())
    }

    /// Registered versions of `name`, ascending.
    #[must_use]
    pub fn versions(&self, name: &str) -> Vec<u32> {
        self.actions
            .get(name)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default()
    }

    /// All action names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Group names in application order.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    /// Number of distinct action names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Refuse further writes.
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            tracing::debug!(actions = self.len(), "action registry frozen");
        }
    }

    /// Whether [`freeze`](Self::freeze) was called.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), RegistryError> {
        if self.is_frozen() {
            Err(RegistryError::Frozen { registry: "action" })
        } else {
            Ok(())
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .field("groups", &self.group_names())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn action(name: &str, version: u32) -> ActionDefinition {
        ActionDefinition::builder(name)
            .version(version)
            .run(move |_, _| async move { Ok(json!(version)) })
            .build()
            .unwrap()
    }

    #[test]
    fn missing_version_resolves_to_highest() {
        let reg = ActionRegistry::new();
        reg.register(action("versioned", 2)).unwrap();
        reg.register(action("versioned", 3)).unwrap();
        reg.register(action("versioned", 1)).unwrap();

        assert_eq!(reg.resolve("versioned", None).unwrap().version, 3);
        assert_eq!(reg.resolve("versioned", Some(1)).unwrap().version, 1);
        assert_eq!(reg.versions("versioned"), vec![1, 2, 3]);
    }

    #[test]
    fn unknown_action_and_version() {
        let reg = ActionRegistry::new();
        reg.register(action("known", 1)).unwrap();

        assert_eq!(
            reg.resolve("missing", None).unwrap_err(),
            RegistryError::UnknownAction {
                name: "missing".into()
            }
        );
        assert_eq!(
            reg.resolve("known", Some(7)).unwrap_err(),
            RegistryError::UnknownVersion {
                name: "known".into(),
                version: 7
            }
        );
    }

    #[test]
    fn later_registration_overrides() {
        let reg = ActionRegistry::new();
        reg.register(action("a", 1)).unwrap();
        let replacement = ActionDefinition::builder("a")
            .description("second")
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        reg.register(replacement).unwrap();

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("a", Some(1)).unwrap().description, "second");
    }

    #[test]
    fn protected_action_is_kept() {
        let reg = ActionRegistry::new();
        let original = ActionDefinition::builder("a")
            .description("original")
            .protected(true)
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        reg.register(original).unwrap();

        let err = reg.register(action("a", 1)).unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateVersion {
                name: "a".into(),
                version: 1
            }
        );
        assert_eq!(reg.get("a", None).unwrap().description, "original");
        // Other versions are still accepted.
        reg.register(action("a", 2)).unwrap();
    }

    #[test]
    fn resolve_applies_groups_in_registration_order() {
        let reg = ActionRegistry::new();
        let base = ActionDefinition::builder("groupTest")
            .group("first")
            .metadata("customProp", json!(["a", "b"]))
            .run(|_, _| async { Ok(Value::Null) })
            .build()
            .unwrap();
        reg.register(base).unwrap();
        reg.register_group(
            ActionGroup::new("first")
                .set("+customProp", json!(["c"]))
                .set("modProp", "first"),
        )
        .unwrap();
        reg.register_group(
            ActionGroup::new("second")
                .action("groupTest")
                .set("modProp", "second"),
        )
        .unwrap();

        let resolved = reg.resolve("groupTest", None).unwrap();

        assert_eq!(resolved.metadata["customProp"], json!(["a", "b", "c"]));
        assert_eq!(resolved.metadata["modProp"], json!("second"));
        let stored = reg.get("groupTest", None).unwrap();
        assert!(!stored.metadata.contains_key("modProp"));
        assert_eq!(reg.group_names(), vec!["first", "second"]);
    }

    #[test]
    fn freeze_blocks_writes() {
        let reg = ActionRegistry::new();
        reg.register(action("a", 1)).unwrap();
        reg.freeze();

        assert!(reg.is_frozen());
        assert_eq!(
            reg.register(action("b", 1)).unwrap_err(),
            RegistryError::Frozen { registry: "action" }
        );
        assert!(reg.register_group(ActionGroup::new("g")).is_err());
        assert!(reg.resolve("a", None).is_ok());
    }

    #[test]
    fn names_are_sorted() {
        let reg = ActionRegistry::new();
        for name in ["c", "a", "b"] {
            reg.register(action(name, 1)).unwrap();
        }
        assert_eq!(reg.names(), vec!["a", "b", "c"]);
        assert!(reg.contains("a"));
        assert!(!reg.contains("z"));
    }
}
