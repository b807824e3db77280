//! Module descriptors: the content an application boots.

use std::fmt;
use std::sync::Arc;

use orbit_action::{ActionDefinition, ActionGroup, ActionMiddleware};
use orbit_eventbus::Subscription;
use orbit_task::TaskDefinition;

use crate::satellite::Satellite;

/// A named bundle of actions, groups, middleware, listeners, tasks and
/// satellites.
///
/// Built in code by the application and handed to the engine;
/// `modules.enabled` selects which ones boot.
#[derive(Clone)]
pub struct Module {
    name: String,
    actions: Vec<ActionDefinition>,
    groups: Vec<ActionGroup>,
    middleware: Vec<Arc<dyn ActionMiddleware>>,
    listeners: Vec<Subscription>,
    tasks: Vec<TaskDefinition>,
    satellites: Vec<Arc<dyn Satellite>>,
}

impl Module {
    /// An empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            groups: Vec::new(),
            middleware: Vec::new(),
            listeners: Vec::new(),
            tasks: Vec::new(),
            satellites: Vec::new(),
        }
    }

    /// Add an action. It is tagged with this module's name at load.
    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    /// Add a group.
    pub fn group(mut self, group: ActionGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Add middleware.
    pub fn middleware(mut self, middleware: impl ActionMiddleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Add a listener subscription.
    pub fn listener(mut self, subscription: Subscription) -> Self {
        self.listeners.push(subscription);
        self
    }

    /// Add a task.
    pub fn task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }

    /// Add a satellite.
    pub fn satellite(mut self, satellite: impl Satellite + 'static) -> Self {
        self.satellites.push(Arc::new(satellite));
        self
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> &[ActionDefinition] {
        &self.actions
    }

    /// Groups in declaration order.
    pub fn groups(&self) -> &[ActionGroup] {
        &self.groups
    }

    /// Middleware in declaration order.
    pub fn middleware_list(&self) -> &[Arc<dyn ActionMiddleware>] {
        &self.middleware
    }

    /// Listener subscriptions.
    pub fn listeners(&self) -> &[Subscription] {
        &self.listeners
    }

    /// Tasks.
    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    /// Satellites in declaration order.
    pub fn satellites(&self) -> &[Arc<dyn Satellite>] {
        &self.satellites
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("actions", &self.actions.len())
            .field("groups", &self.groups.len())
            .field("middleware", &self.middleware.len())
            .field("listeners", &self.listeners.len())
            .field("tasks", &self.tasks.len())
            .field("satellites", &self.satellites)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    #[test]
    fn builder_collects_content() {
        let module = Module::new("billing")
            .action(
                ActionDefinition::builder("invoice")
                    .run(|_, _| async { Ok(Value::Null) })
                    .build()
                    .unwrap(),
            )
            .group(ActionGroup::new("audited").module("billing"))
            .task(
                TaskDefinition::builder("settle")
                    .run(|_, _| async { Ok(Value::Null) })
                    .build()
                    .unwrap(),
            );

        assert_eq!(module.name(), "billing");
        assert_eq!(module.actions().len(), 1);
        assert_eq!(module.groups().len(), 1);
        assert_eq!(module.tasks().len(), 1);
        assert!(module.listeners().is_empty());
        assert!(module.satellites().is_empty());
    }
}
