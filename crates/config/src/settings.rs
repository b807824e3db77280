//! Typed configuration sections

use std::time::Duration;

use orbit_core::DEFAULT_PRIORITY;
use orbit_log::Level;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Queue name that matches every queue.
pub const ALL_QUEUES: &str = "*";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    /// Engine and action processing
    pub general: GeneralConfig,
    /// Log output
    pub logging: orbit_log::Config,
    /// Task scheduling and workers
    pub tasks: TaskConfig,
    /// Which modules are booted
    pub modules: ModulesConfig,
}

/// Engine and action-processing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Server id; generated at boot when absent
    pub id: Option<String>,
    /// Surface fatal boot errors to the caller instead of exiting
    pub test_mode: bool,
    /// Watch loaded config files and report changes
    pub development_mode: bool,
    /// Milliseconds an action may run before the caller gets a timeout
    pub action_timeout_ms: u64,
    /// Priority given to listeners registered without one
    pub default_listener_priority: u32,
    /// Which values count as missing in addition to an absent key
    pub missing_param_checks: Vec<MissingParamCheck>,
    /// Drop params that are not declared inputs
    pub scrub_params: bool,
    /// Concurrent actions allowed per connection
    pub max_pending_actions: usize,
    /// Level for successful action log lines
    pub action_success_log_level: Level,
    /// Level for failed action log lines
    pub action_failure_log_level: Level,
}

/// A value treated as a missing param.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingParamCheck {
    /// JSON `null`
    Null,
    /// The empty string
    EmptyString,
}

/// Task scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Run the delayed-job promotion loop and recurrent tasks
    pub scheduler: bool,
    /// Milliseconds between promotion passes and idle worker polls
    pub check_timeout_ms: u64,
    /// Number of workers
    pub workers: usize,
    /// Queues the workers poll, in order; `"*"` means all
    pub queues: Vec<String>,
}

/// Module selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    /// Module names to boot; empty boots every module
    pub enabled: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            id: None,
            test_mode: false,
            development_mode: false,
            action_timeout_ms: 300_000,
            default_listener_priority: DEFAULT_PRIORITY,
            missing_param_checks: vec![MissingParamCheck::Null, MissingParamCheck::EmptyString],
            scrub_params: true,
            max_pending_actions: 5,
            action_success_log_level: Level::Info,
            action_failure_log_level: Level::Error,
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            scheduler: false,
            check_timeout_ms: 500,
            workers: 1,
            queues: vec![ALL_QUEUES.to_string()],
        }
    }
}

impl GeneralConfig {
    /// Action timeout as a [`Duration`].
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Whether `check` is enabled.
    pub fn treats_as_missing(&self, check: MissingParamCheck) -> bool {
        self.missing_param_checks.contains(&check)
    }
}

impl TaskConfig {
    /// Scheduler interval as a [`Duration`].
    pub const fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Whether workers poll every queue.
    pub fn polls_all_queues(&self) -> bool {
        self.queues.iter().any(|q| q == ALL_QUEUES)
    }
}

impl ModulesConfig {
    /// Whether the module called `name` should boot.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|m| m == name)
    }
}

impl OrbitConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.general.action_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "general.action_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.general.max_pending_actions == 0 {
            return Err(ConfigError::validation(
                "general.max_pending_actions",
                "must be greater than zero",
            ));
        }
        if self.tasks.check_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "tasks.check_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.tasks.workers > 0 && self.tasks.queues.is_empty() {
            return Err(ConfigError::validation(
                "tasks.queues",
                "workers need at least one queue",
            ));
        }
        if self.general.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ConfigError::validation("general.id", "must not be blank"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        let config = OrbitConfig::default();
        config.validate().unwrap();
        assert_eq!(config.general.action_timeout(), Duration::from_secs(300));
        assert_eq!(config.general.default_listener_priority, 100);
        assert!(config.general.scrub_params);
        assert!(config.tasks.polls_all_queues());
    }

    #[rstest]
    #[case::action_timeout(|c: &mut OrbitConfig| c.general.action_timeout_ms = 0, "general.action_timeout_ms")]
    #[case::pending(|c: &mut OrbitConfig| c.general.max_pending_actions = 0, "general.max_pending_actions")]
    #[case::check_timeout(|c: &mut OrbitConfig| c.tasks.check_timeout_ms = 0, "tasks.check_timeout_ms")]
    #[case::queues(|c: &mut OrbitConfig| c.tasks.queues.clear(), "tasks.queues")]
    #[case::blank_id(|c: &mut OrbitConfig| c.general.id = Some("  ".into()), "general.id")]
    fn validate_rejects(#[case] mutate: fn(&mut OrbitConfig), #[case] field: &str) {
        let mut config = OrbitConfig::default();
        mutate(&mut config);
        match config.validate() {
            Err(ConfigError::Validation { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn workers_disabled_allow_empty_queues() {
        let mut config = OrbitConfig::default();
        config.tasks.workers = 0;
        config.tasks.queues.clear();
        config.validate().unwrap();
    }

    #[test]
    fn empty_enable_list_enables_everything() {
        let modules = ModulesConfig::default();
        assert!(modules.is_enabled("anything"));

        let modules = ModulesConfig {
            enabled: vec!["billing".into()],
        };
        assert!(modules.is_enabled("billing"));
        assert!(!modules.is_enabled("chat"));
    }

    #[test]
    fn missing_param_checks_deserialize_snake_case() {
        let general: GeneralConfig =
            serde_json::from_str(r#"{"missing_param_checks": ["null"]}"#).unwrap();
        assert!(general.treats_as_missing(MissingParamCheck::Null));
        assert!(!general.treats_as_missing(MissingParamCheck::EmptyString));
    }
}
