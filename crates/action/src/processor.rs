//! Per-call pipeline: gate, resolve, middleware, validate, execute, respond.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use orbit_config::GeneralConfig;
use orbit_core::{Params, Services};
use orbit_core::params::{action_name, api_version};
use orbit_log::Level;
use parking_lot::RwLock;
use serde_json::Value;

use crate::connection::Connection;
use crate::context::ActionContext;
use crate::definition::ActionDefinition;
use crate::input::{MissingPolicy, prepare_params, scrub_params};
use crate::middleware::MiddlewareRegistry;
use crate::registry::ActionRegistry;
use crate::response::{ActionComplete, ActionResponse, ErrorCode, ResponseError};

const UNKNOWN_ACTION: &str = "unknown action or invalid apiVersion";
const SHUTTING_DOWN: &str = "the server is shutting down";
const TOO_MANY_PENDING: &str = "you have too many pending requests";

/// Processor settings, normally taken from [`GeneralConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// How long to wait for an action body.
    pub timeout: Duration,
    /// Calls a connection may have in flight before new ones are refused.
    pub max_pending: usize,
    /// Drop undeclared params before validation.
    pub scrub: bool,
    /// Which values count as missing.
    pub missing: MissingPolicy,
    /// Level for successful calls, unless the action overrides it.
    pub success_level: Level,
    /// Level for failed calls.
    pub failure_level: Level,
}

impl From<&GeneralConfig> for ProcessorOptions {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            timeout: general.action_timeout(),
            max_pending: general.max_pending_actions,
            scrub: general.scrub_params,
            missing: MissingPolicy::from(general),
            success_level: general.action_success_log_level,
            failure_level: general.action_failure_log_level,
        }
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self::from(&GeneralConfig::default())
    }
}

/// What a pipeline run produced, before it is shaped into a response.
struct Outcome {
    action: Option<Arc<ActionDefinition>>,
    params: Params,
    result: Result<Value, ResponseError>,
    render: bool,
}

impl Outcome {
    fn rejected(params: Params, error: ResponseError) -> Self {
        Self {
            action: None,
            params,
            result: Err(error),
            render: true,
        }
    }

    fn failed(
        action: Arc<ActionDefinition>,
        params: Params,
        error: ResponseError,
        ctx: &ActionContext,
    ) -> Self {
        Self {
            action: Some(action),
            params,
            result: Err(error),
            render: ctx.to_render(),
        }
    }
}

/// Runs actions for transports.
///
/// Every call is answered; failures become part of the envelope and never
/// escape [`process`](Self::process).
pub struct ActionProcessor {
    actions: Arc<ActionRegistry>,
    middleware: Arc<MiddlewareRegistry>,
    options: ProcessorOptions,
    services: RwLock<Services>,
    accepting: AtomicBool,
}

impl ActionProcessor {
    /// Create a processor that accepts work immediately.
    #[must_use]
    pub fn new(
        actions: Arc<ActionRegistry>,
        middleware: Arc<MiddlewareRegistry>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            actions,
            middleware,
            options,
            services: RwLock::new(Services::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Services handed to every [`ActionContext`].
    #[must_use]
    pub fn with_services(self, services: Services) -> Self {
        *self.services.write() = services;
        self
    }

    /// Replace the services handed to later calls.
    pub fn set_services(&self, services: Services) {
        *self.services.write() = services;
    }

    /// Open or close the gate for new calls.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Whether new calls are accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Active settings.
    pub const fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// The action registry this processor resolves against.
    pub fn actions(&self) -> &Arc<ActionRegistry> {
        &self.actions
    }

    /// Handle one call. The action name and version come from
    /// `connection.params`; the returned connection carries the params the
    /// body actually received.
    pub async fn process(&self, mut connection: Connection) -> ActionComplete {
        let started = Instant::now();
        let pending = connection.begin_action();
        let params = std::mem::take(&mut connection.params);
        let requested = action_name(&params).map(str::to_owned);

        tracing::trace!(
            connection = %connection.id(),
            kind = connection.kind(),
            action = requested.as_deref().unwrap_or_default(),
            "action received"
        );

        let outcome = self.run(&connection, params).await;
        let duration = started.elapsed();
        drop(pending);

        self.log(&connection, requested.as_deref(), &outcome, duration);

        connection.params = outcome.params;
        let response = match outcome.result {
            Ok(value) => ActionResponse::success(value),
            Err(error) => ActionResponse::failure(error),
        };
        ActionComplete {
            to_render: outcome.render && !connection.is_destroyed(),
            message_count: connection.message_count(),
            action: outcome.action.map(|a| a.name.clone()),
            response,
            connection,
            duration,
        }
    }

    async fn run(&self, connection: &Connection, mut params: Params) -> Outcome {
        if !self.is_accepting() {
            return Outcome::rejected(
                params,
                ResponseError::coded(ErrorCode::ServerShuttingDown, SHUTTING_DOWN),
            );
        }
        if connection.pending_actions() > self.options.max_pending {
            return Outcome::rejected(
                params,
                ResponseError::coded(ErrorCode::TooManyPendingActions, TOO_MANY_PENDING),
            );
        }

        let action = match self.resolve(connection, &params) {
            Ok(action) => action,
            Err(error) => return Outcome::rejected(params, error),
        };
        let services = self.services.read().clone();
        let ctx = ActionContext::new(Arc::clone(&action), connection.clone(), services);

        let chain = match self.middleware.chain_for(&action) {
            Ok(chain) => chain,
            Err(e) => {
                let error = ResponseError::Thrown(Value::String(e.to_string()));
                return Outcome::failed(action, params, error, &ctx);
            }
        };
        for middleware in &chain {
            if let Err(failure) = middleware.pre_process(&mut params, &ctx).await {
                let error = ResponseError::Thrown(failure.into_value());
                return Outcome::failed(action, params, error, &ctx);
            }
        }

        if self.options.scrub {
            scrub_params(&action.inputs, &mut params);
        }
        if let Err(fields) = prepare_params(&action.inputs, &mut params, self.options.missing) {
            return Outcome::failed(action, params, ResponseError::Fields(fields), &ctx);
        }

        let handler = action.handler();
        let body = tokio::spawn({
            let params = params.clone();
            let ctx = ctx.clone();
            async move { handler.run(params, ctx).await }
        });

        // On timeout the join handle is dropped, which detaches the body.
        let mut value = match tokio::time::timeout(self.options.timeout, body).await {
            Err(_) => {
                let message = format!(
                    "response timeout for action `{}` after {}ms",
                    action.name,
                    self.options.timeout.as_millis()
                );
                let error = ResponseError::coded(ErrorCode::Timeout, message);
                return Outcome::failed(action, params, error, &ctx);
            }
            Ok(Err(join)) => {
                let error = ResponseError::Thrown(Value::String(format!(
                    "action `{}` did not complete: {join}",
                    action.name
                )));
                return Outcome::failed(action, params, error, &ctx);
            }
            Ok(Ok(Err(failure))) => {
                let error = ResponseError::Thrown(failure.into_value());
                return Outcome::failed(action, params, error, &ctx);
            }
            Ok(Ok(Ok(value))) => value,
        };

        for middleware in &chain {
            if let Err(failure) = middleware.post_process(&mut value, &ctx).await {
                let error = ResponseError::Thrown(failure.into_value());
                return Outcome::failed(action, params, error, &ctx);
            }
        }

        Outcome {
            render: ctx.to_render(),
            action: Some(action),
            params,
            result: Ok(value),
        }
    }

    fn resolve(
        &self,
        connection: &Connection,
        params: &Params,
    ) -> Result<Arc<ActionDefinition>, ResponseError> {
        let unknown = || ResponseError::coded(ErrorCode::UnknownAction, UNKNOWN_ACTION);

        let name = action_name(params).ok_or_else(unknown)?;
        let version = api_version(params).map_err(|_| unknown())?;
        let action = self.actions.resolve(name, version).map_err(|e| {
            tracing::debug!(action = name, error = %e, "action resolution failed");
            unknown()
        })?;

        if action.private && !connection.is_internal() {
            tracing::debug!(action = name, kind = connection.kind(), "private action refused");
            return Err(unknown());
        }
        if action.blocks(connection.kind()) {
            tracing::debug!(action = name, kind = connection.kind(), "connection type blocked");
            return Err(unknown());
        }
        Ok(action)
    }

    fn log(
        &self,
        connection: &Connection,
        requested: Option<&str>,
        outcome: &Outcome,
        duration: Duration,
    ) {
        let action = outcome
            .action
            .as_deref()
            .map(|a| a.name.as_str())
            .or(requested)
            .unwrap_or_default();
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);

        match &outcome.result {
            Ok(_) => {
                let level = outcome
                    .action
                    .as_deref()
                    .and_then(|a| a.log_level)
                    .unwrap_or(self.options.success_level);
                orbit_log::event_at!(
                    level,
                    action,
                    connection = %connection.id(),
                    kind = connection.kind(),
                    duration_ms,
                    "action complete"
                );
            }
            Err(error) => {
                let error = serde_json::to_string(error).unwrap_or_default();
                orbit_log::event_at!(
                    self.options.failure_level,
                    action,
                    connection = %connection.id(),
                    kind = connection.kind(),
                    duration_ms,
                    error = %error,
                    "action failed"
                );
            }
        }
    }
}

impl fmt::Debug for ActionProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionProcessor")
            .field("options", &self.options)
            .field("accepting", &self.is_accepting())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn options_follow_general_config() {
        let general = GeneralConfig {
            action_timeout_ms: 100,
            max_pending_actions: 2,
            scrub_params: false,
            missing_param_checks: Vec::new(),
            ..GeneralConfig::default()
        };

        let options = ProcessorOptions::from(&general);

        assert_eq!(options.timeout, Duration::from_millis(100));
        assert_eq!(options.max_pending, 2);
        assert!(!options.scrub);
        assert_eq!(
            options.missing,
            MissingPolicy {
                null: false,
                empty_string: false
            }
        );
    }

    #[test]
    fn gate_toggles() {
        let processor = ActionProcessor::new(
            Arc::new(ActionRegistry::new()),
            Arc::new(MiddlewareRegistry::new()),
            ProcessorOptions::default(),
        );
        assert!(processor.is_accepting());
        processor.set_accepting(false);
        assert!(!processor.is_accepting());
    }
}
