//! The module `orbit start` boots.

use std::time::Duration;

use chrono::Utc;
use orbit_action::{ActionDefinition, ActionFailure, InputSpec};
use orbit_engine::{ApiExt, Module};
use orbit_eventbus::{Subscription, listener_fn};
use orbit_task::{TaskDefinition, TaskFailure};
use serde_json::{Value, json};

/// Event fired by the heartbeat task.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

pub fn module() -> anyhow::Result<Module> {
    let status = ActionDefinition::builder("status")
        .description("Engine identity, uptime and registered content")
        .run(|_, ctx| async move {
            let Some(api) = ctx.api() else {
                return Err(ActionFailure::message("engine is gone"));
            };
            let identity = api.identity();
            let uptime_ms = api
                .boot_time()
                .map(|at| (Utc::now() - at).num_milliseconds())
                .unwrap_or_default();
            Ok(json!({
                "id": identity.as_ref().map(|i| i.id.clone()),
                "pid": identity.as_ref().map(|i| i.pid),
                "uptime_ms": uptime_ms,
                "actions": api.actions().names(),
                "tasks": api.tasks().registry().names(),
            }))
        })
        .build()?;

    let echo = ActionDefinition::builder("echo")
        .description("Return the message it was given")
        .input("message", InputSpec::required())
        .run(|params, _| async move {
            Ok(json!({ "message": params.get("message").cloned().unwrap_or(Value::Null) }))
        })
        .build()?;

    let heartbeat = TaskDefinition::builder("heartbeat")
        .description("Fire the heartbeat event once a minute")
        .frequency(Duration::from_secs(60))
        .run(|_, ctx| async move {
            let Some(api) = ctx.api() else {
                return Err(TaskFailure::from("engine is gone"));
            };
            api.fire(HEARTBEAT_EVENT, json!({ "at": Utc::now().to_rfc3339() }))
                .await
                .map_err(|e| TaskFailure(e.to_string()))
        })
        .build()?;

    let log_heartbeat = listener_fn("log-heartbeat", |_, payload: Value| async move {
        tracing::info!(%payload, "heartbeat");
        Ok(payload)
    });

    Ok(Module::new("demo")
        .action(status)
        .action(echo)
        .task(heartbeat)
        .listener(Subscription::new(HEARTBEAT_EVENT, log_heartbeat)))
}
