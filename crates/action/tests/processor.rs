use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use orbit_action::{
    ActionContext, ActionDefinition, ActionFailure, ActionGroup, ActionMiddleware,
    ActionProcessor, ActionRegistry, Connection, ConnectionDetails, InputFormat, InputSpec,
    MiddlewareRegistry, NoopTransport, ProcessorOptions, ResponseError,
};
use orbit_core::Params;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};

fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn connection(kind: &str) -> Connection {
    Connection::new(
        ConnectionDetails::new(kind, IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
        Arc::new(NoopTransport),
    )
}

fn processor(actions: ActionRegistry, options: ProcessorOptions) -> ActionProcessor {
    ActionProcessor::new(
        Arc::new(actions),
        Arc::new(MiddlewareRegistry::new()),
        options,
    )
}

fn echo_versions() -> ActionRegistry {
    let actions = ActionRegistry::new();
    for version in [1, 2, 3] {
        actions
            .register(
                ActionDefinition::builder("versioned")
                    .version(version)
                    .run(move |_, _| async move { Ok(json!({ "version": version })) })
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
    actions
}

#[rstest]
#[case(json!({"action": "versioned"}), json!({"version": 3}))]
#[case(json!({"action": "versioned", "apiVersion": 1}), json!({"version": 1}))]
#[case(json!({"action": "versioned", "apiVersion": "2"}), json!({"version": 2}))]
#[tokio::test]
async fn resolves_requested_or_latest_version(#[case] call: Value, #[case] expected: Value) {
    let processor = processor(echo_versions(), ProcessorOptions::default());

    let complete = processor
        .process(connection("web").with_params(params(call)))
        .await;

    assert_eq!(complete.response.value(), Some(&expected));
    assert_eq!(complete.action.as_deref(), Some("versioned"));
}

#[rstest]
#[case(json!({"action": "missing"}))]
#[case(json!({"action": "versioned", "apiVersion": 9}))]
#[case(json!({"action": "versioned", "apiVersion": "two"}))]
#[case(json!({}))]
#[tokio::test]
async fn unresolvable_calls_answer_004(#[case] call: Value) {
    let processor = processor(echo_versions(), ProcessorOptions::default());

    let complete = processor
        .process(connection("web").with_params(params(call)))
        .await;

    assert_eq!(complete.response.code(), Some("004"));
    assert!(complete.action.is_none());
}

#[tokio::test]
async fn validation_reports_every_failing_field() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("cacheTest")
                .input("key", InputSpec::required())
                .input("value", InputSpec::required())
                .input("ttl", InputSpec::optional().with_format(InputFormat::Integer))
                .run(|_, _| async { Err(ActionFailure::message("body must not run")) })
                .build()
                .unwrap(),
        )
        .unwrap();
    let processor = processor(actions, ProcessorOptions::default());

    let complete = processor
        .process(connection("web").with_params(params(json!({
            "action": "cacheTest",
            "value": "",
            "ttl": "soon"
        }))))
        .await;

    let mut expected = orbit_action::FieldErrors::new();
    expected.insert(
        "key".into(),
        "`key` is a required parameter for this action".into(),
    );
    expected.insert(
        "value".into(),
        "`value` is a required parameter for this action".into(),
    );
    expected.insert("ttl".into(), "`ttl` must be an integer".into());
    assert_eq!(
        complete.response.error(),
        Some(&ResponseError::Fields(expected))
    );
}

#[tokio::test]
async fn defaults_and_formats_reach_the_body() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("page")
                .input("page", InputSpec::optional().with_default(1))
                .input("size", InputSpec::required().with_format(InputFormat::Integer))
                .run(|params, _| async move { Ok(Value::Object(params)) })
                .build()
                .unwrap(),
        )
        .unwrap();
    let processor = processor(actions, ProcessorOptions::default());

    let complete = processor
        .process(connection("web").with_params(params(json!({"action": "page", "size": "20"}))))
        .await;

    assert_eq!(
        complete.response.value(),
        Some(&json!({"action": "page", "page": 1, "size": 20}))
    );
    assert_eq!(complete.connection.params["size"], json!(20));
}

#[tokio::test(start_paused = true)]
async fn slow_body_times_out_and_late_result_is_discarded() {
    let finished = Arc::new(AtomicBool::new(false));
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("slow")
                .run({
                    let finished = Arc::clone(&finished);
                    move |_, _| {
                        let finished = Arc::clone(&finished);
                        async move {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                            finished.store(true, Ordering::SeqCst);
                            Ok(json!("late"))
                        }
                    }
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let options = ProcessorOptions {
        timeout: Duration::from_millis(100),
        ..ProcessorOptions::default()
    };
    let processor = processor(actions, options);

    let started = tokio::time::Instant::now();
    let complete = processor
        .process(connection("web").with_params(params(json!({"action": "slow"}))))
        .await;
    let waited = started.elapsed();

    assert_eq!(complete.response.code(), Some("022"));
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(200));
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(complete.connection.pending_actions(), 0);

    // The body was abandoned, not cancelled.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn thrown_payloads_pass_through() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("message")
                .run(|_, _| async { Err(ActionFailure::message("boom")) })
                .build()
                .unwrap(),
        )
        .unwrap();
    actions
        .register(
            ActionDefinition::builder("payload")
                .run(|_, _| async {
                    Err(ActionFailure::payload(json!({"reason": "custom", "retry": false})))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let processor = processor(actions, ProcessorOptions::default());

    let message = processor
        .process(connection("web").with_params(params(json!({"action": "message"}))))
        .await;
    let payload = processor
        .process(connection("web").with_params(params(json!({"action": "payload"}))))
        .await;

    assert_eq!(message.response.to_json(), json!({"error": "boom"}));
    assert_eq!(
        payload.response.to_json(),
        json!({"error": {"reason": "custom", "retry": false}})
    );
}

#[tokio::test]
async fn private_and_blocked_actions_look_unknown() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("secret")
                .private(true)
                .run(|_, _| async { Ok(json!("internal only")) })
                .build()
                .unwrap(),
        )
        .unwrap();
    actions
        .register(
            ActionDefinition::builder("upload")
                .block_connection_type("websocket")
                .run(|_, _| async { Ok(json!("uploaded")) })
                .build()
                .unwrap(),
        )
        .unwrap();
    let processor = processor(actions, ProcessorOptions::default());
    let call = |name: &str| params(json!({ "action": name }));

    let from_web = processor.process(connection("web").with_params(call("secret"))).await;
    let internal = processor
        .process(Connection::internal().with_params(call("secret")))
        .await;
    let from_socket = processor
        .process(connection("websocket").with_params(call("upload")))
        .await;
    let from_web_upload = processor.process(connection("web").with_params(call("upload"))).await;

    assert_eq!(from_web.response.code(), Some("004"));
    assert_eq!(internal.response.value(), Some(&json!("internal only")));
    assert_eq!(from_socket.response.code(), Some("004"));
    assert_eq!(from_web_upload.response.value(), Some(&json!("uploaded")));
}

#[tokio::test]
async fn closed_gate_answers_020() {
    let processor = processor(echo_versions(), ProcessorOptions::default());
    processor.set_accepting(false);

    let complete = processor
        .process(connection("web").with_params(params(json!({"action": "versioned"}))))
        .await;

    assert_eq!(complete.response.code(), Some("020"));
}

#[tokio::test(start_paused = true)]
async fn too_many_pending_answers_021() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("slow")
                .run(|_, _| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(json!("done"))
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let options = ProcessorOptions {
        max_pending: 1,
        ..ProcessorOptions::default()
    };
    let processor = Arc::new(processor(actions, options));
    let session = connection("websocket");

    let first = tokio::spawn({
        let processor = Arc::clone(&processor);
        let call = session.clone().with_params(params(json!({"action": "slow"})));
        async move { processor.process(call).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(session.pending_actions(), 1);

    let second = processor
        .process(session.clone().with_params(params(json!({"action": "slow"}))))
        .await;
    let first = first.await.unwrap();

    assert_eq!(second.response.code(), Some("021"));
    assert_eq!(first.response.value(), Some(&json!("done")));
    assert_eq!(session.pending_actions(), 0);
    assert_eq!(session.total_actions(), 2);
}

struct Stamp;

#[async_trait]
impl ActionMiddleware for Stamp {
    fn name(&self) -> &str {
        "stamp"
    }

    fn global(&self) -> bool {
        true
    }

    async fn pre_process(
        &self,
        params: &mut Params,
        _ctx: &ActionContext,
    ) -> Result<(), ActionFailure> {
        params.insert("stamped".into(), json!(true));
        Ok(())
    }

    async fn post_process(
        &self,
        response: &mut Value,
        ctx: &ActionContext,
    ) -> Result<(), ActionFailure> {
        *response = json!({ "action": ctx.action().name, "data": response.take() });
        Ok(())
    }
}

struct Gatekeeper;

#[async_trait]
impl ActionMiddleware for Gatekeeper {
    fn name(&self) -> &str {
        "gatekeeper"
    }

    async fn pre_process(
        &self,
        params: &mut Params,
        _ctx: &ActionContext,
    ) -> Result<(), ActionFailure> {
        match params.get("token") {
            Some(Value::String(token)) if token == "letmein" => Ok(()),
            _ => Err(ActionFailure::message("not authorized")),
        }
    }
}

#[tokio::test]
async fn middleware_wraps_and_guards() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("guarded")
                .input("stamped", InputSpec::required())
                .input("token", InputSpec::optional())
                .middleware("gatekeeper")
                .run(|params, _| async move { Ok(params["stamped"].clone()) })
                .build()
                .unwrap(),
        )
        .unwrap();
    let middleware = MiddlewareRegistry::new();
    middleware.register(Arc::new(Stamp)).unwrap();
    middleware.register(Arc::new(Gatekeeper)).unwrap();
    let processor = ActionProcessor::new(
        Arc::new(actions),
        Arc::new(middleware),
        ProcessorOptions::default(),
    );

    let allowed = processor
        .process(connection("web").with_params(params(
            json!({"action": "guarded", "token": "letmein"}),
        )))
        .await;
    let refused = processor
        .process(connection("web").with_params(params(json!({"action": "guarded"}))))
        .await;

    assert_eq!(
        allowed.response.value(),
        Some(&json!({"action": "guarded", "data": true}))
    );
    assert_eq!(refused.response.to_json(), json!({"error": "not authorized"}));
}

#[tokio::test]
async fn group_mods_reach_the_processor() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("admin")
                .group("restricted")
                .run(|_, _| async { Ok(json!("ok")) })
                .build()
                .unwrap(),
        )
        .unwrap();
    actions
        .register_group(ActionGroup::new("restricted").set("+blocked_connection_types", "web"))
        .unwrap();
    let processor = processor(actions, ProcessorOptions::default());

    let complete = processor
        .process(connection("web").with_params(params(json!({"action": "admin"}))))
        .await;

    assert_eq!(complete.response.code(), Some("004"));
}

#[rstest]
#[case(true, json!({"action": "keys", "known": 1}))]
#[case(false, json!({"action": "keys", "known": 1, "extra": 2}))]
#[tokio::test]
async fn scrubbing_drops_undeclared_params(#[case] scrub: bool, #[case] expected: Value) {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("keys")
                .input("known", InputSpec::optional())
                .run(|params, _| async move { Ok(Value::Object(params)) })
                .build()
                .unwrap(),
        )
        .unwrap();
    let options = ProcessorOptions {
        scrub,
        ..ProcessorOptions::default()
    };
    let processor = processor(actions, options);

    let complete = processor
        .process(connection("web").with_params(params(
            json!({"action": "keys", "known": 1, "extra": 2}),
        )))
        .await;

    assert_eq!(complete.response.value(), Some(&expected));
}

#[tokio::test]
async fn render_flag_and_counters() {
    let actions = ActionRegistry::new();
    actions
        .register(
            ActionDefinition::builder("file")
                .run(|_, ctx| async move {
                    ctx.skip_render();
                    Ok(Value::Null)
                })
                .build()
                .unwrap(),
        )
        .unwrap();
    let processor = processor(actions, ProcessorOptions::default());
    let session = connection("websocket");

    let skipped = processor
        .process(session.clone().with_params(params(json!({"action": "file"}))))
        .await;
    session.destroy();
    let destroyed = processor
        .process(session.clone().with_params(params(json!({"action": "missing"}))))
        .await;

    assert!(!skipped.to_render);
    assert_eq!(skipped.message_count, 1);
    assert!(!destroyed.to_render);
    assert_eq!(destroyed.message_count, 2);
}
