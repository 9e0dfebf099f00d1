//! IPC request handling for `form-pilot-ctl`.

use std::time::Duration;

use form_pilot::ipc::server::dispatch_line;
use serde_json::Value;

use super::test_helpers::{
    app_state, fast_settings, flow, harness, simple_flow, wait_for_pending, Script,
    ScriptedProvider,
};

async fn call(state: &form_pilot::state::AppState, line: &str) -> Value {
    serde_json::from_str(&dispatch_line(state, line).await).expect("response json")
}

#[tokio::test]
async fn requests_without_the_token_are_unauthorized() {
    let h = harness(
        ScriptedProvider::new(Script::default()),
        simple_flow(),
        fast_settings(),
        Duration::ZERO,
    )
    .await;
    let state = app_state(&h, Some("s3cret"));

    let denied = call(&state, r#"{"command":"status"}"#).await;
    assert_eq!(denied["ok"], false);
    assert_eq!(denied["error"], "unauthorized");

    let wrong = call(&state, r#"{"command":"status","auth_token":"guess"}"#).await;
    assert_eq!(wrong["error"], "unauthorized");

    let allowed = call(&state, r#"{"command":"status","auth_token":"s3cret"}"#).await;
    assert_eq!(allowed["ok"], true);
    assert_eq!(allowed["data"]["status"], "idle");
    assert_eq!(allowed["data"]["running"], false);
    assert!(allowed["data"]["pending"].is_null());
}

#[tokio::test]
async fn malformed_and_unknown_requests_are_errors() {
    let h = harness(
        ScriptedProvider::new(Script::default()),
        simple_flow(),
        fast_settings(),
        Duration::ZERO,
    )
    .await;
    let state = app_state(&h, None);

    let garbage = call(&state, "not json").await;
    assert_eq!(garbage["ok"], false);
    assert!(garbage["error"]
        .as_str()
        .is_some_and(|error| error.starts_with("invalid json")));

    let unknown = call(&state, r#"{"command":"reboot"}"#).await;
    assert_eq!(unknown["error"], "unknown command: reboot");

    let no_config = call(&state, r#"{"command":"start"}"#).await;
    assert_eq!(no_config["error"], "missing required 'config' field");

    let no_value = call(&state, r#"{"command":"respond"}"#).await;
    assert_eq!(no_value["error"], "missing required 'value' field");
}

#[tokio::test]
async fn start_status_respond_and_stop_round_trip() {
    let steps = flow(
        r#"
[[flow.steps]]
name = "code"
action = "fill"
selector = "input[name=code]"
value = { from = "manual", kind = "otp" }
"#,
    );
    let provider = ScriptedProvider::new(Script::default());
    let h = harness(provider.clone(), steps, fast_settings(), Duration::ZERO).await;
    let state = app_state(&h, None);

    let respond_early = call(&state, r#"{"command":"respond","value":"000000"}"#).await;
    assert_eq!(respond_early["data"]["delivered"], false);
    assert_eq!(respond_early["data"]["reason"], "no pending request");

    let started = call(
        &state,
        r#"{"command":"start","config":{"credential":"Pa55word!","proxies":""}}"#,
    )
    .await;
    assert_eq!(started["ok"], true);
    assert_eq!(started["data"]["started"], true);

    let again = call(
        &state,
        r#"{"command":"start","config":{"credential":"Pa55word!"}}"#,
    )
    .await;
    assert_eq!(again["data"]["started"], false);

    let request_id = wait_for_pending(&h.pause).await;
    let status = call(&state, r#"{"command":"status"}"#).await;
    assert_eq!(status["data"]["running"], true);
    assert_eq!(status["data"]["pending"]["kind"], "otp");
    assert_eq!(status["data"]["pending"]["request_id"], request_id.as_str());

    let stale = call(&state, r#"{"command":"respond","value":"1","id":"not-the-one"}"#).await;
    assert_eq!(stale["data"]["delivered"], false);
    assert_eq!(stale["data"]["reason"], "stale request");

    let delivered = call(
        &state,
        &format!(r#"{{"command":"respond","value":"123456","id":"{request_id}"}}"#),
    )
    .await;
    assert_eq!(delivered["data"]["delivered"], true);
    assert_eq!(delivered["data"]["kind"], "otp");

    h.scheduler.wait_idle().await;
    let stopped = call(&state, r#"{"command":"stop"}"#).await;
    assert_eq!(stopped["data"]["stopped"], false);

    let totals = call(&state, r#"{"command":"status"}"#).await;
    assert_eq!(totals["data"]["attempts"]["completed"], 1);
    assert_eq!(
        provider.ledger.actions(),
        vec!["fill:input[name=code]=123456"]
    );
}

#[tokio::test]
async fn invalid_run_configuration_is_reported() {
    let h = harness(
        ScriptedProvider::new(Script::default()),
        simple_flow(),
        fast_settings(),
        Duration::ZERO,
    )
    .await;
    let state = app_state(&h, None);

    let response = call(
        &state,
        r#"{"command":"start","config":{"credential":"x","mode":"custom-sequential"}}"#,
    )
    .await;
    assert_eq!(response["ok"], false);
    assert!(response["error"]
        .as_str()
        .is_some_and(|error| error.contains("custom_base")));
    assert!(!h.scheduler.is_running());
}
