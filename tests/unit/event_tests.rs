use form_pilot::models::event::{CancelReason, LogLevel, ObserverEvent, OperatorCommand, RunStatus};
use form_pilot::models::run::{IdentityMode, RunConfiguration};
use form_pilot::AppError;
use serde_json::json;

#[test]
fn events_are_tagged_by_event() {
    let log = serde_json::to_value(ObserverEvent::Log {
        level: LogLevel::Success,
        message: "cycle 1: flow completed".into(),
    })
    .expect("serialize");
    assert_eq!(
        log,
        json!({"event": "log", "level": "success", "message": "cycle 1: flow completed"})
    );

    let status = serde_json::to_value(ObserverEvent::Status {
        state: RunStatus::Running,
        message: None,
    })
    .expect("serialize");
    assert_eq!(status, json!({"event": "status", "state": "running"}));

    let closed = serde_json::to_value(ObserverEvent::ManualInputClosed {
        request_id: "r-1".into(),
        kind: "otp".into(),
        reason: CancelReason::ChannelLost,
    })
    .expect("serialize");
    assert_eq!(closed["event"], "manual_input_closed");
    assert_eq!(closed["reason"], "channel_lost");
}

#[test]
fn manual_response_without_request_id_parses() {
    let command: OperatorCommand =
        serde_json::from_str(r#"{"command":"manual_response","value":"123456"}"#)
            .expect("parse");
    assert_eq!(
        command,
        OperatorCommand::ManualResponse {
            value: "123456".into(),
            request_id: None,
        }
    );
}

#[test]
fn start_command_carries_run_configuration() {
    let command: OperatorCommand = serde_json::from_value(json!({
        "command": "start",
        "config": {
            "credential": "Pa55word!",
            "mode": "custom-sequential",
            "custom_base": "pilot",
            "proxies": "10.0.0.1:8080\n10.0.0.2:8080",
            "flags": {"skip_optional": true}
        }
    }))
    .expect("parse");

    let OperatorCommand::Start { config } = command else {
        panic!("expected start");
    };
    assert_eq!(config.mode, IdentityMode::CustomSequential);
    assert_eq!(config.custom_base.as_deref(), Some("pilot"));
    assert!(config.flag("skip_optional"));
    assert!(!config.flag("missing"));
    config.validate().expect("valid");
}

#[test]
fn stop_command_has_no_payload() {
    let command: OperatorCommand = serde_json::from_str(r#"{"command":"stop"}"#).expect("parse");
    assert_eq!(command, OperatorCommand::Stop);
}

#[test]
fn custom_alias_selects_sequential_mode() {
    let config: RunConfiguration =
        serde_json::from_value(json!({"credential": "x", "mode": "custom", "custom_base": "b"}))
            .expect("parse");
    assert_eq!(config.mode, IdentityMode::CustomSequential);
}

#[test]
fn run_configuration_defaults_to_random_direct() {
    let config: RunConfiguration =
        serde_json::from_value(json!({"credential": "x"})).expect("parse");
    assert_eq!(config.mode, IdentityMode::Random);
    assert!(config.proxies.is_empty());
    assert!(config.flags.is_empty());
}

#[test]
fn run_configuration_validation() {
    let blank: RunConfiguration =
        serde_json::from_value(json!({"credential": "   "})).expect("parse");
    assert!(matches!(blank.validate(), Err(AppError::Config(_))));

    let no_base: RunConfiguration =
        serde_json::from_value(json!({"credential": "x", "mode": "custom-sequential"}))
            .expect("parse");
    assert!(matches!(no_base.validate(), Err(AppError::Config(_))));
}
