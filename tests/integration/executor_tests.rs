//! Step execution against a scripted environment.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use form_pilot::driver::{Environment, EnvironmentProvider, EnvironmentSpec};
use form_pilot::flow::executor::{execute_step, StepContext, StepDisposition};
use form_pilot::models::failure::FailureKind;
use form_pilot::models::identity::{Identity, ViewportProfile};
use form_pilot::models::page_state::PageState;
use form_pilot::models::run::RunConfiguration;
use form_pilot::observer::ObserverHub;
use form_pilot::orchestrator::pause::{PauseCoordinator, SubmitOutcome};

use super::test_helpers::{flow, run_config, wait_for_pending, Script, ScriptedProvider};

fn identity() -> Identity {
    Identity {
        given_name: "Ada".into(),
        family_name: "Brooks".into(),
        username: "pilot05".into(),
        credential: "Pa55word!".into(),
        viewport: ViewportProfile::default(),
    }
}

async fn environment(provider: &ScriptedProvider) -> Arc<dyn Environment> {
    provider
        .acquire(&EnvironmentSpec {
            proxy: None,
            viewport: ViewportProfile::default(),
        })
        .await
        .expect("scripted acquire")
}

fn context<'a>(
    env: &'a dyn Environment,
    identity: &'a Identity,
    config: &'a RunConfiguration,
    pause: &'a PauseCoordinator,
    hub: &'a ObserverHub,
) -> StepContext<'a> {
    StepContext {
        env,
        identity,
        config,
        pause,
        hub,
        step_timeout: Duration::from_millis(500),
        manual_input_timeout: Duration::from_secs(2),
        snapshot_quality: 40,
    }
}

#[tokio::test]
async fn identity_values_are_typed_into_fields() {
    let provider = ScriptedProvider::new(Script::default());
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let config = run_config("");
    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);

    let steps = flow(
        r##"
[[flow.steps]]
name = "username"
action = "fill"
selector = "#user"
value = { from = "identity", field = "username" }

[[flow.steps]]
name = "password"
action = "fill"
selector = "#pass"
value = { from = "identity", field = "credential" }
"##,
    );
    for step in &steps.steps {
        assert_eq!(
            execute_step(step, &ctx).await.expect("step"),
            StepDisposition::Ran
        );
    }

    assert_eq!(
        provider.ledger.actions(),
        vec!["fill:#user=pilot05", "fill:#pass=Pa55word!"]
    );
}

#[tokio::test]
async fn guards_skip_without_touching_the_page() {
    let provider = ScriptedProvider::new(Script {
        page_state: Some(PageState::Ready),
        ..Script::default()
    });
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let mut config = run_config("");
    config.flags = BTreeMap::from([("accept_terms".to_owned(), false)]);
    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);

    let steps = flow(
        r##"
[[flow.steps]]
name = "terms"
action = "click"
selector = "#terms"
when_flag = "accept_terms"

[[flow.steps]]
name = "code"
action = "click"
selector = "#resend"
when_state = "awaiting_input"
"##,
    );
    for step in &steps.steps {
        assert_eq!(
            execute_step(step, &ctx).await.expect("step"),
            StepDisposition::Skipped
        );
    }
    assert!(provider.ledger.actions().is_empty());
}

#[tokio::test]
async fn missing_element_is_input_missing() {
    let provider = ScriptedProvider::new(Script {
        missing: ["#phone".to_owned()].into(),
        ..Script::default()
    });
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let config = run_config("");
    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);

    let steps = flow(
        r##"
[[flow.steps]]
name = "phone field"
action = "wait_for"
selector = "#phone"
timeout_seconds = 1
"##,
    );
    let err = execute_step(&steps.steps[0], &ctx)
        .await
        .expect_err("element never appears");
    assert_eq!(err.kind, FailureKind::InputMissing);
}

#[tokio::test]
async fn rejected_page_is_unexpected_state() {
    let provider = ScriptedProvider::new(Script {
        page_state: Some(PageState::Rejected),
        ..Script::default()
    });
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let config = run_config("");
    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);

    let steps = flow(
        r#"
[[flow.steps]]
name = "landed"
action = "expect_state"
any_of = ["ready", "completed"]
"#,
    );
    let err = execute_step(&steps.steps[0], &ctx)
        .await
        .expect_err("rejection fails the step");
    assert_eq!(err.kind, FailureKind::UnexpectedPageState);
}

#[tokio::test]
async fn driver_errors_are_driver_faults() {
    let provider = ScriptedProvider::new(Script {
        broken: ["#submit".to_owned()].into(),
        ..Script::default()
    });
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let config = run_config("");
    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);

    let steps = flow(
        r##"
[[flow.steps]]
name = "submit"
action = "click"
selector = "#submit"
"##,
    );
    let err = execute_step(&steps.steps[0], &ctx)
        .await
        .expect_err("broken selector");
    assert_eq!(err.kind, FailureKind::DriverFault);
}

#[tokio::test]
async fn hung_driver_call_is_step_timeout() {
    let provider = ScriptedProvider::new(Script {
        hangs: ["#spinner".to_owned()].into(),
        ..Script::default()
    });
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let config = run_config("");
    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);

    let steps = flow(
        r##"
[[flow.steps]]
name = "spinner"
action = "click"
selector = "#spinner"
"##,
    );
    let err = execute_step(&steps.steps[0], &ctx)
        .await
        .expect_err("click never returns");
    assert_eq!(err.kind, FailureKind::StepTimeout);
}

#[tokio::test]
async fn manual_fill_types_the_operator_value() {
    let provider = ScriptedProvider::new(Script::default());
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = Arc::new(PauseCoordinator::new(hub.clone()));
    let identity = identity();
    let config = run_config("");

    let steps = flow(
        r#"
[[flow.steps]]
name = "verification code"
action = "fill"
selector = "input[name=code]"
value = { from = "manual", kind = "otp" }
"#,
    );

    let operator = {
        let pause = Arc::clone(&pause);
        tokio::spawn(async move {
            let request_id = wait_for_pending(&pause).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            pause
                .submit_response("123456".into(), Some(&request_id))
                .await
        })
    };

    let ctx = context(env.as_ref(), &identity, &config, &pause, &hub);
    let disposition = execute_step(&steps.steps[0], &ctx).await.expect("filled");
    assert_eq!(disposition, StepDisposition::Ran);

    let outcome = operator.await.expect("operator task");
    assert!(matches!(outcome, SubmitOutcome::Delivered { ref kind, .. } if kind == "otp"));
    assert_eq!(
        provider.ledger.actions(),
        vec!["fill:input[name=code]=123456"]
    );
}

#[tokio::test]
async fn manual_fill_times_out_as_never_arrived() {
    let provider = ScriptedProvider::new(Script::default());
    let env = environment(&provider).await;
    let hub = ObserverHub::new(64);
    let pause = PauseCoordinator::new(hub.clone());
    let identity = identity();
    let config = run_config("");
    let mut ctx = context(env.as_ref(), &identity, &config, &pause, &hub);
    ctx.manual_input_timeout = Duration::from_millis(100);

    let steps = flow(
        r#"
[[flow.steps]]
name = "phone"
action = "fill"
selector = "input[name=phone]"
value = { from = "manual", kind = "phone" }
"#,
    );
    let err = execute_step(&steps.steps[0], &ctx)
        .await
        .expect_err("nobody answers");
    assert_eq!(err.kind, FailureKind::ManualInputNeverArrived);
    assert!(pause.pending().await.is_none());
    assert!(provider.ledger.actions().is_empty());
}
