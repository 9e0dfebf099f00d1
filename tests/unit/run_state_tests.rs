use std::time::Duration;

use form_pilot::orchestrator::run_state::RunState;

#[test]
fn begins_idle() {
    assert!(!RunState::new().is_running());
}

#[test]
fn try_begin_is_single_flight() {
    let state = RunState::new();
    assert!(state.try_begin());
    assert!(state.is_running());
    assert!(!state.try_begin());
    assert!(state.is_running());
}

#[test]
fn stop_when_idle_is_a_no_op() {
    let state = RunState::new();
    assert!(!state.request_stop());
    assert!(!state.is_running());
}

#[test]
fn stop_clears_an_active_run() {
    let state = RunState::new();
    state.try_begin();
    assert!(state.request_stop());
    assert!(!state.is_running());
    assert!(state.try_begin());
}

#[test]
fn finish_is_idempotent() {
    let state = RunState::new();
    state.try_begin();
    state.finish();
    state.finish();
    assert!(!state.is_running());
}

#[tokio::test]
async fn stopped_resolves_on_stop() {
    let state = std::sync::Arc::new(RunState::new());
    state.try_begin();

    let waiter = std::sync::Arc::clone(&state);
    let handle = tokio::spawn(async move { waiter.stopped().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());

    state.request_stop();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("stopped resolved")
        .expect("join");
}

#[tokio::test]
async fn subscribers_observe_transitions() {
    let state = RunState::new();
    let mut rx = state.subscribe();
    state.try_begin();
    rx.changed().await.expect("changed");
    assert!(*rx.borrow_and_update());
    state.finish();
    rx.changed().await.expect("changed");
    assert!(!*rx.borrow());
}
