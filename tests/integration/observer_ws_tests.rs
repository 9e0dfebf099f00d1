//! End-to-end observer channel: a dashboard drives a run over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use form_pilot::models::event::{CancelReason, ObserverEvent, RunStatus};
use form_pilot::observer::ws;
use form_pilot::persistence::attempt_repo::AttemptRepo;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::test_helpers::{app_state, fast_settings, flow, harness, Harness, Script, ScriptedProvider};

type Dashboard = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OTP_FLOW: &str = r#"
[[flow.steps]]
name = "open"
action = "navigate"
url = "https://forms.example.test/"

[[flow.steps]]
name = "code"
action = "fill"
selector = "input[name=code]"
value = { from = "manual", kind = "otp" }
"#;

const START: &str = r#"{"command":"start","config":{"credential":"Pa55word!","mode":"random","proxies":""}}"#;

async fn serve(h: &Harness) -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let ct = CancellationToken::new();
    let state = app_state(h, None);
    let server_ct = ct.clone();
    tokio::spawn(async move {
        ws::serve(listener, state, server_ct).await.expect("serve");
    });
    (addr, ct)
}

async fn connect(addr: SocketAddr) -> Dashboard {
    let (socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("dashboard connects");
    socket
}

async fn next_event(socket: &mut Dashboard) -> ObserverEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str::<ObserverEvent>(text.as_str())
                        .expect("event json");
                }
                Some(Ok(_)) => {}
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("event arrives")
}

async fn wait_for(
    socket: &mut Dashboard,
    mut matches: impl FnMut(&ObserverEvent) -> bool,
) -> ObserverEvent {
    loop {
        let event = next_event(socket).await;
        if matches(&event) {
            return event;
        }
    }
}

async fn send(socket: &mut Dashboard, raw: &str) {
    socket
        .send(Message::Text(raw.to_owned().into()))
        .await
        .expect("send command");
}

#[tokio::test]
async fn dashboard_answers_manual_input_and_run_completes() {
    let provider = ScriptedProvider::new(Script::default());
    let h = harness(provider.clone(), flow(OTP_FLOW), fast_settings(), Duration::ZERO).await;
    let (addr, ct) = serve(&h).await;
    let mut socket = connect(addr).await;

    let first = next_event(&mut socket).await;
    assert_eq!(
        first,
        ObserverEvent::Status {
            state: RunStatus::Idle,
            message: None
        }
    );

    send(&mut socket, START).await;
    let requested = wait_for(&mut socket, |event| {
        matches!(event, ObserverEvent::ManualInputRequested { .. })
    })
    .await;
    let ObserverEvent::ManualInputRequested { request_id, kind } = requested else {
        unreachable!()
    };
    assert_eq!(kind, "otp");

    tokio::time::sleep(Duration::from_millis(200)).await;
    send(
        &mut socket,
        &format!(r#"{{"command":"manual_response","value":"123456","request_id":"{request_id}"}}"#),
    )
    .await;

    let done = wait_for(&mut socket, |event| {
        matches!(event, ObserverEvent::Status { state, .. } if *state != RunStatus::Running)
    })
    .await;
    assert!(matches!(
        done,
        ObserverEvent::Status {
            state: RunStatus::Completed,
            ..
        }
    ));
    assert!(provider
        .ledger
        .actions()
        .contains(&"fill:input[name=code]=123456".to_owned()));

    ct.cancel();
}

#[tokio::test]
async fn late_dashboard_sees_the_pending_request() {
    let provider = ScriptedProvider::new(Script::default());
    let h = harness(provider, flow(OTP_FLOW), fast_settings(), Duration::ZERO).await;
    let (addr, ct) = serve(&h).await;
    let mut first = connect(addr).await;
    next_event(&mut first).await;

    send(&mut first, START).await;
    let request_id = super::test_helpers::wait_for_pending(&h.pause).await;

    let mut second = connect(addr).await;
    let status = next_event(&mut second).await;
    assert!(matches!(
        status,
        ObserverEvent::Status {
            state: RunStatus::Running,
            ..
        }
    ));
    assert_eq!(
        next_event(&mut second).await,
        ObserverEvent::ManualInputRequested {
            request_id,
            kind: "otp".into()
        }
    );

    h.scheduler.stop().await;
    h.scheduler.wait_idle().await;
    ct.cancel();
}

#[tokio::test]
async fn losing_the_last_dashboard_cancels_pending_input() {
    let provider = ScriptedProvider::new(Script::default());
    let mut h = harness(provider.clone(), flow(OTP_FLOW), fast_settings(), Duration::ZERO).await;
    let (addr, ct) = serve(&h).await;
    let mut socket = connect(addr).await;
    next_event(&mut socket).await;

    send(&mut socket, START).await;
    let request_id = super::test_helpers::wait_for_pending(&h.pause).await;
    socket.close(None).await.expect("close");
    drop(socket);

    let events = super::test_helpers::events_until(&mut h.events, Duration::from_secs(5), |event| {
        matches!(event, ObserverEvent::Status { state: RunStatus::Completed, .. })
    })
    .await;
    assert!(events.iter().any(|event| *event
        == ObserverEvent::ManualInputClosed {
            request_id: request_id.clone(),
            kind: "otp".into(),
            reason: CancelReason::ChannelLost,
        }));

    h.scheduler.wait_idle().await;
    assert!(h.pause.pending().await.is_none());
    assert_eq!(provider.ledger.released(), 1);

    assert!(events.iter().any(|event| matches!(
        event,
        ObserverEvent::Log { message, .. } if message.contains("failed [manual_input_never_arrived]")
    )));

    let (completed, failed) = AttemptRepo::new(Arc::clone(&h.db))
        .totals()
        .await
        .expect("totals");
    assert_eq!((completed, failed), (0, 1));

    ct.cancel();
}

#[tokio::test]
async fn malformed_command_is_reported_to_the_sender_only() {
    let provider = ScriptedProvider::new(Script::default());
    let h = harness(provider, flow(OTP_FLOW), fast_settings(), Duration::ZERO).await;
    let (addr, ct) = serve(&h).await;
    let mut socket = connect(addr).await;
    next_event(&mut socket).await;

    send(&mut socket, r#"{"command":"launch_rockets"}"#).await;
    let reply = next_event(&mut socket).await;
    assert!(matches!(
        reply,
        ObserverEvent::Log { ref message, .. } if message.starts_with("invalid command")
    ));
    assert!(!h.scheduler.is_running());

    ct.cancel();
}

#[tokio::test]
async fn health_reports_liveness() {
    let provider = ScriptedProvider::new(Script::default());
    let h = harness(provider, flow(OTP_FLOW), fast_settings(), Duration::ZERO).await;
    let (addr, ct) = serve(&h).await;

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .expect("request");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("response");

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = response.split("\r\n\r\n").nth(1).expect("body");
    let json: serde_json::Value = serde_json::from_str(body.trim()).expect("json body");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["running"], false);

    ct.cancel();
}
