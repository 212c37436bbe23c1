#![allow(clippy::unwrap_used)]
// Integration tests for `EventChannel` against a local WebSocket server.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use scanlink_core::{
    ChannelError, ChannelEvent, ChannelNotice, ClientConfig, Connectivity, ConnectionState,
    Directive, Environment, EventChannel, PageOrigin, ReconnectPolicy, Visibility,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

async fn bind() -> (TcpListener, PageOrigin) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, PageOrigin::new(addr.to_string(), false))
}

/// Accept connections forever. Each ping is answered with a pong followed
/// by one `scan_progress` event; every text frame is forwarded to the test.
fn serve(listener: TcpListener) -> mpsc::UnboundedReceiver<String> {
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    if text.as_str() == r#"{"type":"ping"}"# {
                        let _ = ws.send(Message::text(r#"{"type":"pong"}"#)).await;
                        let _ = ws
                            .send(Message::text(
                                r#"{"type":"scan_progress","scan_id":"s1","progress":10}"#,
                            ))
                            .await;
                    }
                    let _ = seen_tx.send(text.as_str().to_owned());
                }
            });
        }
    });

    seen_rx
}

async fn next_notice(
    rx: &mut broadcast::Receiver<ChannelNotice>,
    mut matches: impl FnMut(&ChannelNotice) -> bool,
) -> ChannelNotice {
    within(async {
        loop {
            let notice = rx.recv().await.unwrap();
            if matches(&notice) {
                return notice;
            }
        }
    })
    .await
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_events_and_subscriptions() {
    let (listener, origin) = bind().await;
    let mut seen = serve(listener);
    let env = Environment::new(origin);

    let channel = EventChannel::spawn(ClientConfig::default(), &env);
    assert_eq!(env.listener_count(), 1);
    assert_eq!(channel.state(), ConnectionState::Idle);

    channel.connect();
    within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();
    assert!(channel.is_connected());

    // The liveness ping is the first frame on the wire.
    assert_eq!(within(seen.recv()).await.unwrap(), r#"{"type":"ping"}"#);

    let mut events = channel.watch_events();
    within(events.wait_for(|e| !e.is_empty())).await.unwrap();
    assert!(channel.events_by_type("pong").is_empty());
    assert_eq!(channel.events().len(), 1);
    assert_eq!(
        channel.latest_by_type("scan_progress").unwrap().get("progress"),
        Some(&10.into())
    );

    channel.subscribe("s1");
    let directive: serde_json::Value =
        serde_json::from_str(&within(seen.recv()).await.unwrap()).unwrap();
    assert_eq!(
        directive,
        serde_json::json!({"type": "subscribe_scan", "scan_id": "s1"})
    );

    channel.send(ChannelEvent::new("request_report").with("scan_id", "s1"));
    assert!(within(seen.recv()).await.unwrap().contains("request_report"));

    channel.clear();
    assert!(channel.events().is_empty());
    assert_eq!(channel.state(), ConnectionState::Open);

    channel.shutdown().await;
    assert_eq!(env.listener_count(), 0, "environment listener leaked");
}

#[tokio::test]
async fn test_reconnects_after_connection_loss() {
    let (listener, origin) = bind().await;

    // First connection is dropped without a closing handshake.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let env = Environment::new(origin);
    let policy = ReconnectPolicy {
        interval: Duration::from_millis(50),
        max_attempts: 3,
        auto_reconnect: true,
    };
    let channel = EventChannel::spawn(ClientConfig::default().with_policy(policy), &env);
    let mut notices = channel.notices();

    channel.connect();
    next_notice(&mut notices, |n| matches!(n, ChannelNotice::Opened { .. })).await;

    let closed = next_notice(&mut notices, |n| matches!(n, ChannelNotice::Closed { .. })).await;
    assert!(matches!(closed, ChannelNotice::Closed { clean: false, .. }));

    let scheduled = next_notice(&mut notices, |n| {
        matches!(n, ChannelNotice::ReconnectScheduled { .. })
    })
    .await;
    assert_eq!(
        scheduled,
        ChannelNotice::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_millis(50)
        }
    );

    next_notice(&mut notices, |n| matches!(n, ChannelNotice::Opened { .. })).await;
    let status = within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();
    assert_eq!(status.attempts, 0);
    assert!(status.last_error.is_none());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_gives_up_when_endpoint_unreachable() {
    // Bind then drop to get a port nobody listens on.
    let (listener, origin) = bind().await;
    drop(listener);

    let env = Environment::new(origin);
    let policy = ReconnectPolicy {
        interval: Duration::from_millis(10),
        max_attempts: 2,
        auto_reconnect: true,
    };
    let channel = EventChannel::spawn(ClientConfig::default().with_policy(policy), &env);

    channel.connect();
    let status = within(channel.wait_for_state(ConnectionState::Failed))
        .await
        .unwrap();
    assert_eq!(
        status.last_error,
        Some(ChannelError::RetriesExhausted { attempts: 2 })
    );
    assert!(!status.connected);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_send_while_disconnected_records_error() {
    let env = Environment::new(PageOrigin::new("127.0.0.1:9", false));
    let channel = EventChannel::spawn(ClientConfig::default(), &env);

    channel.send(Directive::Ping);
    let status = within(channel.wait_for(|s| s.last_error.is_some()))
        .await
        .unwrap();

    assert_eq!(status.last_error, Some(ChannelError::NotConnected));
    assert_eq!(status.state, ConnectionState::Idle);
    assert!(channel.events().is_empty());

    channel.shutdown().await;
}

#[tokio::test]
async fn test_hidden_page_suspends_and_resumes() {
    let (listener, origin) = bind().await;
    let mut seen = serve(listener);
    let env = Environment::new(origin);
    let channel = EventChannel::spawn(ClientConfig::default(), &env);
    let mut notices = channel.notices();

    channel.connect();
    within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();

    env.set_visibility(Visibility::Hidden);
    let closed = next_notice(&mut notices, |n| matches!(n, ChannelNotice::Closed { .. })).await;
    assert!(matches!(
        closed,
        ChannelNotice::Closed {
            suspended: true,
            clean: true,
            code: 1001,
            ..
        }
    ));
    let status = within(channel.wait_for_state(ConnectionState::Closed))
        .await
        .unwrap();
    assert!(status.last_error.is_none());

    env.set_visibility(Visibility::Visible);
    within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();

    // One ping per successful open.
    assert_eq!(within(seen.recv()).await.unwrap(), r#"{"type":"ping"}"#);
    assert_eq!(within(seen.recv()).await.unwrap(), r#"{"type":"ping"}"#);

    channel.shutdown().await;
}

#[tokio::test]
async fn test_dropping_last_handle_releases_environment() {
    let env = Environment::new(PageOrigin::new("127.0.0.1:9", false));
    let channel = EventChannel::spawn(ClientConfig::default(), &env);
    let other = channel.clone();
    assert_eq!(env.listener_count(), 1);

    drop(channel);
    drop(other);

    within(async {
        while env.listener_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn test_send_right_before_shutdown_is_delivered() {
    let (listener, origin) = bind().await;
    let mut seen = serve(listener);
    let env = Environment::new(origin);
    let channel = EventChannel::spawn(ClientConfig::default(), &env);

    channel.connect();
    within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();
    assert_eq!(within(seen.recv()).await.unwrap(), r#"{"type":"ping"}"#);

    // No yield between the two: the driver sees the send only after cancel.
    channel.send(ChannelEvent::new("note").with("text", "bye"));
    channel.shutdown().await;

    let frame: serde_json::Value =
        serde_json::from_str(&within(seen.recv()).await.unwrap()).unwrap();
    assert_eq!(frame, serde_json::json!({"type": "note", "text": "bye"}));
    assert!(channel.last_error().is_none());
}

#[tokio::test]
async fn test_status_stream_follows_connection() {
    let (listener, origin) = bind().await;
    let _seen = serve(listener);
    let env = Environment::new(origin);
    let channel = EventChannel::spawn(ClientConfig::default(), &env);

    let mut stream = channel.status_stream();
    let first = within(stream.next()).await.unwrap();
    assert_eq!(first.state, ConnectionState::Idle);

    channel.connect();
    let mut observed = vec![first.state];
    while observed.last() != Some(&ConnectionState::Open) {
        observed.push(within(stream.next()).await.unwrap().state);
    }

    // Snapshots may coalesce, but never go anywhere else on the way up.
    assert!(observed.iter().all(|s| matches!(
        s,
        ConnectionState::Idle | ConnectionState::Connecting | ConnectionState::Open
    )));

    channel.shutdown().await;
}

#[tokio::test]
async fn test_connectivity_changes_reach_the_client() {
    let (listener, origin) = bind().await;
    let _seen = serve(listener);
    let env = Environment::new(origin);

    // Offline while open: flag drops at once, the transport still owns the state.
    let channel = EventChannel::spawn(ClientConfig::default(), &env);
    channel.connect();
    within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();

    env.set_connectivity(Connectivity::Offline);
    assert_eq!(env.connectivity(), Connectivity::Offline);
    let status = within(channel.wait_for(|s| !s.connected)).await.unwrap();
    assert_eq!(status.state, ConnectionState::Open);
    assert!(!channel.is_connected());
    channel.shutdown().await;

    // Online from idle with automatic recovery: connects by itself.
    let channel = EventChannel::spawn(ClientConfig::default(), &env);
    assert_eq!(channel.state(), ConnectionState::Idle);

    env.set_connectivity(Connectivity::Online);
    let status = within(channel.wait_for_state(ConnectionState::Open))
        .await
        .unwrap();
    assert!(status.connected);

    channel.shutdown().await;
}
