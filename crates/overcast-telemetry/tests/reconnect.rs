//! Telemetry client against a mock source over real sockets.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use overcast_core::LinkStatus;
use overcast_telemetry::{STATUS_CHANNEL, STATUS_EVENT, TelemetryClient, TelemetryConfig};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(250);

type ServerWs = WebSocketStream<TcpStream>;

struct MockSource {
    url: String,
    accepted: mpsc::UnboundedReceiver<ServerWs>,
}

impl MockSource {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, accepted) = mpsc::unbounded_channel();
        let _ = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = accept_async(stream).await {
                    if tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            url: format!("ws://{addr}"),
            accepted,
        }
    }

    fn config(&self) -> TelemetryConfig {
        TelemetryConfig {
            reconnect_delay: Duration::from_millis(50),
            ..TelemetryConfig::new(self.url.clone())
        }
    }

    async fn next_conn(&mut self) -> ServerWs {
        timeout(TIMEOUT, self.accepted.recv())
            .await
            .expect("client never connected")
            .expect("mock source gone")
    }

    async fn assert_no_conn(&mut self) {
        assert!(
            timeout(QUIET, self.accepted.recv()).await.is_err(),
            "unexpected connection"
        );
    }
}

async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("recv timeout")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(t) => return serde_json::from_str(t.as_str()).unwrap(),
            Message::Close(_) => panic!("unexpected close"),
            _ => {}
        }
    }
}

async fn assert_quiet(ws: &mut ServerWs) {
    if let Ok(Some(Ok(Message::Text(t)))) = timeout(QUIET, ws.next()).await {
        panic!("unexpected frame: {}", t.as_str());
    }
}

async fn expect_closed(ws: &mut ServerWs) {
    timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("client did not close the socket");
}

async fn send_event(ws: &mut ServerWs, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    ws.send(Message::Text(frame.into())).await.unwrap();
}

fn registration(pair: &str) -> Value {
    json!({ "event": "wsRelay:register", "data": pair })
}

fn channel_sink(client: &TelemetryClient, channel: &str, event: &str) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.subscribe(channel, event, move |data: &Value| {
        let _ = tx.send(data.clone());
    });
    rx
}

async fn next_value(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(TIMEOUT, rx.recv())
        .await
        .expect("callback not invoked")
        .expect("sink dropped")
}

#[tokio::test]
async fn registers_each_network_pair_once_on_open() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::new();
    client.subscribe("game", "match_ended", |_: &Value| {});
    client.subscribe("game", "match_ended", |_: &Value| {});
    client.subscribe("game", "goal_scored", |_: &Value| {});
    client.subscribe("local", "note", |_: &Value| {});
    client.subscribe(STATUS_CHANNEL, STATUS_EVENT, |_: &Value| {});
    client.start(source.config());

    let mut conn = source.next_conn().await;
    assert_eq!(recv_json(&mut conn).await, registration("game:match_ended"));
    assert_eq!(recv_json(&mut conn).await, registration("game:goal_scored"));
    assert_quiet(&mut conn).await;

    client.subscribe("sos", "version", |_: &Value| {});
    assert_eq!(recv_json(&mut conn).await, registration("sos:version"));
    client.subscribe("game", "goal_scored", |_: &Value| {});
    assert_quiet(&mut conn).await;

    client.close();
}

#[tokio::test]
async fn reconnect_replays_registrations_without_duplicates() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::new();
    client.subscribe("game", ["match_ended", "pre_countdown_begin"], |_: &Value| {});
    client.subscribe("game", "match_ended", |_: &Value| {});
    client.start(source.config());

    let mut first = source.next_conn().await;
    assert_eq!(recv_json(&mut first).await, registration("game:match_ended"));
    assert_eq!(recv_json(&mut first).await, registration("game:pre_countdown_begin"));
    first.close(None).await.unwrap();
    drop(first);

    let mut second = source.next_conn().await;
    assert_eq!(recv_json(&mut second).await, registration("game:match_ended"));
    assert_eq!(recv_json(&mut second).await, registration("game:pre_countdown_begin"));
    assert_quiet(&mut second).await;

    client.close();
}

#[tokio::test]
async fn match_ended_reaches_callbacks_in_subscription_order() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_b = tx.clone();
    client.subscribe("game", "match_ended", move |data: &Value| {
        let _ = tx.send(("A", data.clone()));
    });
    client.subscribe("game", "match_ended", move |data: &Value| {
        let _ = tx_b.send(("B", data.clone()));
    });
    client.start(source.config());

    let mut conn = source.next_conn().await;
    let _ = recv_json(&mut conn).await;
    send_event(&mut conn, "game:match_ended", json!({"winner_team_num": 1})).await;

    let first = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    let second = timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, ("A", json!({"winner_team_num": 1})));
    assert_eq!(second, ("B", json!({"winner_team_num": 1})));
    assert!(timeout(QUIET, rx.recv()).await.is_err());

    client.close();
}

#[tokio::test]
async fn send_writes_envelope_when_open() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::new();
    let mut status = client.watch_status();
    client.start(source.config());
    let mut conn = source.next_conn().await;
    let _ = status.wait_for(|r| r.status == LinkStatus::Up).await.unwrap();

    assert!(client.is_open());
    assert!(client.send("sos", "ping", json!({"a": 1})));
    assert_eq!(recv_json(&mut conn).await, json!({"event": "sos:ping", "data": {"a": 1}}));

    client.close();
    assert!(!client.send("sos", "ping", json!(null)));
}

#[tokio::test]
async fn status_transitions_reach_ws_status_subscribers() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::new();
    let mut statuses = channel_sink(&client, STATUS_CHANNEL, STATUS_EVENT);
    client.start(source.config());

    assert_eq!(next_value(&mut statuses).await, json!({"status": "connecting", "error": null}));
    let conn = source.next_conn().await;
    assert_eq!(next_value(&mut statuses).await, json!({"status": "up", "error": null}));

    drop(conn);
    let lost = next_value(&mut statuses).await;
    assert_eq!(lost["status"], "connecting");
    assert!(lost["error"].is_string());

    let _conn = source.next_conn().await;
    assert_eq!(next_value(&mut statuses).await, json!({"status": "up", "error": null}));

    client.close();
    assert_eq!(next_value(&mut statuses).await, json!({"status": "down", "error": null}));
}

#[tokio::test]
async fn unreachable_source_reports_connecting_with_error() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let client = TelemetryClient::new();
    let mut status = client.watch_status();
    client.start(TelemetryConfig {
        reconnect_delay: Duration::from_millis(50),
        ..TelemetryConfig::new(format!("ws://127.0.0.1:{port}"))
    });

    let report = timeout(TIMEOUT, status.wait_for(|r| r.error.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(report.status, LinkStatus::Connecting);
    client.close();
}

#[tokio::test]
async fn close_stops_reconnecting() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::connect(source.config());
    let mut conn = source.next_conn().await;

    client.close();
    expect_closed(&mut conn).await;
    source.assert_no_conn().await;
    assert_eq!(client.status(), LinkStatus::Down);
}

#[tokio::test]
async fn restart_moves_the_link_to_the_new_source() {
    let mut old = MockSource::start().await;
    let mut new = MockSource::start().await;
    let client = TelemetryClient::new();
    let mut events = channel_sink(&client, "game", "goal_scored");

    client.start(old.config());
    let mut old_conn = old.next_conn().await;
    assert_eq!(recv_json(&mut old_conn).await, registration("game:goal_scored"));

    client.start(new.config());
    let mut new_conn = new.next_conn().await;
    assert_eq!(recv_json(&mut new_conn).await, registration("game:goal_scored"));
    expect_closed(&mut old_conn).await;
    old.assert_no_conn().await;

    send_event(&mut new_conn, "game:goal_scored", json!({"team": 1})).await;
    assert_eq!(next_value(&mut events).await, json!({"team": 1}));

    client.close();
}

#[tokio::test]
async fn dropping_the_client_closes_the_socket() {
    let mut source = MockSource::start().await;
    let client = TelemetryClient::connect(source.config());
    let mut conn = source.next_conn().await;
    drop(client);
    expect_closed(&mut conn).await;
    source.assert_no_conn().await;
}
