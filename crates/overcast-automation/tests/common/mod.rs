//! Mock obs-websocket server and telemetry source shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use overcast_automation::obs::protocol::auth_string;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;

pub const TIMEOUT: Duration = Duration::from_secs(5);

const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";
const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";

pub type ServerWs = WebSocketStream<TcpStream>;

// ─────────────────────────────────────────────────────────────────────────────
// obs-websocket
// ─────────────────────────────────────────────────────────────────────────────

/// How the mock obs server behaves.
#[derive(Clone, Default)]
pub struct ObsBehavior {
    /// Require this password.
    pub password: Option<String>,
    /// `SetCurrentProgramScene` fails for these scene names.
    pub missing_scenes: Vec<String>,
    /// Requests of these types are never answered.
    pub stalled_requests: Vec<String>,
}

pub struct MockObs {
    pub url: String,
    connections: Arc<AtomicUsize>,
    requests: mpsc::UnboundedReceiver<(String, Value)>,
    kill: Arc<Mutex<CancellationToken>>,
}

impl MockObs {
    pub async fn start(behavior: ObsBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let kill = Arc::new(Mutex::new(CancellationToken::new()));
        let (tx, requests) = mpsc::unbounded_channel();

        let accepted = connections.clone();
        let kill_slot = kill.clone();
        let _ = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let _ = accepted.fetch_add(1, Ordering::SeqCst);
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                let kill = kill_slot.lock().clone();
                let _ = tokio::spawn(serve_obs(ws, behavior.clone(), tx.clone(), kill));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            connections,
            requests,
            kill,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Drop every live socket without a close handshake.
    pub fn drop_connections(&self) {
        let mut kill = self.kill.lock();
        kill.cancel();
        *kill = CancellationToken::new();
    }

    /// Next `(requestType, requestData)` received.
    pub async fn next_request(&mut self) -> (String, Value) {
        timeout(TIMEOUT, self.requests.recv())
            .await
            .expect("no obs request")
            .expect("mock obs gone")
    }

    /// Assert nothing else arrives for a short while.
    pub async fn assert_no_request(&mut self) {
        if let Ok(Some(req)) = timeout(Duration::from_millis(250), self.requests.recv()).await {
            panic!("unexpected obs request: {req:?}");
        }
    }
}

async fn serve_obs(
    mut ws: ServerWs,
    behavior: ObsBehavior,
    requests: mpsc::UnboundedSender<(String, Value)>,
    kill: CancellationToken,
) {
    let mut hello = json!({"obsWebSocketVersion": "5.5.0", "rpcVersion": 1});
    if behavior.password.is_some() {
        hello["authentication"] = json!({"challenge": CHALLENGE, "salt": SALT});
    }
    let _ = ws.send(text(json!({"op": 0, "d": hello}))).await;

    let Some(identify) = next_json(&mut ws).await else {
        return;
    };
    assert_eq!(identify["op"], 1);
    if let Some(password) = &behavior.password {
        let expected = auth_string(password, SALT, CHALLENGE);
        if identify["d"]["authentication"].as_str() != Some(expected.as_str()) {
            let _ = ws
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::from(4009),
                    reason: "Authentication failed.".into(),
                })))
                .await;
            return;
        }
    }
    let _ = ws
        .send(text(json!({"op": 2, "d": {"negotiatedRpcVersion": 1}})))
        .await;

    loop {
        let request = tokio::select! {
            () = kill.cancelled() => return,
            request = next_json(&mut ws) => match request {
                Some(request) => request,
                None => return,
            },
        };
        let d = &request["d"];
        let request_type = d["requestType"].as_str().unwrap_or_default().to_owned();
        let request_id = d["requestId"].clone();
        let data = d.get("requestData").cloned().unwrap_or(Value::Null);
        let _ = requests.send((request_type.clone(), data.clone()));

        if behavior.stalled_requests.contains(&request_type) {
            continue;
        }
        let (ok, code, comment, response) = match request_type.as_str() {
            "GetSceneList" => (
                true,
                100,
                None,
                json!({"scenes": [
                    {"sceneName": "Endgame", "sceneIndex": 0},
                    {"sceneName": "Live", "sceneIndex": 1}
                ]}),
            ),
            "GetSceneTransitionList" => (
                true,
                100,
                None,
                json!({"transitions": [{"transitionName": "Cut"}, {"transitionName": "Fade"}]}),
            ),
            "SetCurrentProgramScene"
                if data["sceneName"]
                    .as_str()
                    .is_some_and(|s| behavior.missing_scenes.iter().any(|m| m == s)) =>
            {
                (false, 600, Some("No source was found."), Value::Null)
            }
            _ => (true, 100, None, Value::Null),
        };
        let mut reply = json!({
            "requestType": request_type,
            "requestId": request_id,
            "requestStatus": {"result": ok, "code": code, "comment": comment},
        });
        if !response.is_null() {
            reply["responseData"] = response;
        }
        if ws.send(text(json!({"op": 7, "d": reply}))).await.is_err() {
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry source
// ─────────────────────────────────────────────────────────────────────────────

pub struct MockSource {
    pub url: String,
    accepted: mpsc::UnboundedReceiver<ServerWs>,
}

impl MockSource {
    pub async fn start() -> Self {
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

    pub async fn next_conn(&mut self) -> ServerWs {
        timeout(TIMEOUT, self.accepted.recv())
            .await
            .expect("telemetry client never connected")
            .expect("mock source gone")
    }
}

pub async fn send_event(ws: &mut ServerWs, event: &str, data: Value) {
    ws.send(text(json!({"event": event, "data": data})))
        .await
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

pub fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

/// Next text frame as JSON; `None` when the socket ends.
pub async fn next_json<S>(ws: &mut WebSocketStream<S>) -> Option<Value>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match ws.next().await? {
            Ok(Message::Text(t)) => return serde_json::from_str(t.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Read until a frame satisfies `pred`.
pub async fn wait_for_json<S>(ws: &mut WebSocketStream<S>, pred: impl Fn(&Value) -> bool) -> Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    timeout(TIMEOUT, async {
        loop {
            let value = next_json(ws).await.expect("socket ended");
            if pred(&value) {
                return value;
            }
        }
    })
    .await
    .expect("expected frame never arrived")
}
