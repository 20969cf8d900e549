//! `ObsClient`: connection state machine and request/response plumbing.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Connected
//!      ▲                        │    ▲                         │
//!      │   intent cleared       │    └── backoff (intent set) ─┤ socket lost
//!      └────────────────────────┴──────────── disconnect() ────┘
//! ```
//!
//! Concurrent `connect()` calls share one in-flight attempt. The attempt runs
//! on its own task so a caller dropping its future never strands the state
//! machine in `Connecting`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::{FutureExt, SinkExt, StreamExt};
use metrics::counter;
use overcast_core::LinkStatus;
use overcast_core::retry::BackoffConfig;
use overcast_settings::ObsSettings;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ObsError;
use super::protocol::{self, CLOSE_AUTHENTICATION_FAILED, ServerFrame};
use crate::metrics::OBS_CONNECT_ATTEMPTS_TOTAL;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type PendingTx = oneshot::Sender<Result<Value, ObsError>>;
type ConnectFuture = Shared<BoxFuture<'static, Result<(), ObsError>>>;

/// Buffered transitions per [`ObsClient::subscribe_transitions`] receiver.
const TRANSITION_BUFFER: usize = 64;

/// Connection state of an [`ObsClient`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObsState {
    /// No session and no attempt in progress.
    #[default]
    Disconnected,
    /// Handshaking or waiting out a backoff delay.
    Connecting,
    /// Identified; requests can be issued.
    Connected,
}

impl ObsState {
    /// Tri-state shown to UIs.
    pub fn link_status(self) -> LinkStatus {
        match self {
            Self::Disconnected => LinkStatus::Down,
            Self::Connecting => LinkStatus::Connecting,
            Self::Connected => LinkStatus::Up,
        }
    }
}

/// Endpoint and timing for an [`ObsClient`].
#[derive(Clone, Debug, PartialEq)]
pub struct ObsConfig {
    /// obs-websocket URL.
    pub url: String,
    /// Server password, if authentication is enabled.
    pub password: Option<String>,
    /// Delay schedule between failed handshakes.
    pub backoff: BackoffConfig,
    /// How long a request (and the handshake) may take.
    pub request_timeout: Duration,
}

impl From<&ObsSettings> for ObsConfig {
    fn from(s: &ObsSettings) -> Self {
        Self {
            url: s.url.clone(),
            password: s.password.clone().filter(|p| !p.is_empty()),
            backoff: s.backoff.clone(),
            request_timeout: Duration::from_millis(s.request_timeout_ms),
        }
    }
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self::from(&ObsSettings::default())
    }
}

struct ObsCommand {
    request_type: String,
    data: Option<Value>,
    response_tx: PendingTx,
}

struct Session {
    id: u64,
    cmd_tx: mpsc::Sender<ObsCommand>,
    cancel: CancellationToken,
}

struct Control {
    /// Shared outcome of the running connect loop, tagged with its id.
    in_flight: Option<(u64, ConnectFuture)>,
    /// Cancels backoff delays and handshakes. Replaced on every `disconnect`.
    retry_cancel: CancellationToken,
    session: Option<Session>,
    next_id: u64,
}

struct Inner {
    config: ObsConfig,
    want_connection: AtomicBool,
    state: watch::Sender<ObsState>,
    /// Every state change, in order; `state` only keeps the latest.
    transitions: broadcast::Sender<ObsState>,
    control: Mutex<Control>,
    next_request_id: AtomicU64,
}

impl Inner {
    fn wants_connection(&self) -> bool {
        self.want_connection.load(Ordering::SeqCst)
    }

    fn publish(&self, state: ObsState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            // sent under the watch lock so receivers see publish order
            let _ = self.transitions.send(state);
            true
        });
        if changed {
            debug!(?state, "obs state");
        }
    }

    /// Publish `state` only while attempt `attempt_id` is still the live one.
    fn publish_for_attempt(&self, attempt_id: u64, state: ObsState) {
        let control = self.control.lock();
        if control.in_flight.as_ref().is_some_and(|(id, _)| *id == attempt_id) {
            self.publish(state);
        }
    }
}

/// Client for one obs-websocket endpoint.
pub struct ObsClient {
    inner: Arc<Inner>,
}

impl ObsClient {
    /// A disconnected client. Nothing happens until [`connect`](Self::connect).
    pub fn new(config: ObsConfig) -> Self {
        let (state, _) = watch::channel(ObsState::Disconnected);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            inner: Arc::new(Inner {
                config,
                want_connection: AtomicBool::new(false),
                state,
                transitions,
                control: Mutex::new(Control {
                    in_flight: None,
                    retry_cancel: CancellationToken::new(),
                    session: None,
                    next_id: 1,
                }),
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> ObsState {
        *self.inner.state.borrow()
    }

    /// Receiver for the latest state. Changes in quick succession coalesce.
    pub fn subscribe_state(&self) -> watch::Receiver<ObsState> {
        self.inner.state.subscribe()
    }

    /// Receiver for every state change from now on, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ObsState> {
        self.inner.transitions.subscribe()
    }

    /// Client configuration.
    pub fn config(&self) -> &ObsConfig {
        &self.inner.config
    }

    /// Set connection intent and wait until identified.
    ///
    /// Failed handshakes are retried with backoff for as long as intent is
    /// set; the future resolves with [`ObsError::Cancelled`] if
    /// [`disconnect`](Self::disconnect) is called first.
    pub async fn connect(&self) -> Result<(), ObsError> {
        self.inner.want_connection.store(true, Ordering::SeqCst);
        match start_attempt(&self.inner, true) {
            Some(attempt) => attempt.await,
            None => Ok(()),
        }
    }

    /// A single handshake without retry. Intent is cleared again on failure.
    pub async fn connect_once(&self) -> Result<(), ObsError> {
        self.inner.want_connection.store(true, Ordering::SeqCst);
        let result = match start_attempt(&self.inner, false) {
            Some(attempt) => attempt.await,
            None => Ok(()),
        };
        if result.is_err() {
            self.inner.want_connection.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Clear intent, cancel any pending retry and close the session.
    pub fn disconnect(&self) {
        self.inner.want_connection.store(false, Ordering::SeqCst);
        let session = {
            let mut control = self.inner.control.lock();
            control.retry_cancel.cancel();
            control.retry_cancel = CancellationToken::new();
            control.in_flight = None;
            control.session.take()
        };
        if let Some(session) = session {
            session.cancel.cancel();
            info!(url = %self.inner.config.url, "obs disconnected");
        }
        self.inner.publish(ObsState::Disconnected);
    }

    /// Issue `request_type` with optional `requestData` and wait for the response.
    pub async fn call(&self, request_type: &str, data: Option<Value>) -> Result<Value, ObsError> {
        let cmd_tx = self
            .inner
            .control
            .lock()
            .session
            .as_ref()
            .map(|s| s.cmd_tx.clone())
            .ok_or(ObsError::NotConnected)?;

        let (response_tx, rx) = oneshot::channel();
        cmd_tx
            .send(ObsCommand {
                request_type: request_type.to_owned(),
                data,
                response_tx,
            })
            .await
            .map_err(|_| ObsError::NotConnected)?;

        let timeout = self.inner.config.request_timeout;
        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| ObsError::Timeout {
                request_type: request_type.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|_| ObsError::Closed)?
    }

    /// `SetCurrentSceneTransition`
    pub async fn set_current_scene_transition(&self, name: &str) -> Result<(), ObsError> {
        let _ = self
            .call("SetCurrentSceneTransition", Some(json!({ "transitionName": name })))
            .await?;
        Ok(())
    }

    /// `SetCurrentProgramScene`
    pub async fn set_current_program_scene(&self, name: &str) -> Result<(), ObsError> {
        let _ = self
            .call("SetCurrentProgramScene", Some(json!({ "sceneName": name })))
            .await?;
        Ok(())
    }

    /// Scene names from `GetSceneList`, in the server's order.
    pub async fn get_scene_list(&self) -> Result<Vec<String>, ObsError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Scene {
            scene_name: String,
        }
        #[derive(Deserialize)]
        struct SceneList {
            scenes: Vec<Scene>,
        }

        let data = self.call("GetSceneList", None).await?;
        let list: SceneList =
            serde_json::from_value(data).map_err(|e| ObsError::Protocol(e.to_string()))?;
        Ok(list.scenes.into_iter().map(|s| s.scene_name).collect())
    }

    /// Transition names from `GetSceneTransitionList`.
    pub async fn get_scene_transition_list(&self) -> Result<Vec<String>, ObsError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Transition {
            transition_name: String,
        }
        #[derive(Deserialize)]
        struct TransitionList {
            transitions: Vec<Transition>,
        }

        let data = self.call("GetSceneTransitionList", None).await?;
        let list: TransitionList =
            serde_json::from_value(data).map_err(|e| ObsError::Protocol(e.to_string()))?;
        Ok(list
            .transitions
            .into_iter()
            .map(|t| t.transition_name)
            .collect())
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Join the in-flight attempt or spawn a new one. `None` when already connected.
fn start_attempt(inner: &Arc<Inner>, retry: bool) -> Option<ConnectFuture> {
    let mut control = inner.control.lock();
    if control.session.is_some() {
        return None;
    }
    if let Some((_, attempt)) = &control.in_flight {
        return Some(attempt.clone());
    }

    let attempt_id = control.next_id;
    control.next_id += 1;
    let cancel = control.retry_cancel.clone();
    let task = tokio::spawn(connect_loop(inner.clone(), attempt_id, cancel, retry));
    let attempt = async move { task.await.unwrap_or(Err(ObsError::Cancelled)) }
        .boxed()
        .shared();
    control.in_flight = Some((attempt_id, attempt.clone()));
    Some(attempt)
}

async fn connect_loop(
    inner: Arc<Inner>,
    attempt_id: u64,
    cancel: CancellationToken,
    retry: bool,
) -> Result<(), ObsError> {
    let config = &inner.config;
    let mut failures = 0u32;

    let result = loop {
        if !inner.wants_connection() || cancel.is_cancelled() {
            break Err(ObsError::Cancelled);
        }
        inner.publish_for_attempt(attempt_id, ObsState::Connecting);
        counter!(OBS_CONNECT_ATTEMPTS_TOTAL).increment(1);

        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(ObsError::Cancelled),
            outcome = tokio::time::timeout(config.request_timeout, handshake(config)) => {
                outcome.unwrap_or_else(|_| Err(ObsError::Connect("handshake timed out".into())))
            }
        };

        let error = match outcome {
            Ok(ws) => match install_session(&inner, attempt_id, &cancel, ws) {
                Ok(()) => break Ok(()),
                Err(e) => e,
            },
            Err(e) => e,
        };
        if error == ObsError::Cancelled || !retry || !inner.wants_connection() {
            break Err(error);
        }

        let delay = config.backoff.delay(failures);
        failures = failures.saturating_add(1);
        warn!(
            url = %config.url,
            error = %error,
            attempt = failures,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "obs connect failed, retrying"
        );
        tokio::select! {
            () = cancel.cancelled() => break Err(ObsError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    };

    let mut control = inner.control.lock();
    if control.in_flight.as_ref().is_some_and(|(id, _)| *id == attempt_id) {
        control.in_flight = None;
        if result.is_err() {
            inner.publish(ObsState::Disconnected);
        }
    }
    result
}

/// Adopt a handshaken socket as the current session, unless intent was
/// withdrawn meanwhile.
fn install_session(
    inner: &Arc<Inner>,
    attempt_id: u64,
    cancel: &CancellationToken,
    ws: WsStream,
) -> Result<(), ObsError> {
    let mut control = inner.control.lock();
    let current = control.in_flight.as_ref().is_some_and(|(id, _)| *id == attempt_id);
    if !current || cancel.is_cancelled() || !inner.wants_connection() {
        return Err(ObsError::Cancelled);
    }

    let session_id = control.next_id;
    control.next_id += 1;
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let session_cancel = CancellationToken::new();
    control.session = Some(Session {
        id: session_id,
        cmd_tx,
        cancel: session_cancel.clone(),
    });
    // the attempt is done; a session that dies right away must start a new one
    control.in_flight = None;
    inner.publish(ObsState::Connected);
    info!(url = %inner.config.url, "obs connected");

    let _ = tokio::spawn(run_session(inner.clone(), session_id, ws, cmd_rx, session_cancel));
    Ok(())
}

async fn handshake(config: &ObsConfig) -> Result<WsStream, ObsError> {
    let (mut ws, _) = connect_async(config.url.as_str())
        .await
        .map_err(|e| ObsError::Connect(e.to_string()))?;

    let ServerFrame::Hello(hello) = next_frame(&mut ws).await? else {
        return Err(ObsError::Protocol("expected Hello".into()));
    };
    debug!(
        version = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
        rpc_version = hello.rpc_version,
        auth = hello.authentication.is_some(),
        "obs hello"
    );

    let authentication = match (&hello.authentication, &config.password) {
        (Some(challenge), Some(password)) => Some(protocol::auth_string(
            password,
            &challenge.salt,
            &challenge.challenge,
        )),
        (Some(_), None) => {
            warn!("obs requires a password but none is configured");
            None
        }
        (None, _) => None,
    };
    ws.send(Message::Text(
        protocol::identify_message(authentication.as_deref()).into(),
    ))
    .await
    .map_err(|e| ObsError::Connect(e.to_string()))?;

    match next_frame(&mut ws).await? {
        ServerFrame::Identified => Ok(ws),
        other => Err(ObsError::Protocol(format!("expected Identified, got {other:?}"))),
    }
}

/// Next decodable frame during the handshake.
async fn next_frame(ws: &mut WsStream) -> Result<ServerFrame, ObsError> {
    loop {
        let msg = match ws.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => return Err(ObsError::Connect(e.to_string())),
            None => return Err(ObsError::Connect("closed during handshake".into())),
        };
        match msg {
            Message::Text(text) => return ServerFrame::decode(text.as_str()),
            Message::Close(Some(frame)) if u16::from(frame.code) == CLOSE_AUTHENTICATION_FAILED => {
                return Err(ObsError::AuthFailed);
            }
            Message::Close(frame) => {
                let reason = frame.map_or_else(String::new, |f| f.reason.as_str().to_owned());
                return Err(ObsError::Connect(format!("closed during handshake: {reason}")));
            }
            _ => {}
        }
    }
}

/// Request/response pump for an identified socket.
async fn run_session(
    inner: Arc<Inner>,
    session_id: u64,
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<ObsCommand>,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<String, PendingTx> = HashMap::new();

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break "closed locally".to_owned();
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break "command channel closed".to_owned() };
                let id = inner.next_request_id.fetch_add(1, Ordering::Relaxed).to_string();
                let frame = protocol::request_message(&cmd.request_type, &id, cmd.data.as_ref());
                debug!(request_type = %cmd.request_type, request_id = %id, "obs request");
                let _ = pending.insert(id, cmd.response_tx);
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    break e.to_string();
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break "closed by server".to_owned(),
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break e.to_string(),
                };
                match ServerFrame::decode(text.as_str()) {
                    Ok(ServerFrame::RequestResponse(resp)) => {
                        if let Some(tx) = pending.remove(&resp.request_id) {
                            let _ = tx.send(resp.into_result());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "ignoring undecodable obs frame"),
                }
            }
        }
    };

    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(ObsError::Closed));
    }
    session_ended(&inner, session_id, &reason);
}

/// Clear the session and, if intent is still set, start reconnecting.
fn session_ended(inner: &Arc<Inner>, session_id: u64, reason: &str) {
    {
        let mut control = inner.control.lock();
        if !control.session.as_ref().is_some_and(|s| s.id == session_id) {
            return;
        }
        control.session = None;
        inner.publish(ObsState::Disconnected);
    }
    warn!(url = %inner.config.url, reason, "obs connection lost");

    if inner.wants_connection() {
        if let Some(attempt) = start_attempt(inner, true) {
            let _ = tokio::spawn(async move {
                if let Err(e) = attempt.await {
                    debug!(error = %e, "obs reconnect ended");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn state_maps_to_link_status() {
        assert_eq!(ObsState::Disconnected.link_status(), LinkStatus::Down);
        assert_eq!(ObsState::Connecting.link_status(), LinkStatus::Connecting);
        assert_eq!(ObsState::Connected.link_status(), LinkStatus::Up);
    }

    #[test]
    fn config_from_settings_drops_empty_password() {
        let settings = ObsSettings {
            password: Some(String::new()),
            request_timeout_ms: 2500,
            ..ObsSettings::default()
        };
        let config = ObsConfig::from(&settings);
        assert_eq!(config.password, None);
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn call_without_session_is_not_connected() {
        let client = ObsClient::new(ObsConfig::default());
        assert_matches!(
            client.call("GetSceneList", None).await,
            Err(ObsError::NotConnected)
        );
        assert_eq!(client.state(), ObsState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let client = ObsClient::new(ObsConfig::default());
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ObsState::Disconnected);
    }

    #[tokio::test]
    async fn transitions_keep_every_change_in_order() {
        let client = ObsClient::new(ObsConfig::default());
        let mut latest = client.subscribe_state();
        let mut transitions = client.subscribe_transitions();

        client.inner.publish(ObsState::Connecting);
        client.inner.publish(ObsState::Connected);
        client.inner.publish(ObsState::Connected);
        client.inner.publish(ObsState::Disconnected);
        client.inner.publish(ObsState::Connecting);

        assert!(latest.has_changed().unwrap());
        assert_eq!(*latest.borrow_and_update(), ObsState::Connecting);

        let mut seen = Vec::new();
        while let Ok(state) = transitions.try_recv() {
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                ObsState::Connecting,
                ObsState::Connected,
                ObsState::Disconnected,
                ObsState::Connecting,
            ]
        );
    }
}
