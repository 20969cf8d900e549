//! `TelemetryClient`: a reconnecting WebSocket link with pair dispatch.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use metrics::counter;
use overcast_core::LinkStatus;
use overcast_core::envelope::{TelemetryEnvelope, registration_message};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::dispatch::{
    Callback, LOCAL_CHANNEL, Names, STATUS_CHANNEL, STATUS_EVENT, SubscriptionTable,
    is_network_channel,
};
use crate::error::TelemetryError;
use crate::metrics::{TELEMETRY_EVENTS_TOTAL, TELEMETRY_RECONNECTS_TOTAL};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Link status plus the last transport error, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Current status.
    pub status: LinkStatus,
    /// Why the last connection attempt or session ended. Cleared on open.
    pub error: Option<String>,
}

impl StatusReport {
    fn up() -> Self {
        Self {
            status: LinkStatus::Up,
            error: None,
        }
    }

    fn connecting(error: Option<String>) -> Self {
        Self {
            status: LinkStatus::Connecting,
            error,
        }
    }

    /// `{"status": "...", "error": string|null}`
    pub fn payload(&self) -> Value {
        json!({ "status": self.status.as_str(), "error": self.error })
    }
}

struct LinkState {
    table: SubscriptionTable,
    /// Writer for the open socket. `None` whenever the link is not open.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Bumped by `start` and `close`; tasks holding an older value are inert.
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    state: Mutex<LinkState>,
    status: watch::Sender<StatusReport>,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.state.lock().generation == generation
    }

    /// Publish `report` if it differs from the current one and notify
    /// `ws:status` subscribers.
    fn set_status(&self, generation: u64, report: StatusReport) {
        let callbacks = {
            let state = self.state.lock();
            if state.generation != generation {
                return;
            }
            let changed = self.status.send_if_modified(|current| {
                if *current == report {
                    return false;
                }
                *current = report.clone();
                true
            });
            if !changed {
                return;
            }
            state.table.callbacks(STATUS_CHANNEL, STATUS_EVENT)
        };
        debug!(status = %report.status, error = ?report.error, "telemetry status");
        let payload = report.payload();
        for callback in &callbacks {
            callback(&payload);
        }
    }

    fn dispatch(&self, channel: &str, event: &str, data: &Value) {
        let callbacks = self.state.lock().table.callbacks(channel, event);
        for callback in &callbacks {
            callback(data);
        }
    }

    /// Install the writer for a fresh socket, queueing one registration per
    /// known network pair ahead of anything else.
    fn attach(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let mut registered = 0usize;
        for (channel, event) in state.table.network_pairs() {
            let _ = outbound.send(registration_message(channel, event));
            registered += 1;
        }
        debug!(pairs = registered, "replayed telemetry registrations");
        state.outbound = Some(outbound);
        true
    }

    fn detach(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.outbound = None;
        }
    }

    fn handle_frame(&self, generation: u64, config: &TelemetryConfig, text: &str) {
        if !self.is_current(generation) {
            return;
        }
        let Some(envelope) = TelemetryEnvelope::decode(text) else {
            debug!(len = text.len(), "ignoring telemetry frame without event");
            return;
        };
        if config.should_log(&envelope.event) {
            info!(event = %envelope.event, data = %envelope.data, "telemetry event");
        }
        self.set_status(generation, StatusReport::up());

        let (channel, event) = envelope.split_event();
        counter!(TELEMETRY_EVENTS_TOTAL, "channel" => channel.to_owned()).increment(1);
        self.dispatch(channel, event, &envelope.data);
    }
}

/// Pub/sub client for one telemetry source.
///
/// Subscriptions survive reconnects and restarts. Dropping the client stops
/// its connection task.
pub struct TelemetryClient {
    inner: Arc<Inner>,
}

impl TelemetryClient {
    /// A client with no link. Local dispatch works immediately.
    pub fn new() -> Self {
        let (status, _) = watch::channel(StatusReport::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LinkState {
                    table: SubscriptionTable::new(),
                    outbound: None,
                    generation: 0,
                    cancel: CancellationToken::new(),
                }),
                status,
            }),
        }
    }

    /// A client already connecting to `config.url`.
    pub fn connect(config: TelemetryConfig) -> Self {
        let client = Self::new();
        client.start(config);
        client
    }

    /// Begin connecting to `config.url`, tearing down any previous link.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, config: TelemetryConfig) {
        let (generation, cancel) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.outbound = None;
            state.cancel.cancel();
            state.cancel = CancellationToken::new();
            (state.generation, state.cancel.clone())
        };
        info!(url = %config.url, "starting telemetry link");
        let _ = tokio::spawn(run_link(self.inner.clone(), config, generation, cancel));
    }

    /// Register `callback` for every `channel × event` combination.
    ///
    /// Network pairs seen for the first time are registered upstream now if
    /// the link is open, otherwise when it next opens.
    pub fn subscribe<F>(&self, channels: impl Into<Names>, events: impl Into<Names>, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let channels = channels.into();
        let events = events.into();

        let mut state = self.inner.state.lock();
        for channel in channels.iter() {
            for event in events.iter() {
                let is_new = state.table.add(channel, event, callback.clone());
                if !is_new || !is_network_channel(channel) {
                    continue;
                }
                if let Some(outbound) = &state.outbound {
                    let _ = outbound.send(registration_message(channel, event));
                }
            }
        }
    }

    /// Publish `data` on `channel:event`.
    ///
    /// The `local` channel dispatches synchronously to local subscribers.
    /// Anything else is written to the socket; returns `false` when the link
    /// is not open.
    pub fn send(&self, channel: &str, event: &str, data: Value) -> bool {
        match self.try_send(channel, event, data) {
            Ok(()) => true,
            Err(e) => {
                debug!(channel, event, error = %e, "telemetry send skipped");
                false
            }
        }
    }

    /// Like [`send`](Self::send), reporting why nothing was written.
    pub fn try_send(&self, channel: &str, event: &str, data: Value) -> Result<(), TelemetryError> {
        if channel == LOCAL_CHANNEL {
            self.inner.dispatch(channel, event, &data);
            return Ok(());
        }
        let frame = TelemetryEnvelope::new(channel, event, data).encode();
        let state = self.inner.state.lock();
        let outbound = state.outbound.as_ref().ok_or(TelemetryError::NotConnected)?;
        outbound.send(frame).map_err(|_| TelemetryError::Closed)
    }

    /// Current link status.
    pub fn status(&self) -> LinkStatus {
        self.inner.status.borrow().status
    }

    /// Current status with the last error.
    pub fn status_report(&self) -> StatusReport {
        self.inner.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<StatusReport> {
        self.inner.status.subscribe()
    }

    /// Whether a socket is currently open.
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().outbound.is_some()
    }

    /// Tear down the link and mark it `down`. Subscriptions are kept.
    pub fn close(&self) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.outbound = None;
            state.cancel.cancel();
            state.generation
        };
        self.inner.set_status(generation, StatusReport::default());
    }
}

impl Default for TelemetryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        self.inner.state.lock().cancel.cancel();
    }
}

/// Connect, serve, and reconnect after a fixed delay until cancelled.
async fn run_link(
    inner: Arc<Inner>,
    config: TelemetryConfig,
    generation: u64,
    cancel: CancellationToken,
) {
    inner.set_status(generation, StatusReport::connecting(None));
    loop {
        let connected = tokio::select! {
            () = cancel.cancelled() => return,
            result = connect_async(config.url.as_str()) => result,
        };
        let error = match connected {
            Ok((ws, _)) => {
                debug!(url = %config.url, "telemetry connected");
                serve(&inner, &config, generation, &cancel, ws).await
            }
            Err(e) => Some(e.to_string()),
        };
        if cancel.is_cancelled() {
            return;
        }

        debug!(error = ?error, delay = ?config.reconnect_delay, "telemetry link down, retrying");
        inner.set_status(generation, StatusReport::connecting(error));
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(config.reconnect_delay) => {}
        }
        counter!(TELEMETRY_RECONNECTS_TOTAL).increment(1);
    }
}

/// Pump one socket until it closes. Returns why it ended, or `None` when cancelled.
async fn serve(
    inner: &Inner,
    config: &TelemetryConfig,
    generation: u64,
    cancel: &CancellationToken,
    ws: WsStream,
) -> Option<String> {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    if !inner.attach(generation, out_tx) {
        return None;
    }
    inner.set_status(generation, StatusReport::up());

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break None;
            }
            Some(text) = out_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break Some(e.to_string());
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_frame(generation, config, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => inner.handle_frame(generation, config, text),
                    Err(_) => debug!(len = data.len(), "dropping non-UTF8 telemetry frame"),
                },
                Some(Ok(Message::Close(_))) | None => break Some("connection closed".to_owned()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
            }
        }
    };

    inner.detach(generation);
    reason
}
