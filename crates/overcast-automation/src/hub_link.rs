//! Reconnecting client connection to the broadcast hub.
//!
//! Declares a role on every (re)open and carries outbound frames only; the
//! hub's own traffic is read and discarded.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use metrics::counter;
use overcast_core::Role;
use overcast_core::envelope::hello_message;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::HUB_LINK_RECONNECTS_TOTAL;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Where and as whom to connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubLinkConfig {
    /// Hub WebSocket URL.
    pub url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Role declared in the hello sent on every open.
    pub role: Role,
}

struct LinkInner {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Number of times the link has opened.
    opened: watch::Sender<u64>,
}

/// A reconnecting hub client.
pub struct HubLink {
    inner: Arc<LinkInner>,
    cancel: CancellationToken,
}

impl HubLink {
    /// Start connecting in the background. Must be called within a tokio runtime.
    pub fn start(config: HubLinkConfig) -> Self {
        let (opened, _) = watch::channel(0);
        let inner = Arc::new(LinkInner {
            outbound: Mutex::new(None),
            opened,
        });
        let cancel = CancellationToken::new();
        let _ = tokio::spawn(run_link(inner.clone(), config, cancel.clone()));
        Self { inner, cancel }
    }

    /// Whether a socket is open.
    pub fn is_open(&self) -> bool {
        self.inner.outbound.lock().is_some()
    }

    /// Queue a text frame. Returns `false` when the link is not open.
    pub fn publish(&self, text: impl Into<String>) -> bool {
        self.inner
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(text.into()).is_ok())
    }

    /// Receiver whose value increments on every open.
    pub fn subscribe_open(&self) -> watch::Receiver<u64> {
        self.inner.opened.subscribe()
    }

    /// Stop reconnecting. Frames already published are flushed before the
    /// socket closes.
    pub fn close(&self) {
        self.cancel.cancel();
        let _ = self.inner.outbound.lock().take();
    }
}

impl Drop for HubLink {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_link(inner: Arc<LinkInner>, config: HubLinkConfig, cancel: CancellationToken) {
    loop {
        let connected = tokio::select! {
            () = cancel.cancelled() => return,
            result = connect_async(config.url.as_str()) => result,
        };
        match connected {
            Ok((ws, _)) => {
                if let Some(reason) = serve(&inner, &config, &cancel, ws).await {
                    debug!(url = %config.url, reason, "hub link lost");
                }
            }
            Err(e) => debug!(url = %config.url, error = %e, "hub link connect failed"),
        }
        if cancel.is_cancelled() {
            return;
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(config.reconnect_delay) => {}
        }
        counter!(HUB_LINK_RECONNECTS_TOTAL).increment(1);
    }
}

async fn serve(
    inner: &LinkInner,
    config: &HubLinkConfig,
    cancel: &CancellationToken,
    ws: WsStream,
) -> Option<String> {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let _ = out_tx.send(hello_message(&config.role));
    {
        let mut outbound = inner.outbound.lock();
        if cancel.is_cancelled() {
            return None;
        }
        *outbound = Some(out_tx);
    }
    inner.opened.send_modify(|n| *n += 1);
    info!(url = %config.url, role = %config.role, "hub link open");

    let reason = loop {
        tokio::select! {
            biased;
            Some(text) = out_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break Some(e.to_string());
                }
            }
            () = cancel.cancelled() => {
                while let Ok(text) = out_rx.try_recv() {
                    let _ = ws_tx.send(Message::Text(text.into())).await;
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break None;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break Some("closed by hub".to_owned()),
                Some(Err(e)) => break Some(e.to_string()),
                Some(Ok(_)) => {}
            }
        }
    };

    let _ = inner.outbound.lock().take();
    reason
}
