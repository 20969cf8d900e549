//! Restart-on-change supervision of the automation relay.

use overcast_settings::{AutomationSettings, OvercastSettings};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::relay::{AutomationRelay, RelayEndpoints};

struct SupervisorState {
    endpoints: RelayEndpoints,
    relay: Option<AutomationRelay>,
    /// Snapshot the current relay (or its absence) was derived from.
    applied: Option<(AutomationSettings, RelayEndpoints)>,
}

/// Owns at most one [`AutomationRelay`] and replaces it when settings change.
pub struct RelaySupervisor {
    state: Mutex<SupervisorState>,
}

impl RelaySupervisor {
    /// A supervisor with no relay running.
    pub fn new(endpoints: RelayEndpoints) -> Self {
        Self {
            state: Mutex::new(SupervisorState {
                endpoints,
                relay: None,
                applied: None,
            }),
        }
    }

    /// Stop the current relay, then start a new one if `settings.enabled`.
    pub async fn apply(&self, settings: &AutomationSettings) {
        let mut state = self.state.lock().await;
        Self::restart(&mut state, settings).await;
    }

    /// Apply a full settings snapshot, restarting only when the automation
    /// section or the telemetry endpoint changed. Returns whether it did.
    ///
    /// The hub URL given at construction is kept; it points at the hub this
    /// process is actually serving.
    pub async fn apply_snapshot(&self, settings: &OvercastSettings) -> bool {
        let mut state = self.state.lock().await;
        let endpoints = RelayEndpoints {
            hub_url: state.endpoints.hub_url.clone(),
            ..RelayEndpoints::from_settings(settings)
        };
        let unchanged = state
            .applied
            .as_ref()
            .is_some_and(|(automation, applied)| {
                *automation == settings.automation && *applied == endpoints
            });
        if unchanged {
            return false;
        }
        state.endpoints = endpoints;
        Self::restart(&mut state, &settings.automation).await;
        true
    }

    /// Whether a relay is running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.relay.is_some()
    }

    /// Stop the current relay, if any.
    pub async fn shutdown(&self) {
        let relay = self.state.lock().await.relay.take();
        if let Some(relay) = relay {
            relay.stop().await;
        }
    }

    /// Follow `settings` until `cancel` fires, then stop the relay.
    ///
    /// If the settings source goes away the current relay keeps running.
    pub async fn run(&self, mut settings: watch::Receiver<OvercastSettings>, cancel: CancellationToken) {
        let initial = settings.borrow_and_update().clone();
        let _ = self.apply_snapshot(&initial).await;
        let mut following = true;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = settings.changed(), if following => {
                    if changed.is_err() {
                        following = false;
                        continue;
                    }
                    let snapshot = settings.borrow_and_update().clone();
                    if self.apply_snapshot(&snapshot).await {
                        info!(enabled = snapshot.automation.enabled, "automation settings applied");
                    }
                }
            }
        }
        self.shutdown().await;
    }

    async fn restart(state: &mut SupervisorState, settings: &AutomationSettings) {
        if let Some(relay) = state.relay.take() {
            relay.stop().await;
        }
        if settings.enabled {
            state.relay = Some(AutomationRelay::start(
                settings.clone(),
                state.endpoints.clone(),
            ));
        } else {
            info!("automation disabled");
        }
        state.applied = Some((settings.clone(), state.endpoints.clone()));
    }
}
