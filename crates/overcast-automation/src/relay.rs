//! `AutomationRelay`: game events in, scene switches and health out.
//!
//! One relay is built from one immutable [`AutomationSettings`] snapshot and
//! owns its own obs client, telemetry client and hub link. Settings changes
//! replace the relay (see [`RelaySupervisor`](crate::supervisor::RelaySupervisor)).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::counter;
use overcast_core::envelope::automation_status_message;
use overcast_core::{LinkStatus, Role};
use overcast_settings::{AutomationSettings, OvercastSettings};
use overcast_telemetry::{TelemetryClient, TelemetryConfig};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub_link::{HubLink, HubLinkConfig};
use crate::metrics::{OBS_COMMAND_FAILURES_TOTAL, OBS_SCENE_SWITCHES_TOTAL};
use crate::obs::{ObsClient, ObsConfig, ObsError, ObsState};
use crate::triggers::{SceneSwitch, Trigger, plan};

/// Role the relay declares on the hub.
pub const AUTOMATION_ROLE: &str = "automation";

/// How long `stop` waits for the relay's tasks to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the relay's two inbound/outbound links point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayEndpoints {
    /// Telemetry source for game events.
    pub telemetry: TelemetryConfig,
    /// Hub URL for status publishing.
    pub hub_url: String,
    /// Fixed hub link reconnect delay.
    pub hub_reconnect_delay: Duration,
}

impl RelayEndpoints {
    /// Endpoints derived from a full settings snapshot.
    pub fn from_settings(settings: &OvercastSettings) -> Self {
        Self {
            telemetry: TelemetryConfig::from(&settings.telemetry),
            hub_url: settings.hub.url(),
            hub_reconnect_delay: settings.automation.hub_reconnect_delay(),
        }
    }
}

/// Publishes `obsAutomation:status` through the hub link.
struct StatusPublisher {
    obs: Arc<ObsClient>,
    hub: Arc<HubLink>,
    /// Consecutive failed scene switches.
    failures: AtomicU64,
}

impl StatusPublisher {
    fn publish(&self) {
        self.publish_as(self.obs.state().link_status());
    }

    fn publish_as(&self, status: LinkStatus) {
        if !self.hub.is_open() {
            return;
        }
        let failures = self.failures.load(Ordering::SeqCst);
        if self.hub.publish(automation_status_message(status, failures)) {
            debug!(%status, command_failures = failures, "published automation status");
        }
    }

    /// Track the consecutive failure count, republishing when it changes.
    fn record(&self, outcome: &Result<(), ObsError>) {
        let changed = match outcome {
            Ok(()) => self.failures.swap(0, Ordering::SeqCst) != 0,
            Err(_) => {
                let _ = self.failures.fetch_add(1, Ordering::SeqCst);
                true
            }
        };
        if changed {
            self.publish();
        }
    }
}

/// A running automation instance.
pub struct AutomationRelay {
    settings: Arc<AutomationSettings>,
    obs: Arc<ObsClient>,
    telemetry: TelemetryClient,
    hub: Arc<HubLink>,
    status: Arc<StatusPublisher>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AutomationRelay {
    /// Build the relay and start all of its links. Must be called within a
    /// tokio runtime.
    pub fn start(settings: AutomationSettings, endpoints: RelayEndpoints) -> Self {
        let settings = Arc::new(settings);
        info!(
            mode = ?settings.mode,
            obs = %settings.obs.url,
            telemetry = %endpoints.telemetry.url,
            hub = %endpoints.hub_url,
            "starting automation relay"
        );

        let obs = Arc::new(ObsClient::new(ObsConfig::from(&settings.obs)));
        let hub = Arc::new(HubLink::start(HubLinkConfig {
            url: endpoints.hub_url.clone(),
            reconnect_delay: endpoints.hub_reconnect_delay,
            role: Role::parse(AUTOMATION_ROLE),
        }));
        let status = Arc::new(StatusPublisher {
            obs: obs.clone(),
            hub: hub.clone(),
            failures: AtomicU64::new(0),
        });
        let cancel = CancellationToken::new();

        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let telemetry = TelemetryClient::new();
        for trigger in Trigger::ALL {
            let tx = trigger_tx.clone();
            telemetry.subscribe(trigger.channel(), trigger.event(), move |_: &Value| {
                let _ = tx.send(trigger);
            });
        }
        telemetry.start(endpoints.telemetry);

        let tasks = vec![
            tokio::spawn(forward_status(
                status.clone(),
                obs.subscribe_transitions(),
                hub.subscribe_open(),
                cancel.clone(),
            )),
            tokio::spawn(run_triggers(
                trigger_rx,
                obs.clone(),
                settings.clone(),
                status.clone(),
                cancel.clone(),
            )),
            tokio::spawn(initial_connect(obs.clone(), cancel.clone())),
        ];

        Self {
            settings,
            obs,
            telemetry,
            hub,
            status,
            cancel,
            tasks,
        }
    }

    /// Settings this relay was built from.
    pub fn settings(&self) -> &AutomationSettings {
        &self.settings
    }

    /// The relay's obs client.
    pub fn obs(&self) -> &ObsClient {
        &self.obs
    }

    /// Consecutive failed scene switches.
    pub fn command_failures(&self) -> u64 {
        self.status.failures.load(Ordering::SeqCst)
    }

    /// Publish a final `down`, then disconnect obs and close both links.
    pub async fn stop(self) {
        info!("stopping automation relay");
        self.cancel.cancel();
        self.obs.disconnect();
        self.status.publish_as(LinkStatus::Down);
        self.telemetry.close();
        self.hub.close();

        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(STOP_TIMEOUT, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

async fn initial_connect(obs: Arc<ObsClient>, cancel: CancellationToken) {
    tokio::select! {
        () = cancel.cancelled() => {}
        result = obs.connect() => match result {
            Ok(()) => {}
            Err(ObsError::Cancelled) => debug!("obs connect cancelled"),
            Err(e) => warn!(error = %e, "obs connect gave up"),
        }
    }
}

/// Publish every obs transition, and the current status on every hub (re)open.
async fn forward_status(
    status: Arc<StatusPublisher>,
    mut transitions: broadcast::Receiver<ObsState>,
    mut hub_opened: watch::Receiver<u64>,
    cancel: CancellationToken,
) {
    status.publish();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            transition = transitions.recv() => match transition {
                Ok(state) => status.publish_as(state.link_status()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "obs transitions lagged");
                    status.publish();
                }
                Err(RecvError::Closed) => break,
            },
            changed = hub_opened.changed() => {
                if changed.is_err() {
                    break;
                }
                status.publish();
            }
        }
    }
}

/// Apply triggers one at a time, in arrival order.
async fn run_triggers(
    mut triggers: mpsc::UnboundedReceiver<Trigger>,
    obs: Arc<ObsClient>,
    settings: Arc<AutomationSettings>,
    status: Arc<StatusPublisher>,
    cancel: CancellationToken,
) {
    loop {
        let trigger = tokio::select! {
            () = cancel.cancelled() => break,
            trigger = triggers.recv() => match trigger {
                Some(trigger) => trigger,
                None => break,
            },
        };
        let Some(switch) = plan(trigger, &settings) else {
            debug!(%trigger, mode = ?settings.mode, "trigger skipped");
            continue;
        };

        let outcome = switch_scene(&obs, &switch).await;
        match &outcome {
            Ok(()) => {
                info!(%trigger, scene = %switch.scene, "scene switched");
                counter!(OBS_SCENE_SWITCHES_TOTAL, "trigger" => trigger.event()).increment(1);
            }
            Err(e) => {
                warn!(%trigger, scene = %switch.scene, error = %e, "scene switch failed");
                counter!(OBS_COMMAND_FAILURES_TOTAL).increment(1);
            }
        }
        status.record(&outcome);
    }
}

async fn switch_scene(obs: &ObsClient, switch: &SceneSwitch) -> Result<(), ObsError> {
    if let Some(transition) = &switch.transition {
        obs.set_current_scene_transition(transition).await?;
    }
    obs.set_current_program_scene(&switch.scene).await
}
