//! # overcast-agent
//!
//! Overcast binary. `serve` runs the broadcast hub and the automation relay
//! supervisor; `obs-scenes` lists what the configured obs instance offers.

#![deny(unsafe_code)]

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overcast_automation::{ObsClient, ObsConfig, RelayEndpoints, RelaySupervisor};
use overcast_server::{HubConfig, HubServer};
use overcast_settings::{OvercastSettings, SettingsWatcher};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Overcast broadcast hub and obs automation relay.
#[derive(Parser, Debug)]
#[command(name = "overcast-agent", about = "Overcast broadcast hub and obs automation relay")]
struct Cli {
    /// Settings file (defaults to `~/.overcast/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Host to bind the hub on (overrides settings).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to bind the hub on (overrides settings, 0 for auto-assign).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the hub and the automation relay (default).
    Serve,
    /// Print the scene and transition names of the configured obs endpoint.
    ObsScenes,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(overcast_settings::settings_path)
    }

    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut OvercastSettings) {
        if let Some(ref host) = self.host {
            settings.hub.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.hub.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

/// URL a local client uses to reach a hub bound on `addr`.
fn hub_client_url(addr: SocketAddr) -> String {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    format!("ws://{}/", SocketAddr::new(ip, addr.port()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings first; the log level comes from them
    let settings_path = args.settings_path();
    let loaded = overcast_settings::load_settings_from_path(&settings_path);
    let (mut settings, load_error) = match loaded {
        Ok(settings) => (settings, None),
        Err(e) => (OvercastSettings::default(), Some(e)),
    };
    args.apply(&mut settings);

    overcast_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    if let Some(e) = load_error {
        warn!(path = %settings_path.display(), error = %e, "failed to load settings, using defaults");
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings_path, settings).await,
        Command::ObsScenes => obs_scenes(&settings).await,
    }
}

async fn serve(settings_path: PathBuf, settings: OvercastSettings) -> Result<()> {
    let mut hub = HubServer::new(HubConfig::from(&settings.hub));
    if settings.hub.metrics_enabled {
        match overcast_server::metrics::install_recorder() {
            Ok(handle) => hub = hub.with_metrics(handle),
            Err(e) => warn!(error = %e, "metrics recorder unavailable"),
        }
    }
    let addr = hub.listen().await.context("Failed to start hub")?;

    let watcher = match SettingsWatcher::spawn(settings_path.clone(), settings.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(path = %settings_path.display(), error = %e, "settings hot reload disabled");
            None
        }
    };
    // without a watcher the supervisor keeps the initial snapshot
    let updates = watcher
        .as_ref()
        .map_or_else(|| watch::channel(settings.clone()).1, SettingsWatcher::subscribe);

    // The relay always dials the hub this process serves
    let endpoints = RelayEndpoints {
        hub_url: hub_client_url(addr),
        ..RelayEndpoints::from_settings(&settings)
    };
    let supervisor = Arc::new(RelaySupervisor::new(endpoints));
    let cancel = CancellationToken::new();
    let supervisor_task = tokio::spawn({
        let supervisor = supervisor.clone();
        let cancel = cancel.clone();
        async move { supervisor.run(updates, cancel).await }
    });

    info!(%addr, automation = settings.automation.enabled, "overcast running");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    cancel.cancel();
    if let Err(e) = supervisor_task.await {
        warn!(error = %e, "relay supervisor task failed");
    }
    hub.stop().await;
    drop(watcher);

    info!("Shutdown complete");
    Ok(())
}

async fn obs_scenes(settings: &OvercastSettings) -> Result<()> {
    let obs = &settings.automation.obs;
    let client = ObsClient::new(ObsConfig::from(obs));
    client
        .connect_once()
        .await
        .with_context(|| format!("Failed to connect to obs at {}", obs.url))?;

    let listed = async {
        let scenes = client.get_scene_list().await.context("GetSceneList failed")?;
        let transitions = client
            .get_scene_transition_list()
            .await
            .context("GetSceneTransitionList failed")?;
        anyhow::Ok(serde_json::json!({ "scenes": scenes, "transitions": transitions }))
    }
    .await;
    client.disconnect();

    println!("{}", serde_json::to_string_pretty(&listed?)?);
    Ok(())
}
