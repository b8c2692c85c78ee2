// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! VolMix - command-line front end for the audio sync core.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use volmix::config::{AppConfig, ConfigManager, TransportKind};
use volmix::menu::MenuEntry;
use volmix::{
    transport, BridgeHandle, BridgeSettings, CoreEvent, CoreSettings, DeviceSelector, DeviceView,
    EventBridge, Gesture, Intent, MixerCore, VolumeIcon,
};

/// How long a one-shot command waits for the first snapshot.
const INITIAL_STATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "volmix", version, about = "Control audio devices through the VolMix backend")]
struct Cli {
    /// Use the built-in simulated backend
    #[arg(long)]
    loopback: bool,

    /// Config file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices
    Devices {
        /// Print the mirrored snapshot in wire format
        #[arg(long)]
        json: bool,
    },
    /// Print device changes until interrupted
    Watch,
    /// Set a device's volume (0.0-1.0)
    Volume { device: DeviceSelector, volume: f32 },
    /// Change a device's volume by a relative amount
    Nudge {
        device: DeviceSelector,
        #[arg(allow_negative_numbers = true)]
        delta: f32,
    },
    /// Toggle mute
    Mute { device: DeviceSelector },
    /// Make a device the default output
    Default { id: String },
    /// Show the device picker menu
    Menu,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("volmix=info".parse()?)
                .add_directive("zbus=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let kind = if cli.loopback {
        TransportKind::Loopback
    } else {
        config.transport.kind
    };

    let transport = transport::connect(kind).await?;
    let core = MixerCore::new(transport, CoreSettings::from(&config));
    let bridge = EventBridge::new(core, BridgeSettings::from(&config));
    let handle = bridge.start().await?;

    if let Commands::Watch = cli.command {
        return watch(handle).await;
    }

    tokio::time::timeout(INITIAL_STATE_TIMEOUT, handle.wait_live())
        .await
        .map_err(|_| "No audio state received from backend")??;
    let core = handle.core();

    let intent = match cli.command {
        Commands::Devices { json: true } => {
            if let Some(snapshot) = core.snapshot() {
                println!("{}", serde_json::to_string_pretty(&*snapshot)?);
            }
            return Ok(());
        }
        Commands::Devices { json: false } => {
            core.devices().iter().for_each(print_device);
            return Ok(());
        }
        Commands::Menu => {
            core.context_menu().iter().for_each(print_menu_entry);
            return Ok(());
        }
        Commands::Volume { device, volume } => Intent::set_volume(device, volume, Gesture::Discrete),
        Commands::Nudge { device, delta } => {
            let current = core
                .device_view(&device)
                .ok_or_else(|| format!("Unknown device: {}", device))?;
            Intent::set_volume(device, current.volume + delta, Gesture::Discrete)
        }
        Commands::Mute { device } => Intent::toggle_mute(device),
        Commands::Default { id } => Intent::SetDefault { id },
        Commands::Watch => return Ok(()),
    };

    core.handle_intent(intent)?;
    core.wait_idle().await;
    core.devices().iter().for_each(print_device);
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => ConfigManager::load_from(path)?,
        None => ConfigManager::new()?.load_config()?,
    };
    Ok(config)
}

async fn watch(handle: BridgeHandle) -> Result<(), Box<dyn std::error::Error>> {
    let core = handle.core().clone();
    let mut events = core.subscribe_events();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("Watching audio state, Ctrl+C to stop");
    // The initial dump may have landed before the event subscription.
    core.devices().iter().for_each(print_device);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CoreEvent::SnapshotApplied { generation, .. }) => {
                    println!("-- snapshot #{}", generation);
                    core.devices().iter().for_each(print_device);
                }
                Ok(CoreEvent::CommandFailed { query, error }) => {
                    warn!("{} failed: {}", query.kind(), error);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} core events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
        }
    }

    core.shutdown();
    Ok(())
}

fn print_device(view: &DeviceView) {
    let icon = match view.icon() {
        VolumeIcon::Muted => "muted",
        VolumeIcon::Silent => "silent",
        VolumeIcon::Audible => "",
    };
    println!(
        "{} {:>3}% {:<8} {} [{}]",
        if view.is_default { "*" } else { " " },
        view.percent(),
        icon,
        view.name,
        view.id
    );
}

fn print_menu_entry(entry: &MenuEntry) {
    let mark = match entry.checked {
        Some(true) => "[x] ",
        Some(false) => "[ ] ",
        None => "    ",
    };
    println!("{}{}", mark, entry.label);
}
