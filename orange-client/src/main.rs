//! Orange client entry point.
//!
//! ```text
//! orange-client                                  Race candidates and stay connected
//! orange-client --config <path>                  Use custom config TOML
//! orange-client --server <url> [--server <url>]  Override the candidates
//! orange-client --gen-config                     Dump default config and exit
//! orange-client --init                           Write default config to --config
//! orange-client provision --target <url>         Send join_cluster to a fresh device
//! orange-client control --device <sn> tap 0.5 0.5
//!                                                Send one input event and exit
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use orange_core::protocol::outbound;
use orange_core::{
    ConnectionState, Prober, RemoteCommand, RemoteScreen, Session, StreamViewer, SystemKey,
    provision,
};

use orange_client::config::ClientConfig;
use orange_client::decoder::LoggingDecoder;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "orange-client", about = "Orange remote-control client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "orange-client.toml")]
    config: PathBuf,

    /// Relay candidate (repeatable; overrides config). Example: ws://10.0.0.5:8080/ws
    #[arg(short, long)]
    server: Vec<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Point a freshly installed device at its cluster master.
    Provision {
        /// Device address.
        #[arg(long)]
        target: String,
        /// Master address the device should join (default: first candidate).
        #[arg(long)]
        master: Option<String>,
    },
    /// Send one input event to a device through the relay.
    Control {
        /// Serial number of the controlled device.
        #[arg(long)]
        device: String,
        #[command(subcommand)]
        action: ControlAction,
    },
}

/// Input events. Coordinates are normalized to 0..=1.
#[derive(Subcommand, Debug, Clone, PartialEq)]
enum ControlAction {
    Tap { x: f64, y: f64 },
    Swipe { x1: f64, y1: f64, x2: f64, y2: f64 },
    Text { text: String },
    Key { key: KeyArg },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum KeyArg {
    Home,
    Back,
    AppSwitch,
}

impl From<ControlAction> for RemoteCommand {
    fn from(action: ControlAction) -> Self {
        match action {
            ControlAction::Tap { x, y } => RemoteCommand::Tap { x, y },
            ControlAction::Swipe { x1, y1, x2, y2 } => RemoteCommand::Swipe {
                from: (x1, y1),
                to: (x2, y2),
            },
            ControlAction::Text { text } => RemoteCommand::Text(text),
            ControlAction::Key { key } => RemoteCommand::Key(match key {
                KeyArg::Home => SystemKey::Home,
                KeyArg::Back => SystemKey::Back,
                KeyArg::AppSwitch => SystemKey::AppSwitch,
            }),
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    if cli.init {
        ClientConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if !cli.server.is_empty() {
        config.server.candidates = cli.server;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("orange-client v{}", env!("CARGO_PKG_VERSION"));

    let identity = config.identity();
    let session_config = config.session_config();

    // ── Provisioning ────────────────────────────────────────────

    if let Some(Command::Provision { target, master }) = cli.command.clone() {
        let Some(master) = master.or_else(|| config.server.candidates.first().cloned()) else {
            return Err("no master address: pass --master or configure a candidate".into());
        };
        provision(
            &target,
            &master,
            &identity.token,
            session_config.connect_timeout,
            session_config.provision_settle,
        )
        .await?;
        info!(device = %target, master = %master, "device provisioned");
        return Ok(());
    }

    // ── 1. Pick a relay ─────────────────────────────────────────

    let prober = Prober::http(session_config.probe_timeout)?;
    let Some(address) = prober.race(&config.server.candidates).await else {
        return Err(format!(
            "none of {} candidate(s) reachable",
            config.server.candidates.len()
        )
        .into());
    };

    // ── 2. Open the session ─────────────────────────────────────

    info!(sn = identity.sn, "client identity");
    let session = Session::new(identity, session_config);
    if let Err(e) = session.setup(&address).await {
        // A reconnect is already scheduled.
        warn!("initial connect failed: {e}");
    }

    if let Some(Command::Control { device, action }) = cli.command {
        let result = send_control(
            &session,
            &device,
            RemoteCommand::from(action),
            &config.remote_screen(),
        )
        .await;
        session.shutdown().await;
        return result;
    }

    let requester = tokio::spawn(request_on_connect(session.clone(), session.watch_state()));

    // ── 3. Follow streams sent to us ────────────────────────────

    let viewer = StreamViewer::new(
        &session,
        LoggingDecoder::default(),
        config.media.max_pending_bytes,
    );
    let stats_rx = viewer.stats_receiver();
    let viewer_stop = viewer.stop_handle();
    let viewer_handle = tokio::spawn(viewer.run());

    // ── 4. Event loop ───────────────────────────────────────────

    let mut devices = session.devices();
    let mut workflows = session.workflows();
    let mut offline = session.soft_offline();
    let mut password = session.password();
    let mut stats_tick = tokio::time::interval(Duration::from_secs(5));
    let mut last_frames = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            Ok(()) = devices.changed() => {
                let list = devices.borrow_and_update().clone();
                let online = list.iter().filter(|d| d.is_online()).count();
                info!(total = list.len(), online, "devices");
                for device in &list {
                    info!(sn = device.sn, model = device.model, status = device.status, "device");
                }
            }
            Ok(()) = workflows.changed() => {
                let list = workflows.borrow_and_update().clone();
                info!(count = list.len(), "workflows");
            }
            Ok(()) = offline.changed() => {
                if *offline.borrow_and_update() {
                    warn!("evicted by server; waiting for re-registration");
                } else {
                    info!("online");
                }
            }
            Ok(()) = password.changed() => {
                if password.borrow_and_update().is_some() {
                    info!("device password received");
                }
            }
            _ = stats_tick.tick() => {
                let stats = stats_rx.borrow().clone();
                if stats.total_frames != last_frames {
                    info!(
                        fps = format!("{:.1}", stats.fps),
                        frames = stats.total_frames,
                        bytes = stats.total_bytes,
                        "stream"
                    );
                    last_frames = stats.total_frames;
                }
            }
        }
    }

    // ── 5. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    viewer_stop.cancel();
    match viewer_handle.await {
        Ok(decode) => info!(
            key_frames = decode.decoder().key_frames(),
            delta_frames = decode.decoder().delta_frames(),
            "viewer stopped"
        ),
        Err(e) => error!("viewer task failed: {e}"),
    }
    requester.abort();
    session.shutdown().await;

    Ok(())
}

/// Wait for the session to come up, queue one input event and give the
/// writer a moment to flush it.
async fn send_control(
    session: &Session,
    device: &str,
    command: RemoteCommand,
    screen: &RemoteScreen,
) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = session.config().connect_timeout;
    let mut state = session.watch_state();
    tokio::time::timeout(timeout, state.wait_for(ConnectionState::is_connected))
        .await
        .map_err(|_| format!("not connected within {timeout:?}"))??;

    if !session.send_json(&command.to_envelope(device, screen)) {
        return Err("control command not queued".into());
    }
    info!(device, ?command, "control command sent");
    tokio::time::sleep(session.config().provision_settle).await;
    Ok(())
}

/// Ask for the device list every time the session (re)connects.
async fn request_on_connect(session: Session, mut state: watch::Receiver<ConnectionState>) {
    let mut was_connected = false;
    loop {
        let connected = state.borrow_and_update().is_connected();
        if connected && !was_connected {
            session.send_json(&outbound::get_device_list());
        }
        was_connected = connected;
        if state.changed().await.is_err() {
            break;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
