use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtc_call::config::CallConfig;
use rtc_call::events::{EventBus, SessionEvent};
use rtc_call::media::{CaptureProvider, MediaDeviceController, SyntheticCaptureProvider};
use rtc_call::session::{PeerSession, Role, SignalingState};
use rtc_call::signaling::SignalingChannel;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Which side of the call this process plays
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRole {
    Caller,
    Callee,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Caller => Role::Caller,
            CliRole::Callee => Role::Callee,
        }
    }
}

/// rtc-call command line arguments
#[derive(Parser, Debug)]
#[command(name = "rtc-call")]
#[command(version, about = "Peer-to-peer audio/video call client", long_about = None)]
struct CliArgs {
    /// Configuration file (TOML); falls back to $RTC_CALL_CONFIG
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Signaling relay URL (overrides config)
    #[arg(short = 'u', long, value_name = "URL")]
    url: Option<String>,

    /// Call role (overrides config)
    #[arg(short = 'r', long, value_name = "ROLE")]
    role: Option<CliRole>,

    /// Capture audio only
    #[arg(long, conflicts_with = "video_only")]
    audio_only: bool,

    /// Capture video only
    #[arg(long)]
    video_only: bool,

    /// Camera device ID
    #[arg(long, value_name = "DEVICE")]
    camera: Option<String>,

    /// Microphone device ID
    #[arg(long, value_name = "DEVICE")]
    microphone: Option<String>,

    /// Use synthetic devices instead of host hardware
    #[arg(long)]
    synthetic: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.json_logs);

    tracing::info!("Starting rtc-call v{}", env!("CARGO_PKG_VERSION"));

    let mut config = CallConfig::load_or_default(args.config.as_deref()).await?;

    // Apply CLI argument overrides to config (only if explicitly specified)
    if let Some(url) = args.url {
        config.signaling.url = Some(url);
    }
    if let Some(role) = args.role {
        config.session.role = role.into();
    }
    if args.audio_only {
        config.media.video = false;
    }
    if args.video_only {
        config.media.audio = false;
    }
    if let Some(camera) = args.camera {
        config.media.video_device = Some(camera);
    }
    if let Some(microphone) = args.microphone {
        config.media.audio_device = Some(microphone);
    }
    config.validate()?;

    let events = Arc::new(EventBus::new());
    let media = MediaDeviceController::new(capture_provider(args.synthetic), events.clone());

    if args.list_devices {
        for device in media.enumerate_devices().await? {
            println!(
                "{:<12} {:<28} {}",
                format!("{:?}", device.kind).to_lowercase(),
                device.device_id,
                device.label
            );
        }
        return Ok(());
    }

    let url = config
        .signaling
        .url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No signaling URL configured (use --url)"))?;
    let channel =
        SignalingChannel::connect_websocket(&url, config.signaling.channel_capacity).await?;
    let (signals, mut inbound) = channel.split();
    tracing::info!("Connected to signaling relay {}", url);

    let stream = media.acquire_local_media(&config.media).await?;
    tracing::info!("Capturing {} local track(s)", stream.len());

    let session =
        PeerSession::connect(config.session_config(), &config.rtc, signals, events.clone())
            .await?;
    media.attach_to(session.clone()).await?;
    tokio::spawn(log_events(events.subscribe()));

    if session.role() == Role::Caller {
        session.create_offer().await?;
    } else {
        tracing::info!("Waiting for the remote offer");
    }

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };
    tokio::pin!(shutdown_signal);

    let mut state = session.watch_signaling_state();
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                session.hangup().await?;
                break;
            }
            message = inbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = session.handle_signal(message).await {
                        tracing::warn!("Failed to handle signal: {}", e);
                    }
                }
                None => {
                    tracing::warn!("Signaling connection lost");
                    session.close().await?;
                    break;
                }
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == SignalingState::Closed {
                    break;
                }
            }
        }
    }

    media.stop_all().await;
    tracing::info!("Call ended");
    Ok(())
}

/// Log session events as they arrive
async fn log_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                tracing::info!("Event: {}", event.event_name());
                if let Ok(json) = serde_json::to_string(&event) {
                    tracing::debug!("{}", json);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event log lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(feature = "host-capture")]
fn capture_provider(synthetic: bool) -> Arc<dyn CaptureProvider> {
    if synthetic {
        Arc::new(SyntheticCaptureProvider::new())
    } else {
        Arc::new(rtc_call::media::HostCaptureProvider::new())
    }
}

#[cfg(not(feature = "host-capture"))]
fn capture_provider(synthetic: bool) -> Arc<dyn CaptureProvider> {
    if !synthetic {
        tracing::warn!("Built without host-capture; using synthetic devices");
    }
    Arc::new(SyntheticCaptureProvider::new())
}

/// Initialize logging with CLI arguments
fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Build filter string based on effective level
    let filter = match effective_level {
        LogLevel::Error => "rtc_call=error,webrtc=error",
        LogLevel::Warn => "rtc_call=warn,webrtc=warn",
        LogLevel::Info => "rtc_call=info,webrtc=warn",
        LogLevel::Verbose => "rtc_call=debug,webrtc=warn",
        LogLevel::Debug => "rtc_call=debug,webrtc=info",
        LogLevel::Trace => "rtc_call=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
