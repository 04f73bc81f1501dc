//! Headless call peer
//!
//! Connects to the signaling server and either places a call or waits to
//! answer one, using synthetic media and logging surfaces.
//!
//! # Usage
//!
//! ```bash
//! # Wait for an incoming offer
//! cargo run --bin alloallo-call -- --signaling-url ws://localhost:8080/ws
//!
//! # Register with the directory and call peerB
//! cargo run --bin alloallo-call -- --register peerA --caller peerA --callee peerB
//!
//! # List users available to call
//! cargo run --bin alloallo-call -- --list-users
//! ```

use alloallo_webrtc::{
    CallConfig, CallEvent, CallOrchestrator, DirectoryClient, LogSurface, MediaConstraints,
    SyntheticCapture, TurnServerConfig,
};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Alloallo call peer
///
/// One-to-one WebRTC call negotiation over a WebSocket signaling server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket signaling URL
    #[arg(
        long,
        default_value = "ws://localhost:8080/ws",
        env = "ALLOALLO_SIGNALING_URL"
    )]
    signaling_url: String,

    /// Directory API base URL
    #[arg(
        long,
        default_value = "http://localhost:8080/api/users",
        env = "ALLOALLO_DIRECTORY_URL"
    )]
    directory_url: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "ALLOALLO_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "ALLOALLO_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Delay before reconnecting a closed signaling connection
    #[arg(long, default_value_t = 3000, env = "ALLOALLO_RECONNECT_DELAY_MS")]
    reconnect_delay_ms: u64,

    /// Identifier of this peer in outgoing offers
    #[arg(long, default_value = "peerA", env = "ALLOALLO_CALLER")]
    caller: String,

    /// Peer to call; without it this peer waits for an offer
    #[arg(long, env = "ALLOALLO_CALLEE")]
    callee: Option<String>,

    /// Register this username with the directory before connecting
    #[arg(long, env = "ALLOALLO_REGISTER")]
    register: Option<String>,

    /// Print the users available to call and exit
    #[arg(long, default_value_t = false)]
    list_users: bool,

    /// Send audio only
    #[arg(long, default_value_t = false, env = "ALLOALLO_AUDIO_ONLY")]
    audio_only: bool,
}

/// Parse TURN server string (format: turn:host:port:username:password or turns:host:port:username:password)
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    // Password may contain colons
    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        credential: parts[4..].join(":"),
    })
}

fn build_config_from_args(args: &Args) -> Result<CallConfig, Box<dyn std::error::Error>> {
    let turn_servers = args
        .turn_servers
        .iter()
        .map(|s| parse_turn_server(s))
        .collect::<Result<Vec<_>, _>>()?;

    let media = if args.audio_only {
        MediaConstraints::audio_only()
    } else {
        MediaConstraints::default()
    };

    let mut config = CallConfig::default()
        .with_signaling_url(&args.signaling_url)
        .with_directory_url(&args.directory_url)
        .with_turn_servers(turn_servers)
        .with_reconnect_delay_ms(args.reconnect_delay_ms)
        .with_media(media)
        .with_parties(&args.caller, args.callee.as_deref().unwrap_or("peerB"));
    config.stun_servers = args.stun_servers.clone();

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let shutdown = Arc::new(Notify::new());
    let shutdown_requested = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        let shutdown_requested = Arc::clone(&shutdown_requested);
        ctrlc::set_handler(move || {
            if shutdown_requested.swap(true, Ordering::SeqCst) {
                eprintln!("Shutdown already in progress, forcing exit");
                std::process::exit(0);
            }
            eprintln!("Ctrl+C received, hanging up");
            shutdown.notify_one();
        })?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("alloallo-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown))
}

async fn async_main(args: Args, shutdown: Arc<Notify>) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Alloallo call peer starting");

    let config = build_config_from_args(&args)?;
    info!(
        signaling_url = %config.signaling_url,
        stun_servers = config.stun_servers.len(),
        turn_servers = config.turn_servers.len(),
        reconnect_delay_ms = config.reconnect_delay_ms,
        "Configuration loaded"
    );

    if args.list_users || args.register.is_some() {
        let directory = DirectoryClient::new(&config.directory_url)?;
        if let Some(username) = &args.register {
            let response = directory.register(username).await?;
            info!(%username, %response, "Registered with directory");
        }
        if args.list_users {
            for user in directory.available_users().await? {
                println!("{}", user.username);
            }
            return Ok(());
        }
    }

    let callee = args.callee.clone();
    let orchestrator = CallOrchestrator::new(config, Arc::new(SyntheticCapture::default()))?;
    tokio::spawn(log_events(orchestrator.subscribe()));

    if let Err(e) = orchestrator.connect().await {
        warn!("Signaling server unreachable, retrying in the background: {}", e);
    }

    let local = Arc::new(LogSurface::new("local"));
    let remote = Arc::new(LogSurface::new("remote"));
    let outcome = match callee {
        Some(_) => orchestrator.start_call(local, remote).await,
        None => orchestrator.prepare_to_answer(local, remote).await,
    };
    if let Err(e) = outcome {
        error!("Call setup failed: {}", e);
    }

    shutdown.notified().await;
    orchestrator.shutdown().await;
    info!("Call peer stopped");
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<CallEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Some(message) = event.user_message() {
                    eprintln!("{}", message);
                }
                info!(?event, "Call event");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Call event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,alloallo_webrtc=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
