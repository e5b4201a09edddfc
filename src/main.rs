//! LanChat - Serverless LAN chat
//!
//! Command-line front end for the discovery and messaging engine.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lanchat::config::{self, Config};
use lanchat::discovery::resolve_local_ip;
use lanchat::network::resolve_host;
use lanchat::protocol::{self, derived_discovery_port};
use lanchat::{Engine, Envelope, EventSink, PeerRecord};

/// Ports announced to when the discovery port is derived from the TCP port
const CO_LOCATED_SPAN: u16 = 4;
const CO_LOCATED_BASE: u16 = 7000;

/// LanChat - serverless chat for the local network
#[derive(Parser)]
#[command(name = "lanchat")]
#[command(author = "LanChat Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Discover peers on the LAN and chat with them", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Engine settings shared by the commands that start one
#[derive(clap::Args, Debug, Clone)]
struct EngineArgs {
    /// Display name to announce
    #[arg(short, long)]
    name: Option<String>,

    /// TCP port for incoming messages
    #[arg(short, long)]
    port: Option<u16>,

    /// UDP discovery port (derived from --port when omitted)
    #[arg(short = 'u', long)]
    discovery_port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the LAN chat interactively
    Chat {
        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Listen for peers and print them
    Discover {
        #[command(flatten)]
        engine: EngineArgs,

        /// How long to listen (seconds)
        #[arg(short, long, default_value_t = 12)]
        timeout: u64,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show network information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Chat { engine } => {
            run_chat(apply_args(config, &engine)).await?;
        }
        Commands::Discover { engine, timeout } => {
            run_discovery(apply_args(config, &engine), timeout).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_network_info(&config).await;
        }
    }

    Ok(())
}

/// Overlay command-line flags on the file configuration
fn apply_args(mut config: Config, args: &EngineArgs) -> Config {
    if let Some(name) = &args.name {
        config.general.name = name.clone();
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    match (args.discovery_port, args.port) {
        (Some(discovery_port), _) => config.discovery.port = discovery_port,
        (None, Some(port)) => {
            // Co-located instances: 6000/7000, 6001/7001, ...
            config.discovery.port = derived_discovery_port(port);
            if config.discovery.broadcast_port.is_none() {
                config.discovery.broadcast_port = Some(CO_LOCATED_BASE);
            }
            if config.discovery.broadcast_port_span == 0 {
                config.discovery.broadcast_port_span = CO_LOCATED_SPAN;
            }
        }
        (None, None) => {}
    }
    config
}

/// Event sink printing to the terminal
struct ConsoleSink {
    name: String,
}

#[async_trait]
impl EventSink for ConsoleSink {
    async fn on_log(&self, text: String) {
        tracing::info!("{}", text);
    }

    async fn on_peer_list_update(&self, peers: Vec<PeerRecord>) {
        let online = peers.iter().filter(|p| p.is_online()).count();
        println!("\n[SYSTEM] Peers updated: {} online", online);
        print_peers(&peers);
        prompt();
    }

    async fn on_message(&self, envelope: Envelope) {
        if envelope.is_local() {
            return;
        }
        let message = &envelope.message;
        if message.sender != self.name {
            println!(
                "\n[{}] {} ({}): {}",
                envelope.kind, message.sender, message.lamport_clock, message.content
            );
            prompt();
        }
    }
}

fn prompt() {
    use std::io::Write;
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_peers(peers: &[PeerRecord]) {
    for peer in peers {
        println!(" - {} ({}) [{}]", peer.display_name, peer.key(), peer.status);
    }
}

/// Run the interactive chat
async fn run_chat(config: Config) -> anyhow::Result<()> {
    let sink = Arc::new(ConsoleSink {
        name: config.general.name.clone(),
    });
    let mut engine = Engine::new(config.engine_config(), sink);
    engine.start().await?;

    println!("\n========================================");
    println!("  LanChat started as {}", engine.name());
    println!("========================================");
    println!("  Address: {}", engine.local_ip().map(|ip| ip.to_string()).unwrap_or_default());
    println!("  TCP: {}  UDP: {}", config.network.port, config.discovery.port);
    println!("========================================");
    println!("Commands: /peers, /group <text>, /history, /exit");
    println!("Direct message: <ip[:port]|name> <text>\n");
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_command(&engine, line.trim()).await {
                    break;
                }
                prompt();
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    engine.stop().await?;
    tracing::info!("Chat stopped");

    Ok(())
}

/// Execute one input line; returns false to exit
async fn handle_command(engine: &Engine, cmd: &str) -> bool {
    if cmd.is_empty() {
        return true;
    }

    if cmd == "/exit" {
        println!("Exiting...");
        return false;
    }

    if cmd == "/peers" {
        println!("--- Peers ---");
        print_peers(&engine.peers());
        println!("-------------");
        return true;
    }

    if cmd == "/history" {
        for envelope in engine.messages() {
            let who = if envelope.is_local() { "me" } else { envelope.message.sender.as_str() };
            println!(
                "{:>4} [{}] {}: {}",
                envelope.message.lamport_clock, envelope.kind, who, envelope.message.content
            );
        }
        return true;
    }

    if let Some(content) = cmd.strip_prefix("/group ") {
        let content = content.trim();
        if !content.is_empty() {
            let count = engine.send_group(content).await;
            println!("Sent to {} peers.", count);
        }
        return true;
    }

    let Some((target, content)) = cmd.split_once(' ') else {
        println!("Invalid format. Use: IP CONTENT or IP:PORT CONTENT");
        return true;
    };

    match resolve_target(&engine.peers(), target).await {
        Some(addr) => match engine.send_unicast(addr, content.trim()).await {
            Ok(_) => println!("Sent."),
            Err(e) => println!("Failed to send: {}", e),
        },
        None => println!("Unknown peer: {}", target),
    }
    true
}

/// Match a typed target against the known peers
///
/// Accepts `ip:port`, a bare IP (the peer announcing from it, or the default
/// port), or a display name.
fn match_target(peers: &[PeerRecord], target: &str) -> Option<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Some(addr);
    }

    if let Ok(ip) = target.parse::<IpAddr>() {
        let mut at_address = peers.iter().filter(|p| p.address == ip);
        return match (at_address.next(), at_address.next()) {
            (Some(peer), None) => Some(peer.key()),
            _ => Some(SocketAddr::new(ip, protocol::DEFAULT_TCP_PORT)),
        };
    }

    let mut named = peers.iter().filter(|p| p.display_name == target);
    match (named.next(), named.next()) {
        (Some(peer), None) => Some(peer.key()),
        _ => None,
    }
}

async fn resolve_target(peers: &[PeerRecord], target: &str) -> Option<SocketAddr> {
    match match_target(peers, target) {
        Some(addr) => Some(addr),
        None => resolve_host(target, protocol::DEFAULT_TCP_PORT).await.ok(),
    }
}

/// Listen for announcements for a while and print what was found
async fn run_discovery(config: Config, timeout_secs: u64) -> anyhow::Result<()> {
    println!("Scanning for LanChat peers ({} seconds)...\n", timeout_secs);

    let mut engine = Engine::new(config.engine_config(), Arc::new(lanchat::TracingSink));
    engine.start().await?;
    tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
    let peers = engine.peers();
    engine.stop().await?;

    if peers.is_empty() {
        println!("No peers found.");
    } else {
        println!("Found {} peer(s):", peers.len());
        print_peers(&peers);
    }

    Ok(())
}

/// Print network information
async fn print_network_info(config: &Config) {
    println!("LanChat Network Information");
    println!("===========================\n");

    println!("Local address: {}", resolve_local_ip().await);
    println!("Display name: {}", config.general.name);
    println!("TCP port: {}", config.network.port);
    println!("Discovery port: {}", config.discovery.port);
    println!("Broadcast address: {}", config.discovery.broadcast_address);

    println!("\nDefault TCP Port: {}", protocol::DEFAULT_TCP_PORT);
    println!("Default Discovery Port: {}", protocol::DEFAULT_DISCOVERY_PORT);
    println!("Max Frame Size: {} bytes", protocol::MAX_FRAME_SIZE);
}
