//! Realtime CLI - issue calls and watch events on a realtime session.
//!
//! See the `realtime_rpc` library for the engine itself.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use realtime_rpc::{Session, SessionConfig};
use serde_json::{Map, Value};

#[derive(Parser)]
#[command(name = "realtime")]
#[command(version)]
#[command(about = "Persistent realtime session client")]
struct Cli {
    /// Configuration file (defaults to <config dir>/realtime/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Peer URL, overriding the configuration
    #[arg(long, global = true)]
    url: Option<String>,

    /// Send plain JSON text frames
    #[arg(long, global = true)]
    plain: bool,

    /// Extra handshake header as NAME=VALUE (repeatable)
    #[arg(long = "header", global = true, value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, perform one call and print the result
    Call {
        /// Method name (sent as "<role>.<method>")
        method: String,
        /// Parameters as JSON
        params: Option<String>,
    },
    /// Connect and print remote events until Ctrl-C
    Listen {
        /// Event names to print
        #[arg(required = true)]
        events: Vec<String>,
        /// Only print events addressed to these rooms
        #[arg(long = "room")]
        rooms: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config.url.clone_from(url);
    }
    if cli.plain {
        config.encrypt = false;
    }
    config.headers.extend(cli.headers.iter().cloned());
    config.validate()?;
    Ok(config)
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}

/// Call parameters; an omitted argument sends `{}`.
fn parse_params(raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("Parameters must be valid JSON"),
        None => Ok(Value::Object(Map::new())),
    }
}

async fn run_call(config: SessionConfig, method: &str, params: Option<&str>) -> Result<()> {
    let params = parse_params(params)?;

    let mut session = Session::websocket(config)?;
    session.connect().await?;
    let result = session.call(method, params).await;
    session.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

async fn run_listen(config: SessionConfig, events: Vec<String>, rooms: Vec<String>) -> Result<()> {
    let mut session = Session::websocket(config)?;
    let rooms = Arc::new(rooms);

    for event in events {
        let rooms = Arc::clone(&rooms);
        let name = event.clone();
        session.on_remote(&event, move |payload, room| {
            if !rooms.is_empty() && !room.is_some_and(|r| rooms.iter().any(|want| want == r)) {
                return;
            }
            match room {
                Some(room) => println!("[{room}] {name}: {payload}"),
                None => println!("{name}: {payload}"),
            }
        });
    }
    session.on_room_created(|room| log::info!("Room {} created", room.name()));
    session.on_error(|info| log::warn!("Connection error: {}", info));
    session.on_closed(|reason| log::warn!("Connection closed: {}", reason));

    session.connect().await?;
    log::info!("Connected, listening (Ctrl-C to stop)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    session.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Call { method, params } => run_call(config, &method, params.as_deref()).await,
        Commands::Listen { events, rooms } => run_listen(config, events, rooms).await,
    }
}
