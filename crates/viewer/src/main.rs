//! Follow a ChessLink game live from the terminal.
//!
//! Usage: chesslink-viewer <game_id> [--port serial-port | --tcp host:port |
//!        --device path | --replay file.pgn [--delay-ms N]] [--export out.pgn]
//!        chesslink-viewer --list-ports
//!
//! Without a source flag the game server is polled for live positions.
//! `--port` first has the server open the board on that serial port.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use chesslink_core::pgn::{export_pgn, pgn_file_name};
use chesslink_sync::{ConnectionPhase, GameService, LiveSession, SourceDescriptor};
use chesslink_viewer::clients::game_server::GameServerClient;
use chesslink_viewer::config::ViewerConfig;
use chesslink_viewer::observer::LogObserver;
use chesslink_viewer::transports::{FenLineTransport, FenSource, PgnReplayTransport};

const USAGE: &str = "usage: chesslink-viewer <game_id> [--port serial-port | --tcp host:port | --device path | --replay file.pgn [--delay-ms N]] [--export out.pgn]";

enum SourceArg {
    Poll { port: Option<String> },
    Tcp(String),
    Device(PathBuf),
    Replay { path: PathBuf, delay: Duration },
}

enum Command {
    ListPorts,
    Follow(Args),
}

struct Args {
    game_id: String,
    source: SourceArg,
    export: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--list-ports") {
        return Ok(Command::ListPorts);
    }
    let mut game_id = None;
    let mut source = SourceArg::Poll { port: None };
    let mut replay_delay = Duration::from_millis(1000);
    let mut export = None;

    let mut i = 0;
    while i < args.len() {
        let value = || args.get(i + 1).cloned().context(format!("{} needs a value", args[i]));
        match args[i].as_str() {
            "--port" => {
                source = SourceArg::Poll {
                    port: Some(value()?),
                };
                i += 1;
            }
            "--tcp" => {
                source = SourceArg::Tcp(value()?);
                i += 1;
            }
            "--device" => {
                source = SourceArg::Device(PathBuf::from(value()?));
                i += 1;
            }
            "--replay" => {
                source = SourceArg::Replay {
                    path: PathBuf::from(value()?),
                    delay: replay_delay,
                };
                i += 1;
            }
            "--delay-ms" => {
                let ms: u64 = value()?.parse().context("--delay-ms must be a number")?;
                replay_delay = Duration::from_millis(ms);
                i += 1;
            }
            "--export" => {
                export = Some(PathBuf::from(value()?));
                i += 1;
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            id => game_id = Some(id.to_string()),
        }
        i += 1;
    }

    if let SourceArg::Replay { delay, .. } = &mut source {
        *delay = replay_delay;
    }
    let Some(game_id) = game_id else {
        bail!(USAGE);
    };
    Ok(Command::Follow(Args {
        game_id,
        source,
        export,
    }))
}

fn descriptor(source: SourceArg) -> anyhow::Result<SourceDescriptor> {
    Ok(match source {
        SourceArg::Poll { port } => SourceDescriptor::Poll { port },
        SourceArg::Tcp(addr) => SourceDescriptor::Push(Box::new(FenLineTransport::new(FenSource::Tcp(addr)))),
        SourceArg::Device(path) => {
            SourceDescriptor::Push(Box::new(FenLineTransport::new(FenSource::Device(path))))
        }
        SourceArg::Replay { path, delay } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            SourceDescriptor::Push(Box::new(PgnReplayTransport::from_pgn(&text, delay)?))
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let command = parse_args()?;
    let config = ViewerConfig::from_env();
    tracing::info!("Using game server at {}", config.game_server_url);

    let client = Arc::new(GameServerClient::new(&config)?);
    let args = match command {
        Command::Follow(args) => args,
        Command::ListPorts => {
            for port in client.list_ports().await? {
                println!(
                    "{}\t{}\t{}",
                    port.device,
                    port.description.as_deref().unwrap_or("-"),
                    port.manufacturer.as_deref().unwrap_or("-")
                );
            }
            return Ok(());
        }
    };
    let session = LiveSession::start(&args.game_id, client, config.sync.clone(), Arc::new(LogObserver))
        .await
        .with_context(|| format!("loading game {}", args.game_id))?;

    let finished = session.synchronizer().result().is_terminal();
    let (handle, task) = session.spawn();

    if finished {
        tracing::info!("Game {} is already finished, not connecting", args.game_id);
    } else {
        let phase = handle.connect(descriptor(args.source)?).await?;
        if phase != ConnectionPhase::Connected {
            tracing::warn!("Live source unavailable, showing the stored game only");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown().await;
    let game = task.await?;

    if let (Some(path), Some(game)) = (args.export, game) {
        match export_pgn(&game) {
            Some(pgn) => {
                let path = if path.is_dir() {
                    path.join(pgn_file_name(&game.metadata))
                } else {
                    path
                };
                std::fs::write(&path, pgn).with_context(|| format!("writing {}", path.display()))?;
                tracing::info!("Wrote {}", path.display());
            }
            None => tracing::warn!("No moves to export"),
        }
    }

    Ok(())
}
