//! Headless replay viewer
//!
//! Drives a viewer session at the configured render rate and reads playback
//! commands from stdin, one per line: the player keys (`j`, `k`, `l`, `.`,
//! `,`, `r`, `up`, `down`, `left`, `right`), `seek <fraction>`, `games`,
//! `open <game id>` and `q`.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use replay_viewer::config::ViewerConfig;
use replay_viewer::net::client::RemoteProvider;
use replay_viewer::net::protocol::GameId;
use replay_viewer::net::provider::ProviderInbox;
use replay_viewer::playback::{ControlAction, MonotonicTime, ViewerSession, ViewerStatus};

enum Command {
    Control(ControlAction),
    Seek(f64),
    ListGames,
    Open(GameId),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if let Some(action) = ControlAction::from_key(line) {
        return Some(Command::Control(action));
    }
    let mut parts = line.split_whitespace();
    match (parts.next()?, parts.next()) {
        ("seek", Some(fraction)) => fraction.parse().ok().map(Command::Seek),
        ("open", Some(game_id)) => game_id.parse().ok().map(Command::Open),
        ("games", None) => Some(Command::ListGames),
        ("q" | "quit", None) => Some(Command::Quit),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let mut config = ViewerConfig::load_or_default();
    if let Some(arg) = std::env::args().nth(1) {
        match arg.parse::<GameId>() {
            Ok(game_id) => config.game_id = Some(game_id),
            Err(_) => warn!("Ignoring invalid game id argument '{}'", arg),
        }
    }
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    let Some(game_id) = config.game_id else {
        anyhow::bail!("No game selected");
    };

    info!(
        "Replay Viewer v{}: game {} from {}",
        env!("CARGO_PKG_VERSION"),
        game_id,
        config.server_address
    );

    let inbox = ProviderInbox::new();
    let provider = RemoteProvider::connect(
        &tokio::runtime::Handle::current(),
        config.server_address.clone(),
        inbox.sender(),
    );
    let mut session =
        ViewerSession::new(provider, MonotonicTime::new(), config.engine_config(), game_id)?;

    let (command_tx, mut commands) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(command) => {
                    if command_tx.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}'", line.trim()),
            }
        }
    });

    let mut ticker = interval(Duration::from_millis(config.render_tick_ms()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Render loop started at {} Hz", config.render_rate);

    let mut last_status: Option<ViewerStatus> = None;
    let mut last_frame: Option<usize> = None;
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut shutdown_armed = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            command = commands.recv(), if stdin_open => {
                match command {
                    Some(Command::Control(action)) => {
                        if let Err(e) = session.apply(action) {
                            warn!("{:?} failed: {}", action, e);
                        }
                    }
                    Some(Command::Seek(fraction)) => session.seek_fraction(fraction),
                    Some(Command::ListGames) => session.provider_mut().list_games(),
                    Some(Command::Open(game_id)) => {
                        session.change_game(game_id);
                        last_frame = None;
                    }
                    Some(Command::Quit) => break,
                    // Keep playing without input
                    None => stdin_open = false,
                }
                continue;
            }
            result = &mut shutdown, if shutdown_armed => {
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        warn!("Failed to listen for Ctrl+C: {}", e);
                        shutdown_armed = false;
                        continue;
                    }
                }
            }
        }

        let status = session.tick(inbox.drain());
        if last_status.as_ref() != Some(&status) {
            info!("Status: {:?}", status);
            last_status = Some(status.clone());
        }

        if let (ViewerStatus::Ready, Some(engine)) = (&status, session.engine()) {
            let position = engine.position();
            if last_frame != Some(position.frame_index) {
                last_frame = Some(position.frame_index);
                let bytes = engine.current_frame().map_or(0, |frame| frame.len());
                info!(
                    "Frame {}/{} ({} bytes) rate {}x{}{}",
                    position.frame_index,
                    engine.frame_count(),
                    bytes,
                    engine.clock().rate(),
                    if engine.clock().is_paused() { " paused" } else { "" },
                    if engine.is_at_end() { " [end]" } else { "" },
                );
            }
        }
    }

    drop(session.end_session());
    info!("Viewer stopped");
    Ok(())
}
