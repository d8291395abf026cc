//! Soundboard CLI Application

mod console;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use console::Line;
use soundboard_core::domain::{
    Change, Command, ConfigManager, DeviceId, InitialState, OutputSlot, Persister, Session, SessionParts,
    SessionUpdate, SoundboardConfig, TrackId, TrackImporter, TrackStore,
};
use soundboard_infra::audio::{CpalEnumerator, CpalSink, DeviceWatcher, SymphoniaDecoder};
use soundboard_infra::input::{binding_name, KeyHook};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soundboard")]
#[command(about = "Play sounds on two outputs at once with global hotkeys", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding config.toml and stored tracks
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// List output devices and the slots they back
    Devices,
    /// List tracks with their hotkeys
    Tracks,
    /// Import sound files as tracks
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete a track
    Remove { id: String },
    /// Route an output slot to a device
    SetOutput {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        slot: u8,
        device: String,
    },
    /// Listen for hotkeys and take commands on stdin
    Run,
}

/// Session plus everything needed to save it
struct App {
    session: Session,
    persister: Persister,
    journal: mpsc::UnboundedReceiver<SessionUpdate>,
    config: SoundboardConfig,
    enumerator: Arc<CpalEnumerator>,
}

impl App {
    async fn open(config_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_dir = match config_dir {
            Some(dir) => dir,
            None => ConfigManager::default_config_dir()?,
        };
        let manager = ConfigManager::new(config_dir);
        let config = manager.load().await;
        let store = TrackStore::beside(&manager);
        let tracks = store.load_tracks(&config.tracks);

        let enumerator = Arc::new(CpalEnumerator::new());
        let parts = SessionParts {
            enumerator: enumerator.clone(),
            decoder: Arc::new(SymphoniaDecoder::new()),
            sink: Arc::new(CpalSink::new(*enumerator)),
        };
        let mut session = Session::new(
            parts,
            InitialState {
                assignment: config.outputs.clone(),
                tracks,
                stop_key: config.stop_key,
                escape: config.app.escape_key,
            },
        );
        let journal = session.journal();
        let persister = Persister::new(manager, store, config.clone());

        Ok(Self {
            session,
            persister,
            journal,
            config,
            enumerator,
        })
    }

    /// Save every change made so far
    async fn flush(&mut self) -> anyhow::Result<()> {
        while let Ok(update) = self.journal.try_recv() {
            self.persister.apply(&update).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let mut app = App::open(cli.config_dir).await?;

    match cli.command {
        CliCommand::Devices => {
            app.session.refresh_devices().await?;
            console::print_devices(&app.session.snapshot());
        }
        CliCommand::Tracks => console::print_tracks(&app.session.snapshot()),
        CliCommand::Add { files } => {
            let importer = TrackImporter::new(app.config.app.import_policy());
            for file in files {
                match importer.import(&file).await {
                    Ok(track) => {
                        println!("{}  {}", track.id, track.name);
                        app.session.add_track(track)?;
                    }
                    Err(e) => eprintln!("{}: {}", file.display(), e),
                }
            }
        }
        CliCommand::Remove { id } => {
            let track = app.session.remove_track(&TrackId::new(id))?;
            println!("Removed {}", track.name);
        }
        CliCommand::SetOutput { slot, device } => {
            let slot = OutputSlot::from_number(slot).ok_or_else(|| anyhow!("no output slot {}", slot))?;
            app.session.refresh_devices().await?;
            app.session
                .select_output(slot, DeviceId::new(device))
                .context("pick a device listed by `soundboard devices`")?;
            console::print_devices(&app.session.snapshot());
        }
        CliCommand::Run => return run(app).await,
    }

    app.flush().await
}

async fn run(app: App) -> anyhow::Result<()> {
    let App {
        session,
        persister,
        journal,
        config,
        enumerator,
    } = app;

    let watcher = DeviceWatcher::start(enumerator, config.app.device_poll_interval());

    let (key_tx, key_rx) = mpsc::unbounded_channel();
    let _hook = match KeyHook::start(key_tx) {
        Ok(hook) => Some(hook),
        Err(e) => {
            warn!(error = %e, "Hotkeys are unavailable, use the console instead");
            None
        }
    };

    let persisting = tokio::spawn(persister.run(journal));
    let reporting = tokio::spawn(report(session.subscribe()));

    let (command_tx, command_rx) = mpsc::channel(32);
    let running = tokio::spawn(session.run(key_rx, watcher.subscribe(), command_rx));

    info!("Soundboard running");
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        let command = match console::parse_line(&line) {
            Ok(Line::Empty) => continue,
            Ok(Line::Help) => {
                println!("{}", console::HELP);
                continue;
            }
            Ok(Line::Quit) => break,
            Ok(Line::Devices) => {
                console::print_devices(&snapshot(&command_tx).await?);
                continue;
            }
            Ok(Line::Tracks) => {
                console::print_tracks(&snapshot(&command_tx).await?);
                continue;
            }
            Ok(Line::Play(id)) => Command::Play(id),
            Ok(Line::Bind(id)) => Command::RebindTrack(id),
            Ok(Line::BindStop) => Command::RebindStop,
            Ok(Line::Cancel) => Command::CancelRebind,
            Ok(Line::Stop) => Command::StopAll,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if command_tx.send(command).await.is_err() {
            break;
        }
    }

    // The session may already be gone if the command channel closed
    let _ = command_tx.send(Command::Quit).await;
    running.await?;
    persisting.await?;
    reporting.await?;
    drop(watcher);

    info!("Soundboard stopped");
    Ok(())
}

async fn snapshot(commands: &mpsc::Sender<Command>) -> anyhow::Result<soundboard_core::domain::SessionSnapshot> {
    let (reply, snapshot) = oneshot::channel();
    commands
        .send(Command::Snapshot(reply))
        .await
        .map_err(|_| anyhow!("session has stopped"))?;
    Ok(snapshot.await?)
}

/// Echo binding changes so the user knows when a key was captured
async fn report(mut updates: broadcast::Receiver<SessionUpdate>) {
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match &update.change {
            Change::BindingChanged => {
                if let Some(prompt) = console::binding_prompt(&update.snapshot.binding) {
                    println!("{}", prompt);
                }
            }
            Change::TrackKeyChanged { track, key } => {
                println!("{} -> {}", track, binding_name(*key));
            }
            Change::StopKeyChanged(key) => println!("stop key -> {}", binding_name(*key)),
            Change::AssignmentChanged => {
                let a = &update.snapshot.assignment;
                println!(
                    "outputs: {} | {}",
                    a.slot1.as_ref().map(|d| d.as_str()).unwrap_or("none"),
                    a.slot2.as_ref().map(|d| d.as_str()).unwrap_or("none"),
                );
            }
            _ => {}
        }
    }
}
