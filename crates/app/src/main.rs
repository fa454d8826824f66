use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use trackwatch_core::{AccessMode, ActivitySignal, AppConfig, TrackIdentity, TrackSnapshot, Tuning};
use trackwatch_engine::{
    estimate_start_offset, Engine, EngineEvent, PollGate, PollOutcome,
};
use trackwatch_upstream::{HttpClient, RecentTracksApi, UpstreamError};

#[derive(Parser, Debug)]
#[command(
    name = "trackwatch",
    about = "Recent-tracks polling -> playback state engine -> JSON facet"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run,
    Doctor,
    Status,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

/// Results of fire-and-forget background fetches, funneled back to the
/// single writer.
enum BackgroundWrite {
    Offset {
        identity: TrackIdentity,
        offset_ms: u64,
    },
    TrackDuration {
        identity: TrackIdentity,
        duration_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg).await
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Run => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path).await
        }
    }
}

async fn run(mut cfg: AppConfig, cfg_path: PathBuf) -> Result<()> {
    let mut api = Arc::new(HttpClient::from_config(&cfg.username, &cfg.upstream)?);
    let mut engine = Engine::new(cfg.tuning.clone());

    info!(user = %cfg.username, "trackwatch started");

    // Startup counts as activity so the first polls use the responsive
    // tiers instead of the idle one.
    engine.record_activity(ActivitySignal::External, Instant::now());

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(
        cfg_path.clone(),
        cfg.intervals.file_watch_poll_ms,
        reload_tx,
    )
    .await?;

    let (bg_tx, mut bg_rx) = mpsc::channel::<BackgroundWrite>(8);
    let mut activity_rx = spawn_activity_listener()?;

    let mut facet_ticker =
        tokio::time::interval(Duration::from_millis(cfg.intervals.facet_refresh_ms.max(100)));
    facet_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut next_poll_in = Duration::from_secs(0);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(next_poll_in) => {
                let now = Instant::now();
                match engine.begin_poll(now) {
                    PollGate::Skip { retry_in } => {
                        next_poll_in = retry_in;
                    }
                    PollGate::Proceed { mode } => {
                        let outcome = match api.latest_snapshot(mode).await {
                            Ok(snapshot) => PollOutcome::Snapshot(snapshot),
                            Err(err) => PollOutcome::Failed(err),
                        };
                        let out = engine.observe(outcome, Instant::now());
                        next_poll_in = out.next_poll_in;

                        if let Some(track) = out.estimate_for {
                            spawn_estimator(
                                Arc::clone(&api),
                                engine.access_mode(),
                                track,
                                cfg.upstream.history_limit,
                                cfg.tuning.clone(),
                                bg_tx.clone(),
                            );
                        }
                        if let Some((artist, name)) = out.fetch_duration_for {
                            spawn_duration_fetch(
                                Arc::clone(&api),
                                engine.access_mode(),
                                artist,
                                name,
                                bg_tx.clone(),
                            );
                        }

                        if !out.events.is_empty() {
                            for event in &out.events {
                                log_event(event);
                            }
                            emit_facet(&engine);
                        }
                    }
                }
            }
            Some(write) = bg_rx.recv() => {
                let applied = match write {
                    BackgroundWrite::Offset { identity, offset_ms } => {
                        engine.apply_estimated_offset(&identity, offset_ms)
                    }
                    BackgroundWrite::TrackDuration { identity, duration_ms } => {
                        engine.apply_duration(&identity, duration_ms)
                    }
                };
                if applied {
                    emit_facet(&engine);
                }
            }
            _ = facet_ticker.tick(), if engine.ticker_active() => {
                emit_facet(&engine);
            }
            Some(signal) = activity_rx.recv() => {
                engine.record_activity(signal, Instant::now());
            }
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(new_cfg) => {
                            cfg = new_cfg;
                            engine.update_tuning(cfg.tuning.clone());
                            match HttpClient::from_config(&cfg.username, &cfg.upstream) {
                                Ok(client) => api = Arc::new(client),
                                Err(err) => error!(error = %err, "keeping previous upstream client"),
                            }
                            info!("configuration reloaded");
                            next_poll_in = Duration::from_secs(0);
                        }
                        Err(err) => {
                            error!(error = %err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn spawn_estimator(
    api: Arc<HttpClient>,
    mode: AccessMode,
    track: TrackSnapshot,
    history_limit: u32,
    tuning: Tuning,
    tx: mpsc::Sender<BackgroundWrite>,
) {
    tokio::spawn(async move {
        let identity = track.identity();
        let offset_ms =
            estimate_start_offset(api.as_ref(), mode, &track, history_limit, &tuning).await;
        let _ = tx.send(BackgroundWrite::Offset { identity, offset_ms }).await;
    });
}

fn spawn_duration_fetch(
    api: Arc<HttpClient>,
    mode: AccessMode,
    artist: String,
    name: String,
    tx: mpsc::Sender<BackgroundWrite>,
) {
    tokio::spawn(async move {
        match api.track_duration(mode, &artist, &name).await {
            Ok(Some(duration_ms)) => {
                let identity = TrackIdentity::new(&name, &artist);
                let _ = tx
                    .send(BackgroundWrite::TrackDuration {
                        identity,
                        duration_ms,
                    })
                    .await;
            }
            Ok(None) => {}
            Err(err) => {
                // Non-fatal: the facet falls back to its fixed window.
                warn!(error = %err, %artist, %name, "duration lookup failed");
            }
        }
    });
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::TrackChanged { identity } => info!(%identity, "now playing"),
        EngineEvent::PlaybackStopped => info!("playback stopped"),
        EngineEvent::Paused => info!("paused"),
        EngineEvent::Resumed => info!("resumed"),
        EngineEvent::SwitchedToMediated => info!("now polling through the mediated endpoint"),
    }
}

fn emit_facet(engine: &Engine) {
    let facet = engine.facet(Instant::now());
    match serde_json::to_string(&facet) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(error = %err, "failed to serialize facet"),
    }
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== trackwatch doctor ==");
    println!("Tracked user: {}", cfg.username);

    let api = HttpClient::from_config(&cfg.username, &cfg.upstream)?;

    for mode in [AccessMode::Direct, AccessMode::Mediated] {
        match api.latest_snapshot(mode).await {
            Ok(Some(track)) => println!(
                "{mode:?} endpoint: reachable ({} - {}{})",
                track.artist_name,
                track.name,
                if track.is_now_playing { ", live" } else { "" }
            ),
            Ok(None) => println!("{mode:?} endpoint: reachable (no recent tracks)"),
            Err(UpstreamError::VisibilityRestricted) => {
                println!("{mode:?} endpoint: visibility restricted")
            }
            Err(err) => println!("{mode:?} endpoint: {err}"),
        }
    }

    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let api = HttpClient::from_config(&cfg.username, &cfg.upstream)?;

    let snapshot = match api.latest_snapshot(AccessMode::Direct).await {
        Err(UpstreamError::VisibilityRestricted) => {
            api.latest_snapshot(AccessMode::Mediated).await?
        }
        other => other?,
    };

    match snapshot {
        Some(track) => {
            println!("track: {} - {}", track.artist_name, track.name);
            if !track.album_name.is_empty() {
                println!("album: {}", track.album_name);
            }
            println!("live: {}", track.is_now_playing);
            if let Some(uts) = track.scrobbled_at_unix {
                println!("scrobbled_at: {uts}");
            }
        }
        None => println!("track: <none>"),
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("trackwatch").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// SIGUSR1 is the activity ingestion point: external integrations ping the
/// daemon when the user interacts with whatever is showing the facet.
fn spawn_activity_listener() -> Result<mpsc::Receiver<ActivitySignal>> {
    let (tx, rx) = mpsc::channel::<ActivitySignal>(4);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sig = signal(SignalKind::user_defined1())
            .context("failed to install SIGUSR1 handler")?;
        tokio::spawn(async move {
            while sig.recv().await.is_some() {
                let _ = tx.send(ActivitySignal::External).await;
            }
        });
    }

    #[cfg(not(unix))]
    drop(tx);

    Ok(rx)
}

async fn spawn_reload_watchers(path: PathBuf, poll_ms: u64, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        let sleep = Duration::from_millis(poll_ms.max(2_000));
        loop {
            tokio::time::sleep(sleep).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                let _ = tx_poll.send(()).await;
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("TRACKWATCH_USERNAME") {
        if !v.trim().is_empty() {
            cfg.username = v;
        }
    }
    if let Ok(v) = std::env::var("TRACKWATCH_API_KEY") {
        if !v.trim().is_empty() {
            cfg.upstream.api_key = v;
        }
    }
    if let Ok(v) = std::env::var("TRACKWATCH_SESSION_KEY") {
        if !v.trim().is_empty() {
            cfg.upstream.session_key = Some(v);
        }
    }
    if let Ok(v) = std::env::var("TRACKWATCH_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
}
