use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Context;
use crossbeam_channel::{select, Receiver};
use sysinfo::System;

use cricket_live::capture::{CaptureManager, SyntheticCamera};
use cricket_live::career::{CareerEngine, LeaderboardCategory};
use cricket_live::config::{Config, Preferences};
use cricket_live::detection::{BoundingBox, DetectionEngine, Point, RawDetection, ScriptedModel};
use cricket_live::error::UserMessage;
use cricket_live::messaging::{EventBus, PipelineEvent, ScoreUpdate, UpdateKind};
use cricket_live::pipeline::{FrameLoop, FramePipeline, LoopOptions};
use cricket_live::prediction::PredictionEngine;
use cricket_live::rules::RuleEngine;
use cricket_live::scoring::{LiveScoringEngine, ManualDelivery, ScoringOptions};
use cricket_live::state::{Lineup, MatchSession};
use cricket_live::store::{CreatePlayerRequest, CreateTeamRequest, MatchStore, PlayerRole, Team};
use cricket_live::AppResult;

const LOG_TARGET_STARTUP: &str = "cricket_live::startup";

/// Initialize tracing with file rotation
///
/// Logs go to `<config_dir>/CricketLive/logs/cricket-live.YYYY-MM-DD.log`.
/// Debug builds also log to the console.
fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = Config::log_dir().unwrap_or_else(|_| std::path::PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "cricket-live.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting Cricket Live v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);

    let cpus = System::new_all().cpus().len();
    tracing::debug!(target: LOG_TARGET_STARTUP, "Logical CPUs: {}", cpus);
}

/// Six, four and bowled, each followed by enough empty frames to clear the
/// rule engine cooldown at 30 fps
fn demo_script() -> Vec<Vec<RawDetection>> {
    let ball = |x: f32, y: f32| {
        RawDetection::new(
            "sports ball",
            0.9,
            BoundingBox::centered_at(Point::new(x, y), 12.0, 12.0),
        )
    };
    let stumps = RawDetection::new(
        "stumps",
        0.85,
        BoundingBox::centered_at(Point::new(640.0, 420.0), 30.0, 80.0),
    );

    let mut script = vec![Vec::new(); 60];
    script[0] = vec![ball(640.0, 30.0)];
    script[20] = vec![ball(700.0, 650.0)];
    script[21] = vec![ball(20.0, 300.0)];
    script[40] = vec![ball(640.0, 420.0), stumps];
    script
}

fn find_or_create_team(store: &MatchStore, name: &str, players: &[&str]) -> AppResult<Team> {
    if let Some(team) = store.find_team_by_name(name) {
        return Ok(team);
    }

    let mut ids = Vec::with_capacity(players.len());
    for (index, player) in players.iter().enumerate() {
        let role = match index {
            0..=2 => PlayerRole::Batsman,
            3 => PlayerRole::AllRounder,
            _ => PlayerRole::Bowler,
        };
        let created = match store.find_player_by_name(player) {
            Some(existing) => existing,
            None => store
                .create_player(CreatePlayerRequest::new(*player, role))
                .with_context(|| format!("Failed to create player {}", player))?,
        };
        ids.push(created.id);
    }

    store
        .create_team(CreateTeamRequest::new(name).with_players(ids))
        .with_context(|| format!("Failed to create team {}", name))
}

fn open_store(config: &Config) -> AppResult<Arc<MatchStore>> {
    if std::env::args().any(|arg| arg == "--persist") {
        let dir = config.resolved_data_dir();
        let store = MatchStore::open_dir(&dir)
            .with_context(|| format!("Failed to open match data in {}", dir.display()))?;
        tracing::info!("Match data directory: {}", dir.display());
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(MatchStore::in_memory()))
    }
}

/// Drive the live session from the synthetic camera until the frame loop stops
///
/// Wickets reported while the loop runs send in the next batsman.
fn run_camera(
    config: &Config,
    session: &Arc<MatchSession>,
    updates_rx: &Receiver<ScoreUpdate>,
    batting_order: &mut VecDeque<String>,
) -> AppResult<()> {
    let detection = DetectionEngine::new(
        Box::new(ScriptedModel::new(demo_script())),
        config.detection.clone(),
    );
    let pipeline = FramePipeline::new(
        CaptureManager::new(SyntheticCamera::with_default_devices()),
        detection,
        RuleEngine::new(config.rules.clone()),
        Arc::clone(session),
    );

    let events = EventBus::new();
    let (pipeline_rx, pipeline_sub) = events.subscribe();

    let options = LoopOptions::from_frame_rate(config.capture.frame_rate.unwrap_or(30))
        .with_max_iterations(config.demo_frames);
    let frame_loop = FrameLoop::spawn(pipeline, &config.capture, options, events)
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .context("Failed to start live detection")?;

    loop {
        select! {
            recv(updates_rx) -> update => {
                let Ok(update) = update else { continue };
                println!("  [{}.{}] {}", update.over, update.ball, update.description);
                if update.kind == UpdateKind::Wicket {
                    match batting_order.pop_front() {
                        Some(next) => session.set_striker(next),
                        None => tracing::warn!("No batsmen left to send in"),
                    }
                }
            }
            recv(pipeline_rx) -> event => {
                let Ok(event) = event else { break };
                tracing::debug!("{}", event.description());
                if let PipelineEvent::StateChanged { new_state, .. } = event {
                    if new_state.is_stopped() {
                        break;
                    }
                }
            }
        }
    }
    pipeline_sub.unsubscribe();

    let report = frame_loop
        .join()
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .context("Frame loop failed")?;
    println!(
        "Frame loop: {} iterations, {} events, {} discarded ({:?})",
        report.iterations, report.events, report.discarded, report.stop_reason
    );
    report.latency.log_report();
    Ok(())
}

fn run() -> AppResult<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default config: {}", e);
            Config::default()
        }
    };

    let store = open_store(&config)?;
    let preferences = Preferences::load(store.kv()).context("Failed to load preferences")?;

    let home = find_or_create_team(
        &store,
        "Harbour Strikers",
        &["Arjun Rao", "Ben Walsh", "Chris Ndlovu", "Dev Patel", "Eli Moss"],
    )?;
    let away = find_or_create_team(
        &store,
        "Valley Titans",
        &["Femi Ade", "Gus Lee", "Hamza Khan", "Ivan Petrov", "Jake Storm"],
    )?;

    let engine = Arc::new(LiveScoringEngine::new(
        Arc::clone(&store),
        ScoringOptions::from(&preferences),
    ));
    let started = engine
        .start_match(&home.id, &away.id, preferences.default_overs)
        .context("Failed to start match")?;
    println!("{} vs {}: match {} is live", home.name, away.name, started.match_id);

    let mut batting_order: VecDeque<String> = home.player_ids.iter().cloned().collect();
    let (Some(striker), Some(non_striker)) = (batting_order.pop_front(), batting_order.pop_front())
    else {
        anyhow::bail!("{} needs at least two players", home.name);
    };
    let Some(bowler) = away.player_ids.last().cloned() else {
        anyhow::bail!("{} has no players", away.name);
    };
    let session = Arc::new(MatchSession::new(
        Arc::clone(&engine),
        Lineup::new(striker, bowler).with_non_striker(non_striker),
    ));

    let (updates_rx, updates_sub) = engine.subscribe_updates();
    if preferences.camera_detection {
        run_camera(&config, &session, &updates_rx, &mut batting_order)?;
    } else {
        tracing::info!("Camera detection is off; scoring manual deliveries only");
    }

    // Hand-entered deliveries the camera cannot see
    for delivery in [
        ManualDelivery::runs(1),
        ManualDelivery::wide(1),
        ManualDelivery::runs(2),
        ManualDelivery::no_ball(0),
    ] {
        session.record_manual(delivery).context("Failed to record manual delivery")?;
    }
    for update in updates_rx.try_iter() {
        println!("  [{}.{}] {}", update.over, update.ball, update.description);
    }
    updates_sub.unsubscribe();

    if let Some(score) = session.score() {
        println!("Score: {}", score.headline());
    }

    let lineup = session.lineup();
    let predictions = PredictionEngine::new(Arc::clone(&store));
    let next_ball = predictions.predict_next_ball(&lineup.striker_id, &lineup.bowler_id)?;
    println!(
        "Next ball: {} ({:.0}% confidence)",
        next_ball.outcome.as_str(),
        next_ball.confidence
    );
    let win = predictions.predict_winner(&started.match_id)?;
    println!(
        "Win probability: {} {:.0}% / {} {:.0}%",
        home.name, win.team_a_probability, away.name, win.team_b_probability
    );

    let summary = engine.end_match().context("Failed to end match")?;
    println!(
        "Result: {:?} {}",
        summary.winner,
        summary.win_margin.as_deref().unwrap_or("")
    );

    let careers = CareerEngine::load(Arc::clone(&store)).context("Failed to load careers")?;
    careers.update_all_careers().context("Failed to update careers")?;
    if let Some(top) = careers.get_leaderboard(LeaderboardCategory::AiRating).first() {
        careers.award_mvp(&top.player_id)?;
        println!("Player of the match: {}", top.name);
    }

    for recommendation in predictions.best_batting_order(&home.id)?.iter().take(3) {
        println!("  bat: {} ({})", recommendation.name, recommendation.reason);
    }

    println!("Leaderboard ({}):", LeaderboardCategory::Runs.as_str());
    for entry in careers.get_leaderboard(LeaderboardCategory::Runs).iter().take(5) {
        println!("  {:>2}. {:<16} {:>5.0}", entry.rank, entry.name, entry.value);
    }

    Ok(())
}

fn main() {
    initialize_tracing();
    log_runtime_environment();

    if let Err(e) = run() {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
