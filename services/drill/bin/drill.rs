//! Main Entrypoint for the Daily French Drill
//!
//! `drill run` (the default) is meant to be invoked once a day, e.g. from a scheduled CI
//! job. It:
//! 1. Loads configuration from the environment.
//! 2. Loads the curriculum, the learner state and the episode log.
//! 3. Builds the generation, encoding and publishing services.
//! 4. Runs the daily drill and commits the results only if every step succeeded.
//!
//! The other subcommands inspect or adjust the learner state without generating anything.

use anyhow::Context;
use clap::{Parser, Subcommand};
use obsede_core::{
    CoreError,
    brainstorm::{CurriculumService, LLMCurriculumService},
    curriculum::Curriculum,
    drill::{self, DailyDrill, DrillServices},
    episode::EpisodeLog,
    llm_client::GenerationClient,
    prompts::PromptLibrary,
    selector::Selection,
    state::LearnerState,
    storage::AudioStore,
};
use obsede_drill::{
    audio_utils::FfmpegEncoder,
    config::Config,
    feed::RssFeed,
    gemini::GeminiClient,
    storage::{DriveStorage, LocalStorage},
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "drill", version)]
#[command(about = "Generates and publishes the daily French listening and reading drill", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Generate, publish and record today's drill
    Run,
    /// Show what today's run would study, without generating or saving anything
    Plan,
    /// Show level, XP, status, streak and the active chain
    Status,
    /// Move the learner to the next CEFR level with a fresh XP counter
    Promote,
    /// Re-render the RSS feed from the episode log
    Feed,
}

fn describe(selection: Option<&Selection>) -> String {
    match selection {
        Some(s) => format!("{} [{}] ({:?})", s.label(), s.category, s.source),
        None => "exhausted (a new topic would be brainstormed)".to_string(),
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let paths = config.drill_paths();
    let api_key = config.require_api_key()?;
    let prompts = Arc::new(PromptLibrary::load(&config.prompts_path)?);

    let generator: Arc<dyn GenerationClient> = Arc::new(GeminiClient::new(
        api_key,
        config.text_model.clone(),
        config.tts_model.clone(),
    ));
    let curriculum_service: Arc<dyn CurriculumService> =
        Arc::new(LLMCurriculumService::new(generator.clone(), prompts.clone()));
    let store: Arc<dyn AudioStore> = match &config.drive {
        Some(credentials) => {
            info!("Publishing audio to Google Drive.");
            Arc::new(DriveStorage::new(credentials))
        }
        None => {
            info!("Drive credentials not configured, publishing audio from the content directory.");
            Arc::new(LocalStorage::new(&config.content_dir, &config.public_base_url))
        }
    };
    let services = DrillServices {
        generator,
        curriculum_service,
        encoder: Arc::new(FfmpegEncoder::new(&config.content_dir)),
        store,
        prompts,
    };

    let state = LearnerState::load(&paths.state).context("Failed to load the learner state")?;
    let mut curriculum = Curriculum::load(&paths.curriculum).context("Failed to load the curriculum")?;
    let today = drill::today();

    let outcome = match DailyDrill::new(services).run(state, &mut curriculum, today).await {
        Ok(outcome) => outcome,
        Err(err) => match err.downcast_ref::<CoreError>() {
            Some(CoreError::AlreadyRan(date)) => {
                info!(%date, "Today's drill is already published, nothing to do");
                return Ok(());
            }
            _ => return Err(err),
        },
    };
    let mut log = EpisodeLog::load(&paths.episodes);
    let feed = RssFeed::new(config.public_base_url.clone());
    let state = drill::commit(outcome, &mut log, &feed, &paths)?;

    info!(
        level = %state.current_level,
        xp = state.xp_in_level,
        status = %state.status,
        streak = state.day_streak,
        "Daily drill complete"
    );
    Ok(())
}

fn plan(config: &Config) -> anyhow::Result<()> {
    let paths = config.drill_paths();
    let state = LearnerState::load(&paths.state)?;
    let curriculum = Curriculum::load(&paths.curriculum)?;

    let (status, listening, reading, review) = drill::preview(&state, &curriculum, rand::random());
    println!("Status:    {status} ({} {}/{} XP)", state.current_level, state.xp_in_level, state.current_level.gauntlet_threshold());
    if review.is_empty() {
        println!("Listening: {}", describe(listening.as_ref()));
        println!("Reading:   {}", describe(reading.as_ref()));
    } else {
        println!("Gauntlet review ({} topics):", review.len());
        for topic in review {
            println!("  - {topic}");
        }
    }
    Ok(())
}

fn status(config: &Config) -> anyhow::Result<()> {
    let mut state = LearnerState::load(config.drill_paths().state)?;
    let status = state.refresh_status();
    println!("Level:     {}", state.current_level);
    println!("XP:        {}/{}", state.xp_in_level, state.current_level.gauntlet_threshold());
    println!("Status:    {status}");
    println!("Streak:    {} day(s), last run {}", state.day_streak, state.last_run_date);
    println!("Advanced:  {}", if state.allow_advanced() { "unlocked" } else { "locked" });
    match &state.current_chain {
        Some(chain) => println!(
            "Chain:     {} / {} ({}/{}) [{}]",
            chain.topic_name, chain.subtopic_id, chain.current_episode, chain.total_episodes, chain.category
        ),
        None => println!("Chain:     none"),
    }
    Ok(())
}

fn promote(config: &Config) -> anyhow::Result<()> {
    let path = config.drill_paths().state;
    let mut state = LearnerState::load(&path)?;
    let previous = state.current_level;
    let next = state.promote()?;
    state.save(&path)?;
    info!(from = %previous, to = %next, "Learner promoted");
    println!("Promoted from {previous} to {next}.");
    Ok(())
}

fn feed(config: &Config) -> anyhow::Result<()> {
    let paths = config.drill_paths();
    let log = EpisodeLog::load(&paths.episodes);
    drill::write_feed(log.episodes(), &RssFeed::new(config.public_base_url.clone()), &paths.feed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // --- 3. Dispatch ---
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Plan => plan(&config),
        Command::Status => status(&config),
        Command::Promote => promote(&config),
        Command::Feed => feed(&config),
    }
}
