//! Daily Orchestrator
//!
//! One invocation produces one day's drill: refresh the Training/Gauntlet status, pick
//! today's subtopics (or the Gauntlet review set), generate the listening script, the
//! audio and the reading lesson, publish the audio, and fold the results back into the
//! learner state.
//!
//! [`DailyDrill::run`] never writes the learner state, the episode log or the feed; it
//! hands back a [`DrillOutcome`] that [`commit`] persists in one go. A run that fails
//! anywhere before the commit leaves every one of those documents untouched. The only
//! write that can happen earlier is a brainstormed topic being added to the curriculum.

use crate::{
    CoreError,
    brainstorm::CurriculumService,
    curriculum::Curriculum,
    episode::{Episode, EpisodeLog, FeedRenderer},
    lesson::ReadingOutput,
    llm_client::{GenerationClient, parse_script},
    progress::ReviewItem,
    prompts::{PromptLibrary, format_topic_for_prompt},
    selector::{Selection, SelectionSource, Track, preview_track, resolve_chain, select_for_track},
    state::{Chain, LearnerState, Status},
    storage::{AudioEncoder, AudioStore},
    store,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum number of subtopics revisited in a Gauntlet run.
pub const GAUNTLET_REVIEW_SIZE: usize = 10;

/// Review topic used when the learner has no history yet.
pub const EMPTY_REVIEW_TOPIC: &str = "General French";

/// Where the run's documents live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrillPaths {
    pub curriculum: PathBuf,
    pub state: PathBuf,
    pub episodes: PathBuf,
    pub feed: PathBuf,
}

/// The collaborators a run needs, created once at startup.
#[derive(Clone)]
pub struct DrillServices {
    pub generator: Arc<dyn GenerationClient>,
    pub curriculum_service: Arc<dyn CurriculumService>,
    pub encoder: Arc<dyn AudioEncoder>,
    pub store: Arc<dyn AudioStore>,
    pub prompts: Arc<PromptLibrary>,
}

/// What today's run is going to teach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrillPlan {
    Training {
        listening: Selection,
        reading: Selection,
    },
    Gauntlet {
        review: Vec<String>,
    },
}

impl DrillPlan {
    pub fn listening_label(&self) -> String {
        match self {
            DrillPlan::Training { listening, .. } => listening.label(),
            DrillPlan::Gauntlet { review } => gauntlet_label(review),
        }
    }

    pub fn reading_label(&self) -> String {
        match self {
            DrillPlan::Training { reading, .. } => reading.label(),
            DrillPlan::Gauntlet { review } => gauntlet_label(review),
        }
    }
}

fn gauntlet_label(review: &[String]) -> String {
    format!("THE GAUNTLET: Review of {} topics", review.len())
}

/// The Gauntlet review set for the current progress, as prompt-ready strings.
pub fn review_topics(state: &LearnerState) -> Vec<String> {
    let review: Vec<String> = state
        .progress
        .review_set(GAUNTLET_REVIEW_SIZE)
        .iter()
        .map(ReviewItem::to_string)
        .collect();
    if review.is_empty() {
        vec![EMPTY_REVIEW_TOPIC.to_string()]
    } else {
        review
    }
}

/// Everything a successful run produced, ready to be committed.
#[derive(Debug, Clone)]
pub struct DrillOutcome {
    pub state: LearnerState,
    pub episode: Episode,
    pub plan: DrillPlan,
}

pub struct DailyDrill {
    services: DrillServices,
    rng: StdRng,
}

impl DailyDrill {
    pub fn new(services: DrillServices) -> Self {
        Self {
            services,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Uses a fixed seed for the random parts of selection.
    pub fn with_seed(services: DrillServices, seed: u64) -> Self {
        Self {
            services,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Decides what today's run teaches. `state.status` must already be refreshed.
    ///
    /// A stale listening chain is cleared on `state` as a side effect; like every other
    /// state change it only sticks if the run is committed.
    pub async fn plan(&mut self, state: &mut LearnerState, curriculum: &mut Curriculum) -> DrillPlan {
        if state.is_gauntlet() {
            return DrillPlan::Gauntlet {
                review: review_topics(state),
            };
        }

        let allow_advanced = state.allow_advanced();
        let chained = match &state.current_chain {
            Some(chain) => {
                let resolved = resolve_chain(chain, curriculum);
                if resolved.is_none() {
                    warn!(?chain, "Active chain no longer matches the curriculum, clearing it");
                }
                resolved
            }
            None => None,
        };
        let listening = match chained {
            Some(selection) => selection,
            None => {
                state.clear_chain();
                select_for_track(
                    Track::Listening,
                    curriculum,
                    &state.progress,
                    allow_advanced,
                    self.services.curriculum_service.as_ref(),
                    &mut self.rng,
                )
                .await
            }
        };
        let reading = select_for_track(
            Track::Reading,
            curriculum,
            &state.progress,
            allow_advanced,
            self.services.curriculum_service.as_ref(),
            &mut self.rng,
        )
        .await;

        DrillPlan::Training { listening, reading }
    }

    /// Runs one day's drill without persisting anything but brainstormed topics.
    ///
    /// Fails with [`CoreError::AlreadyRan`] when `state` already records a committed run on
    /// `today`; the learner advances at most once per date.
    pub async fn run(
        &mut self,
        mut state: LearnerState,
        curriculum: &mut Curriculum,
        today: NaiveDate,
    ) -> Result<DrillOutcome> {
        if state.last_run_date == today {
            return Err(CoreError::AlreadyRan(today).into());
        }
        let status = state.refresh_status();
        info!(
            %status,
            level = %state.current_level,
            xp = state.xp_in_level,
            threshold = state.current_level.gauntlet_threshold(),
            "Starting daily drill"
        );

        let plan = self.plan(&mut state, curriculum).await;
        let level = state.current_level;
        let prompts = &self.services.prompts;
        let (listening_prompt, reading_prompt) = match &plan {
            DrillPlan::Training { listening, reading } => {
                info!(listening = %listening.label(), reading = %reading.label(), "Today's topics");
                (
                    prompts.listening(level, &format_topic_for_prompt(listening))?,
                    prompts.reading(level, &format_topic_for_prompt(reading))?,
                )
            }
            DrillPlan::Gauntlet { review } => {
                let summary = review.join(", ");
                info!(reviewing = %summary, "Entering GAUNTLET mode");
                (
                    prompts.gauntlet_listening(level, &summary)?,
                    prompts.gauntlet_reading(level, &summary)?,
                )
            }
        };

        // Listening: script, speech, file, upload.
        let generator = &self.services.generator;
        let raw_script = generator
            .generate_content(&listening_prompt)
            .await
            .context("Failed to generate the listening script")?;
        let script = parse_script(&raw_script).context("Listening script is not usable")?;
        info!(turns = script.len(), "Synthesizing audio");
        let pcm = generator
            .generate_audio(&script)
            .await
            .context("Failed to synthesize audio")?;
        let audio_path = self
            .services
            .encoder
            .encode(pcm, &format!("daily_drill_{today}"))
            .await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .context("Encoded audio has no file name")?
            .to_string();
        let uploaded = self
            .services
            .store
            .upload(&audio_path, &file_name)
            .await
            .context("Failed to upload audio")?;
        info!(url = %uploaded.url, size = uploaded.size, "Audio published");

        // Reading.
        let raw_reading = generator
            .generate_content(&reading_prompt)
            .await
            .context("Failed to generate the reading lesson")?;
        let reading = ReadingOutput::from_model_output(&raw_reading);

        let episode = Episode {
            date: today.format("%Y-%m-%d").to_string(),
            listening_topic: plan.listening_label(),
            reading_topic: plan.reading_label(),
            audio_url: uploaded.url,
            description: reading.description,
            reading_content: reading.content,
            file_size: uploaded.size,
        };

        if let DrillPlan::Training { listening, reading } = &plan {
            apply_training(&mut state, listening, reading, today);
        }
        state.update_streak(today);

        Ok(DrillOutcome {
            state,
            episode,
            plan,
        })
    }
}

/// Folds a completed Training day into the learner state.
pub fn apply_training(state: &mut LearnerState, listening: &Selection, reading: &Selection, today: NaiveDate) {
    debug_assert_eq!(state.status, Status::Training);
    for selection in [listening, reading] {
        if selection.source == SelectionSource::Placeholder {
            continue;
        }
        state.progress.record_completion(
            selection.category,
            &selection.topic_name,
            &selection.subtopic.id,
            selection.episode.min(selection.total_episodes()),
            today,
        );
    }

    if listening.source != SelectionSource::Placeholder && !listening.is_final_episode() {
        state.set_chain(Chain {
            category: listening.category,
            topic_name: listening.topic_name.clone(),
            subtopic_id: listening.subtopic.id.clone(),
            current_episode: listening.episode,
            total_episodes: listening.total_episodes(),
        });
    } else {
        state.clear_chain();
    }

    state.increment_xp();
}

/// Persists a finished run: episode log, feed, then learner state.
///
/// The learner state goes last. Until it is saved, its `last_run_date` still points at the
/// previous run, so if that save fails a rerun on the same date is allowed and its episode
/// replaces the one already logged for that date.
pub fn commit(
    outcome: DrillOutcome,
    log: &mut EpisodeLog,
    feed: &dyn FeedRenderer,
    paths: &DrillPaths,
) -> Result<LearnerState> {
    log.upsert(outcome.episode);
    log.save().context("Failed to save the episode log")?;
    write_feed(log.episodes(), feed, &paths.feed)?;
    outcome
        .state
        .save(&paths.state)
        .context("Failed to save the learner state")?;
    info!(
        xp = outcome.state.xp_in_level,
        streak = outcome.state.day_streak,
        "Daily drill committed"
    );
    Ok(outcome.state)
}

/// Renders `episodes` and writes the document to `path`.
pub fn write_feed(episodes: &[Episode], feed: &dyn FeedRenderer, path: &Path) -> Result<()> {
    let document = feed.render(episodes)?;
    store::write_atomic(path, document.as_bytes())
        .with_context(|| format!("Failed to write feed to {}", path.display()))?;
    info!(path = %path.display(), episodes = episodes.len(), "Feed written");
    Ok(())
}

/// The date a run is filed under. Episode dates, the streak and feed timestamps are all UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A read-only preview of what a run would select, for `drill plan`.
///
/// Nothing is brainstormed: an exhausted track shows up as `None`.
pub fn preview(
    state: &LearnerState,
    curriculum: &Curriculum,
    seed: u64,
) -> (Status, Option<Selection>, Option<Selection>, Vec<String>) {
    let mut state = state.clone();
    let status = state.refresh_status();
    if state.is_gauntlet() {
        return (status, None, None, review_topics(&state));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let allow_advanced = state.allow_advanced();
    let listening = state
        .current_chain
        .as_ref()
        .and_then(|chain| resolve_chain(chain, curriculum))
        .or_else(|| preview_track(Track::Listening, curriculum, &state.progress, allow_advanced, &mut rng).0);
    let reading = preview_track(Track::Reading, curriculum, &state.progress, allow_advanced, &mut rng).0;
    (status, listening, reading, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::Category;
    use crate::curriculum::tests::{catalog, subtopic};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn selection(category: Category, topic: &str, id: &str, episode: u32, episodes: u32) -> Selection {
        Selection {
            category,
            topic_name: topic.to_string(),
            topic_description: String::new(),
            subtopic: subtopic(id, episodes, false),
            episode,
            source: SelectionSource::Curriculum,
        }
    }

    #[test]
    fn test_apply_training_starts_and_clears_chain() {
        let mut state = LearnerState::new();
        let reading = selection(Category::Physics, "Entropy", "s1", 1, 2);

        apply_training(&mut state, &selection(Category::Literature, "Camus", "stranger", 1, 2), &reading, day(1));
        let chain = state.current_chain.clone().unwrap();
        assert_eq!(chain.current_episode, 1);
        assert_eq!(chain.total_episodes, 2);
        assert_eq!(state.xp_in_level, 1);

        apply_training(&mut state, &selection(Category::Literature, "Camus", "stranger", 2, 2), &reading, day(2));
        assert!(state.current_chain.is_none());
        assert_eq!(state.progress.completed_episodes(Category::Literature, "Camus", "stranger"), 2);
        assert_eq!(state.xp_in_level, 2);
    }

    #[test]
    fn test_reading_track_never_chains() {
        let mut state = LearnerState::new();
        apply_training(
            &mut state,
            &selection(Category::Philosophy, "Sartre", "nausea", 1, 1),
            &selection(Category::Mathematics, "Calculus", "limits", 1, 4),
            day(1),
        );
        assert!(state.current_chain.is_none());
        assert_eq!(state.progress.completed_episodes(Category::Mathematics, "Calculus", "limits"), 1);
    }

    #[test]
    fn test_placeholder_records_nothing() {
        let mut state = LearnerState::new();
        apply_training(
            &mut state,
            &Selection::placeholder(Category::Literature),
            &Selection::placeholder(Category::Physics),
            day(1),
        );
        assert!(state.progress.review_set(10).is_empty());
        assert!(state.current_chain.is_none());
        assert_eq!(state.xp_in_level, 1);
    }

    #[test]
    fn test_completion_never_exceeds_subtopic_length() {
        let mut state = LearnerState::new();
        apply_training(
            &mut state,
            &selection(Category::Literature, "Camus", "stranger", 5, 2),
            &selection(Category::Physics, "Entropy", "s1", 2, 2),
            day(3),
        );
        assert_eq!(state.progress.completed_episodes(Category::Literature, "Camus", "stranger"), 2);
        assert_eq!(state.progress.completed_episodes(Category::Physics, "Entropy", "s1"), 2);
        assert!(state.current_chain.is_none());
    }

    struct Dates;

    impl FeedRenderer for Dates {
        fn render(&self, episodes: &[Episode]) -> Result<String> {
            Ok(episodes.iter().map(|e| e.date.clone()).collect::<Vec<_>>().join(","))
        }
    }

    #[test]
    fn test_write_feed_replaces_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site").join("feed.xml");
        let episode = Episode {
            date: "2026-03-01".to_string(),
            listening_topic: String::new(),
            reading_topic: String::new(),
            audio_url: String::new(),
            description: String::new(),
            reading_content: String::new(),
            file_size: 0,
        };

        write_feed(&[episode.clone()], &Dates, &path).unwrap();
        let mut newer = episode.clone();
        newer.date = "2026-03-02".to_string();
        write_feed(&[newer, episode], &Dates, &path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2026-03-02,2026-03-01");
        assert!(!dir.path().join("site").join("feed.xml.tmp").exists());
    }

    #[test]
    fn test_today_is_utc() {
        let before = Utc::now().date_naive();
        let date = today();
        assert!(date == before || date == Utc::now().date_naive());
    }

    #[test]
    fn test_review_topics_defaults_when_empty() {
        assert_eq!(review_topics(&LearnerState::new()), vec!["General French"]);
    }

    #[test]
    fn test_preview_follows_chain_and_ignores_exhaustion() {
        let curriculum = catalog(&[(Category::Literature, "Camus", vec![subtopic("stranger", 3, false)])]);
        let mut state = LearnerState::new();
        state.set_chain(Chain {
            category: Category::Literature,
            topic_name: "Camus".to_string(),
            subtopic_id: "stranger".to_string(),
            current_episode: 2,
            total_episodes: 3,
        });

        let (status, listening, reading, review) = preview(&state, &curriculum, 1);
        assert_eq!(status, Status::Training);
        assert_eq!(listening.unwrap().episode, 3);
        assert!(reading.is_none());
        assert!(review.is_empty());
    }

    #[test]
    fn test_gauntlet_labels() {
        let plan = DrillPlan::Gauntlet {
            review: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(plan.listening_label(), "THE GAUNTLET: Review of 2 topics");
        assert_eq!(plan.reading_label(), plan.listening_label());
    }
}
