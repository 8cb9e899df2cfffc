//! Topic Selector
//!
//! Decides which subtopic each track studies next. Selection within a category is
//! deterministic once something is in progress; the only randomness is the pick among
//! not-yet-started subtopics and the order in which a track's categories are tried.

use crate::{
    brainstorm::CurriculumService,
    curriculum::{Category, Curriculum, Subtopic},
    progress::Progress,
    state::Chain,
};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use tracing::{info, warn};

pub const PLACEHOLDER_TOPIC: &str = "General French";
pub const PLACEHOLDER_SUBTOPIC_ID: &str = "fallback";

/// One of the two parallel content lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    /// The audio episode, drawn from literature and philosophy.
    Listening,
    /// The reading lesson, drawn from physics and mathematics.
    Reading,
}

impl Track {
    pub fn categories(self) -> [Category; 2] {
        match self {
            Track::Listening => [Category::Literature, Category::Philosophy],
            Track::Reading => [Category::Physics, Category::Mathematics],
        }
    }
}

/// Where a selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Chain,
    Curriculum,
    Brainstorm,
    Placeholder,
}

/// The subtopic and episode a track will study today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub category: Category,
    pub topic_name: String,
    pub topic_description: String,
    pub subtopic: Subtopic,
    /// 1-based episode number to produce.
    pub episode: u32,
    pub source: SelectionSource,
}

impl Selection {
    pub fn total_episodes(&self) -> u32 {
        self.subtopic.episodes
    }

    pub fn is_final_episode(&self) -> bool {
        self.episode >= self.subtopic.episodes
    }

    /// Short human-readable label used in the episode log and the feed.
    pub fn label(&self) -> String {
        if self.total_episodes() > 1 {
            format!(
                "{} - {} ({}/{})",
                self.topic_name,
                self.subtopic.title,
                self.episode,
                self.total_episodes()
            )
        } else {
            format!("{} - {}", self.topic_name, self.subtopic.title)
        }
    }

    /// The last-resort subtopic used when nothing else can be found.
    pub fn placeholder(category: Category) -> Self {
        Self {
            category,
            topic_name: PLACEHOLDER_TOPIC.to_string(),
            topic_description: "General French practice".to_string(),
            subtopic: Subtopic {
                id: PLACEHOLDER_SUBTOPIC_ID.to_string(),
                title: "Pratique générale".to_string(),
                description: "A general French lesson on a topic of the tutor's choosing".to_string(),
                episodes: 1,
                advanced: false,
            },
            episode: 1,
            source: SelectionSource::Placeholder,
        }
    }
}

struct Candidate<'a> {
    topic_name: &'a str,
    topic_description: &'a str,
    subtopic: &'a Subtopic,
    completed: u32,
}

impl Candidate<'_> {
    fn to_selection(&self, category: Category) -> Selection {
        Selection {
            category,
            topic_name: self.topic_name.to_string(),
            topic_description: self.topic_description.to_string(),
            subtopic: self.subtopic.clone(),
            episode: self.completed + 1,
            source: SelectionSource::Curriculum,
        }
    }
}

/// Picks the next subtopic to study in `category`, or `None` when the category is
/// exhausted.
///
/// In-progress subtopics win, the one with the most completed episodes first; ties go to
/// the first candidate in catalog order (topics by name, subtopics as listed). With
/// nothing in progress, a not-started subtopic is drawn at random, non-advanced ones
/// preferred.
pub fn next_subtopic<R: Rng + ?Sized>(
    curriculum: &Curriculum,
    progress: &Progress,
    category: Category,
    allow_advanced: bool,
    rng: &mut R,
) -> Option<Selection> {
    let mut in_progress: Vec<Candidate> = Vec::new();
    let mut not_started: Vec<Candidate> = Vec::new();

    for (topic_name, topic) in curriculum.topics(category) {
        for subtopic in &topic.subtopics {
            if subtopic.advanced && !allow_advanced {
                continue;
            }
            let completed = progress.completed_episodes(category, topic_name, &subtopic.id);
            if completed >= subtopic.episodes {
                continue;
            }
            let candidate = Candidate {
                topic_name,
                topic_description: &topic.description,
                subtopic,
                completed,
            };
            if completed > 0 {
                in_progress.push(candidate);
            } else {
                not_started.push(candidate);
            }
        }
    }

    // Ties keep the earliest candidate.
    if let Some(chosen) = in_progress
        .into_iter()
        .reduce(|best, c| if c.completed > best.completed { c } else { best })
    {
        return Some(chosen.to_selection(category));
    }

    let (basic, advanced): (Vec<Candidate>, Vec<Candidate>) =
        not_started.into_iter().partition(|c| !c.subtopic.advanced);
    let pool = if basic.is_empty() { advanced } else { basic };
    pool.choose(rng).map(|c| c.to_selection(category))
}

/// Continues an active chain, or returns `None` when the chain no longer matches the
/// curriculum (subtopic removed, or already at its last episode).
pub fn resolve_chain(chain: &Chain, curriculum: &Curriculum) -> Option<Selection> {
    let info = curriculum.get_subtopic_info(chain.category, &chain.topic_name, &chain.subtopic_id)?;
    if chain.current_episode >= info.subtopic.episodes {
        return None;
    }
    Some(Selection {
        category: chain.category,
        topic_name: info.topic_name,
        topic_description: info.topic_description,
        episode: chain.current_episode + 1,
        subtopic: info.subtopic,
        source: SelectionSource::Chain,
    })
}

/// Tries the track's categories in a random order without brainstorming.
///
/// Returns the shuffled order alongside the first selection found, so a caller that has
/// to fall back can reuse the same order.
pub fn preview_track<R: Rng + ?Sized>(
    track: Track,
    curriculum: &Curriculum,
    progress: &Progress,
    allow_advanced: bool,
    rng: &mut R,
) -> (Option<Selection>, [Category; 2]) {
    let mut order = track.categories();
    order.shuffle(rng);
    let found = order
        .iter()
        .find_map(|category| next_subtopic(curriculum, progress, *category, allow_advanced, &mut *rng));
    (found, order)
}

/// Selects today's subtopic for a track, growing the curriculum when it runs dry.
///
/// When every category of the track is exhausted, the brainstorming service is asked for
/// a new topic at most once per category; the first topic the store accepts is used
/// directly, starting at its first subtopic. If no brainstorm succeeds the fixed
/// placeholder is returned, so selection never fails.
pub async fn select_for_track<R: Rng + ?Sized>(
    track: Track,
    curriculum: &mut Curriculum,
    progress: &Progress,
    allow_advanced: bool,
    brainstormer: &dyn CurriculumService,
    rng: &mut R,
) -> Selection {
    let (found, order) = preview_track(track, curriculum, progress, allow_advanced, rng);
    if let Some(selection) = found {
        return selection;
    }

    for category in order {
        info!(?track, %category, "Category exhausted, brainstorming a new topic");
        let existing = curriculum.get_existing_topics(category);
        let draft = match brainstormer.brainstorm_topic(category, &existing).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(%category, error = %e, "Brainstorming failed");
                continue;
            }
        };
        let Some(topic_name) = draft.topic_name.as_ref().map(|n| n.trim().to_string()) else {
            warn!(%category, "Brainstormed topic has no name");
            continue;
        };
        if !curriculum.add_topic(category, draft) {
            continue;
        }
        let first = curriculum
            .topics(category)
            .find(|(name, _)| **name == topic_name)
            .and_then(|(_, topic)| topic.subtopics.first().map(|s| (topic, s.clone())));
        if let Some((topic, subtopic)) = first {
            return Selection {
                category,
                topic_name,
                topic_description: topic.description.clone(),
                subtopic,
                episode: 1,
                source: SelectionSource::Brainstorm,
            };
        }
    }

    warn!(?track, "Falling back to the placeholder subtopic");
    Selection::placeholder(order[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brainstorm::MockCurriculumService;
    use crate::curriculum::TopicDraft;
    use crate::curriculum::tests::{catalog, subtopic};
    use crate::llm_client::GenerationError;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_scenario_a_fresh_subtopic_starts_at_episode_one() {
        let curriculum = catalog(&[(Category::Physics, "Entropy", vec![subtopic("s1", 2, false)])]);
        let selection =
            next_subtopic(&curriculum, &Progress::default(), Category::Physics, false, &mut rng()).unwrap();
        assert_eq!(selection.topic_name, "Entropy");
        assert_eq!(selection.subtopic.id, "s1");
        assert_eq!(selection.episode, 1);
    }

    #[test]
    fn test_scenario_b_partial_subtopic_continues() {
        let curriculum = catalog(&[(Category::Physics, "Entropy", vec![subtopic("s1", 2, false)])]);
        let mut progress = Progress::default();
        progress.record_completion(Category::Physics, "Entropy", "s1", 1, today());

        let selection = next_subtopic(&curriculum, &progress, Category::Physics, false, &mut rng()).unwrap();
        assert_eq!(selection.subtopic.id, "s1");
        assert_eq!(selection.episode, 2);
        assert!(selection.is_final_episode());
    }

    #[test]
    fn test_in_progress_selection_is_deterministic() {
        let curriculum = catalog(&[
            (Category::Physics, "Entropy", vec![subtopic("e1", 4, false), subtopic("e2", 4, false)]),
            (Category::Physics, "Optics", vec![subtopic("o1", 4, false), subtopic("o2", 4, false)]),
        ]);
        let mut progress = Progress::default();
        progress.record_completion(Category::Physics, "Entropy", "e2", 2, today());
        progress.record_completion(Category::Physics, "Optics", "o1", 2, today());
        progress.record_completion(Category::Physics, "Optics", "o2", 1, today());

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selection = next_subtopic(&curriculum, &progress, Category::Physics, false, &mut rng).unwrap();
            // Entropy/e2 and Optics/o1 tie at 2; Entropy comes first in catalog order.
            assert_eq!(selection.topic_name, "Entropy");
            assert_eq!(selection.subtopic.id, "e2");
            assert_eq!(selection.episode, 3);
        }
    }

    #[test]
    fn test_most_advanced_partial_wins() {
        let curriculum = catalog(&[
            (Category::Physics, "Entropy", vec![subtopic("e1", 5, false)]),
            (Category::Physics, "Optics", vec![subtopic("o1", 5, false)]),
        ]);
        let mut progress = Progress::default();
        progress.record_completion(Category::Physics, "Entropy", "e1", 1, today());
        progress.record_completion(Category::Physics, "Optics", "o1", 3, today());

        let selection = next_subtopic(&curriculum, &progress, Category::Physics, false, &mut rng()).unwrap();
        assert_eq!(selection.subtopic.id, "o1");
        assert_eq!(selection.episode, 4);
    }

    #[test]
    fn test_advanced_subtopics_are_gated() {
        let curriculum = catalog(&[(Category::Mathematics, "Topology", vec![subtopic("deep", 2, true)])]);
        let progress = Progress::default();

        assert!(next_subtopic(&curriculum, &progress, Category::Mathematics, false, &mut rng()).is_none());
        let selection =
            next_subtopic(&curriculum, &progress, Category::Mathematics, true, &mut rng()).unwrap();
        assert_eq!(selection.subtopic.id, "deep");
    }

    #[test]
    fn test_non_advanced_preferred_when_starting_fresh() {
        let curriculum = catalog(&[(
            Category::Mathematics,
            "Calculus",
            vec![subtopic("hard", 2, true), subtopic("easy", 2, false)],
        )]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selection =
                next_subtopic(&curriculum, &Progress::default(), Category::Mathematics, true, &mut rng).unwrap();
            assert_eq!(selection.subtopic.id, "easy");
        }
    }

    #[test]
    fn test_completed_subtopics_are_skipped() {
        let curriculum = catalog(&[(Category::Physics, "Entropy", vec![subtopic("s1", 2, false)])]);
        let mut progress = Progress::default();
        progress.record_completion(Category::Physics, "Entropy", "s1", 2, today());
        assert!(next_subtopic(&curriculum, &progress, Category::Physics, false, &mut rng()).is_none());
    }

    #[test]
    fn test_resolve_chain() {
        let curriculum = catalog(&[(Category::Literature, "Camus", vec![subtopic("stranger", 3, false)])]);
        let mut chain = Chain {
            category: Category::Literature,
            topic_name: "Camus".to_string(),
            subtopic_id: "stranger".to_string(),
            current_episode: 1,
            total_episodes: 3,
        };
        let selection = resolve_chain(&chain, &curriculum).unwrap();
        assert_eq!(selection.episode, 2);
        assert_eq!(selection.source, SelectionSource::Chain);

        chain.current_episode = 3;
        assert!(resolve_chain(&chain, &curriculum).is_none());

        chain.current_episode = 1;
        chain.subtopic_id = "plague".to_string();
        assert!(resolve_chain(&chain, &curriculum).is_none());
    }

    #[tokio::test]
    async fn test_select_for_track_skips_exhausted_category() {
        let mut curriculum = catalog(&[(Category::Philosophy, "Sartre", vec![subtopic("nausea", 2, false)])]);
        let mut brainstormer = MockCurriculumService::new();
        brainstormer.expect_brainstorm_topic().times(0);

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selection = select_for_track(
                Track::Listening,
                &mut curriculum,
                &Progress::default(),
                false,
                &brainstormer,
                &mut rng,
            )
            .await;
            assert_eq!(selection.category, Category::Philosophy);
            assert_eq!(selection.subtopic.id, "nausea");
        }
    }

    #[tokio::test]
    async fn test_select_for_track_uses_brainstormed_topic() {
        let mut curriculum = catalog(&[]);
        let mut brainstormer = MockCurriculumService::new();
        brainstormer.expect_brainstorm_topic().times(1).returning(|_, existing| {
            assert!(existing.is_empty());
            Ok(TopicDraft {
                topic_name: Some("Thermodynamique".to_string()),
                description: "Heat".to_string(),
                subtopics: vec![subtopic("first-law", 3, false), subtopic("second-law", 2, false)],
            })
        });

        let selection = select_for_track(
            Track::Reading,
            &mut curriculum,
            &Progress::default(),
            false,
            &brainstormer,
            &mut rng(),
        )
        .await;
        assert_eq!(selection.source, SelectionSource::Brainstorm);
        assert_eq!(selection.topic_name, "Thermodynamique");
        assert_eq!(selection.subtopic.id, "first-law");
        assert_eq!(selection.episode, 1);
        assert_eq!(curriculum.get_existing_topics(selection.category), vec!["Thermodynamique"]);
    }

    #[tokio::test]
    async fn test_scenario_d_invalid_brainstorm_falls_back_to_placeholder() {
        let mut curriculum = catalog(&[]);
        let mut brainstormer = MockCurriculumService::new();
        // One attempt per category of the track, never more.
        brainstormer
            .expect_brainstorm_topic()
            .times(2)
            .returning(|_, _| Err(GenerationError::Malformed("expected value at line 1".to_string())));

        let selection = select_for_track(
            Track::Reading,
            &mut curriculum,
            &Progress::default(),
            false,
            &brainstormer,
            &mut rng(),
        )
        .await;
        assert_eq!(selection.source, SelectionSource::Placeholder);
        assert_eq!(selection.topic_name, "General French");
        assert_eq!(selection.subtopic.id, "fallback");
        assert_eq!(selection.subtopic.episodes, 1);
        assert!(!selection.subtopic.advanced);
    }

    #[tokio::test]
    async fn test_rejected_brainstorm_counts_as_failure() {
        let mut curriculum = catalog(&[]);
        let mut brainstormer = MockCurriculumService::new();
        brainstormer.expect_brainstorm_topic().times(2).returning(|_, _| {
            Ok(TopicDraft {
                topic_name: Some("Empty".to_string()),
                description: String::new(),
                subtopics: vec![],
            })
        });

        let selection = select_for_track(
            Track::Listening,
            &mut curriculum,
            &Progress::default(),
            false,
            &brainstormer,
            &mut rng(),
        )
        .await;
        assert_eq!(selection.source, SelectionSource::Placeholder);
        assert!(curriculum.get_existing_topics(Category::Literature).is_empty());
    }
}
