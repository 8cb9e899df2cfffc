//! Learner State
//!
//! The singleton learner document: level, XP, Training/Gauntlet status, the day streak,
//! the active listening chain and all per-subtopic progress. The orchestrator reads it
//! once at the start of a run and writes it once at the very end.

use crate::{CoreError, curriculum::Category, progress::Progress, store};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Gauntlet threshold for levels that have no explicit entry.
pub const DEFAULT_GAUNTLET_THRESHOLD: u32 = 200;

/// XP needed before advanced subtopics become eligible for selection.
pub const ADVANCED_UNLOCK_XP: u32 = 30;

/// CEFR proficiency tiers, ordered from beginner to mastery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    A1,
    #[default]
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl Level {
    pub const ALL: [Level; 6] = [Level::A1, Level::A2, Level::B1, Level::B2, Level::C1, Level::C2];

    /// XP in the current level at which the learner enters the Gauntlet.
    pub fn gauntlet_threshold(self) -> u32 {
        match self {
            Level::A2 => 60,
            Level::B1 => 120,
            Level::B2 => 200,
            _ => DEFAULT_GAUNTLET_THRESHOLD,
        }
    }

    pub fn next(self) -> Option<Level> {
        let idx = Level::ALL.iter().position(|l| *l == self)?;
        Level::ALL.get(idx + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
            Level::C1 => "C1",
            Level::C2 => "C2",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownLevel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    #[default]
    Training,
    Gauntlet,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Training => f.write_str("TRAINING"),
            Status::Gauntlet => f.write_str("GAUNTLET"),
        }
    }
}

/// An in-flight multi-episode subtopic on the listening track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub category: Category,
    pub topic_name: String,
    pub subtopic_id: String,
    pub current_episode: u32,
    pub total_episodes: u32,
}

fn lenient_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
        .unwrap_or_default())
}

/// Reads a level case-insensitively; an unknown or missing level falls back to the default.
fn lenient_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(match raw {
        Some(s) => s.parse().unwrap_or_else(|_| {
            warn!(level = %s, "Unknown learner level, falling back to {}", Level::default());
            Level::default()
        }),
        None => Level::default(),
    })
}

/// The persisted learner document.
///
/// Every field has a serde default so older documents load without a separate migration
/// step; fields that are no longer used (such as `topics_covered`) are dropped on the
/// next save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerState {
    #[serde(default, deserialize_with = "lenient_level")]
    pub current_level: Level,
    #[serde(default)]
    pub xp_in_level: u32,
    #[serde(default)]
    pub status: Status,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_run_date: NaiveDate,
    #[serde(default)]
    pub day_streak: u32,
    #[serde(default)]
    pub current_chain: Option<Chain>,
    #[serde(default)]
    pub progress: Progress,
}

impl LearnerState {
    /// A fresh learner: A2, no XP, Training, no progress.
    pub fn new() -> Self {
        let mut state = Self::default();
        state.progress.ensure_categories();
        state
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let Some(mut state) = store::read_json::<LearnerState>(path)? else {
            info!(path = %path.display(), "No learner state found, starting fresh");
            return Ok(Self::new());
        };
        state.progress.ensure_categories();
        for category in state.progress.unknown_categories() {
            warn!(%category, "Learner progress contains an unknown category");
        }
        if let Some(chain) = &state.current_chain {
            if chain.current_episode > chain.total_episodes {
                warn!(?chain, "Discarding chain that is past its last episode");
                state.current_chain = None;
            }
        }
        Ok(state)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        store::write_json(path.as_ref(), self)
    }

    /// Recomputes `status` from the XP threshold of the current level.
    pub fn refresh_status(&mut self) -> Status {
        self.status = if self.xp_in_level >= self.current_level.gauntlet_threshold() {
            Status::Gauntlet
        } else {
            Status::Training
        };
        self.status
    }

    pub fn is_gauntlet(&self) -> bool {
        self.status == Status::Gauntlet
    }

    pub fn allow_advanced(&self) -> bool {
        self.xp_in_level >= ADVANCED_UNLOCK_XP
    }

    /// Adds one XP, but only on a Training day.
    pub fn increment_xp(&mut self) {
        if self.status == Status::Training {
            self.xp_in_level += 1;
        }
    }

    /// Bumps the consecutive-day counter for a run on `today`.
    pub fn update_streak(&mut self, today: NaiveDate) {
        if self.last_run_date == today {
            return;
        }
        if self.last_run_date.succ_opt() == Some(today) {
            self.day_streak += 1;
        } else {
            self.day_streak = 1;
        }
        self.last_run_date = today;
    }

    pub fn set_chain(&mut self, chain: Chain) {
        self.current_chain = Some(chain);
    }

    pub fn clear_chain(&mut self) {
        self.current_chain = None;
    }

    /// Moves the learner to the next level with a clean XP counter.
    pub fn promote(&mut self) -> Result<Level, CoreError> {
        let next = self
            .current_level
            .next()
            .ok_or(CoreError::TopLevel(self.current_level))?;
        self.current_level = next;
        self.xp_in_level = 0;
        self.status = Status::Training;
        Ok(next)
    }
}
