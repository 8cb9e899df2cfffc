//! Episode Log
//!
//! The newest-first list of published episodes, and the feed-rendering seam.

use crate::store;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// `YYYY-MM-DD`; entries with any other shape are kept but left out of the feed.
    pub date: String,
    pub listening_topic: String,
    pub reading_topic: String,
    pub audio_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reading_content: String,
    #[serde(default)]
    pub file_size: u64,
}

/// Turns the episode log into a syndication document.
pub trait FeedRenderer: Send + Sync {
    fn render(&self, episodes: &[Episode]) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeLog {
    path: PathBuf,
    episodes: Vec<Episode>,
}

impl EpisodeLog {
    /// Loads the log; a missing or unreadable file yields an empty log.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let episodes = match store::read_json::<Vec<Episode>>(&path) {
            Ok(episodes) => episodes.unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = ?e, "Episode log is unreadable, starting a new one");
                Vec::new()
            }
        };
        Self { path, episodes }
    }

    pub fn save(&self) -> Result<()> {
        store::write_json(&self.path, &self.episodes)
    }

    /// Puts `episode` at the top of the log, replacing an earlier entry for the same date.
    pub fn upsert(&mut self, episode: Episode) {
        self.episodes.retain(|e| e.date != episode.date);
        self.episodes.insert(0, episode);
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }
}
