//! Curriculum Store
//!
//! The catalog of everything the drill can teach: four fixed categories, each holding
//! named topics, each topic an ordered list of subtopics spanning one or more episodes.
//! The catalog only grows at runtime (through brainstorming), and every addition is
//! written to disk straight away.

use crate::{CoreError, store};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// The fixed set of curriculum categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Literature,
    Philosophy,
    Physics,
    Mathematics,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Literature,
        Category::Philosophy,
        Category::Physics,
        Category::Mathematics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Literature => "literature",
            Category::Philosophy => "philosophy",
            Category::Physics => "physics",
            Category::Mathematics => "mathematics",
        }
    }

    /// Long-form description used when asking the model for new curriculum content.
    pub fn describe(self) -> &'static str {
        match self {
            Category::Literature => {
                "Classical French Literature (novels, plays, poetry from French authors)"
            }
            Category::Philosophy => {
                "French Philosophy (existentialism, enlightenment, postmodernism, ethics)"
            }
            Category::Physics => "Physics concepts explained in French",
            Category::Mathematics => "Mathematics concepts explained in French",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

/// The smallest unit of the curriculum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtopic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub episodes: u32,
    #[serde(default)]
    pub advanced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
    /// Set on topics that were generated by the model rather than hand-written.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub brainstormed: bool,
}

/// A topic as proposed by the brainstorming service, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDraft {
    #[serde(default)]
    pub topic_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtopics: Vec<Subtopic>,
}

/// A resolved reference to a subtopic together with its parent topic's details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtopicInfo {
    pub topic_name: String,
    pub topic_description: String,
    pub subtopic: Subtopic,
}

/// Topics of one category, keyed by topic name.
pub type CategoryCatalog = BTreeMap<String, Topic>;

/// Checks the per-topic invariants: at least one subtopic, non-empty ids unique within
/// the topic, and at least one episode per subtopic.
fn validate_subtopics(subtopics: &[Subtopic]) -> Result<(), CoreError> {
    if subtopics.is_empty() {
        return Err(CoreError::InvalidTopic("topic has no subtopics".to_string()));
    }
    let mut seen = HashSet::new();
    for subtopic in subtopics {
        if subtopic.id.trim().is_empty() {
            return Err(CoreError::InvalidTopic("subtopic with empty id".to_string()));
        }
        if subtopic.episodes == 0 {
            return Err(CoreError::InvalidTopic(format!(
                "subtopic '{}' has zero episodes",
                subtopic.id
            )));
        }
        if !seen.insert(subtopic.id.as_str()) {
            return Err(CoreError::InvalidTopic(format!(
                "duplicate subtopic id '{}'",
                subtopic.id
            )));
        }
    }
    Ok(())
}

/// The persisted curriculum catalog.
#[derive(Debug, Clone, Default)]
pub struct Curriculum {
    path: Option<PathBuf>,
    categories: BTreeMap<String, CategoryCatalog>,
}

impl Curriculum {
    /// Loads the catalog from `path`, starting from an empty catalog when the file does
    /// not exist yet.
    ///
    /// Subtopics that break the catalog invariants are dropped with a warning and unknown
    /// category keys are kept but flagged, so a hand-edited file never stops the drill.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let categories: BTreeMap<String, CategoryCatalog> =
            store::read_json(path)?.unwrap_or_default();
        let mut curriculum = Self::from_catalog(categories);
        curriculum.path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            topics = curriculum.categories.values().map(|c| c.len()).sum::<usize>(),
            "Curriculum loaded"
        );
        Ok(curriculum)
    }

    /// Builds an in-memory catalog that is never written to disk.
    pub fn from_catalog(mut categories: BTreeMap<String, CategoryCatalog>) -> Self {
        for (category, topics) in categories.iter_mut() {
            if category.parse::<Category>().is_err() {
                warn!(%category, "Curriculum contains an unknown category; it will be ignored by selection");
            }
            for (topic_name, topic) in topics.iter_mut() {
                let mut seen = HashSet::new();
                topic.subtopics.retain(|s| {
                    let keep = s.episodes >= 1 && !s.id.trim().is_empty() && seen.insert(s.id.clone());
                    if !keep {
                        warn!(%category, topic = %topic_name, subtopic = %s.id, "Dropping invalid subtopic");
                    }
                    keep
                });
            }
        }
        for category in Category::ALL {
            categories.entry(category.as_str().to_string()).or_default();
        }
        Self {
            path: None,
            categories,
        }
    }

    fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => store::write_json(path, &self.categories),
            None => Ok(()),
        }
    }

    /// Topics of a category in catalog iteration order.
    pub fn topics(&self, category: Category) -> impl Iterator<Item = (&String, &Topic)> {
        self.categories
            .get(category.as_str())
            .into_iter()
            .flat_map(|topics| topics.iter())
    }

    /// Names of the topics already present in a category.
    pub fn get_existing_topics(&self, category: Category) -> Vec<String> {
        self.topics(category).map(|(name, _)| name.clone()).collect()
    }

    /// Appends a brainstormed topic and persists the catalog immediately.
    ///
    /// Returns `false` (and logs why) when the draft has no name, duplicates an existing
    /// topic, breaks the subtopic invariants, or cannot be written to disk.
    pub fn add_topic(&mut self, category: Category, draft: TopicDraft) -> bool {
        let Some(topic_name) = draft
            .topic_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
        else {
            warn!(%category, "Rejecting brainstormed topic without a topic_name");
            return false;
        };
        if let Err(e) = validate_subtopics(&draft.subtopics) {
            warn!(%category, topic = %topic_name, error = %e, "Rejecting brainstormed topic");
            return false;
        }

        let topics = self
            .categories
            .entry(category.as_str().to_string())
            .or_default();
        if topics.contains_key(&topic_name) {
            warn!(%category, topic = %topic_name, "Rejecting brainstormed topic that already exists");
            return false;
        }
        topics.insert(
            topic_name.clone(),
            Topic {
                description: draft.description,
                subtopics: draft.subtopics,
                brainstormed: true,
            },
        );

        if let Err(e) = self.save() {
            warn!(%category, topic = %topic_name, error = ?e, "Failed to persist brainstormed topic");
            if let Some(topics) = self.categories.get_mut(category.as_str()) {
                topics.remove(&topic_name);
            }
            return false;
        }
        info!(%category, topic = %topic_name, "Added brainstormed topic to curriculum");
        true
    }

    /// Looks a subtopic up; `None` means the reference is stale.
    pub fn get_subtopic_info(
        &self,
        category: Category,
        topic_name: &str,
        subtopic_id: &str,
    ) -> Option<SubtopicInfo> {
        let topic = self.categories.get(category.as_str())?.get(topic_name)?;
        let subtopic = topic.subtopics.iter().find(|s| s.id == subtopic_id)?;
        Some(SubtopicInfo {
            topic_name: topic_name.to_string(),
            topic_description: topic.description.clone(),
            subtopic: subtopic.clone(),
        })
    }
}
