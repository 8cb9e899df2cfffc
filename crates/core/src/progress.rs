//! Progress Tracker
//!
//! Per-subtopic completion counters, nested as `category → topic → subtopic_id`.

use crate::curriculum::Category;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub completed_episodes: u32,
    #[serde(default)]
    pub last_studied: Option<NaiveDate>,
}

type TopicProgress = BTreeMap<String, ProgressEntry>;
type CategoryProgress = BTreeMap<String, TopicProgress>;

/// A subtopic picked for Gauntlet review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub category: String,
    pub topic: String,
    pub subtopic_id: String,
    pub last_studied: Option<NaiveDate>,
}

impl fmt::Display for ReviewItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.topic, self.subtopic_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Progress {
    categories: BTreeMap<String, CategoryProgress>,
}

impl Progress {
    /// Adds an empty map for every known category that is missing.
    pub fn ensure_categories(&mut self) {
        for category in Category::ALL {
            self.categories
                .entry(category.as_str().to_string())
                .or_default();
        }
    }

    /// Category keys that are not part of the fixed category set.
    pub fn unknown_categories(&self) -> Vec<&str> {
        self.categories
            .keys()
            .filter(|k| k.parse::<Category>().is_err())
            .map(String::as_str)
            .collect()
    }

    pub fn entry(&self, category: Category, topic: &str, subtopic_id: &str) -> Option<&ProgressEntry> {
        self.categories
            .get(category.as_str())?
            .get(topic)?
            .get(subtopic_id)
    }

    pub fn completed_episodes(&self, category: Category, topic: &str, subtopic_id: &str) -> u32 {
        self.entry(category, topic, subtopic_id)
            .map_or(0, |e| e.completed_episodes)
    }

    /// Records that `episode` of a subtopic was completed on `today`.
    ///
    /// Missing category, topic and subtopic entries are created on the fly. The counter
    /// only moves forward: recording an episode at or below the stored count refreshes
    /// `last_studied` and nothing else.
    pub fn record_completion(
        &mut self,
        category: Category,
        topic: &str,
        subtopic_id: &str,
        episode: u32,
        today: NaiveDate,
    ) {
        let entry = self
            .categories
            .entry(category.as_str().to_string())
            .or_default()
            .entry(topic.to_string())
            .or_default()
            .entry(subtopic_id.to_string())
            .or_default();
        entry.completed_episodes = entry.completed_episodes.max(episode);
        entry.last_studied = Some(today);
    }

    /// The most recently studied subtopics across every category, newest first.
    ///
    /// Only subtopics with at least one completed episode qualify. Entries studied on the
    /// same day keep their store order.
    pub fn review_set(&self, limit: usize) -> Vec<ReviewItem> {
        let mut items: Vec<ReviewItem> = self
            .categories
            .iter()
            .flat_map(|(category, topics)| {
                topics.iter().flat_map(move |(topic, subtopics)| {
                    subtopics
                        .iter()
                        .filter(|(_, e)| e.completed_episodes > 0)
                        .map(move |(id, e)| ReviewItem {
                            category: category.clone(),
                            topic: topic.clone(),
                            subtopic_id: id.clone(),
                            last_studied: e.last_studied,
                        })
                })
            })
            .collect();
        items.sort_by(|a, b| b.last_studied.cmp(&a.last_studied));
        items.truncate(limit);
        items
    }
}
