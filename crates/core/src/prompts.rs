//! Prompt templates.
//!
//! Templates live as Markdown files in a prompts directory, one file per prompt, with
//! `{name}` placeholders filled in at render time.

use crate::{curriculum::Category, selector::Selection, state::Level};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const LISTENING: &str = "listening";
pub const READING: &str = "reading";
pub const GAUNTLET_LISTENING: &str = "gauntlet_listening";
pub const GAUNTLET_READING: &str = "gauntlet_reading";
pub const BRAINSTORM: &str = "brainstorm";

/// Target lesson length in minutes.
pub fn level_duration(level: Level) -> u32 {
    match level {
        Level::A1 | Level::A2 => 10,
        Level::B1 => 15,
        Level::B2 | Level::C1 | Level::C2 => 20,
    }
}

/// Target script length in words.
pub fn level_word_count(level: Level) -> u32 {
    match level {
        Level::A1 => 800,
        Level::A2 => 900,
        Level::B1 => 1200,
        Level::B2 => 1600,
        Level::C1 => 1800,
        Level::C2 => 2000,
    }
}

/// Renders the topic block that is spliced into the listening and reading prompts.
pub fn format_topic_for_prompt(selection: &Selection) -> String {
    let total = selection.total_episodes();
    let mut block = format!(
        "TOPIC: {}\nSUBTOPIC: {} (Episode {} of {})\nFOCUS: {}\nCATEGORY: {}\n",
        selection.topic_name,
        selection.subtopic.title,
        selection.episode,
        total,
        selection.subtopic.description,
        selection.category,
    );
    if total > 1 {
        block.push_str(
            "\nThis is part of an EPISODE CHAIN. Maintain continuity with previous episodes if this is not episode 1.\n",
        );
    }
    if selection.is_final_episode() && total > 1 {
        block.push_str("This is the FINAL episode of this subtopic - include a summary and conclusion.\n");
    }
    if selection.subtopic.advanced {
        block.push_str("This is an ADVANCED topic - go deeper into philosophical/theoretical aspects.\n");
    }
    block
}

/// The set of prompt templates, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: HashMap<String, String>,
}

impl PromptLibrary {
    /// Loads every `*.md` file in `dir`, keyed by its file stem.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut templates = HashMap::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompts directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
                let key = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .context("Could not get file stem")?
                    .to_string();
                let content = fs::read_to_string(&path)?;
                templates.insert(key, content);
            }
        }
        Ok(Self { templates })
    }

    pub fn from_templates(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Fills `{name}` placeholders of template `key` with `vars`.
    pub fn render(&self, key: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = self
            .templates
            .get(key)
            .with_context(|| format!("Missing prompt template: '{key}'"))?;
        Ok(vars.iter().fold(template.clone(), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        }))
    }

    pub fn listening(&self, level: Level, topic_context: &str) -> Result<String> {
        let duration = level_duration(level).to_string();
        let words = level_word_count(level);
        let (word_count, word_count_max) = (words.to_string(), (words + 200).to_string());
        self.render(
            LISTENING,
            &[
                ("level", level.as_str()),
                ("duration", duration.as_str()),
                ("word_count", word_count.as_str()),
                ("word_count_max", word_count_max.as_str()),
                ("topic_context", topic_context),
            ],
        )
    }

    pub fn reading(&self, level: Level, topic_context: &str) -> Result<String> {
        self.render(
            READING,
            &[("level", level.as_str()), ("topic_context", topic_context)],
        )
    }

    pub fn gauntlet_listening(&self, level: Level, topics_summary: &str) -> Result<String> {
        self.render(
            GAUNTLET_LISTENING,
            &[("level", level.as_str()), ("topics_summary", topics_summary)],
        )
    }

    pub fn gauntlet_reading(&self, level: Level, topics_summary: &str) -> Result<String> {
        self.render(
            GAUNTLET_READING,
            &[("level", level.as_str()), ("topics_summary", topics_summary)],
        )
    }

    pub fn brainstorm(&self, category: Category, existing_topics: &[String]) -> Result<String> {
        let existing = if existing_topics.is_empty() {
            "None".to_string()
        } else {
            existing_topics.join(", ")
        };
        self.render(
            BRAINSTORM,
            &[("category", category.describe()), ("existing_topics", existing.as_str())],
        )
    }
}
