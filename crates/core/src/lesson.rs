//! The structured reading lesson returned by the reading prompt.

use crate::llm_client::{parse_json_output, strip_code_fences};
use serde::{Deserialize, Serialize};

const DESCRIPTION_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub grammar_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingLesson {
    pub title: String,
    #[serde(default)]
    pub level: Option<String>,
    pub text: String,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,
    /// Exercise shapes vary by type, so they are kept as raw JSON.
    #[serde(default)]
    pub exercises: Vec<serde_json::Value>,
}

/// The reading output as stored in the episode log.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingOutput {
    /// Model output without code fences; JSON for lessons, plain text for Gauntlet essays.
    pub content: String,
    pub description: String,
    pub lesson: Option<ReadingLesson>,
}

impl ReadingOutput {
    pub fn from_model_output(raw: &str) -> Self {
        let content = strip_code_fences(raw).to_string();
        match parse_json_output::<ReadingLesson>(&content) {
            Ok(lesson) => {
                let first_paragraph = lesson
                    .text
                    .split("\n\n")
                    .map(str::trim)
                    .find(|p| !p.is_empty())
                    .unwrap_or_default()
                    .replace("[[", "")
                    .replace("]]", "");
                Self {
                    description: format!("{}\n\n{}", lesson.title, first_paragraph),
                    content,
                    lesson: Some(lesson),
                }
            }
            Err(_) => Self {
                description: content.chars().take(DESCRIPTION_CHARS).collect(),
                content,
                lesson: None,
            },
        }
    }
}
