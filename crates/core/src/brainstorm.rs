//! Curriculum Generation Service
//!
//! When a category runs out of material, the selector asks a `CurriculumService` for a
//! brand new topic. The service only proposes; validation and persistence belong to the
//! curriculum store.

use crate::{
    curriculum::{Category, TopicDraft},
    llm_client::{GenerationClient, GenerationError, parse_json_output},
    prompts::PromptLibrary,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Defines the contract for any service that can propose new curriculum topics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CurriculumService: Send + Sync {
    /// Proposes a new topic for `category` that is not among `existing_topics`.
    async fn brainstorm_topic(
        &self,
        category: Category,
        existing_topics: &[String],
    ) -> Result<TopicDraft, GenerationError>;
}

/// A `CurriculumService` backed by the generative model.
pub struct LLMCurriculumService {
    client: Arc<dyn GenerationClient>,
    prompts: Arc<PromptLibrary>,
}

impl LLMCurriculumService {
    pub fn new(client: Arc<dyn GenerationClient>, prompts: Arc<PromptLibrary>) -> Self {
        Self { client, prompts }
    }
}

#[async_trait]
impl CurriculumService for LLMCurriculumService {
    async fn brainstorm_topic(
        &self,
        category: Category,
        existing_topics: &[String],
    ) -> Result<TopicDraft, GenerationError> {
        let prompt = self
            .prompts
            .brainstorm(category, existing_topics)
            .map_err(|e| GenerationError::Fatal(format!("{e:#}")))?;
        info!(%category, existing = existing_topics.len(), "Brainstorming new curriculum topic");
        let answer = self.client.generate_content(&prompt).await?;
        parse_json_output(&answer)
    }
}
