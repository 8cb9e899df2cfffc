use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Failure modes of a generation call.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Timeouts, dropped connections, rate limits and 5xx responses.
    #[error("Transient generation error: {0}")]
    Transient(String),
    /// Authorization or quota failures, and transient failures that ran out of retries.
    #[error("Fatal generation error: {0}")]
    Fatal(String),
    /// The model answered, but not in the structure that was asked for.
    #[error("Malformed model output: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }
}

/// Who speaks a line of a listening script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// English-speaking tutor.
    TutorEn,
    /// Native French reader.
    ActorFr,
}

/// One line of a two-voice listening script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptTurn {
    pub role: Role,
    pub text: String,
}

/// A client for a generative text and speech model.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Submits a prompt and returns the full text of the answer.
    async fn generate_content(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Synthesizes a script into raw 16-bit little-endian mono PCM.
    async fn generate_audio(&self, script: &[ScriptTurn]) -> Result<Vec<u8>, GenerationError>;
}

/// Removes a surrounding Markdown code fence (with or without a `json` tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parses structured model output, tolerating a surrounding code fence.
pub fn parse_json_output<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
    serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

/// Parses a listening script; an empty script counts as malformed.
pub fn parse_script(raw: &str) -> Result<Vec<ScriptTurn>, GenerationError> {
    let script: Vec<ScriptTurn> = parse_json_output(raw)?;
    if script.is_empty() {
        return Err(GenerationError::Malformed("script has no turns".to_string()));
    }
    Ok(script)
}
