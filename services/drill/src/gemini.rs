//! Gemini REST client for script/lesson generation and multi-speaker speech.

use crate::audio_utils::decode_pcm_base64;
use async_trait::async_trait;
use obsede_core::llm_client::{GenerationClient, GenerationError, Role, ScriptTurn};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Script turns sent to the speech model per request.
pub const MAX_TURNS_PER_CHUNK: usize = 20;

const TUTOR_SPEAKER: &str = "Tutor";
const ACTOR_SPEAKER: &str = "Acteur";
const TUTOR_VOICE: &str = "Achernar";
const ACTOR_VOICE: &str = "Alnilam";

const TEXT_TIMEOUT: Duration = Duration::from_secs(120);
const AUDIO_TIMEOUT: Duration = Duration::from_secs(180);

const DIRECTOR_NOTES: &str = "# AUDIO PROFILES

## Tutor
Concise English instructor. Keep English brief - only essential context.

## Acteur
Native French speaker reading French text with authentic Parisian accent.

### DIRECTOR'S NOTES
Pacing: Fast, natural conversational speed. No slow dictation. Speak as natives would in real conversation.
Tutor: American English accent. Brief and efficient delivery.
Acteur: Native French (Parisian) accent. Speak French passages at authentic native speed with proper French phonetics.

### DIALOGUE
";

// --- Local Gemini REST Types ---
mod gemini_types {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateContentRequest {
        pub contents: Vec<Content>,
        pub generation_config: GenerationConfig,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub tools: Vec<Tool>,
    }
    #[derive(Serialize)]
    pub(super) struct Content {
        pub role: String,
        pub parts: Vec<Part>,
    }
    #[derive(Serialize)]
    pub(super) struct Part {
        pub text: String,
    }
    #[derive(Serialize, Default)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub thinking_config: Option<ThinkingConfig>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub response_modalities: Option<Vec<ResponseModality>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub speech_config: Option<SpeechConfig>,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ThinkingConfig {
        pub thinking_level: String,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub(super) enum ResponseModality {
        Audio,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Tool {
        pub google_search: GoogleSearch,
    }
    #[derive(Serialize)]
    pub(super) struct GoogleSearch {}
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeechConfig {
        pub multi_speaker_voice_config: MultiSpeakerVoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct MultiSpeakerVoiceConfig {
        pub speaker_voice_configs: Vec<SpeakerVoiceConfig>,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct SpeakerVoiceConfig {
        pub speaker: String,
        pub voice_config: VoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }

    /// `streamGenerateContent` answers with an array of chunks; some proxies collapse
    /// it into a single object.
    #[derive(Deserialize, Debug)]
    #[serde(untagged)]
    pub(super) enum StreamResponse {
        Chunks(Vec<ResponseChunk>),
        Single(ResponseChunk),
    }
    #[derive(Deserialize, Debug, Default)]
    pub(super) struct ResponseChunk {
        #[serde(default)]
        pub candidates: Vec<Candidate>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct Candidate {
        pub content: Option<CandidateContent>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct CandidateContent {
        #[serde(default)]
        pub parts: Vec<ResponsePart>,
    }
    #[derive(Deserialize, Debug)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ResponsePart {
        pub text: Option<String>,
        pub inline_data: Option<InlineData>,
    }
    #[derive(Deserialize, Debug)]
    pub(super) struct InlineData {
        pub data: String,
    }
}

use gemini_types::*;

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// Only [`GenerationError::Transient`] failures are retried. A transient failure on the
/// last attempt comes back as [`GenerationError::Fatal`].
pub async fn retry_with_backoff<F, Fut, T>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt = 1;
    let mut delay = policy.initial_delay;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= policy.multiplier;
                attempt += 1;
            }
            Err(GenerationError::Transient(msg)) => {
                return Err(GenerationError::Fatal(format!(
                    "{operation_name} failed after {attempt} attempts: {msg}"
                )));
            }
            Err(e) => return Err(e),
        }
    }
}

fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let msg = format!("HTTP {status}: {}", body.chars().take(300).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GenerationError::Transient(msg)
    } else {
        GenerationError::Fatal(msg)
    }
}

fn classify_transport(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        GenerationError::Transient(e.to_string())
    } else {
        GenerationError::Fatal(e.to_string())
    }
}

fn parse_stream(body: &str) -> Result<Vec<ResponseChunk>, GenerationError> {
    match serde_json::from_str::<StreamResponse>(body) {
        Ok(StreamResponse::Chunks(chunks)) => Ok(chunks),
        Ok(StreamResponse::Single(chunk)) => Ok(vec![chunk]),
        Err(e) => Err(GenerationError::Malformed(format!("unexpected response shape: {e}"))),
    }
}

fn response_parts(chunks: Vec<ResponseChunk>) -> impl Iterator<Item = ResponsePart> {
    chunks
        .into_iter()
        .flat_map(|chunk| chunk.candidates)
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
}

/// Concatenates every text part of a streamed answer.
fn collect_text(body: &str) -> Result<String, GenerationError> {
    Ok(response_parts(parse_stream(body)?)
        .filter_map(|part| part.text)
        .collect())
}

/// Concatenates the decoded audio of every `inlineData` part of a streamed answer.
fn collect_audio(body: &str) -> Result<Vec<u8>, GenerationError> {
    let mut pcm = Vec::new();
    for part in response_parts(parse_stream(body)?) {
        if let Some(inline) = part.inline_data {
            let bytes = decode_pcm_base64(&inline.data)
                .map_err(|e| GenerationError::Malformed(format!("audio is not valid base64: {e}")))?;
            pcm.extend_from_slice(&bytes);
        }
    }
    Ok(pcm)
}

/// Renders script turns as the two-speaker dialogue the speech model reads.
pub fn render_dialogue(turns: &[ScriptTurn]) -> String {
    let lines: Vec<String> = turns
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                Role::TutorEn => TUTOR_SPEAKER,
                Role::ActorFr => ACTOR_SPEAKER,
            };
            format!("{speaker}: {}", turn.text)
        })
        .collect();
    format!("{DIRECTOR_NOTES}{}", lines.join("\n"))
}

fn speaker(name: &str, voice: &str) -> SpeakerVoiceConfig {
    SpeakerVoiceConfig {
        speaker: name.to_string(),
        voice_config: VoiceConfig {
            prebuilt_voice_config: PrebuiltVoiceConfig {
                voice_name: voice.to_string(),
            },
        },
    }
}

fn user_content(text: String) -> Vec<Content> {
    vec![Content {
        role: "user".to_string(),
        parts: vec![Part { text }],
    }]
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    text_model: String,
    tts_model: String,
    retry: RetryPolicy,
    chunk_pause: Duration,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, text_model: impl Into<String>, tts_model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: GEMINI_API_BASE.to_string(),
            text_model: text_model.into(),
            tts_model: tts_model.into(),
            retry: RetryPolicy::default(),
            chunk_pause: Duration::from_secs(2),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pause between consecutive speech requests.
    pub fn with_chunk_pause(mut self, pause: Duration) -> Self {
        self.chunk_pause = pause;
        self
    }

    fn stream_url(&self, model: &str) -> String {
        format!("{}/models/{model}:streamGenerateContent", self.base_url)
    }

    /// One POST to `streamGenerateContent`, returning the raw body on success.
    async fn post(&self, model: &str, request: &GenerateContentRequest, timeout: Duration) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(self.stream_url(model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        Ok(body)
    }

    async fn generate_audio_chunk(&self, turns: &[ScriptTurn]) -> Result<Vec<u8>, GenerationError> {
        let request = GenerateContentRequest {
            contents: user_content(render_dialogue(turns)),
            generation_config: GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig {
                    multi_speaker_voice_config: MultiSpeakerVoiceConfig {
                        speaker_voice_configs: vec![
                            speaker(TUTOR_SPEAKER, TUTOR_VOICE),
                            speaker(ACTOR_SPEAKER, ACTOR_VOICE),
                        ],
                    },
                }),
                ..Default::default()
            },
            tools: Vec::new(),
        };
        let body = retry_with_backoff(self.retry, "speech synthesis", || {
            self.post(&self.tts_model, &request, AUDIO_TIMEOUT)
        })
        .await?;
        collect_audio(&body)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate_content(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: user_content(prompt.to_string()),
            generation_config: GenerationConfig {
                thinking_config: Some(ThinkingConfig {
                    thinking_level: "HIGH".to_string(),
                }),
                ..Default::default()
            },
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
        };
        let body = retry_with_backoff(self.retry, "text generation", || {
            self.post(&self.text_model, &request, TEXT_TIMEOUT)
        })
        .await?;
        collect_text(&body)
    }

    async fn generate_audio(&self, script: &[ScriptTurn]) -> Result<Vec<u8>, GenerationError> {
        let chunks: Vec<&[ScriptTurn]> = script.chunks(MAX_TURNS_PER_CHUNK).collect();
        info!(turns = script.len(), chunks = chunks.len(), "Generating audio");

        let mut pcm = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.chunk_pause).await;
            }
            info!(chunk = i + 1, of = chunks.len(), turns = chunk.len(), "Synthesizing chunk");
            pcm.extend(self.generate_audio_chunk(chunk).await?);
        }
        if pcm.is_empty() {
            return Err(GenerationError::Malformed("speech model returned no audio".to_string()));
        }
        Ok(pcm)
    }
}
