use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::voice::audio::Utterance;

/// Reply the model gives when the clip holds no intelligible speech.
pub const NO_SPEECH: &str = "NO_SPEECH";

const TRANSCRIBE_PROMPT: &str = "\
Transcribe the spoken English command in this audio clip exactly as said. \
Reply with the transcription only, no quotes or commentary. \
If there is no intelligible speech, reply with exactly NO_SPEECH.";

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// `Ok(None)` when nothing intelligible was said; `Err` when the
    /// request itself failed.
    async fn transcribe(&self, utterance: &Utterance) -> VoxPlayResult<Option<String>>;
}

/// Transcribes through a multimodal chat model, sending the phrase as a WAV
/// `input_audio` part.
pub struct ModelTranscriber {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
}

impl ModelTranscriber {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self { provider, call }
    }
}

#[async_trait]
impl Transcriber for ModelTranscriber {
    async fn transcribe(&self, utterance: &Utterance) -> VoxPlayResult<Option<String>> {
        let audio = base64::engine::general_purpose::STANDARD.encode(utterance.to_wav());
        let messages = vec![ChatMessage::user_with_audio(TRANSCRIBE_PROMPT, audio, "wav")];

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.call.model,
            duration_ms = utterance.duration_ms(),
            "transcribing phrase"
        );
        let response = self
            .provider
            .chat(messages, &self.call)
            .await
            .map_err(|e| VoxPlayError::Voice(format!("transcription request failed: {e}")))?;
        Ok(parse_transcript(&response.content))
    }
}

fn parse_transcript(reply: &str) -> Option<String> {
    let text = reply
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim();
    if text.is_empty() || text.eq_ignore_ascii_case(NO_SPEECH) {
        None
    } else {
        Some(text.to_string())
    }
}
