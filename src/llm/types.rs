use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn carrying a prompt and one screenshot.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// User turn carrying an instruction and one base64 audio clip.
    pub fn user_with_audio(
        text: impl Into<String>,
        data: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::InputAudio {
                    input_audio: InputAudio {
                        data: data.into(),
                        format: format.into(),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    InputAudio { input_audio: InputAudio },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudio {
    /// Base64 without a data-URL prefix.
    pub data: String,
    pub format: String,
}

/// Per-call model settings resolved from the provider entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    /// Only populated by providers that expose a separate reasoning channel.
    pub reasoning: String,
}
