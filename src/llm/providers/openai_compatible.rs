use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{VoxPlayError, VoxPlayResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// `timeout` bounds the whole request, so a stalled endpoint fails the
    /// cycle instead of hanging it.
    pub fn new(
        id: String,
        api_base: String,
        api_key: String,
        timeout: Duration,
    ) -> VoxPlayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id,
            api_base,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> VoxPlayResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": false,
            "temperature": cfg.temperature,
        });

        tracing::debug!(provider = %self.id, model = %cfg.model, "sending LLM request");
        tracing::debug!(
            body = %sanitize_for_log(&body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(VoxPlayError::Llm(format!("{status}: {err_body}")));
        }

        let json: serde_json::Value = response.json().await?;
        let parsed = parse_completion(&json)?;
        tracing::info!(
            provider = %self.id,
            content_len = parsed.content.len(),
            reasoning_len = parsed.reasoning.len(),
            "LLM response received"
        );
        Ok(parsed)
    }
}

/// Pulls the first choice out of a chat-completions response body.
fn parse_completion(json: &serde_json::Value) -> VoxPlayResult<LlmResponse> {
    let message = &json["choices"][0]["message"];
    let content = match &message["content"] {
        serde_json::Value::String(s) => s.clone(),
        // Some gateways return content as a list of text parts.
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    };

    if content.trim().is_empty() {
        return Err(VoxPlayError::Llm(format!(
            "completion has no content: {}",
            json["error"]["message"].as_str().unwrap_or("empty choices")
        )));
    }

    Ok(LlmResponse {
        content,
        reasoning: message["reasoning_content"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    })
}

/// Serialises a request body for logging with image payloads blanked out.
fn sanitize_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                match part.get("type").and_then(|t| t.as_str()) {
                    Some("image_url") => {
                        if let Some(url) = part.get_mut("image_url").and_then(|i| i.get_mut("url")) {
                            *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                        }
                    }
                    Some("input_audio") => {
                        if let Some(data) =
                            part.get_mut("input_audio").and_then(|a| a.get_mut("data"))
                        {
                            *data = serde_json::Value::String("<omitted_base64_audio>".to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}
