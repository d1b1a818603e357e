//! Minimal OpenAI chat-completions client for text and vision prompts.

use crate::models::OpenAiConfig;
use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    chat_model: String,
    vision_model: String,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, config: &OpenAiConfig) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
            endpoint: OPENAI_ENDPOINT.to_string(),
        }
    }

    pub async fn chat(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let body = json!({
            "model": self.chat_model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": max_tokens,
        });
        self.complete(&body).await
    }

    /// Sends an image with the prompt and reports whether the answer
    /// contains `yes_word` (case-insensitive).
    pub async fn vision_yes_no(&self, prompt: &str, image: &[u8], yes_word: &str) -> Result<bool> {
        let body = json!({
            "model": self.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": data_url(image), "detail": "low" } }
                ]
            }],
            "max_tokens": 10,
        });
        let answer = self.complete(&body).await?;
        Ok(answer.to_uppercase().contains(&yes_word.to_uppercase()))
    }

    async fn complete(&self, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("OpenAI request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error ({}): {}", status, text);
        }

        let json: Value = response.json().await.context("Failed to parse OpenAI response")?;
        message_content(&json)
    }
}

pub fn data_url(image: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(image))
}

fn message_content(json: &Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid response format"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_is_base64_png() {
        assert_eq!(data_url(b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn content_is_extracted() {
        let json = json!({ "choices": [{ "message": { "role": "assistant", "content": " GOOD \n" } }] });
        assert_eq!(message_content(&json).unwrap(), "GOOD");
        assert!(message_content(&json!({ "error": "nope" })).is_err());
    }
}
