use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

const OPENAI_API: &str = "https://api.openai.com/v1";

#[automock]
#[async_trait]
pub trait LlmGateway {
    /// Free-form completion used for the CIM memo.
    async fn generate_memo(&self, prompt: String) -> Result<String>;

    /// JSON-mode chat completion used for deal scoring. Returns the raw message content.
    async fn score_deal(&self, system_prompt: String, user_content: String) -> Result<String>;
}

/// Minimal OpenAI client built on reqwest.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    memo_model: String,
    scoring_model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetails {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesOutput {
    #[serde(default)]
    pub output: Vec<ResponsesOutputItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesOutputItem {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub content: Vec<ResponsesContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsesContent {
    #[serde(rename = "type", default)]
    pub type_: String,
    pub text: Option<String>,
}

impl ResponsesOutput {
    /// Concatenates every `output_text` part of every message item.
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.type_ == "message")
            .flat_map(|item| item.content.iter())
            .filter(|content| content.type_ == "output_text")
            .filter_map(|content| content.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: String, memo_model: String, scoring_model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            memo_model,
            scoring_model,
        }
    }

    async fn ensure_success(
        resp: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let body = resp.text().await.unwrap_or_default();
        let details = serde_json::from_str::<OpenAiErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error);

        error!(
            status = %status,
            openai_request_id = ?request_id,
            openai_error_type = ?details.as_ref().and_then(|d| d.type_.as_deref()),
            openai_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
            context = %context,
            "openai api request failed"
        );

        let message = details
            .and_then(|d| d.message)
            .unwrap_or_else(|| format!("status {status}"));

        anyhow::bail!("OpenAI {context} failed: {message}");
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        context: &str,
    ) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{OPENAI_API}/{path}"))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(resp, context).await
    }
}

#[async_trait]
impl LlmGateway for OpenAiClient {
    async fn generate_memo(&self, prompt: String) -> Result<String> {
        // https://platform.openai.com/docs/api-reference/responses/create
        let body = json!({
            "model": self.memo_model,
            "input": prompt,
        });

        let resp = self.post_json("responses", body, "create response").await?;
        let parsed: ResponsesOutput = resp.json().await?;
        let text = parsed.output_text();

        debug!(model = %self.memo_model, chars = text.len(), "memo generated");
        Ok(text)
    }

    async fn score_deal(&self, system_prompt: String, user_content: String) -> Result<String> {
        let body = json!({
            "model": self.scoring_model,
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content },
            ],
        });

        let resp = self
            .post_json("chat/completions", body, "chat completion")
            .await?;
        let parsed: ChatCompletion = resp.json().await?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_joins_message_parts() {
        let parsed: ResponsesOutput = serde_json::from_value(json!({
            "output": [
                { "type": "reasoning", "content": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "## Executive Summary\n" },
                    { "type": "output_text", "text": "Solid HVAC business." }
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(parsed.output_text(), "## Executive Summary\nSolid HVAC business.");
    }

    #[test]
    fn output_text_is_empty_without_messages() {
        assert_eq!(ResponsesOutput::default().output_text(), "");
    }
}
