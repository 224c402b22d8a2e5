//! xAI chat completions, used as the ranker's selection model.

use crate::upstream;
use mugshot_core::{SelectionModel, UpstreamError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "xai";
const COMPLETIONS_URL: &str = "https://api.x.ai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "grok-beta";
const MAX_TOKENS: u32 = 120;
const TEMPERATURE: f32 = 0.2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

pub struct XaiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl XaiClient {
    pub fn new(api_key: String, model: String) -> reqwest::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, api_key, model })
    }

    fn request_body(&self, prompt: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".into(),
                content: Some(prompt.to_string()),
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

impl SelectionModel for XaiClient {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| upstream(SERVICE, e))?;

        first_choice_text(&body)
    }
}

/// Trimmed content of the first choice.
fn first_choice_text(body: &str) -> Result<String, UpstreamError> {
    let malformed = |reason: String| UpstreamError::Malformed { service: SERVICE, reason };
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| malformed("no choices in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let client = XaiClient::new("k".into(), DEFAULT_MODEL.into()).unwrap();
        let json = serde_json::to_value(client.request_body("pick one")).unwrap();
        assert_eq!(json["model"], "grok-beta");
        assert_eq!(json["max_tokens"], 120);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "pick one");
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_first_choice_text() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant",
            "content":"  {\"index\": 1, \"reason\": \"faces\"}\n"},"finish_reason":"stop"}]}"#;
        assert_eq!(first_choice_text(body).unwrap(), r#"{"index": 1, "reason": "faces"}"#);
    }

    #[test]
    fn test_first_choice_text_empty() {
        assert!(matches!(
            first_choice_text(r#"{"choices":[]}"#),
            Err(UpstreamError::Malformed { .. })
        ));
        assert!(matches!(
            first_choice_text("<html>502</html>"),
            Err(UpstreamError::Malformed { .. })
        ));
    }
}
