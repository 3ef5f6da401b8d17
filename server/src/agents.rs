//! Hosted LLM calls and the small agents built on top of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::matching;
use crate::prompting;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> AppResult<String>;
}

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            model: config.openai_model.clone(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> AppResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("OPENAI_API_KEY"))?;
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user }
                ],
                "temperature": 0.2
            }))
            .send()
            .await
            .map_err(AppError::http("openai"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "openai call failed");
            return Err(AppError::Upstream {
                service: "openai",
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| AppError::decode("openai", err.to_string()))?;
        let text = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("")
            .to_string();
        if text.is_empty() {
            return Err(AppError::decode("openai", "response had empty content"));
        }
        Ok(text)
    }
}

/// Finds the JSON object in a model reply, tolerating code fences and prose
/// around it.
pub fn extract_json_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut candidates = vec![trimmed.to_string()];
    if trimmed.starts_with("```") {
        let stripped = trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string();
        if !stripped.is_empty() {
            candidates.push(stripped);
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            candidates.push(trimmed[start..=end].to_string());
        }
    }

    candidates
        .iter()
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find(Value::is_object)
}

fn string_field(value: Option<&Value>, key: &str) -> Option<String> {
    value?
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIssue {
    pub car_model: String,
    pub issue_category: String,
    pub issue_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub english_message: String,
    pub detected_language: String,
}

pub async fn assistant_reply(model: &dyn LanguageModel, input: &str) -> AppResult<String> {
    let reply = model
        .complete(prompting::ASSISTANT_INSTRUCTIONS, input)
        .await?;
    Ok(reply.trim().to_string())
}

pub async fn parse_issue(model: &dyn LanguageModel, text: &str) -> AppResult<ParsedIssue> {
    let raw = model
        .complete(&prompting::parse_issue_instructions(), text)
        .await?;
    let parsed = extract_json_object(&raw);
    if parsed.is_none() {
        tracing::warn!("issue parser reply had no JSON object");
    }
    Ok(ParsedIssue {
        car_model: string_field(parsed.as_ref(), "carModel")
            .unwrap_or_else(|| "Unknown".to_string()),
        issue_category: string_field(parsed.as_ref(), "issueCategory")
            .unwrap_or_else(|| matching::FALLBACK_CATEGORY.to_string()),
        issue_description: string_field(parsed.as_ref(), "issueDescription")
            .unwrap_or_else(|| text.trim().to_string()),
    })
}

pub async fn extract_intent(model: &dyn LanguageModel, text: &str) -> AppResult<Intent> {
    let raw = model
        .complete(&prompting::extract_intent_instructions(), text)
        .await?;
    let parsed = extract_json_object(&raw);
    Ok(Intent {
        english_message: string_field(parsed.as_ref(), "englishMessage")
            .unwrap_or_else(|| text.trim().to_string()),
        detected_language: string_field(parsed.as_ref(), "detectedLanguage")
            .unwrap_or_else(|| "English".to_string()),
    })
}
