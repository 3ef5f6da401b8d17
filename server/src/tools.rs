//! Voice-agent tool calls: request parsing and the static responses.

use serde::Serialize;
use serde_json::{json, Value};

use crate::types::ISSUE_CATEGORIES;

pub const FIND_PROVIDERS: &str = "find_providers";
pub const GET_ISSUE_CATEGORIES: &str = "get_issue_categories";
pub const GET_PLATFORM_STATS: &str = "get_platform_stats";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub tool_name: String,
    pub parameters: Value,
    pub conversation_id: Option<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    FindProviders,
    IssueCategories,
    PlatformStats,
    Unknown(String),
}

impl Tool {
    pub fn from_name(name: &str) -> Self {
        match name {
            FIND_PROVIDERS => Tool::FindProviders,
            GET_ISSUE_CATEGORIES => Tool::IssueCategories,
            GET_PLATFORM_STATS => Tool::PlatformStats,
            other => Tool::Unknown(other.to_string()),
        }
    }
}

fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Accepts the field spellings the voice platform has used over time.
pub fn parse_tool_request(body: &Value) -> ToolRequest {
    let tool = body.get("tool");
    let tool_name = first_text([
        body.get("tool_name"),
        body.get("name"),
        tool.and_then(|t| t.get("name")),
    ])
    .unwrap_or_else(|| "unknown".to_string());

    let parameters = [
        body.get("parameters"),
        body.get("input"),
        tool.and_then(|t| t.get("input")),
    ]
    .into_iter()
    .flatten()
    .find(|value| value.is_object())
    .cloned()
    .unwrap_or_else(|| json!({}));

    ToolRequest {
        tool_name,
        parameters,
        conversation_id: first_text([body.get("conversation_id"), body.get("conversationId")]),
        agent_id: first_text([body.get("agent_id"), body.get("agentId")]),
    }
}

/// Numeric tool parameter given as a number or a numeric string; `0.0`
/// otherwise.
pub fn number_param(parameters: &Value, key: &str) -> f64 {
    match parameters.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn text_param(parameters: &Value, key: &str) -> String {
    parameters
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string()
}

pub fn categories_response() -> Value {
    json!({
        "categories": ISSUE_CATEGORIES,
        "tool": GET_ISSUE_CATEGORIES,
    })
}

pub fn unknown_tool_response(tool_name: &str) -> Value {
    json!({
        "error": true,
        "message": format!(
            "Unknown tool: \"{tool_name}\". Supported tools are: \
             {FIND_PROVIDERS}, {GET_ISSUE_CATEGORIES}, {GET_PLATFORM_STATS}."
        ),
        "tool": tool_name,
    })
}
