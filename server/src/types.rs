use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canned reply stored when a chat is handed off to a human.
pub const ESCALATION_REPLY: &str = "A specialist will contact you soon.";

pub const ISSUE_CATEGORIES: [&str; 8] = [
    "Engine",
    "Brakes",
    "Electrical",
    "Transmission",
    "Tires",
    "AC/Heating",
    "Bodywork",
    "General",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Resolved,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Contacted => "Contacted",
            LeadStatus::Resolved => "Resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(LeadStatus::New),
            "contacted" => Some(LeadStatus::Contacted),
            "resolved" => Some(LeadStatus::Resolved),
            _ => None,
        }
    }

    /// Leads a provider still has to act on.
    pub fn is_open(&self) -> bool {
        matches!(self, LeadStatus::New | LeadStatus::Contacted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("user") {
            Sender::User
        } else {
            Sender::Agent
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Escalation,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Escalation => "escalation",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("escalation") {
            MessageKind::Escalation
        } else {
            MessageKind::Text
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Escalated,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Escalated => "escalated",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "escalated" => SessionStatus::Escalated,
            "closed" => SessionStatus::Closed,
            _ => SessionStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub creation_time: i64,
    pub name: String,
    #[serde(default)]
    pub services: Vec<String>,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    pub name: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Provider picked for a lead, stored on the lead itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedProvider {
    pub id: String,
    pub name: String,
    pub email: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub creation_time: i64,
    pub user_id: String,
    pub issue_description: String,
    pub car_model: String,
    pub status: LeadStatus,
    #[serde(default)]
    pub issue_category: Option<String>,
    #[serde(default)]
    pub assigned_providers: Vec<MatchedProvider>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub user_id: String,
    pub issue_description: String,
    pub car_model: String,
    pub issue_category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub creation_time: i64,
    pub session_id: String,
    pub sender: Sender,
    #[serde(default)]
    pub kind: MessageKind,
    pub message: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn is_escalation(&self) -> bool {
        self.sender == Sender::Agent && self.kind == MessageKind::Escalation
    }
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: String,
    pub sender: Sender,
    pub kind: MessageKind,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub creation_time: i64,
    pub user_id: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRating {
    pub id: String,
    pub creation_time: i64,
    pub provider_id: String,
    pub user_id: String,
    pub rating: f64,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub provider_id: String,
    pub user_id: String,
    pub rating: f64,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappSession {
    pub id: String,
    pub creation_time: i64,
    pub phone: String,
    pub session_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIssueBody {
    pub user_id: String,
    pub address: String,
    pub issue_description: String,
    #[serde(default)]
    pub car_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessageBody {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingBody {
    pub provider_id: String,
    pub user_id: String,
    pub rating: f64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearbyQuery {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceChatBody {
    pub session_id: String,
    pub base64_audio: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadStatusBody {
    pub status: String,
}

/// Request as seen by a webhook-triggered flow.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookInput {
    pub body: Value,
    pub headers: Value,
    pub query: Value,
    pub method: String,
    pub path: String,
    pub url: String,
}
