//! Aggregations over whole-table scans for the admin dashboard and the
//! voice agent's stats tool.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::matching::round_to;
use crate::types::{ChatMessage, Lead, Provider, ProviderRating, Sender};

const RECENT_ESCALATION_LIMIT: usize = 10;
const MESSAGE_HISTORY_DAYS: i64 = 7;

/// Per-day message counts, oldest day first. Serialized as a JSON object
/// whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayBuckets(pub Vec<(String, usize)>);

impl Serialize for DayBuckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (day, count) in &self.0 {
            map.serialize_entry(day, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRef {
    pub session_id: String,
    pub timestamp: i64,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAnalytics {
    pub total_leads: usize,
    pub total_sessions: usize,
    pub total_messages: usize,
    pub total_ai_messages: usize,
    pub total_user_messages: usize,
    pub escalation_count: usize,
    pub escalation_rate: u32,
    pub total_providers: usize,
    pub avg_rating: f64,
    pub leads_by_category: BTreeMap<String, usize>,
    pub messages_by_day: DayBuckets,
    pub recent_escalations: Vec<EscalationRef>,
}

fn day_key(at: DateTime<Utc>) -> String {
    at.format("%b %-d").to_string()
}

fn messages_by_day(messages: &[ChatMessage], now: DateTime<Utc>) -> DayBuckets {
    let mut buckets = (0..MESSAGE_HISTORY_DAYS)
        .rev()
        .map(|days_ago| (day_key(now - ChronoDuration::days(days_ago)), 0usize))
        .collect::<Vec<_>>();

    let window_start = now.timestamp_millis() - MESSAGE_HISTORY_DAYS * 24 * 60 * 60 * 1000;
    for message in messages.iter().filter(|m| m.timestamp >= window_start) {
        let Some(sent_at) = DateTime::<Utc>::from_timestamp_millis(message.timestamp) else {
            continue;
        };
        let key = day_key(sent_at);
        if let Some((_, count)) = buckets.iter_mut().find(|(day, _)| *day == key) {
            *count += 1;
        }
    }
    DayBuckets(buckets)
}

pub fn compute_admin_analytics(
    leads: &[Lead],
    messages: &[ChatMessage],
    providers: &[Provider],
    ratings: &[ProviderRating],
    now: DateTime<Utc>,
) -> AdminAnalytics {
    let mut escalations = messages
        .iter()
        .filter(|m| m.is_escalation())
        .collect::<Vec<_>>();

    let all_sessions = messages
        .iter()
        .map(|m| m.session_id.as_str())
        .collect::<HashSet<_>>();
    let escalated_sessions = escalations
        .iter()
        .map(|m| m.session_id.as_str())
        .collect::<HashSet<_>>();

    let total_ai_messages = messages
        .iter()
        .filter(|m| m.sender == Sender::Agent && !m.is_escalation())
        .count();
    let total_user_messages = messages.iter().filter(|m| m.sender == Sender::User).count();

    let avg_rating = if ratings.is_empty() {
        0.0
    } else {
        round_to(
            ratings.iter().map(|r| r.rating).sum::<f64>() / ratings.len() as f64,
            1,
        )
    };

    let mut leads_by_category = BTreeMap::new();
    for lead in leads {
        let category = lead
            .issue_category
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or("Unknown");
        *leads_by_category.entry(category.to_string()).or_insert(0) += 1;
    }

    let escalation_rate = if all_sessions.is_empty() {
        0
    } else {
        ((escalated_sessions.len() as f64 / all_sessions.len() as f64) * 100.0).round() as u32
    };

    escalations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let recent_escalations = escalations
        .iter()
        .take(RECENT_ESCALATION_LIMIT)
        .map(|m| EscalationRef {
            session_id: m.session_id.clone(),
            timestamp: m.timestamp,
            id: m.id.clone(),
        })
        .collect();

    AdminAnalytics {
        total_leads: leads.len(),
        total_sessions: all_sessions.len(),
        total_messages: messages.len(),
        total_ai_messages,
        total_user_messages,
        escalation_count: escalated_sessions.len(),
        escalation_rate,
        total_providers: providers.len(),
        avg_rating,
        leads_by_category,
        messages_by_day: messages_by_day(messages, now),
        recent_escalations,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub message_count: usize,
    pub is_escalated: bool,
    pub last_message_at: i64,
    pub last_message: String,
}

/// Groups messages by session key, most recently active session first.
pub fn group_sessions(messages: &[ChatMessage]) -> Vec<SessionOverview> {
    let mut order = HashMap::<&str, usize>::new();
    let mut sessions = Vec::<SessionOverview>::new();

    for message in messages {
        let index = *order.entry(message.session_id.as_str()).or_insert_with(|| {
            sessions.push(SessionOverview {
                session_id: message.session_id.clone(),
                messages: Vec::new(),
                message_count: 0,
                is_escalated: false,
                last_message_at: 0,
                last_message: String::new(),
            });
            sessions.len() - 1
        });
        let session = &mut sessions[index];
        session.messages.push(message.clone());
        session.message_count += 1;
        if message.timestamp > session.last_message_at {
            session.last_message_at = message.timestamp;
            session.last_message = message.message.clone();
        }
        if message.is_escalation() {
            session.is_escalated = true;
        }
    }

    sessions.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    sessions
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_providers: usize,
    pub total_leads: usize,
    pub total_messages: usize,
    pub leads_by_status: BTreeMap<String, usize>,
}

pub fn platform_stats(
    leads: &[Lead],
    providers: &[Provider],
    messages: &[ChatMessage],
) -> PlatformStats {
    let mut leads_by_status = BTreeMap::new();
    for lead in leads {
        *leads_by_status
            .entry(lead.status.as_str().to_string())
            .or_insert(0) += 1;
    }
    PlatformStats {
        total_providers: providers.len(),
        total_leads: leads.len(),
        total_messages: messages.len(),
        leads_by_status,
    }
}

pub fn sort_leads_newest_first(mut leads: Vec<Lead>) -> Vec<Lead> {
    leads.sort_by(|a, b| b.creation_time.cmp(&a.creation_time));
    leads
}

/// Open leads that were offered to the given provider, newest first.
pub fn provider_leads(leads: Vec<Lead>, provider_id: &str) -> Vec<Lead> {
    let assigned = leads
        .into_iter()
        .filter(|lead| {
            lead.status.is_open() && lead.assigned_providers.iter().any(|p| p.id == provider_id)
        })
        .collect();
    sort_leads_newest_first(assigned)
}
