//! Request flows. Each flow is a fixed sequence of awaited steps; every
//! completed step lands in the flow's trace and the first failing step ends
//! the flow.

use std::sync::{Arc, LazyLock};

use axum::http::StatusCode;
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::agents;
use crate::analytics;
use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::integrations::{self, FetchedMedia};
use crate::matching::{self, LEAD_MATCH_LIMIT};
use crate::prompting::{self, CustomerContext, ProviderEmail};
use crate::store::now_millis;
use crate::tools::{self, Tool, FIND_PROVIDERS, GET_PLATFORM_STATS};
use crate::types::*;

pub const PROVIDER_REQUEST_SUBJECT: &str = "New Auto Repair Request";
pub const SUPPORT_REQUEST_SUBJECT: &str = "Customer Requesting Human Support";
pub const RATING_UPDATED: &str = "Rating submitted and provider score updated successfully.";
const UNFETCHED_VOICE_NOTE: &str = "[voice message could not be fetched]";
const UNTRANSCRIBED_AUDIO: &str = "[Could not transcribe audio]";

static ESCALATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(human|agent|representative)").expect("escalation pattern is valid")
});

pub fn wants_human(message: &str) -> bool {
    ESCALATION_PATTERN.is_match(message)
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub step: &'static str,
    pub input: Value,
    pub output: Value,
}

pub struct FlowTrace {
    flow: &'static str,
    steps: Vec<TraceStep>,
}

impl FlowTrace {
    pub fn new(flow: &'static str) -> Self {
        tracing::debug!(flow, "flow started");
        Self {
            flow,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, step: &'static str, input: impl Serialize, output: impl Serialize) {
        tracing::debug!(flow = self.flow, step, "flow step completed");
        self.steps.push(TraceStep {
            step,
            input: serde_json::to_value(input).unwrap_or(Value::Null),
            output: serde_json::to_value(output).unwrap_or(Value::Null),
        });
    }

    pub fn finish<T: Serialize>(self, result: AppResult<T>) -> FlowOutcome {
        match result {
            Ok(value) => FlowOutcome {
                result: serde_json::to_value(value).unwrap_or(Value::Null),
                trace: self.steps,
                error: None,
                status: StatusCode::OK,
            },
            Err(err) => {
                let (status, _) = err.status();
                tracing::warn!(
                    flow = self.flow,
                    completed_steps = self.steps.len(),
                    error = %err,
                    "flow failed"
                );
                FlowOutcome {
                    result: Value::Null,
                    trace: self.steps,
                    error: Some(err.to_string()),
                    status,
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FlowOutcome {
    pub result: Value,
    pub trace: Vec<TraceStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl FlowOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(())
}

pub async fn submit_issue(state: &Arc<AppState>, body: SubmitIssueBody) -> AppResult<FlowOutcome> {
    require(&body.user_id, "userId")?;
    require(&body.address, "address")?;
    require(&body.issue_description, "issueDescription")?;

    let mut trace = FlowTrace::new("submit_issue");
    let result = submit_issue_steps(state, &body, &mut trace).await;
    Ok(trace.finish(result))
}

async fn submit_issue_steps(
    state: &Arc<AppState>,
    body: &SubmitIssueBody,
    trace: &mut FlowTrace,
) -> AppResult<Vec<MatchedProvider>> {
    let geocode = state.geocoder.geocode(&body.address).await?;
    trace.record("Geocode Address", json!({ "address": body.address }), &geocode);

    let origin = integrations::extract_coordinates(&geocode);
    trace.record("Extract Coordinates", Value::Null, origin);

    let parsed = agents::parse_issue(state.llm.as_ref(), &body.issue_description).await?;
    trace.record("Parse Issue", &body.issue_description, &parsed);

    let car_model = body
        .car_model
        .as_deref()
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(&parsed.car_model)
        .to_string();
    let lead = state
        .store
        .insert_lead(NewLead {
            user_id: body.user_id.clone(),
            issue_description: parsed.issue_description.clone(),
            car_model,
            issue_category: Some(parsed.issue_category.clone()),
            latitude: Some(origin.lat),
            longitude: Some(origin.lng),
        })
        .await?;
    trace.record("Save Lead", &parsed, &lead);

    let providers = state.store.list_providers().await?;
    trace.record("Find Providers", Value::Null, json!({ "count": providers.len() }));

    let matched = matching::match_providers_for_lead(&providers, &parsed.issue_category, origin);
    trace.record("Sort & Filter Providers", &parsed.issue_category, &matched);

    state.store.assign_providers(&lead.id, &matched).await?;
    trace.record("Assign Providers to Lead", &lead.id, &matched);

    // Delivery problems only show up in the trace; the customer still sees
    // every assigned provider.
    let mut deliveries = Vec::with_capacity(matched.len());
    for provider in &matched {
        let status = notify_provider(state, &lead, provider).await;
        deliveries.push(json!({ "providerId": provider.id, "status": status }));
    }
    trace.record("Notify Providers", &matched, &deliveries);

    Ok(matched)
}

/// One bounded delivery attempt; failures are reported, never raised.
async fn notify_provider(
    state: &Arc<AppState>,
    lead: &Lead,
    provider: &MatchedProvider,
) -> &'static str {
    if provider.email.trim().is_empty() {
        return "skipped";
    }
    let html = prompting::render_provider_email(&ProviderEmail {
        provider_name: &provider.name,
        lead_id: &lead.id,
        car_model: &lead.car_model,
        issue_category: lead.issue_category.as_deref().unwrap_or("Unknown"),
        issue_description: &lead.issue_description,
        distance_km: provider.distance,
    });
    let send = state
        .mailer
        .send(&provider.email, PROVIDER_REQUEST_SUBJECT, &html);
    match tokio::time::timeout(state.config.notify_timeout, send).await {
        Ok(Ok(_)) => "sent",
        Ok(Err(err)) => {
            tracing::warn!(provider_id = %provider.id, error = %err, "provider notification failed");
            "failed"
        }
        Err(_) => {
            tracing::warn!(provider_id = %provider.id, "provider notification timed out");
            "timeout"
        }
    }
}

fn user_message(session_id: &str, text: &str) -> NewChatMessage {
    NewChatMessage {
        session_id: session_id.to_string(),
        sender: Sender::User,
        kind: MessageKind::Text,
        message: text.to_string(),
        timestamp: now_millis(),
    }
}

fn agent_message(session_id: &str, text: &str) -> NewChatMessage {
    NewChatMessage {
        sender: Sender::Agent,
        ..user_message(session_id, text)
    }
}

async fn save_canned_reply(
    state: &Arc<AppState>,
    session_id: &str,
    trace: &mut FlowTrace,
) -> AppResult<ChatMessage> {
    let canned = state
        .store
        .insert_message(NewChatMessage {
            kind: MessageKind::Escalation,
            ..agent_message(session_id, ESCALATION_REPLY)
        })
        .await?;
    // Web chat keys are client-generated, so there may be no session row.
    let flagged = state
        .store
        .set_session_status(session_id, SessionStatus::Escalated)
        .await?;
    trace.record(
        "Save Canned Reply",
        session_id,
        json!({ "message": canned, "sessionFlagged": flagged }),
    );
    Ok(canned)
}

pub async fn send_chat_message(
    state: &Arc<AppState>,
    body: SessionMessageBody,
) -> AppResult<FlowOutcome> {
    require(&body.session_id, "sessionId")?;
    require(&body.message, "message")?;

    let mut trace = FlowTrace::new("send_chat_message");
    let result = send_chat_message_steps(state, &body, &mut trace).await;
    Ok(trace.finish(result))
}

async fn send_chat_message_steps(
    state: &Arc<AppState>,
    body: &SessionMessageBody,
    trace: &mut FlowTrace,
) -> AppResult<Value> {
    let saved = state
        .store
        .insert_message(user_message(&body.session_id, &body.message))
        .await?;
    trace.record("Save Chat Message", body, &saved);

    let escalate = wants_human(&body.message);
    trace.record(
        "Escalation Check",
        &body.message,
        json!({ "conditionResult": escalate }),
    );

    if escalate {
        save_canned_reply(state, &body.session_id, trace).await?;

        let html = prompting::render_support_email(&body.session_id, &body.message);
        let send = state.mailer.send(
            &state.config.admin_email,
            SUPPORT_REQUEST_SUBJECT,
            &html,
        );
        let delivery = match tokio::time::timeout(state.config.notify_timeout, send).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(err)) => {
                tracing::warn!(session_id = %body.session_id, error = %err, "admin notification failed");
                json!({ "success": false, "error": err.to_string() })
            }
            Err(_) => {
                tracing::warn!(session_id = %body.session_id, "admin notification timed out");
                json!({ "success": false, "error": "timeout" })
            }
        };
        trace.record("Notify Admin", &state.config.admin_email, &delivery);
        return Ok(Value::String(ESCALATION_REPLY.to_string()));
    }

    let reply = agents::assistant_reply(state.llm.as_ref(), &body.message).await?;
    trace.record("AI Car Repair Assistant", &body.message, &reply);

    let saved_reply = state
        .store
        .insert_message(agent_message(&body.session_id, &reply))
        .await?;
    trace.record("Save Agent Reply", &reply, &saved_reply);

    Ok(serde_json::to_value(saved_reply).unwrap_or(Value::Null))
}

pub async fn escalate_session(state: &Arc<AppState>, session_id: &str) -> AppResult<FlowOutcome> {
    require(session_id, "sessionId")?;

    let mut trace = FlowTrace::new("escalate_session");
    let result = save_canned_reply(state, session_id, &mut trace)
        .await
        .map(|_| ESCALATION_REPLY);
    Ok(trace.finish(result))
}

pub async fn submit_rating(state: &Arc<AppState>, body: SubmitRatingBody) -> AppResult<FlowOutcome> {
    require(&body.provider_id, "providerId")?;
    require(&body.user_id, "userId")?;
    if !body.rating.is_finite() || !(1.0..=5.0).contains(&body.rating) {
        return Err(AppError::BadRequest(
            "rating must be between 1 and 5".to_string(),
        ));
    }
    if state.store.get_provider(&body.provider_id).await?.is_none() {
        return Err(AppError::NotFound(format!("provider {}", body.provider_id)));
    }

    let mut trace = FlowTrace::new("submit_rating");
    let result = submit_rating_steps(state, body, &mut trace).await;
    Ok(trace.finish(result))
}

async fn submit_rating_steps(
    state: &Arc<AppState>,
    body: SubmitRatingBody,
    trace: &mut FlowTrace,
) -> AppResult<&'static str> {
    let provider_id = body.provider_id.clone();
    let saved = state
        .store
        .insert_rating(NewRating {
            provider_id: body.provider_id,
            user_id: body.user_id,
            rating: body.rating,
            comment: body.comment,
        })
        .await?;
    trace.record("Save Provider Rating", Value::Null, &saved);

    let ratings = state.store.provider_ratings(&provider_id).await?;
    trace.record("Fetch Provider Ratings", &provider_id, json!({ "count": ratings.len() }));

    let average = matching::average_rating(&ratings);
    trace.record(
        "Compute Average Rating",
        Value::Null,
        json!({ "providerId": provider_id, "averageRating": average }),
    );

    state
        .store
        .update_provider_rating(&provider_id, average)
        .await?;
    trace.record("Update Provider Rating", &provider_id, average);

    Ok(RATING_UPDATED)
}

pub async fn nearby_providers(state: &Arc<AppState>, query: NearbyQuery) -> FlowOutcome {
    let mut trace = FlowTrace::new("nearby_providers");
    let result = async {
        let providers = state.store.list_providers().await?;
        trace.record("Fetch All Providers", Value::Null, json!({ "count": providers.len() }));

        let origin = Coordinates {
            lat: query.latitude.unwrap_or(0.0),
            lng: query.longitude.unwrap_or(0.0),
        };
        let nearby = matching::rank_by_distance(&providers, origin);
        trace.record("Sort by Distance", origin, json!({ "count": nearby.len() }));

        Ok::<_, AppError>(json!({ "nearby": nearby, "all": providers }))
    }
    .await;
    trace.finish(result)
}

pub async fn admin_providers(state: &Arc<AppState>) -> FlowOutcome {
    nearby_providers(state, NearbyQuery::default()).await
}

pub async fn chat_history(state: &Arc<AppState>, session_id: &str) -> AppResult<FlowOutcome> {
    require(session_id, "sessionId")?;

    let mut trace = FlowTrace::new("chat_history");
    let result = async {
        let mut messages = state.store.session_messages(session_id).await?;
        trace.record("Fetch Chat Messages", session_id, json!({ "count": messages.len() }));

        messages.sort_by_key(|m| m.timestamp);
        trace.record("Sort Messages by Timestamp", Value::Null, json!({ "count": messages.len() }));
        Ok::<_, AppError>(messages)
    }
    .await;
    Ok(trace.finish(result))
}

pub async fn provider_leads(state: &Arc<AppState>, provider_id: &str) -> AppResult<FlowOutcome> {
    require(provider_id, "providerId")?;

    let mut trace = FlowTrace::new("provider_leads");
    let result = async {
        let leads = state.store.list_leads().await?;
        trace.record("Fetch All Leads", Value::Null, json!({ "count": leads.len() }));

        let assigned = analytics::provider_leads(leads, provider_id);
        trace.record("Filter Provider Leads", provider_id, json!({ "count": assigned.len() }));
        Ok::<_, AppError>(assigned)
    }
    .await;
    Ok(trace.finish(result))
}

pub async fn update_lead_status(
    state: &Arc<AppState>,
    lead_id: &str,
    body: LeadStatusBody,
) -> AppResult<FlowOutcome> {
    require(lead_id, "leadId")?;
    let status = LeadStatus::parse(&body.status).ok_or_else(|| {
        AppError::BadRequest(format!(
            "status must be one of New, Contacted, Resolved (got \"{}\")",
            body.status
        ))
    })?;

    let mut trace = FlowTrace::new("update_lead_status");
    let result = state.store.update_lead_status(lead_id, status).await;
    if let Ok(lead) = &result {
        trace.record("Update Lead Status", json!({ "leadId": lead_id, "status": status }), lead);
    }
    Ok(trace.finish(result))
}

pub async fn admin_analytics(state: &Arc<AppState>) -> FlowOutcome {
    let mut trace = FlowTrace::new("admin_analytics");
    let result = async {
        let leads = state.store.list_leads().await?;
        trace.record("Fetch Analytics Leads", Value::Null, json!({ "count": leads.len() }));
        let messages = state.store.list_messages().await?;
        trace.record("Fetch Analytics Messages", Value::Null, json!({ "count": messages.len() }));
        let providers = state.store.list_providers().await?;
        trace.record("Fetch Analytics Providers", Value::Null, json!({ "count": providers.len() }));
        let ratings = state.store.list_ratings().await?;
        trace.record("Fetch Analytics Ratings", Value::Null, json!({ "count": ratings.len() }));

        let stats =
            analytics::compute_admin_analytics(&leads, &messages, &providers, &ratings, Utc::now());
        trace.record("Compute Analytics", Value::Null, Value::Null);
        Ok::<_, AppError>(stats)
    }
    .await;
    trace.finish(result)
}

pub async fn admin_sessions(state: &Arc<AppState>) -> FlowOutcome {
    let mut trace = FlowTrace::new("admin_sessions");
    let result = async {
        let messages = state.store.list_messages().await?;
        trace.record(
            "Fetch All Messages For Sessions",
            Value::Null,
            json!({ "count": messages.len() }),
        );
        let sessions = analytics::group_sessions(&messages);
        trace.record("Group Sessions", Value::Null, json!({ "count": sessions.len() }));
        Ok::<_, AppError>(sessions)
    }
    .await;
    trace.finish(result)
}

pub async fn admin_leads(state: &Arc<AppState>) -> FlowOutcome {
    let mut trace = FlowTrace::new("admin_leads");
    let result = async {
        let leads = state.store.list_leads().await?;
        trace.record("Fetch All Leads For Admin", Value::Null, json!({ "count": leads.len() }));
        let sorted = analytics::sort_leads_newest_first(leads);
        trace.record("Sort Leads By Date", Value::Null, json!({ "count": sorted.len() }));
        Ok::<_, AppError>(sorted)
    }
    .await;
    trace.finish(result)
}

pub async fn admin_send_message(
    state: &Arc<AppState>,
    body: SessionMessageBody,
) -> AppResult<FlowOutcome> {
    require(&body.session_id, "sessionId")?;
    require(&body.message, "message")?;

    let mut trace = FlowTrace::new("admin_send_message");
    let result = state
        .store
        .insert_message(agent_message(&body.session_id, &body.message))
        .await;
    if let Ok(saved) = &result {
        trace.record("Save Admin Message", &body, saved);
    }
    Ok(trace.finish(result))
}

pub async fn register_provider(state: &Arc<AppState>, body: NewProvider) -> AppResult<FlowOutcome> {
    require(&body.name, "name")?;
    if !body.latitude.is_finite()
        || !body.longitude.is_finite()
        || !(-90.0..=90.0).contains(&body.latitude)
        || !(-180.0..=180.0).contains(&body.longitude)
    {
        return Err(AppError::BadRequest(
            "latitude and longitude must be valid coordinates".to_string(),
        ));
    }

    let mut trace = FlowTrace::new("register_provider");
    let input = body.clone();
    let result = state.store.insert_provider(body).await;
    if let Ok(provider) = &result {
        tracing::info!(provider_id = %provider.id, name = %provider.name, "provider registered");
        trace.record("Save Provider", &input, provider);
    }
    Ok(trace.finish(result))
}

fn body_text(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string()
}

pub fn is_audio_media(content_type: &str) -> bool {
    content_type.starts_with("audio/") || content_type.contains("ogg") || content_type.contains("mpeg")
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PreparedInput {
    is_audio: bool,
    mime_type: Option<String>,
    text_body: Option<String>,
    #[serde(skip)]
    audio: Option<FetchedMedia>,
}

/// Inbound WhatsApp message (Twilio form fields).
pub async fn whatsapp_inbound(state: &Arc<AppState>, input: &WebhookInput) -> FlowOutcome {
    let mut trace = FlowTrace::new("whatsapp_inbound");
    let result = whatsapp_steps(state, &input.body, &mut trace).await;
    trace.finish(result)
}

async fn whatsapp_steps(
    state: &Arc<AppState>,
    body: &Value,
    trace: &mut FlowTrace,
) -> AppResult<&'static str> {
    let phone = body_text(body, "From");
    let text_body = body_text(body, "Body");
    let media_type = body_text(body, "MediaContentType0");
    let media_url = body_text(body, "MediaUrl0");
    tracing::info!(%phone, has_media = !media_url.is_empty(), "whatsapp message received");

    let session = state.store.insert_session(&phone, now_millis()).await?;
    trace.record("Create Session", &phone, &session);

    let wa_session = state
        .store
        .insert_whatsapp_session(&phone, &session.id)
        .await?;
    trace.record("Save WhatsApp Session Record", &session.id, &wa_session);

    let saved = state
        .store
        .insert_message(user_message(&session.id, &text_body))
        .await?;
    trace.record("Save User Message", &text_body, &saved);

    let prepared = if is_audio_media(&media_type) {
        match state.media.fetch(&media_url, &media_type).await {
            Ok(media) => PreparedInput {
                is_audio: true,
                mime_type: Some(media.mime_type.clone()),
                text_body: None,
                audio: Some(media),
            },
            Err(err) => {
                tracing::warn!(%media_url, error = %err, "voice note download failed");
                let fallback = if text_body.is_empty() {
                    UNFETCHED_VOICE_NOTE.to_string()
                } else {
                    text_body.clone()
                };
                PreparedInput {
                    is_audio: false,
                    mime_type: None,
                    text_body: Some(fallback),
                    audio: None,
                }
            }
        }
    } else {
        PreparedInput {
            is_audio: false,
            mime_type: None,
            text_body: Some(text_body.clone()),
            audio: None,
        }
    };
    trace.record(
        "Prepare Input",
        json!({ "mediaContentType": media_type }),
        &prepared,
    );

    let resolved_text = match &prepared.audio {
        Some(media) => {
            let stt = state
                .speech
                .transcribe(&media.base64, &media.mime_type)
                .await?;
            trace.record("Transcribe Voice Note", json!({ "mimeType": media.mime_type }), &stt);
            let transcript = integrations::extract_transcript(&stt);
            trace.record("Extract Transcript", Value::Null, json!({ "resolvedText": transcript }));
            transcript
        }
        None => {
            let text = prepared.text_body.clone().unwrap_or_default();
            trace.record("Use Text Body", Value::Null, json!({ "resolvedText": text }));
            text
        }
    };

    let intent = agents::extract_intent(state.llm.as_ref(), &resolved_text).await?;
    trace.record("Extract English Intent", &resolved_text, &intent);

    let parsed = agents::parse_issue(state.llm.as_ref(), &intent.english_message).await?;
    trace.record("Parse Issue", &intent.english_message, &parsed);

    let providers = state.store.list_providers().await?;
    trace.record("Fetch Providers", Value::Null, json!({ "count": providers.len() }));

    let matching = matching::top_for_category(&providers, &parsed.issue_category, LEAD_MATCH_LIMIT);
    let customer_name = match body_text(body, "ProfileName") {
        name if name.is_empty() => "Customer".to_string(),
        name => name,
    };
    let original_message = if text_body.is_empty() {
        "[voice message]"
    } else {
        text_body.as_str()
    };
    let context = prompting::render_whatsapp_context(&CustomerContext {
        customer_name: &customer_name,
        language: &intent.detected_language,
        original_message,
        english_message: &intent.english_message,
        issue_category: &parsed.issue_category,
        car_model: &parsed.car_model,
        issue_summary: &parsed.issue_description,
        providers: &matching,
    });
    trace.record(
        "Build Context",
        json!({ "matchingProviders": matching.len() }),
        json!({
            "contextPrompt": context,
            "senderName": customer_name,
            "senderPhone": phone,
            "detectedLanguage": intent.detected_language,
        }),
    );

    let reply = agents::assistant_reply(state.llm.as_ref(), &context).await?;
    trace.record("AI Assistant", Value::Null, &reply);

    let saved_reply = state
        .store
        .insert_message(agent_message(&session.id, &reply))
        .await?;
    trace.record("Save AI Reply", &reply, &saved_reply);

    Ok("OK")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceReply {
    pub audio_base64: Option<String>,
    pub mime_type: String,
    pub agent_text: String,
    pub transcript: String,
    pub detected_language: String,
    pub issue_category: String,
    pub car_model: String,
    pub success: bool,
}

fn or_default(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

pub async fn voice_chat(state: &Arc<AppState>, body: VoiceChatBody) -> AppResult<FlowOutcome> {
    require(&body.session_id, "sessionId")?;
    require(&body.base64_audio, "base64Audio")?;

    let mut trace = FlowTrace::new("voice_chat");
    let result = voice_steps(state, &body, &mut trace).await;
    Ok(trace.finish(result))
}

async fn voice_steps(
    state: &Arc<AppState>,
    body: &VoiceChatBody,
    trace: &mut FlowTrace,
) -> AppResult<VoiceReply> {
    let mime_type = or_default(&body.mime_type, "audio/webm");
    let stt = state.speech.transcribe(&body.base64_audio, &mime_type).await?;
    trace.record("Voice STT", json!({ "mimeType": mime_type }), &stt);

    let transcript = or_default(&integrations::extract_transcript(&stt), UNTRANSCRIBED_AUDIO);
    trace.record("Extract Transcript", Value::Null, json!({ "resolvedText": transcript }));

    let saved = state
        .store
        .insert_message(user_message(&body.session_id, &transcript))
        .await?;
    trace.record("Save User Message", &transcript, &saved);

    let intent = agents::extract_intent(state.llm.as_ref(), &transcript).await?;
    trace.record("Extract Intent", &transcript, &intent);

    let parsed = agents::parse_issue(state.llm.as_ref(), &intent.english_message).await?;
    trace.record("Parse Issue", &intent.english_message, &parsed);

    let providers = state.store.list_providers().await?;
    trace.record("Fetch Providers", Value::Null, json!({ "count": providers.len() }));

    let matching = matching::top_for_category(&providers, &parsed.issue_category, LEAD_MATCH_LIMIT);
    let context = prompting::render_voice_context(&CustomerContext {
        customer_name: "",
        language: &intent.detected_language,
        original_message: &transcript,
        english_message: &intent.english_message,
        issue_category: &parsed.issue_category,
        car_model: &parsed.car_model,
        issue_summary: &parsed.issue_description,
        providers: &matching,
    });
    trace.record(
        "Build Voice Context",
        json!({ "matchingProviders": matching.len() }),
        json!({ "contextPrompt": context }),
    );

    let agent_text = agents::assistant_reply(state.llm.as_ref(), &context).await?;
    trace.record("Voice AI Assistant", Value::Null, &agent_text);

    let saved_reply = state
        .store
        .insert_message(agent_message(&body.session_id, &agent_text))
        .await?;
    trace.record("Save Agent Reply", &agent_text, &saved_reply);

    let tts = state.speech.synthesize(&agent_text).await?;
    let (audio, audio_mime) = integrations::extract_speech_audio(&tts);
    trace.record(
        "Voice TTS",
        json!({ "characters": agent_text.chars().count() }),
        json!({ "mimeType": audio_mime, "audioBytes": audio.len() }),
    );

    let audio_base64 = (!audio.is_empty()).then_some(audio);
    let reply = VoiceReply {
        success: audio_base64.is_some(),
        audio_base64,
        mime_type: audio_mime,
        agent_text,
        transcript,
        detected_language: or_default(&intent.detected_language, "English"),
        issue_category: or_default(&parsed.issue_category, "General"),
        car_model: or_default(&parsed.car_model, "Unknown"),
    };
    trace.record("Build Final Voice Response", Value::Null, json!({ "success": reply.success }));
    Ok(reply)
}

/// Tool webhook called by the voice agent mid-conversation.
pub async fn tool_call(state: &Arc<AppState>, input: &WebhookInput) -> FlowOutcome {
    let mut trace = FlowTrace::new("tool_call");
    let result = tool_call_steps(state, &input.body, &mut trace).await;
    trace.finish(result)
}

async fn tool_call_steps(
    state: &Arc<AppState>,
    body: &Value,
    trace: &mut FlowTrace,
) -> AppResult<Value> {
    let request = tools::parse_tool_request(body);
    trace.record("Parse Tool Request", body, &request);

    tracing::info!(
        tool = %request.tool_name,
        conversation_id = request.conversation_id.as_deref().unwrap_or("-"),
        "voice agent tool call"
    );
    trace.record(
        "Log Tool Call",
        Value::Null,
        json!({
            "toolName": request.tool_name,
            "parameters": request.parameters,
            "conversationId": request.conversation_id,
        }),
    );

    match Tool::from_name(&request.tool_name) {
        Tool::FindProviders => {
            let providers = state.store.list_providers().await?;
            trace.record("Fetch Providers for Tool", Value::Null, json!({ "count": providers.len() }));

            let params = &request.parameters;
            let origin = Coordinates {
                lat: tools::number_param(params, "latitude"),
                lng: tools::number_param(params, "longitude"),
            };
            let category = tools::text_param(params, "category");
            let found = matching::find_for_tool(&providers, &category, origin);
            let response = json!({
                "providers": found,
                "count": found.len(),
                "tool": FIND_PROVIDERS,
            });
            trace.record("Filter & Format Providers", params, &response);
            Ok(response)
        }
        Tool::IssueCategories => {
            let response = tools::categories_response();
            trace.record("Return Categories", Value::Null, &response);
            Ok(response)
        }
        Tool::PlatformStats => {
            let leads = state.store.list_leads().await?;
            trace.record("Fetch All Leads for Stats", Value::Null, json!({ "count": leads.len() }));
            let providers = state.store.list_providers().await?;
            trace.record("Fetch Providers for Stats", Value::Null, json!({ "count": providers.len() }));
            let messages = state.store.list_messages().await?;
            trace.record("Fetch Messages for Stats", Value::Null, json!({ "count": messages.len() }));

            let stats = analytics::platform_stats(&leads, &providers, &messages);
            let mut response = serde_json::to_value(stats).unwrap_or_else(|_| json!({}));
            response["tool"] = json!(GET_PLATFORM_STATS);
            trace.record("Format Platform Stats", Value::Null, &response);
            Ok(response)
        }
        Tool::Unknown(name) => {
            tracing::warn!(tool = %name, "unsupported voice agent tool");
            let response = tools::unknown_tool_response(&name);
            trace.record("Unknown Tool Response", Value::Null, &response);
            Ok(response)
        }
    }
}
