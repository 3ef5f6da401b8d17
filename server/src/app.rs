use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::agents::{LanguageModel, OpenAiChat};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::flows::{self, FlowOutcome};
use crate::integrations::{
    Geocoder, GoogleGeocoder, HttpMediaFetcher, Mailer, MediaFetcher, ResendMailer,
    SpeechGateway, SpeechService,
};
use crate::pg_store::PgStore;
use crate::store::{MemoryStore, Store};
use crate::types::*;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub geocoder: Arc<dyn Geocoder>,
    pub speech: Arc<dyn SpeechService>,
    pub media: Arc<dyn MediaFetcher>,
    pub mailer: Arc<dyn Mailer>,
    pub llm: Arc<dyn LanguageModel>,
}

impl AppState {
    /// Wires the real HTTP integrations around the given store.
    pub fn live(config: Config, store: Arc<dyn Store>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(AppError::http("http client"))?;
        Ok(Self {
            geocoder: Arc::new(GoogleGeocoder::new(client.clone(), &config)),
            speech: Arc::new(SpeechGateway::new(client.clone(), &config)),
            media: Arc::new(HttpMediaFetcher::new(client.clone())),
            mailer: Arc::new(ResendMailer::new(client.clone(), &config)),
            llm: Arc::new(OpenAiChat::new(client, &config)),
            store,
            config,
        })
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

fn outcome_response(outcome: FlowOutcome) -> Response {
    (outcome.status, Json(outcome)).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "now": now_iso() }))
}

async fn submit_issue(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitIssueBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(flows::submit_issue(&state, body).await?))
}

async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
    body: Result<Json<LeadStatusBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(
        flows::update_lead_status(&state, &lead_id, body).await?,
    ))
}

async fn send_chat_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SessionMessageBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(flows::send_chat_message(&state, body).await?))
}

async fn escalate_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Response> {
    Ok(outcome_response(
        flows::escalate_session(&state, &session_id).await?,
    ))
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Response> {
    Ok(outcome_response(flows::chat_history(&state, &session_id).await?))
}

async fn submit_rating(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitRatingBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(flows::submit_rating(&state, body).await?))
}

async fn nearby_providers(
    State(state): State<Arc<AppState>>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) = query?;
    Ok(outcome_response(flows::nearby_providers(&state, query).await))
}

async fn provider_leads(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<String>,
) -> AppResult<Response> {
    Ok(outcome_response(
        flows::provider_leads(&state, &provider_id).await?,
    ))
}

async fn voice_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<VoiceChatBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(flows::voice_chat(&state, body).await?))
}

async fn admin_analytics(State(state): State<Arc<AppState>>) -> Response {
    outcome_response(flows::admin_analytics(&state).await)
}

async fn admin_sessions(State(state): State<Arc<AppState>>) -> Response {
    outcome_response(flows::admin_sessions(&state).await)
}

async fn admin_send_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SessionMessageBody>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(
        flows::admin_send_message(&state, body).await?,
    ))
}

async fn admin_providers(State(state): State<Arc<AppState>>) -> Response {
    outcome_response(flows::admin_providers(&state).await)
}

async fn register_provider(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewProvider>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = body?;
    Ok(outcome_response(
        flows::register_provider(&state, body).await?,
    ))
}

async fn admin_leads(State(state): State<Arc<AppState>>) -> Response {
    outcome_response(flows::admin_leads(&state).await)
}

fn form_to_json(raw: &[u8]) -> Value {
    let map = url::form_urlencoded::parse(raw)
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect::<Map<_, _>>();
    Value::Object(map)
}

/// Decodes a webhook body by content type: JSON, url-encoded form, else the
/// raw text.
pub fn parse_webhook_body(content_type: &str, raw: &[u8]) -> Value {
    let text = String::from_utf8_lossy(raw);
    if content_type.contains("application/json") {
        return serde_json::from_slice(raw).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "webhook body is not valid JSON");
            Value::String(text.into_owned())
        });
    }
    if content_type.contains("application/x-www-form-urlencoded") {
        return form_to_json(raw);
    }
    Value::String(text.into_owned())
}

fn webhook_input(method: &Method, uri: &Uri, headers: &HeaderMap, raw: &[u8]) -> WebhookInput {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let header_map = headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), Value::String(value.to_string())))
        })
        .collect::<Map<_, _>>();
    WebhookInput {
        body: parse_webhook_body(&content_type, raw),
        headers: Value::Object(header_map),
        query: form_to_json(uri.query().unwrap_or("").as_bytes()),
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        url: uri.to_string(),
    }
}

fn webhook_response(outcome: FlowOutcome) -> Response {
    match outcome.error {
        None => Json(json!({
            "success": true,
            "result": outcome.result,
            "trace": outcome.trace,
            "timestamp": now_iso(),
        }))
        .into_response(),
        Some(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Webhook processing failed",
                "message": message,
                "trace": outcome.trace,
            })),
        )
            .into_response(),
    }
}

async fn whatsapp_webhook(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input = webhook_input(&method, &uri, &headers, &body);
    tracing::info!(path = %input.path, "whatsapp webhook received");
    webhook_response(flows::whatsapp_inbound(&state, &input).await)
}

async fn tool_call_webhook(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input = webhook_input(&method, &uri, &headers, &body);
    tracing::info!(path = %input.path, "tool call webhook received");
    webhook_response(flows::tool_call(&state, &input).await)
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/leads", post(submit_issue))
        .route("/api/leads/{lead_id}/status", patch(update_lead_status))
        .route("/api/chat/messages", post(send_chat_message))
        .route(
            "/api/chat/sessions/{session_id}/escalate",
            post(escalate_session),
        )
        .route(
            "/api/chat/sessions/{session_id}/messages",
            get(chat_history),
        )
        .route("/api/ratings", post(submit_rating))
        .route("/api/providers/nearby", get(nearby_providers))
        .route("/api/providers/{provider_id}/leads", get(provider_leads))
        .route("/api/voice", post(voice_chat))
        .route("/api/admin/analytics", get(admin_analytics))
        .route("/api/admin/sessions", get(admin_sessions))
        .route("/api/admin/messages", post(admin_send_message))
        .route(
            "/api/admin/providers",
            get(admin_providers).post(register_provider),
        )
        .route("/api/admin/leads", get(admin_leads))
        .route("/whatsapp-webhook", post(whatsapp_webhook))
        .route("/elevenlabs-tool-call", post(tool_call_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn open_store(config: &Config) -> AppResult<Arc<dyn Store>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("no database configured, using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("connected to postgres and applied migrations");
    Ok(Arc::new(PgStore::new(db)))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let port = config.port;
    let state = Arc::new(AppState::live(config, store)?);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("repair desk server running at http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}
