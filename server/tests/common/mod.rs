//! Shared test harness: in-memory store plus scripted integrations.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use serde_json::{json, Value};

use repair_desk::agents::LanguageModel;
use repair_desk::app::{build_router, AppState};
use repair_desk::config::Config;
use repair_desk::error::{AppError, AppResult};
use repair_desk::integrations::{FetchedMedia, Geocoder, Mailer, MediaFetcher, SpeechService};
use repair_desk::store::{MemoryStore, Store};
use repair_desk::types::NewProvider;

pub struct FixedGeocoder {
    pub lat: f64,
    pub lng: f64,
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn geocode(&self, _address: &str) -> AppResult<Value> {
        Ok(json!({
            "results": [{ "geometry": { "location": { "lat": self.lat, "lng": self.lng } } }],
            "status": "OK"
        }))
    }
}

pub struct ScriptedSpeech;

#[async_trait]
impl SpeechService for ScriptedSpeech {
    async fn transcribe(&self, _base64_audio: &str, _mime_type: &str) -> AppResult<Value> {
        Ok(json!({ "text": "mis frenos hacen ruido" }))
    }

    async fn synthesize(&self, _text: &str) -> AppResult<Value> {
        Ok(json!({ "audioBase64": "SUQz", "mimeType": "audio/mpeg" }))
    }
}

/// Speech gateway that hears nothing.
pub struct SilentSpeech;

#[async_trait]
impl SpeechService for SilentSpeech {
    async fn transcribe(&self, _base64_audio: &str, _mime_type: &str) -> AppResult<Value> {
        Ok(json!(""))
    }

    async fn synthesize(&self, _text: &str) -> AppResult<Value> {
        Ok(json!({ "audioBase64": "SUQz" }))
    }
}

pub struct FailingMedia;

#[async_trait]
impl MediaFetcher for FailingMedia {
    async fn fetch(&self, _url: &str, _content_type: &str) -> AppResult<FetchedMedia> {
        Err(AppError::Upstream {
            service: "media",
            status: 401,
            reason: "Unauthorized".to_string(),
        })
    }
}

pub struct StaticMedia;

#[async_trait]
impl MediaFetcher for StaticMedia {
    async fn fetch(&self, _url: &str, content_type: &str) -> AppResult<FetchedMedia> {
        Ok(FetchedMedia {
            base64: "T2dnUw==".to_string(),
            mime_type: content_type.to_string(),
        })
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_for: Option<String>,
    /// Behave like a deployment without `RESEND_API_KEY`.
    pub unconfigured: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> AppResult<Value> {
        if self.unconfigured {
            return Err(AppError::MissingConfig("RESEND_API_KEY"));
        }
        if self.fail_for.as_deref() == Some(to) {
            return Err(AppError::Upstream {
                service: "email",
                status: 422,
                reason: "Unprocessable Entity".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(json!({ "success": true, "messageId": "m-1", "status": "sent" }))
    }
}

/// Answers by recognising which agent prompt it was given.
pub struct ScriptedModel;

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str) -> AppResult<String> {
        if system.contains("intake") {
            return Ok(r#"```json
{"carModel":"Honda Civic","issueCategory":"Brakes","issueDescription":"Brakes squeal when stopping."}
```"#
                .to_string());
        }
        if system.contains("englishMessage") {
            return Ok(
                r#"{"englishMessage":"my brakes are making noise","detectedLanguage":"Spanish"}"#
                    .to_string(),
            );
        }
        Ok(format!("Assistant reply to: {}", user.lines().next().unwrap_or("")))
    }
}

pub struct UnconfiguredModel;

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn complete(&self, _system: &str, _user: &str) -> AppResult<String> {
        Err(AppError::MissingConfig("OPENAI_API_KEY"))
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(RecordingMailer::default(), Arc::new(StaticMedia))
    }

    pub fn with(mailer: RecordingMailer, media: Arc<dyn MediaFetcher>) -> Self {
        Self::build(mailer, media, Arc::new(ScriptedSpeech), Arc::new(ScriptedModel))
    }

    pub fn with_speech(speech: Arc<dyn SpeechService>) -> Self {
        Self::build(
            RecordingMailer::default(),
            Arc::new(StaticMedia),
            speech,
            Arc::new(ScriptedModel),
        )
    }

    pub fn without_llm() -> Self {
        Self::build(
            RecordingMailer::default(),
            Arc::new(StaticMedia),
            Arc::new(ScriptedSpeech),
            Arc::new(UnconfiguredModel),
        )
    }

    fn build(
        mailer: RecordingMailer,
        media: Arc<dyn MediaFetcher>,
        speech: Arc<dyn SpeechService>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(mailer);
        let state = Arc::new(AppState {
            config: Config::default(),
            store: store.clone(),
            geocoder: Arc::new(FixedGeocoder { lat: 40.0, lng: -74.0 }),
            speech,
            media,
            mailer: mailer.clone(),
            llm,
        });
        Self {
            state,
            store,
            mailer,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn add_provider(&self, name: &str, services: &[&str], lat: f64, lng: f64) -> String {
        self.store
            .insert_provider(NewProvider {
                name: name.to_string(),
                services: services.iter().map(|s| s.to_string()).collect(),
                email: format!("{}@shops.test", name.to_lowercase().replace(' ', "-")),
                phone: "555-0100".to_string(),
                address: "1 Main St".to_string(),
                latitude: lat,
                longitude: lng,
            })
            .await
            .unwrap()
            .id
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

pub fn step_names(outcome: &Value) -> Vec<String> {
    outcome["trace"]
        .as_array()
        .map(|steps| {
            steps
                .iter()
                .filter_map(|s| s["step"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
