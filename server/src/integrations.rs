//! Outbound HTTP integrations: geocoding, speech, media download and e-mail.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::types::Coordinates;

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const RESEND_URL: &str = "https://api.resend.com/emails";

const STT_MODEL: &str = "scribe_v2";
const TTS_VOICE: &str = "EXAVITQu4vr4xnSDxMaL";
const TTS_MODEL: &str = "eleven_multilingual_v2";
const TTS_FORMAT: &str = "mp3_44100_128";
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Raw geocoding response; see [`extract_coordinates`].
    async fn geocode(&self, address: &str) -> AppResult<Value>;
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn transcribe(&self, base64_audio: &str, mime_type: &str) -> AppResult<Value>;
    async fn synthesize(&self, text: &str) -> AppResult<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMedia {
    pub base64: String,
    pub mime_type: String,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, content_type: &str) -> AppResult<FetchedMedia>;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<Value>;
}

fn is_binary_content(content_type: &str) -> bool {
    ["audio/", "image/", "video/", "application/pdf", "application/octet-stream"]
        .iter()
        .any(|needle| content_type.contains(needle))
}

/// Fails on non-2xx, otherwise decodes by content type: JSON as-is, binary
/// payloads as a base64 string, anything else as text.
async fn read_body(service: &'static str, response: reqwest::Response) -> AppResult<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream {
            service,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("application/json") {
        return response
            .json::<Value>()
            .await
            .map_err(|err| AppError::decode(service, err.to_string()));
    }
    if is_binary_content(&content_type) {
        let bytes = response.bytes().await.map_err(AppError::http(service))?;
        return Ok(Value::String(BASE64.encode(&bytes)));
    }
    let text = response.text().await.map_err(AppError::http(service))?;
    Ok(Value::String(text))
}

/// `results[0].geometry.location`, or the origin when nothing matched.
pub fn extract_coordinates(geocode: &Value) -> Coordinates {
    let location = geocode
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(|first| first.pointer("/geometry/location"));
    let Some(location) = location else {
        return Coordinates::default();
    };
    Coordinates {
        lat: location.get("lat").and_then(Value::as_f64).unwrap_or(0.0),
        lng: location.get("lng").and_then(Value::as_f64).unwrap_or(0.0),
    }
}

/// Pulls the spoken text out of a speech-to-text response, whatever shape
/// the gateway answered with.
pub fn extract_transcript(result: &Value) -> String {
    if let Some(text) = result.as_str() {
        return text.trim().to_string();
    }
    for key in ["text", "transcription"] {
        if let Some(text) = result.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return text.trim().to_string();
            }
        }
    }
    if let Some(words) = result.get("words").and_then(Value::as_array) {
        let joined = words
            .iter()
            .filter_map(|w| w.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.trim().is_empty() {
            return joined.trim().to_string();
        }
    }
    if result.is_null() {
        return String::new();
    }
    result.to_string()
}

/// Audio payload and mime type of a text-to-speech response.
pub fn extract_speech_audio(result: &Value) -> (String, String) {
    if let Some(raw) = result.as_str() {
        return (raw.to_string(), DEFAULT_AUDIO_MIME.to_string());
    }
    let pick = |key: &str| {
        result
            .get(key)
            .or_else(|| result.get("data").and_then(|data| data.get(key)))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    (
        pick("audioBase64").unwrap_or_default(),
        pick("mimeType").unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string()),
    )
}

pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_key: config.google_maps_api_key.clone(),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> AppResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("GOOGLE_MAPS_API_KEY"))?;
        let url = url::Url::parse_with_params(
            GEOCODE_URL,
            &[("key", api_key), ("address", address)],
        )
        .map_err(|err| AppError::decode("geocoding", err.to_string()))?;

        tracing::debug!(%address, "geocoding address");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(AppError::http("geocoding"))?;
        read_body("geocoding", response).await
    }
}

/// Speech-to-text and text-to-speech through the hosted speech gateway.
pub struct SpeechGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SpeechGateway {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.speech_gateway_url.clone(),
            api_key: config.elevenlabs_api_key.clone(),
        }
    }

    async fn post(&self, service: &'static str, path: &str, body: Value) -> AppResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("API_ELEVENLABS_KEY"))?;
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(AppError::http(service))?;
        read_body(service, response).await
    }
}

#[async_trait]
impl SpeechService for SpeechGateway {
    async fn transcribe(&self, base64_audio: &str, mime_type: &str) -> AppResult<Value> {
        tracing::debug!(%mime_type, bytes = base64_audio.len(), "transcribing audio");
        self.post(
            "speech-to-text",
            "speech-to-text",
            json!({
                "modelId": STT_MODEL,
                "base64Audio": base64_audio,
                "mimeType": mime_type,
            }),
        )
        .await
    }

    async fn synthesize(&self, text: &str) -> AppResult<Value> {
        self.post(
            "text-to-speech",
            "text-to-speech",
            json!({
                "voiceId": TTS_VOICE,
                "modelId": TTS_MODEL,
                "outputFormat": TTS_FORMAT,
                "text": text,
            }),
        )
        .await
    }
}

pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, url: &str, content_type: &str) -> AppResult<FetchedMedia> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, content_type)
            .send()
            .await
            .map_err(AppError::http("media"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: "media",
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        let bytes = response.bytes().await.map_err(AppError::http("media"))?;
        let mime_type = if content_type.is_empty() {
            "audio/ogg".to_string()
        } else {
            content_type.to_string()
        };
        Ok(FetchedMedia {
            base64: BASE64.encode(&bytes),
            mime_type,
        })
    }
}

/// Transactional e-mail through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
}

impl ResendMailer {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            api_key: config.resend_api_key.clone(),
            from: config.mail_from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> AppResult<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AppError::MissingConfig("RESEND_API_KEY"))?;
        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(AppError::http("email"))?;
        let payload = read_body("email", response).await?;
        Ok(json!({
            "success": true,
            "messageId": payload.get("id").cloned().unwrap_or(Value::Null),
            "status": "sent",
        }))
    }
}
