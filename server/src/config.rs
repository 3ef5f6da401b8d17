use std::{env, time::Duration};

pub const DEFAULT_SPEECH_GATEWAY_URL: &str =
    "https://integration.vibeflow.ai/api/actions/elevenlabs";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAIL_FROM: &str = "AutoRepair Platform <noreply@yourapp.com>";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@yourapp.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub google_maps_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub speech_gateway_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    pub admin_email: String,
    pub notify_timeout: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            database_url: None,
            google_maps_api_key: None,
            elevenlabs_api_key: None,
            speech_gateway_url: DEFAULT_SPEECH_GATEWAY_URL.to_string(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            resend_api_key: None,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            notify_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(30),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_database_url() -> Option<String> {
    if let Some(url) = non_empty_var("DATABASE_URL") {
        return Some(url);
    }
    let host = non_empty_var("POSTGRES_HOST").or_else(|| non_empty_var("PGHOST"))?;
    let port = non_empty_var("POSTGRES_PORT")
        .or_else(|| non_empty_var("PGPORT"))
        .unwrap_or_else(|| "5432".to_string());
    let user = non_empty_var("POSTGRES_USER")
        .or_else(|| non_empty_var("PGUSER"))
        .unwrap_or_else(|| "postgres".to_string());
    let password = non_empty_var("POSTGRES_PASSWORD")
        .or_else(|| non_empty_var("PGPASSWORD"))
        .unwrap_or_default();
    let db = non_empty_var("POSTGRES_DB")
        .or_else(|| non_empty_var("PGDATABASE"))
        .unwrap_or_else(|| "repair_desk".to_string());
    Some(format!("postgres://{user}:{password}@{host}:{port}/{db}"))
}

impl Config {
    /// Reads `.env` (when present) and the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let port = non_empty_var("PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(defaults.port);
        let notify_timeout = non_empty_var("NOTIFY_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.notify_timeout);
        let http_timeout = non_empty_var("HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        Self {
            port,
            database_url: resolve_database_url(),
            google_maps_api_key: non_empty_var("GOOGLE_MAPS_API_KEY"),
            elevenlabs_api_key: non_empty_var("API_ELEVENLABS_KEY"),
            speech_gateway_url: non_empty_var("SPEECH_GATEWAY_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.speech_gateway_url),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            openai_base_url: non_empty_var("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            openai_model: non_empty_var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            resend_api_key: non_empty_var("RESEND_API_KEY"),
            mail_from: non_empty_var("MAIL_FROM").unwrap_or(defaults.mail_from),
            admin_email: non_empty_var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            notify_timeout,
            http_timeout,
        }
    }
}
