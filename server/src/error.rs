use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} environment variable is required")]
    MissingConfig(&'static str),

    #[error("{service} returned HTTP {status}: {reason}")]
    Upstream {
        service: &'static str,
        status: u16,
        reason: String,
    },

    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected {service} response: {detail}")]
    Decode {
        service: &'static str,
        detail: String,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl AppError {
    pub fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> AppError {
        move |source| AppError::Http { service, source }
    }

    pub fn decode(service: &'static str, detail: impl Into<String>) -> AppError {
        AppError::Decode {
            service,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::MissingConfig(_) => (StatusCode::SERVICE_UNAVAILABLE, "NOT_CONFIGURED"),
            AppError::Upstream { .. } | AppError::Http { .. } | AppError::Decode { .. } => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR")
            }
            AppError::Database(_) | AppError::Migrate(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (
            status,
            Json(json!({
                "error": {
                    "code": code,
                    "message": self.to_string(),
                }
            })),
        )
            .into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
