use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use repo_insight_common::error::CommonError;
use repo_insight_common::openai::OpenAiClientError;
use serde::Serialize;
use tracing::error;

use crate::model::MAX_KEYWORD_CHARS;

const GENERIC_SERVER_ERROR: &str =
    "An unexpected server error occurred. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("config error: {0}")]
    Config(String),

    #[error("unsupported languages: {}", .0.join(", "))]
    UnsupportedLanguage(Vec<String>),

    #[error("keyword must not exceed {} characters", MAX_KEYWORD_CHARS)]
    KeywordTooLong,

    #[error("keyword must not be empty")]
    EmptyKeyword,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("failed to load linguist languages: {0}")]
    LinguistFetch(String),

    #[error("documentation fetch failed: {0}")]
    DocsFetch(#[source] reqwest::Error),

    #[error("invalid documentation url: {0}")]
    DocsUrl(String),

    #[error("github request failed: {0}")]
    Github(#[from] reqwest::Error),

    #[error("llm call failed: {0}")]
    Llm(#[from] OpenAiClientError),
}

impl AppError {
    /// Errors caused by the request itself rather than a dependency.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::UnsupportedLanguage(_)
                | AppError::KeywordTooLong
                | AppError::EmptyKeyword
                | AppError::EmptyQuery
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = if self.is_client_error() {
            (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
        } else if matches!(self, AppError::LinguistFetch(_)) {
            error!(error = %self, "linguist language list unavailable");
            (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
        } else {
            error!(error = %self, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_SERVER_ERROR.to_string(),
            )
        };
        (status, Json(ErrorBody::new(detail))).into_response()
    }
}

/// Body used when a handler panics; never carries internal detail.
pub fn generic_server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(GENERIC_SERVER_ERROR)),
    )
        .into_response()
}
