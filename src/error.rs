use std::io;

use slack_morphism::errors::SlackClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("SLACK_TOKEN environment variable not set")]
    MissingToken,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid date format: {0}")]
    InvalidDate(String),

    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Slack API error: {0}")]
    SlackApi(String),

    #[error("Slack rate limit error: {}", retry_after_label(.retry_after_secs))]
    SlackRateLimit { retry_after_secs: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{operation} reported more pages but returned no cursor")]
    TruncatedPagination { operation: String },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no conversations selected")]
    EmptySelection,

    #[error("{failed} of {total} conversations failed to export")]
    ExportIncomplete { failed: usize, total: usize },
}

/// Slack `error` codes that describe a hiccup on Slack's side rather than a
/// problem with the request.
const TRANSIENT_SLACK_ERRORS: &[&str] = &[
    "internal_error",
    "fatal_error",
    "service_unavailable",
    "request_timeout",
];

impl AppError {
    /// Maps the `error` field of a Slack response with `ok: false`.
    pub fn from_slack_error(code: &str) -> Self {
        if code == "ratelimited" {
            AppError::SlackRateLimit {
                retry_after_secs: None,
            }
        } else if TRANSIENT_SLACK_ERRORS.contains(&code) {
            AppError::Network(format!("Slack reported {code}"))
        } else {
            AppError::SlackApi(code.to_string())
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::SlackRateLimit { .. })
    }

    /// Errors worth retrying with backoff. Rate limits are handled separately.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }
}

impl From<SlackClientError> for AppError {
    fn from(err: SlackClientError) -> Self {
        match err {
            SlackClientError::RateLimitError(limit) => AppError::SlackRateLimit {
                retry_after_secs: limit.retry_after.map(|wait| wait.as_secs()),
            },
            SlackClientError::ApiError(api) => AppError::from_slack_error(&api.code),
            SlackClientError::HttpError(http) if http.status_code.is_server_error() => {
                AppError::Network(format!("HTTP {}", http.status_code))
            }
            SlackClientError::HttpError(http) => {
                AppError::SlackApi(format!("HTTP {}", http.status_code))
            }
            SlackClientError::ProtocolError(protocol) => {
                AppError::JsonParse(protocol.json_error.to_string())
            }
            err @ (SlackClientError::HttpProtocolError(_)
            | SlackClientError::EndOfStream(_)
            | SlackClientError::SystemError(_)) => AppError::Network(err.to_string()),
            err => AppError::SlackApi(err.to_string()),
        }
    }
}

fn retry_after_label(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!("retry after {secs}s"),
        None => "no retry interval given".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
